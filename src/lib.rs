#![allow(unused_assignments)]

//! # Ephemeral Service
//!
//! Throwaway database servers for tests: each instance gets its own
//! directory, port and process, and is torn down when the test is done.
//!
//! ## Features
//!
//! - **Instance Lifecycle**: Provision, start, readiness wait, stop and cleanup of one server process
//! - **Port Allocation**: Free ephemeral ports picked by the OS
//! - **Readiness Probes**: TCP, PostgreSQL handshake and file-existence checks
//! - **Data Caching**: A factory that initializes a data directory once and clones it per instance
//! - **Fork Safety**: Only the process that created an instance can stop it
//! - **PostgreSQL Engine**: initdb, `postgres` and default database creation
//!
//! ## Quick Start
//!
//! ```no_run
//! use ephemeral_service::{InstanceConfig, PostgresEngine, ServiceInstance};
//!
//! # async fn example() -> ephemeral_service::Result<()> {
//! let mut pg = ServiceInstance::new(PostgresEngine::default(), InstanceConfig::default()).await?;
//! println!("connect to {}", pg.url()?);
//!
//! // Stops the server and removes its temp directory
//! pg.stop().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Caching
//!
//! ```no_run
//! use ephemeral_service::{InstanceConfig, PostgresEngine, ServiceFactory};
//!
//! # async fn example() -> ephemeral_service::Result<()> {
//! let factory =
//!     ServiceFactory::build(PostgresEngine::default(), InstanceConfig::default(), true, None)
//!         .await?;
//!
//! // Each instance starts from a copy of the cached data directory
//! let mut a = factory.produce().await?;
//! let mut b = factory.produce().await?;
//! a.stop().await?;
//! b.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod factory;
pub mod instance;
pub mod port;
pub mod probe;

// Re-export commonly used types
pub use config::{AutoStart, Config, InstanceConfig, Parser, SearchPaths};
pub use connection::{ConnectionOverrides, ConnectionParams};
pub use engine::{CommandLine, Engine, PostgresConfig, PostgresEngine};
pub use error::{Error, Result};
pub use factory::{init_hook, InitHook, ServiceFactory};
pub use instance::{Layout, Lifecycle, ServiceInstance};
pub use port::PortAllocator;
pub use probe::{PathProbe, PostgresProbe, ReadinessProbe, TcpProbe};
