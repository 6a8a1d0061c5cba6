//! Configuration parsing and types.
//!
//! - `types` - Instance settings (`InstanceConfig`, `AutoStart`) and the root `Config`
//! - `duration` - Human-readable durations ("100ms", "10s")
//! - `search_paths` - Where engine executables are looked up
//! - `parser` - YAML config file loading

mod duration;
mod parser;
mod search_paths;
mod types;

pub use duration::*;
pub use parser::*;
pub use search_paths::*;
pub use types::*;
