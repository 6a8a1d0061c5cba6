//! Produces instances that share one pre-initialized data directory.
//!
//! Initializing a data directory (initdb plus schema setup) usually dominates
//! instance start time. With caching enabled the factory does that work once
//! in a template instance, then points every produced instance's
//! `copy_data_from` at the template's data directory.

use crate::config::{AutoStart, InstanceConfig};
use crate::engine::Engine;
use crate::error::Result;
use crate::instance::ServiceInstance;
use futures::future::BoxFuture;
use std::path::Path;

/// Seeding hook run against the running template instance.
pub type InitHook<E> = Box<
    dyn for<'a> FnOnce(&'a mut ServiceInstance<E>) -> BoxFuture<'a, Result<()>> + Send,
>;

/// Box a closure as an [`InitHook`].
///
/// ```no_run
/// # use ephemeral_service::{factory::init_hook, PostgresEngine};
/// use futures::FutureExt;
///
/// let hook = init_hook::<PostgresEngine, _>(|pg| {
///     async move {
///         tokio::fs::write(pg.data_dir().join("seeded"), "").await?;
///         Ok(())
///     }
///     .boxed()
/// });
/// ```
pub fn init_hook<E, F>(f: F) -> InitHook<E>
where
    E: Engine,
    F: for<'a> FnOnce(&'a mut ServiceInstance<E>) -> BoxFuture<'a, Result<()>> + Send + 'static,
{
    Box::new(f)
}

pub struct ServiceFactory<E: Engine + Clone> {
    engine: E,
    config: InstanceConfig,
    template: Option<ServiceInstance<E>>,
}

impl<E: Engine + Clone> ServiceFactory<E> {
    /// Resolve executables and, when `cache_initialized_data` is set, build
    /// the template.
    ///
    /// With a hook the template is fully started, seeded by the hook and then
    /// terminated; its directory is kept. Without a hook it is only
    /// provisioned. The hook is ignored when caching is off.
    pub async fn build(
        mut engine: E,
        config: InstanceConfig,
        cache_initialized_data: bool,
        on_initialized: Option<InitHook<E>>,
    ) -> Result<Self> {
        engine.resolve_executables()?;

        let mut factory = Self {
            engine,
            config,
            template: None,
        };

        if cache_initialized_data {
            let template = factory.build_template(on_initialized).await?;
            tracing::info!(
                "Cached initialized {} data in {}",
                factory.engine.name(),
                template.data_dir().display()
            );
            factory.config.copy_data_from = Some(template.data_dir().to_path_buf());
            factory.template = Some(template);
        } else if on_initialized.is_some() {
            tracing::warn!("on_initialized hook ignored: data caching is disabled");
        }

        Ok(factory)
    }

    async fn build_template(&self, hook: Option<InitHook<E>>) -> Result<ServiceInstance<E>> {
        let auto_start = if hook.is_some() {
            AutoStart::ProvisionAndStart
        } else {
            AutoStart::Manual
        };
        let config = InstanceConfig {
            base_dir: None,
            port: None,
            auto_start,
            ..self.config.clone()
        };

        let mut template = ServiceInstance::new(self.engine.clone(), config).await?;
        match hook {
            Some(hook) => {
                if let Err(e) = hook(&mut template).await {
                    if let Err(stop_err) = template.stop().await {
                        tracing::warn!("Failed to stop template after hook error: {}", stop_err);
                    }
                    return Err(e);
                }
                let signal = template.engine().stop_signal();
                template.terminate(signal).await?;
            }
            None => template.provision().await?,
        }
        Ok(template)
    }

    /// A new instance from the stored engine and config.
    pub async fn produce(&self) -> Result<ServiceInstance<E>> {
        ServiceInstance::new(self.engine.clone(), self.config.clone()).await
    }

    /// Tear down the template and stop cloning from it. Later `produce()`
    /// calls initialize from scratch.
    pub fn clear(&mut self) {
        if let Some(mut template) = self.template.take() {
            self.config.copy_data_from = None;
            template.cleanup();
            tracing::debug!("Cleared {} data cache", self.engine.name());
        }
    }

    /// Data directory new instances are cloned from, while caching is active.
    pub fn template_directory(&self) -> Option<&Path> {
        self.template.as_ref().map(|t| t.data_dir())
    }

    pub fn config(&self) -> &InstanceConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }
}
