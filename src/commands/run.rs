use crate::output::UserOutput;
use ephemeral_service::{Config, ServiceInstance};
use std::path::PathBuf;

/// Command line overrides for `ephem run`.
#[derive(Debug, Default)]
pub struct RunOptions {
    pub port: Option<u16>,
    pub base_dir: Option<PathBuf>,
    pub copy_data_from: Option<PathBuf>,
    pub database: Option<String>,
    pub json: bool,
}

impl RunOptions {
    fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.instance.port = Some(port);
        }
        if let Some(ref base_dir) = self.base_dir {
            config.instance.base_dir = Some(base_dir.clone());
        }
        if let Some(ref source) = self.copy_data_from {
            config.instance.copy_data_from = Some(source.clone());
        }
        if let Some(ref database) = self.database {
            config.postgres.database = database.clone();
        }
    }
}

pub async fn run_server(
    mut config: Config,
    options: RunOptions,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    options.apply(&mut config);
    let engine = config.postgres_engine();

    out.status("Starting postgresql...");
    let mut instance = ServiceInstance::new(engine, config.instance).await?;
    let params = instance.connection()?;
    let url = instance.url()?;

    if options.json {
        let summary = serde_json::json!({
            "url": url,
            "dsn": params,
            "pid": instance.pid(),
            "base_dir": instance.base_dir(),
            "started_at": instance.started_at(),
        });
        out.data(&serde_json::to_string_pretty(&summary)?);
    } else {
        out.data(&url);
        out.data(&params.to_string());
        if let Some(started_at) = instance.started_at() {
            out.status(&format!(
                "pid {:?}, started at {}, base dir {}",
                instance.pid(),
                started_at.to_rfc3339(),
                instance.base_dir().display()
            ));
        }
    }

    out.status("Press Ctrl-C to stop");
    let interrupted = tokio::signal::ctrl_c().await;

    out.status("Stopping postgresql...");
    if !instance.is_alive() {
        out.warning("postgresql exited before it was stopped");
    }
    let stopped = instance.stop().await;
    interrupted?;
    stopped?;
    Ok(())
}
