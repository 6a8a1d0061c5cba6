use crate::output::UserOutput;
use ephemeral_service::{Config, Engine};

pub fn run_which(config: &Config, out: &dyn UserOutput) -> anyhow::Result<()> {
    let mut engine = config.postgres_engine();
    engine.resolve_executables()?;

    let resolved = engine.config();
    if let Some(ref initdb) = resolved.initdb {
        out.data(&format!("initdb:   {}", initdb.display()));
    }
    if let Some(ref postgres) = resolved.postgres {
        out.data(&format!("postgres: {}", postgres.display()));
    }
    Ok(())
}
