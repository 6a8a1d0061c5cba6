mod run;
mod which;

pub use run::{run_server, RunOptions};
pub use which::run_which;
