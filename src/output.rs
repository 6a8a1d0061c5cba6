/// Abstraction over user-facing output.
///
/// Command modules use this trait instead of `println!`/`eprintln!` so that
/// machine-readable output on stdout is never mixed with status messages.
pub trait UserOutput: Send + Sync {
    /// Informational status message (e.g., "Starting postgresql...")
    fn status(&self, message: &str);

    /// Result data the caller may want to capture (DSN, URL, JSON)
    fn data(&self, message: &str);

    fn warning(&self, message: &str);
}

/// Standard CLI output: data on stdout, everything else on stderr.
pub struct CliOutput;

impl UserOutput for CliOutput {
    fn status(&self, message: &str) {
        eprintln!("{}", message);
    }

    fn data(&self, message: &str) {
        println!("{}", message);
    }

    fn warning(&self, message: &str) {
        eprintln!("\x1b[33m{}\x1b[0m", message);
    }
}
