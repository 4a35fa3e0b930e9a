//! Logger initialisation.
//!
//! The library itself only emits `log` records; applications embedding it
//! can call [`init_logger`] or install any other `log` backend.

use std::io::Write;

use env_logger::{Builder, Env};

/// Initialise `env_logger`.
///
/// `RUST_LOG` takes precedence; otherwise the level is `info`, or `debug`
/// when `verbose` is set. Returns false if a logger was already installed.
pub fn init_logger(verbose: bool) -> bool {
    let default_level = if verbose { "debug" } else { "info" };

    Builder::from_env(Env::default().default_filter_or(default_level))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {:<5} {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice() {
        let _ = init_logger(false);
        assert!(!init_logger(true));
    }
}
