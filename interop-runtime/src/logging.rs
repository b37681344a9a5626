//! `tracing` subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;
use crate::error::{Error, Result};

/// Install a global `fmt` subscriber.
///
/// `RUST_LOG` is honoured, with `config.filter` added as a default directive.
/// JSON output when `config.json` is set. Calling this again, or after the
/// host installed its own subscriber, is harmless.
pub fn init(config: &LogConfig) -> Result<()> {
    install(config, false)
}

/// As [`init`]; with `test_writer` output goes through the test harness
/// capture instead of straight to stdout.
pub(crate) fn install(config: &LogConfig, test_writer: bool) -> Result<()> {
    let directive = config
        .filter
        .parse()
        .map_err(|e| Error::Config(format!("log filter {:?}: {e}", config.filter)))?;
    let filter = EnvFilter::from_default_env().add_directive(directive);
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match (config.json, test_writer) {
        (true, false) => builder.json().try_init(),
        (true, true) => builder.json().with_test_writer().try_init(),
        (false, false) => builder.try_init(),
        (false, true) => builder.with_test_writer().try_init(),
    };
    if let Err(e) = installed {
        tracing::debug!("subscriber already installed: {e}");
    }
    Ok(())
}
