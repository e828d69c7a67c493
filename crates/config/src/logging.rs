use anyhow::Result;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Overrides the configured log level when set, with the usual `EnvFilter` directive syntax.
pub const LOG_ENV_VAR: &str = "EDGEHUB_LOG";

/// Installs the global `tracing` subscriber. Later calls keep the first subscriber.
pub fn init_logging(level: &str) -> Result<()> {
	let filter = EnvFilter::try_from_env(LOG_ENV_VAR).or_else(|_| EnvFilter::try_new(level))?;

	if tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(true)
		.try_init()
		.is_err()
	{
		debug!("Tracing subscriber already installed");
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn installs_once() {
		init_logging("eh_config=debug").unwrap();
		init_logging("info").unwrap();
	}

	#[test]
	fn rejects_malformed_levels() {
		if std::env::var_os(LOG_ENV_VAR).is_none() {
			assert!(init_logging("eh_config=loud").is_err());
		}
	}
}
