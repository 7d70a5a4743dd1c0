use std::sync::Arc;

use alertgram::{
	alertmanager_webhook_receiver::{self, State},
	log,
	settings::{CommandLine, ConfigFile, Settings},
	telemetry_endpoint,
};
use anyhow::{Context, Result};
use prometheus::Registry;

/// exit the complete program if one thread panics
fn setup_panic_handler() {
	let default_panic = std::panic::take_hook();
	std::panic::set_hook(Box::new(move |info| {
		default_panic(info);
		std::process::exit(1);
	}));
}

/// the entry point of the program
#[tokio::main]
pub async fn main() -> Result<()> {
	setup_panic_handler();

	let opts = CommandLine::parse();
	let (settings, config_file) =
		Settings::from_command_line(&opts).context("failed to load config")?;

	log::setup_logging(&settings.log).context("could not setup logging")?;

	if let ConfigFile::Missing(path) = &config_file {
		tracing::warn!("config file {} not found, using defaults", path.display());
	}

	let registry = Registry::new();
	let state = Arc::new(
		State::new(&settings, &registry).context("failed to construct alert receiver")?,
	);

	state.spawn_account_check();

	tokio::try_join!(
		alertmanager_webhook_receiver::run_prometheus_receiver(
			&settings.alert_webhook_receiver,
			state
		),
		telemetry_endpoint::run_telemetry_endpoint(&settings.telemetry_endpoint, registry),
	)?;

	Ok(())
}
