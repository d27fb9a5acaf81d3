use clap::Parser;
use power_nap::domain::settings::SettingsService;
use power_nap::infrastructure::logging;
use power_nap::presentation::cli::{self, Cli};
use tracing::{debug, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = SettingsService::new()?;
    let mut log_settings = settings.get().log_settings.clone();
    if let Some(level) = &cli.log_level {
        log_settings.level = level.clone();
    }
    let _logging_guard = logging::init_logger(&log_settings)?;
    info!("Starting Power Nap");
    debug!("Settings file: {}", settings.path().display());

    cli::run(cli, settings).await
}
