use amdmon::{
    arg_parser::ArgsOptions, config_manager::ConfigManager,
    devices_manager::DevicesManager, logger, power_settings::PowerSettings,
};
use anyhow::{Context, Result};
use tokio::signal::ctrl_c;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

#[tokio::main]
async fn main() -> Result<()> {
    logger::init_logging();

    // Parse the command line arguments
    let args_options = ArgsOptions::parse();

    let mut config = ConfigManager::new(&args_options.config_file_path)
        .load()
        .context("Failed to load the configuration")?;
    args_options.apply_overrides(&mut config);

    // Shared by every device, changes apply to all of them
    let power_settings =
        PowerSettings::new(config.disable_device_power_mode_settings);

    // This token and tracker will be used to handle graceful shutdown
    let tracker = TaskTracker::new();
    let token = CancellationToken::new();

    let mut devices_manager = DevicesManager::discover(config, power_settings)?;
    devices_manager.apply_config().await;

    // Start the devices manager
    {
        let token = token.clone();

        tracker.spawn(async move {
            devices_manager.run(token).await;
        });
    }

    ctrl_c().await?;

    // Cancel the token to communicate the program
    // termination to the running tasks
    token.cancel();

    // Wait for the tasks to finish
    tracker.close();
    tracker.wait().await;

    Ok(())
}
