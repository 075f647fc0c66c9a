use std::{io, path::PathBuf};

use argparse::{ArgumentParser, Print, Store, StoreOption, StoreTrue};

use crate::config_manager::DaemonConfig;

const DEFAULT_CONFIG_PATH: &str = "/etc/amdmon/config.json";

// Command line options, each set option overrides the config file
pub struct ArgsOptions {
    pub config_file_path: PathBuf,

    pub disable_power_mode_settings: bool,
    pub update_interval_ms: Option<u64>,
}

impl ArgsOptions {
    // Parse the process arguments, exiting on error or after --help
    pub fn parse() -> Self {
        match Self::parse_from(std::env::args().collect()) {
            Ok(options) => options,
            Err(code) => std::process::exit(code),
        }
    }

    // Parse an explicit argument list, the first element is the program name.
    // On failure the parser exit code is returned
    pub fn parse_from(args: Vec<String>) -> Result<Self, i32> {
        let mut options = ArgsOptions::default();

        {
            let mut parser = ArgumentParser::new();
            parser.set_description(
                "AMD GPU monitoring and power control daemon",
            );

            parser.refer(&mut options.config_file_path).add_option(
                &["-c", "--config"],
                Store,
                "The file path of the configuration file",
            );

            parser
                .refer(&mut options.disable_power_mode_settings)
                .add_option(
                    &["--disable-power-settings"],
                    StoreTrue,
                    "Reject every power mode change",
                );

            parser.refer(&mut options.update_interval_ms).add_option(
                &["-i", "--interval"],
                StoreOption,
                "Sensor polling interval in milliseconds",
            );

            // Show daemon version
            parser.add_option(
                &["-V", "--version"],
                Print(env!("CARGO_PKG_VERSION").to_string()),
                "Show the daemon version",
            );

            parser.parse(args, &mut io::stdout(), &mut io::stderr())?;
        }

        Ok(options)
    }

    pub fn apply_overrides(&self, config: &mut DaemonConfig) {
        if self.disable_power_mode_settings {
            config.disable_device_power_mode_settings = true;
        }

        if let Some(interval) = self.update_interval_ms {
            config.update_interval_ms = interval;
        }
    }
}

impl Default for ArgsOptions {
    fn default() -> Self {
        Self {
            config_file_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            disable_power_mode_settings: false,
            update_interval_ms: None,
        }
    }
}
