pub mod amd_driver;
pub mod arg_parser;
pub mod config_manager;
pub mod device_data;
pub mod devices_manager;
pub mod gpu_device;
pub mod log_throttle;
pub mod logger;
pub mod power_settings;
pub mod profile;
pub mod tdp;
