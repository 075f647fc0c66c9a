use std::{collections::BTreeMap, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{
    amd_driver::{AmdDriver, sysfs::SysfsDriver},
    config_manager::{DaemonConfig, TdpConfig},
    device_data::DeviceData,
    gpu_device::{ProfileApplicable, Tdp, amd_device::AmdDevice},
    power_settings::PowerSettings,
    tdp::TdpSettingType,
};

// Own the monitored GPUs, apply their configuration
// and poll their sensors until cancelled
pub struct DevicesManager<D: AmdDriver + 'static> {
    // Monitored devices by bus id
    devices: BTreeMap<i32, AmdDevice<D>>,

    config: DaemonConfig,
    update_interval: Duration,
}

impl DevicesManager<SysfsDriver> {
    // Discover the amdgpu devices on the system
    pub fn discover(
        config: DaemonConfig,
        power_settings: PowerSettings,
    ) -> Result<Self> {
        let driver = Arc::new(SysfsDriver::system());

        let bus_ids = driver
            .discover()
            .context("Failed to enumerate amdgpu devices")?;

        if bus_ids.is_empty() {
            warn!("No amdgpu device found");
        }

        let devices: Vec<(String, i32)> = bus_ids
            .into_iter()
            .map(|bus_id| {
                let uuid = driver
                    .unique_id(bus_id)
                    .unwrap_or_else(|| format!("pci-{bus_id:02x}"));

                debug!("Found AMD device \"{uuid}\" on bus {bus_id}");
                (uuid, bus_id)
            })
            .collect();

        Ok(Self::new(driver, &devices, config, power_settings))
    }
}

impl<D: AmdDriver + 'static> DevicesManager<D> {
    // Create a monitor for each (uuid, bus id) pair
    pub fn new(
        driver: Arc<D>,
        devices: &[(String, i32)],
        config: DaemonConfig,
        power_settings: PowerSettings,
    ) -> Self {
        let devices = devices
            .iter()
            .map(|(uuid, bus_id)| {
                let device = AmdDevice::new(
                    driver.clone(),
                    uuid,
                    *bus_id,
                    power_settings.clone(),
                    config.log_window(),
                );

                (*bus_id, device)
            })
            .collect();

        Self {
            devices,
            update_interval: config.update_interval(),
            config,
        }
    }

    pub fn device(&self, bus_id: i32) -> Option<&AmdDevice<D>> {
        self.devices.get(&bus_id)
    }

    // Apply the configured power target and profile of every device.
    // Failures are logged and never stop the remaining devices
    pub async fn apply_config(&self) {
        for device_config in &self.config.devices {
            let Some(device) = self.devices.get(&device_config.bus_id) else {
                warn!(
                    "Configured device on bus {} was not found",
                    device_config.bus_id
                );
                continue;
            };

            match &device_config.tdp {
                Some(TdpConfig::Simple(level)) => {
                    device.set_setting_type(TdpSettingType::Simple);

                    if let Err(err) = device.set_tdp_simple_name(level) {
                        warn!("Device \"{}\": {err}", device.uuid());
                    }
                }
                Some(TdpConfig::Percentage(percentage)) => {
                    device.set_setting_type(TdpSettingType::Percentage);

                    if let Err(err) = device.set_tdp_percentage(*percentage) {
                        warn!("Device \"{}\": {err}", device.uuid());
                    }
                }
                None => {}
            }

            // A profile without any target has nothing to apply
            let profile = device_config
                .profile
                .as_ref()
                .filter(|profile| !profile.is_empty());

            if let Some(profile) = profile {
                match device.apply_profile(profile).await {
                    Ok(()) => {
                        info!("Device \"{}\": profile applied", device.uuid())
                    }
                    Err(err) => warn!("Device \"{}\": {err}", device.uuid()),
                }
            }
        }
    }

    // Read the current sensor values of every device
    pub fn snapshots(&self) -> Vec<DeviceData> {
        self.devices.values().map(AmdDevice::snapshot).collect()
    }

    pub async fn run(&mut self, run_token: CancellationToken) {
        info!("Devices manager: Running");

        loop {
            select! {
                _ = run_token.cancelled() => {
                    info!("Devices manager: Quiting");

                    break;
                },
                _ = tokio::time::sleep(self.update_interval) => {
                    self.update();
                }
            }
        }
    }

    fn update(&self) {
        for data in self.snapshots() {
            match serde_json::to_string(&data) {
                Ok(json) => debug!("{json}"),
                Err(err) => trace!("Failed to serialize device data: {err}"),
            }
        }
    }
}
