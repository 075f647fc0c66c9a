use std::{
    fmt::Display,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use tracing::{error, info};

use crate::{
    amd_driver::{AmdDriver, DriverError, DriverResult},
    device_data::DeviceData,
    gpu_device::{
        FanSpeedPercentage, FanSpeedRpm, Load, MemoryTimings,
        PowerUsage, ProfileApplicable, Tdp, Temperature,
    },
    log_throttle::LogThrottle,
    power_settings::PowerSettings,
    profile::{ProfileChangeSet, ProfileError, ProfileTransaction},
    tdp::{self, TdpError, TdpSettingType, TdpSimpleLevel},
};

// Monitor and control a single AMD GPU through the native driver
pub struct AmdDevice<D: AmdDriver + 'static> {
    // Store the native driver shared by every device
    driver: Arc<D>,

    // Store the GPU identifiers, the bus id scopes every driver call
    uuid: String,
    bus_id: i32,

    power_settings: PowerSettings,
    log_throttle: LogThrottle,

    // Power target state
    setting_type: Mutex<TdpSettingType>,
    tdp_simple: Mutex<TdpSimpleLevel>,
}

impl<D: AmdDriver + 'static> AmdDevice<D> {
    // Create a new device monitor and apply the high power level.
    // Construction never fails, a rejected power level is only logged
    pub fn new(
        driver: Arc<D>,
        uuid: &str,
        bus_id: i32,
        power_settings: PowerSettings,
        log_window: Duration,
    ) -> Self {
        let device = Self {
            driver,
            uuid: uuid.to_string(),
            bus_id,
            power_settings,
            log_throttle: LogThrottle::new(log_window),
            setting_type: Mutex::new(TdpSettingType::default()),
            tdp_simple: Mutex::new(TdpSimpleLevel::High),
        };

        let default_level = TdpSimpleLevel::High;
        if let Err(err) = device.set_tdp_simple(default_level) {
            info!(
                "{}: Cannot set power target ({default_level}) for device \
                with bus id {bus_id}: {err}",
                device.log_tag()
            );
        }

        device
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn bus_id(&self) -> i32 {
        self.bus_id
    }

    fn log_tag(&self) -> String {
        format!("amd-device(uuid={}, bus={})", self.uuid, self.bus_id)
    }

    // Report a failed driver call, at most once per window for each call
    fn report(&self, call: &str, err: &DriverError) {
        let tag = format!("{}/{call}", self.log_tag());

        self.log_throttle
            .info_delayed(&tag, &format!("{tag} failed: {err}"));
    }

    // Turn a driver read into an optional value, logging failures
    fn read<T>(&self, call: &str, result: DriverResult<T>) -> Option<T> {
        result.inspect_err(|err| self.report(call, err)).ok()
    }

    // Map the normalized power target onto the device range and apply it
    fn set_tdp_native(&self, percentage: f64) -> Result<(), TdpError> {
        let range = self
            .driver
            .get_tdp_range(self.bus_id)
            .inspect_err(|err| self.report("get_tdp_range", err))?;

        let limit = tdp::native_value(percentage, &range);

        self.driver
            .set_tdp(self.bus_id, limit)
            .inspect_err(|err| self.report("set_tdp", err))?;

        Ok(())
    }

    fn check_power_mode_enabled(&self, call: &str) -> Result<(), TdpError> {
        if self.power_settings.is_disabled() {
            let tag = format!("{}/{call}", self.log_tag());

            self.log_throttle.info_delayed(
                &tag,
                &format!("{tag}: device power mode settings are disabled"),
            );
            return Err(TdpError::Disabled);
        }

        Ok(())
    }

    // Apply a simple power level given as a raw number,
    // unknown values fall back to the high level
    pub fn set_tdp_simple_raw(&self, raw: i32) -> Result<(), TdpError> {
        self.apply_tdp_simple(TdpSimpleLevel::from_raw(raw), raw)
    }

    // Apply a simple power level given by name,
    // unknown names fall back to the high level
    pub fn set_tdp_simple_name(&self, name: &str) -> Result<(), TdpError> {
        self.apply_tdp_simple(name.parse().ok(), name)
    }

    fn apply_tdp_simple(
        &self,
        level: Option<TdpSimpleLevel>,
        requested: impl Display,
    ) -> Result<(), TdpError> {
        self.check_power_mode_enabled("set_tdp_simple")?;

        let level = level.unwrap_or_else(|| {
            error!(
                "{}: Unknown power level {requested}, defaulting to {}",
                self.log_tag(),
                TdpSimpleLevel::High
            );
            TdpSimpleLevel::High
        });

        info!("{}: Setting power level to {level}", self.log_tag());

        let result = self.set_tdp_native(level.percentage());
        if result.is_ok() {
            *self
                .tdp_simple
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = level;
        }

        info!(
            "{}: Set power level {level}: {}",
            self.log_tag(),
            result.is_ok()
        );

        result
    }

    // Collect every sensor reading of the device
    pub fn snapshot(&self) -> DeviceData {
        DeviceData {
            uuid: self.uuid.clone(),
            bus_id: self.bus_id,
            temperature: self.temperature(),
            load: self.load(),
            power_usage: self.power_usage(),
            fan_speed_rpm: self.fan_speed_rpm(),
            fan_speed_percentage: self.fan_speed_percentage().ok(),
            tdp_percentage: self.tdp_percentage(),
            tdp_setting_type: self.setting_type(),
            tdp_simple: self.tdp_simple(),
        }
    }
}

impl<D: AmdDriver + 'static> FanSpeedRpm for AmdDevice<D> {
    fn fan_speed_rpm(&self) -> Option<i32> {
        self.read(
            "get_fan_speed_rpm",
            self.driver.get_fan_speed_rpm(self.bus_id),
        )
    }
}

impl<D: AmdDriver + 'static> FanSpeedPercentage for AmdDevice<D> {
    fn fan_speed_percentage(&self) -> DriverResult<i32> {
        self.driver
            .get_fan_speed_percentage(self.bus_id)
            .inspect_err(|err| self.report("get_fan_speed_percentage", err))
    }
}

impl<D: AmdDriver + 'static> Temperature for AmdDevice<D> {
    fn temperature(&self) -> Option<f32> {
        self.read("get_temperature", self.driver.get_temperature(self.bus_id))
            .map(|temp| temp as f32)
    }
}

impl<D: AmdDriver + 'static> Load for AmdDevice<D> {
    fn load(&self) -> Option<f32> {
        self.read(
            "get_load_percentage",
            self.driver.get_load_percentage(self.bus_id),
        )
        .map(|load| load as f32)
    }
}

impl<D: AmdDriver + 'static> PowerUsage for AmdDevice<D> {
    fn power_usage(&self) -> Option<f64> {
        self.read("get_power_usage", self.driver.get_power_usage(self.bus_id))
            .map(f64::from)
    }
}

impl<D: AmdDriver + 'static> Tdp for AmdDevice<D> {
    fn setting_type(&self) -> TdpSettingType {
        *self
            .setting_type
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_setting_type(&self, setting_type: TdpSettingType) {
        *self
            .setting_type
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = setting_type;
    }

    fn tdp_percentage(&self) -> Option<f64> {
        let current = self.read("get_tdp", self.driver.get_tdp(self.bus_id))?;
        let range = self.read(
            "get_tdp_range",
            self.driver.get_tdp_range(self.bus_id),
        )?;

        Some(tdp::percentage(current, &range))
    }

    fn set_tdp_percentage(&self, percentage: f64) -> Result<(), TdpError> {
        self.check_power_mode_enabled("set_tdp_percentage")?;

        // Also catches NaN
        let percentage = if percentage >= 0.0 {
            percentage
        } else {
            error!(
                "{}: Power target {percentage} out of bounds, setting to 0.0",
                self.log_tag()
            );
            0.0
        };

        info!("{}: Setting power target to {percentage}", self.log_tag());
        self.set_tdp_native(percentage)
    }

    fn tdp_simple(&self) -> TdpSimpleLevel {
        *self
            .tdp_simple
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_tdp_simple(&self, level: TdpSimpleLevel) -> Result<(), TdpError> {
        self.apply_tdp_simple(Some(level), level)
    }
}

impl<D: AmdDriver + 'static> MemoryTimings for AmdDevice<D> {
    fn set_memory_timings(&self, timings: &str) -> DriverResult<()> {
        self.driver
            .set_memory_timings(self.bus_id, timings)
            .inspect_err(|err| self.report("set_memory_timings", err))
    }

    fn reset_memory_timings(&self) -> DriverResult<()> {
        self.driver
            .reset_memory_timings(self.bus_id)
            .inspect_err(|err| self.report("reset_memory_timings", err))
    }
}

impl<D: AmdDriver + 'static> ProfileApplicable for AmdDevice<D> {
    async fn apply_profile(
        &self,
        changes: &ProfileChangeSet,
    ) -> Result<(), ProfileError> {
        let transaction =
            ProfileTransaction::new(self.driver.clone(), self.bus_id);

        let result = transaction.apply(changes).await;
        if let Err(err) = &result {
            let tag = format!("{}/apply_profile", self.log_tag());

            self.log_throttle
                .info_delayed(&tag, &format!("{tag}: profile reverted, {err}"));
        }

        result
    }
}
