pub mod amd_device;

use std::future::Future;

use crate::{
    amd_driver::DriverResult,
    profile::{ProfileChangeSet, ProfileError},
    tdp::{TdpError, TdpSettingType, TdpSimpleLevel},
};

// Each trait is a single capability a monitored device may offer,
// read failures are reported as None

pub trait FanSpeedRpm {
    fn fan_speed_rpm(&self) -> Option<i32>;
}

// The driver status is kept so callers can tell
// "no fan" apart from other failures
pub trait FanSpeedPercentage {
    fn fan_speed_percentage(&self) -> DriverResult<i32>;
}

pub trait Temperature {
    // Degrees Celsius
    fn temperature(&self) -> Option<f32>;
}

pub trait Load {
    fn load(&self) -> Option<f32>;
}

pub trait PowerUsage {
    // Watts
    fn power_usage(&self) -> Option<f64>;
}

// Power target control
pub trait Tdp {
    fn setting_type(&self) -> TdpSettingType;
    fn set_setting_type(&self, setting_type: TdpSettingType);

    // Current power target on the 0.0 - 1.0 scale
    fn tdp_percentage(&self) -> Option<f64>;
    // Apply a power target, 1.0 is the device default and 2.0 its maximum
    fn set_tdp_percentage(&self, percentage: f64) -> Result<(), TdpError>;

    // Last simple level that was applied successfully
    fn tdp_simple(&self) -> TdpSimpleLevel;
    fn set_tdp_simple(&self, level: TdpSimpleLevel) -> Result<(), TdpError>;
}

pub trait MemoryTimings {
    fn set_memory_timings(&self, timings: &str) -> DriverResult<()>;
    fn reset_memory_timings(&self) -> DriverResult<()>;
}

// Apply several hardware settings as a unit
pub trait ProfileApplicable {
    fn apply_profile(
        &self,
        changes: &ProfileChangeSet,
    ) -> impl Future<Output = Result<(), ProfileError>> + Send;
}
