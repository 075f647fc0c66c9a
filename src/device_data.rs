use serde::Serialize;

use crate::tdp::{TdpSettingType, TdpSimpleLevel};

// Point in time readings of a monitored GPU,
// None marks a reading the driver failed to report
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceData {
    // GPU identification
    pub uuid: String,
    pub bus_id: i32,

    // Degrees Celsius
    pub temperature: Option<f32>,
    pub load: Option<f32>,
    // Watts
    pub power_usage: Option<f64>,

    // Fan information
    pub fan_speed_rpm: Option<i32>,
    pub fan_speed_percentage: Option<i32>,

    // Power target
    pub tdp_percentage: Option<f64>,
    pub tdp_setting_type: TdpSettingType,
    pub tdp_simple: TdpSimpleLevel,
}
