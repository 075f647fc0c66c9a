// Power target model. Percentages are normalized so that 1.0 is the
// device default power limit: the lower half [0, 1] spans min..default
// and the upper half [1, 2] spans default..max

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

pub use crate::amd_driver::TdpRange;
use crate::amd_driver::DriverError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TdpError {
    #[error("device power mode settings are disabled")]
    Disabled,
    #[error(transparent)]
    Driver(#[from] DriverError),
}

// How the power target of a device is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TdpSettingType {
    #[default]
    Simple,
    Percentage,
}

// Fixed power levels available in simple mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TdpSimpleLevel {
    Low,
    Medium,
    #[default]
    High,
}

impl TdpSimpleLevel {
    // Normalized power target of the level
    pub fn percentage(self) -> f64 {
        match self {
            TdpSimpleLevel::Low => 0.6,
            TdpSimpleLevel::Medium => 0.8,
            TdpSimpleLevel::High => 1.0,
        }
    }

    // Decode the numeric level used by external callers
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(TdpSimpleLevel::Low),
            1 => Some(TdpSimpleLevel::Medium),
            2 => Some(TdpSimpleLevel::High),
            _ => None,
        }
    }
}

impl fmt::Display for TdpSimpleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TdpSimpleLevel::Low => "LOW",
            TdpSimpleLevel::Medium => "MEDIUM",
            TdpSimpleLevel::High => "HIGH",
        };

        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown power level \"{0}\"")]
pub struct UnknownTdpLevel(pub String);

impl FromStr for TdpSimpleLevel {
    type Err = UnknownTdpLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(TdpSimpleLevel::Low),
            "medium" => Ok(TdpSimpleLevel::Medium),
            "high" => Ok(TdpSimpleLevel::High),
            _ => Err(UnknownTdpLevel(s.to_string())),
        }
    }
}

// Linear interpolation, `perc` is not clamped
fn calculate_value(perc: f64, low: i32, high: i32) -> f64 {
    let low = f64::from(low);
    let high = f64::from(high);

    low + perc * (high - low)
}

// Map a normalized power target onto the native power limit.
// Values above 2.0 extrapolate past the maximum
pub fn native_value(perc: f64, range: &TdpRange) -> i32 {
    let limit = if perc > 1.0 {
        calculate_value(perc - 1.0, range.default, range.max)
    } else {
        calculate_value(perc, range.min, range.default)
    };

    limit.round() as i32
}

// Map a native power limit back onto the lower half of the scale.
// The result is always in [0, 1], even when the device runs above its
// default limit, so this is not the inverse of `native_value` above 1.0
pub fn percentage(current: i32, range: &TdpRange) -> f64 {
    let span = f64::from(range.default) - f64::from(range.min);

    // Degenerate range, the only possible value is the default
    if span <= 0.0 {
        return if current >= range.default { 1.0 } else { 0.0 };
    }

    let perc = (f64::from(current) - f64::from(range.min)) / span;
    perc.clamp(0.0, 1.0)
}
