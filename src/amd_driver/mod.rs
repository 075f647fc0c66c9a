use thiserror::Error;

pub mod sysfs;

// Failure status codes reported by the driver, zero means success
pub const STATUS_ERR: i32 = -1;
pub const STATUS_INVALID_PARAM: i32 = -3;
pub const STATUS_INVALID_ADAPTER: i32 = -5;
pub const STATUS_NOT_SUPPORTED: i32 = -8;

pub type DriverResult<T> = std::result::Result<T, DriverError>;

// A driver call that returned a non-success status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("driver call failed with error code {code}")]
pub struct DriverError {
    pub code: i32,
}

impl DriverError {
    pub fn new(code: i32) -> Self {
        Self { code }
    }

    pub fn generic() -> Self {
        Self::new(STATUS_ERR)
    }

    pub fn invalid_param() -> Self {
        Self::new(STATUS_INVALID_PARAM)
    }

    pub fn invalid_adapter() -> Self {
        Self::new(STATUS_INVALID_ADAPTER)
    }

    pub fn not_supported() -> Self {
        Self::new(STATUS_NOT_SUPPORTED)
    }
}

// Power limit range reported by the driver, in native units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TdpRange {
    pub min: i32,
    pub max: i32,
    pub default: i32,
}

// Native AMD driver call surface. Every call is scoped to the GPU
// identified by its PCI bus number and is independent of any other call
pub trait AmdDriver: Send + Sync {
    // Power limit
    fn get_tdp(&self, bus_id: i32) -> DriverResult<i32>;
    fn set_tdp(&self, bus_id: i32, value: i32) -> DriverResult<()>;
    fn get_tdp_range(&self, bus_id: i32) -> DriverResult<TdpRange>;

    // Clocks, in MHz
    fn get_memory_clocks(&self, bus_id: i32) -> DriverResult<i32>;
    fn set_memory_clocks(&self, bus_id: i32, clock: i32) -> DriverResult<()>;
    fn get_core_clocks(&self, bus_id: i32) -> DriverResult<i32>;
    fn set_core_clocks(&self, bus_id: i32, clock: i32) -> DriverResult<()>;

    // Memory timings are an opaque vendor string
    fn get_memory_timings(&self, bus_id: i32) -> DriverResult<String>;
    fn set_memory_timings(&self, bus_id: i32, timings: &str)
    -> DriverResult<()>;
    fn reset_memory_timings(&self, bus_id: i32) -> DriverResult<()>;

    // Sensors
    fn get_fan_speed_rpm(&self, bus_id: i32) -> DriverResult<i32>;
    fn get_fan_speed_percentage(&self, bus_id: i32) -> DriverResult<i32>;
    fn get_temperature(&self, bus_id: i32) -> DriverResult<i32>;
    fn get_load_percentage(&self, bus_id: i32) -> DriverResult<i32>;
    fn get_power_usage(&self, bus_id: i32) -> DriverResult<i32>;
}
