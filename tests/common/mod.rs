#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use amdmon::amd_driver::{AmdDriver, DriverError, DriverResult, TdpRange};

pub const BUS_ID: i32 = 3;

// Every driver call the fake received, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    GetTdp,
    SetTdp(i32),
    GetTdpRange,
    GetMemoryClocks,
    SetMemoryClocks(i32),
    GetCoreClocks,
    SetCoreClocks(i32),
    GetMemoryTimings,
    SetMemoryTimings(String),
    ResetMemoryTimings,
    GetFanSpeedRpm,
    GetFanSpeedPercentage,
    GetTemperature,
    GetLoadPercentage,
    GetPowerUsage,
}

impl Call {
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Call::SetTdp(_)
                | Call::SetMemoryClocks(_)
                | Call::SetCoreClocks(_)
                | Call::SetMemoryTimings(_)
                | Call::ResetMemoryTimings
        )
    }
}

// Hardware state held by the fake
#[derive(Debug, Clone)]
pub struct FakeState {
    pub tdp: i32,
    pub tdp_range: TdpRange,
    pub memory_clock: i32,
    pub core_clock: i32,
    pub memory_timings: String,
    pub fan_speed_rpm: i32,
    pub fan_speed_percentage: i32,
    pub temperature: i32,
    pub load: i32,
    pub power_usage: i32,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            tdp: 200,
            tdp_range: TdpRange {
                min: 100,
                max: 300,
                default: 200,
            },
            memory_clock: 1000,
            core_clock: 1500,
            memory_timings: "stock".to_string(),
            fan_speed_rpm: 1200,
            fan_speed_percentage: 40,
            temperature: 65,
            load: 90,
            power_usage: 180,
        }
    }
}

// In-memory driver for a single GPU. Calls are recorded before the
// configured failures are applied, a failing write leaves the state untouched
#[derive(Debug, Default)]
pub struct FakeDriver {
    state: Mutex<FakeState>,
    calls: Mutex<Vec<Call>>,
    failures: Mutex<HashMap<&'static str, i32>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    // Make every later call to `operation` fail with `code`
    pub fn fail(&self, operation: &'static str, code: i32) {
        self.failures.lock().unwrap().insert(operation, code);
    }

    pub fn recover(&self, operation: &'static str) {
        self.failures.lock().unwrap().remove(operation);
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_write).collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn call(
        &self,
        bus_id: i32,
        operation: &'static str,
        call: Call,
    ) -> DriverResult<MutexGuard<'_, FakeState>> {
        self.calls.lock().unwrap().push(call);

        if bus_id != BUS_ID {
            return Err(DriverError::invalid_adapter());
        }
        if let Some(code) = self.failures.lock().unwrap().get(operation) {
            return Err(DriverError::new(*code));
        }

        Ok(self.state())
    }
}

impl AmdDriver for FakeDriver {
    fn get_tdp(&self, bus_id: i32) -> DriverResult<i32> {
        Ok(self.call(bus_id, "get_tdp", Call::GetTdp)?.tdp)
    }

    fn set_tdp(&self, bus_id: i32, value: i32) -> DriverResult<()> {
        self.call(bus_id, "set_tdp", Call::SetTdp(value))?.tdp = value;
        Ok(())
    }

    fn get_tdp_range(&self, bus_id: i32) -> DriverResult<TdpRange> {
        Ok(self.call(bus_id, "get_tdp_range", Call::GetTdpRange)?.tdp_range)
    }

    fn get_memory_clocks(&self, bus_id: i32) -> DriverResult<i32> {
        Ok(self
            .call(bus_id, "get_memory_clocks", Call::GetMemoryClocks)?
            .memory_clock)
    }

    fn set_memory_clocks(&self, bus_id: i32, clock: i32) -> DriverResult<()> {
        self.call(bus_id, "set_memory_clocks", Call::SetMemoryClocks(clock))?
            .memory_clock = clock;
        Ok(())
    }

    fn get_core_clocks(&self, bus_id: i32) -> DriverResult<i32> {
        Ok(self
            .call(bus_id, "get_core_clocks", Call::GetCoreClocks)?
            .core_clock)
    }

    fn set_core_clocks(&self, bus_id: i32, clock: i32) -> DriverResult<()> {
        self.call(bus_id, "set_core_clocks", Call::SetCoreClocks(clock))?
            .core_clock = clock;
        Ok(())
    }

    fn get_memory_timings(&self, bus_id: i32) -> DriverResult<String> {
        Ok(self
            .call(bus_id, "get_memory_timings", Call::GetMemoryTimings)?
            .memory_timings
            .clone())
    }

    fn set_memory_timings(
        &self,
        bus_id: i32,
        timings: &str,
    ) -> DriverResult<()> {
        self.call(
            bus_id,
            "set_memory_timings",
            Call::SetMemoryTimings(timings.to_string()),
        )?
        .memory_timings = timings.to_string();
        Ok(())
    }

    fn reset_memory_timings(&self, bus_id: i32) -> DriverResult<()> {
        self.call(bus_id, "reset_memory_timings", Call::ResetMemoryTimings)?
            .memory_timings = "stock".to_string();
        Ok(())
    }

    fn get_fan_speed_rpm(&self, bus_id: i32) -> DriverResult<i32> {
        Ok(self
            .call(bus_id, "get_fan_speed_rpm", Call::GetFanSpeedRpm)?
            .fan_speed_rpm)
    }

    fn get_fan_speed_percentage(&self, bus_id: i32) -> DriverResult<i32> {
        Ok(self
            .call(
                bus_id,
                "get_fan_speed_percentage",
                Call::GetFanSpeedPercentage,
            )?
            .fan_speed_percentage)
    }

    fn get_temperature(&self, bus_id: i32) -> DriverResult<i32> {
        Ok(self
            .call(bus_id, "get_temperature", Call::GetTemperature)?
            .temperature)
    }

    fn get_load_percentage(&self, bus_id: i32) -> DriverResult<i32> {
        Ok(self
            .call(bus_id, "get_load_percentage", Call::GetLoadPercentage)?
            .load)
    }

    fn get_power_usage(&self, bus_id: i32) -> DriverResult<i32> {
        Ok(self
            .call(bus_id, "get_power_usage", Call::GetPowerUsage)?
            .power_usage)
    }
}
