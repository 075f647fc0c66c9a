use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::task::TaskTracker;
use tracing::{debug, trace};

use crate::amd_driver::{AmdDriver, DriverError, DriverResult};

// Raw "do not touch" value for numeric profile parameters
pub const NDEF: i32 = i32::MIN;

// Hardware parameters a profile can change, in application order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileParameter {
    MemoryClock,
    CoreClock,
    MemoryTimings,
}

impl fmt::Display for ProfileParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProfileParameter::MemoryClock => "memory clock",
            ProfileParameter::CoreClock => "core clock",
            ProfileParameter::MemoryTimings => "memory timings",
        };

        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProfileError {
    #[error("failed to read the current {parameter}: {source}")]
    Capture {
        parameter: ProfileParameter,
        source: DriverError,
    },
    #[error("failed to set the {parameter}: {source}")]
    Apply {
        parameter: ProfileParameter,
        source: DriverError,
    },
}

impl ProfileError {
    pub fn parameter(&self) -> ProfileParameter {
        match self {
            ProfileError::Capture { parameter, .. } => *parameter,
            ProfileError::Apply { parameter, .. } => *parameter,
        }
    }
}

// Target values of a profile, None leaves the parameter untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileChangeSet {
    #[serde(default)]
    pub memory_clock: Option<i32>,
    #[serde(default)]
    pub core_clock: Option<i32>,
    #[serde(default)]
    pub memory_timings: Option<String>,
}

impl ProfileChangeSet {
    // Build a change set from raw values, where `NDEF` clocks
    // and empty timing strings mean unset
    pub fn from_raw(
        memory_clock: i32,
        core_clock: i32,
        memory_timings: &str,
    ) -> Self {
        Self {
            memory_clock: (memory_clock != NDEF).then_some(memory_clock),
            core_clock: (core_clock != NDEF).then_some(core_clock),
            memory_timings: (!memory_timings.is_empty())
                .then(|| memory_timings.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.memory_clock.is_none()
            && self.core_clock.is_none()
            && self.memory_timings.as_deref().is_none_or(str::is_empty)
    }
}

type RevertAction = Box<dyn FnOnce() + Send + 'static>;

// Applies a change set to a single device. Each parameter is captured
// before it is overwritten, if any step fails every captured parameter
// is restored and the whole change set reports failure
pub struct ProfileTransaction<D: AmdDriver + 'static> {
    driver: Arc<D>,
    bus_id: i32,

    // Undo actions for the parameters touched so far
    reverts: Vec<RevertAction>,
}

impl<D: AmdDriver + 'static> ProfileTransaction<D> {
    pub fn new(driver: Arc<D>, bus_id: i32) -> Self {
        Self {
            driver,
            bus_id,
            reverts: Vec::new(),
        }
    }

    pub async fn apply(
        mut self,
        changes: &ProfileChangeSet,
    ) -> Result<(), ProfileError> {
        match self.apply_all(changes) {
            Ok(()) => {
                trace!(
                    "Profile applied on bus {}, dropping {} revert actions",
                    self.bus_id,
                    self.reverts.len()
                );
                Ok(())
            }
            Err(err) => {
                debug!("Profile apply failed on bus {}: {err}", self.bus_id);
                self.rollback().await;
                Err(err)
            }
        }
    }

    // Stop at the first failing parameter, later ones are never touched
    fn apply_all(
        &mut self,
        changes: &ProfileChangeSet,
    ) -> Result<(), ProfileError> {
        if let Some(clock) = changes.memory_clock {
            self.apply_step(
                ProfileParameter::MemoryClock,
                |driver: &D, bus_id| driver.get_memory_clocks(bus_id),
                |driver: &D, bus_id, clock: &i32| {
                    driver.set_memory_clocks(bus_id, *clock)
                },
                clock,
            )?;
        }

        if let Some(clock) = changes.core_clock {
            self.apply_step(
                ProfileParameter::CoreClock,
                |driver: &D, bus_id| driver.get_core_clocks(bus_id),
                |driver: &D, bus_id, clock: &i32| {
                    driver.set_core_clocks(bus_id, *clock)
                },
                clock,
            )?;
        }

        if let Some(timings) = changes.memory_timings.as_ref() {
            if !timings.is_empty() {
                self.apply_step(
                    ProfileParameter::MemoryTimings,
                    |driver: &D, bus_id| driver.get_memory_timings(bus_id),
                    |driver: &D, bus_id, timings: &String| {
                        driver.set_memory_timings(bus_id, timings)
                    },
                    timings.clone(),
                )?;
            }
        }

        Ok(())
    }

    // Capture the current value, register its undo action and set the
    // target. When the capture fails nothing is written. When the write
    // fails the undo action stays registered since the driver may have
    // partially applied the value
    fn apply_step<T: Send + 'static>(
        &mut self,
        parameter: ProfileParameter,
        get: fn(&D, i32) -> DriverResult<T>,
        set: fn(&D, i32, &T) -> DriverResult<()>,
        target: T,
    ) -> Result<(), ProfileError> {
        let previous = get(&self.driver, self.bus_id)
            .map_err(|source| ProfileError::Capture { parameter, source })?;

        let driver = self.driver.clone();
        let bus_id = self.bus_id;
        self.reverts.push(Box::new(move || {
            if let Err(err) = set(&driver, bus_id, &previous) {
                trace!(
                    "Failed to restore the {parameter} on bus {bus_id}: {err}"
                );
            }
        }));

        set(&self.driver, self.bus_id, &target)
            .map_err(|source| ProfileError::Apply { parameter, source })
    }

    // Run every revert action concurrently and wait for all of them,
    // their individual outcome is not reported
    async fn rollback(self) {
        let tracker = TaskTracker::new();

        for revert in self.reverts {
            tracker.spawn_blocking(revert);
        }

        tracker.close();
        tracker.wait().await;
    }
}
