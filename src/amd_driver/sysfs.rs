use std::{
    fs::File,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    str::FromStr,
};

use tracing::{debug, trace};

use crate::amd_driver::{AmdDriver, DriverError, DriverResult, TdpRange};

const DRM_CLASS_DIR: &str = "sys/class/drm";
const AMDGPU_DRIVER: &str = "amdgpu";

const POWER_CAP: &str = "power1_cap";
const POWER_CAP_MIN: &str = "power1_cap_min";
const POWER_CAP_MAX: &str = "power1_cap_max";
const POWER_CAP_DEFAULT: &str = "power1_cap_default";
const POWER_AVERAGE: &str = "power1_average";
const POWER_INPUT: &str = "power1_input";
const TEMP_INPUT: &str = "temp1_input";
const FAN_INPUT: &str = "fan1_input";
const PWM: &str = "pwm1";
const PWM_MAX: &str = "pwm1_max";

const GPU_BUSY_PERCENT: &str = "gpu_busy_percent";
const OD_CLOCK_VOLTAGE: &str = "pp_od_clk_voltage";

// Overdrive table sections and the index of their maximum clock entry
const OD_CORE_SECTION: &str = "OD_SCLK";
const OD_MEMORY_SECTION: &str = "OD_MCLK";
const OD_MAX_LEVEL: u32 = 1;

// hwmon reports power in microwatts and temperature in millidegrees
const MICROWATTS_PER_WATT: i64 = 1_000_000;
const MILLIDEGREES_PER_DEGREE: i64 = 1_000;
const DEFAULT_PWM_MAX: i64 = 255;

// Root of the sysfs tree, `/` on a real system
// and a temporary directory in tests
#[derive(Debug, Clone)]
pub struct SysfsRoot {
    root: PathBuf,
}

impl Default for SysfsRoot {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
        }
    }
}

impl SysfsRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    // Resolve a path relative to this root
    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }

    // Read a file, trimming whitespace
    pub fn read(&self, relative: impl AsRef<Path>) -> DriverResult<String> {
        let path = self.path(relative);

        std::fs::read_to_string(&path)
            .map(|s| s.trim().to_string())
            .map_err(|err| {
                trace!("Failed to read {}: {err}", path.display());
                io_error(err.kind())
            })
    }

    // Read a file and parse its content
    pub fn read_parse<T: FromStr>(
        &self,
        relative: impl AsRef<Path>,
    ) -> DriverResult<T> {
        let value = self.read(relative)?;

        value.parse::<T>().map_err(|_| DriverError::invalid_param())
    }

    pub fn write(
        &self,
        relative: impl AsRef<Path>,
        value: &str,
    ) -> DriverResult<()> {
        let path = self.path(relative);

        std::fs::write(&path, value).map_err(|err| {
            debug!("Failed to write {}: {err}", path.display());
            io_error(err.kind())
        })
    }

    // Issue several commands through a single open file, one write call
    // per command, as command attributes parse each write on its own
    pub fn write_commands(
        &self,
        relative: impl AsRef<Path>,
        commands: &[String],
    ) -> DriverResult<()> {
        let path = self.path(relative);
        let io_failure = |err: std::io::Error| {
            debug!("Failed to write {}: {err}", path.display());
            io_error(err.kind())
        };

        let mut file = File::create(&path).map_err(io_failure)?;
        for command in commands {
            file.write_all(command.as_bytes()).map_err(io_failure)?;
            file.flush().map_err(io_failure)?;
        }

        Ok(())
    }

    // List the entries of a directory, sorted by name
    pub fn list_dir(
        &self,
        relative: impl AsRef<Path>,
    ) -> DriverResult<Vec<String>> {
        let path = self.path(relative);
        let entries =
            std::fs::read_dir(&path).map_err(|err| io_error(err.kind()))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| io_error(err.kind()))?;

            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();

        Ok(names)
    }
}

// A missing attribute means the kernel driver doesn't expose the feature
fn io_error(kind: ErrorKind) -> DriverError {
    match kind {
        ErrorKind::NotFound => DriverError::not_supported(),
        _ => DriverError::generic(),
    }
}

// AMD driver backed by the amdgpu kernel driver sysfs interface
#[derive(Debug, Clone, Default)]
pub struct SysfsDriver {
    sysfs: SysfsRoot,
}

impl SysfsDriver {
    pub fn system() -> Self {
        Self::default()
    }

    pub fn new(sysfs: SysfsRoot) -> Self {
        Self { sysfs }
    }

    // Return the PCI bus number of every amdgpu device on the system
    pub fn discover(&self) -> DriverResult<Vec<i32>> {
        let mut bus_ids: Vec<i32> = self
            .amdgpu_devices()?
            .into_iter()
            .map(|(bus_id, _)| bus_id)
            .collect();

        bus_ids.sort();
        bus_ids.dedup();

        Ok(bus_ids)
    }

    // Stable identifier of the GPU, only exposed by some ASICs
    pub fn unique_id(&self, bus_id: i32) -> Option<String> {
        let dir = self.device_dir(bus_id).ok()?;

        self.sysfs
            .read(dir.join("unique_id"))
            .ok()
            .filter(|id| !id.is_empty())
    }

    // Find every amdgpu card with its bus number and device directory
    fn amdgpu_devices(&self) -> DriverResult<Vec<(i32, PathBuf)>> {
        let mut devices = Vec::new();

        for card in self.sysfs.list_dir(DRM_CLASS_DIR)? {
            // Skip connectors such as "card0-DP-1"
            if !card.starts_with("card") || card.contains('-') {
                continue;
            }

            let device_dir =
                Path::new(DRM_CLASS_DIR).join(&card).join("device");
            let Ok(uevent) = self.sysfs.read(device_dir.join("uevent")) else {
                continue;
            };

            if let Some(bus_id) = parse_uevent_bus_id(&uevent) {
                trace!("Found amdgpu device {card} on bus {bus_id}");
                devices.push((bus_id, device_dir));
            }
        }

        Ok(devices)
    }

    fn device_dir(&self, bus_id: i32) -> DriverResult<PathBuf> {
        self.amdgpu_devices()?
            .into_iter()
            .find(|(id, _)| *id == bus_id)
            .map(|(_, dir)| dir)
            .ok_or_else(DriverError::invalid_adapter)
    }

    fn hwmon_dir(&self, bus_id: i32) -> DriverResult<PathBuf> {
        let hwmon_root = self.device_dir(bus_id)?.join("hwmon");

        self.sysfs
            .list_dir(&hwmon_root)?
            .into_iter()
            .find(|name| name.starts_with("hwmon"))
            .map(|name| hwmon_root.join(name))
            .ok_or_else(DriverError::not_supported)
    }

    fn read_hwmon(&self, bus_id: i32, attribute: &str) -> DriverResult<i64> {
        let hwmon = self.hwmon_dir(bus_id)?;
        self.sysfs.read_parse(hwmon.join(attribute))
    }

    fn read_power_watts(
        &self,
        bus_id: i32,
        attribute: &str,
    ) -> DriverResult<i32> {
        let microwatts = self.read_hwmon(bus_id, attribute)?;
        to_i32(microwatts / MICROWATTS_PER_WATT)
    }

    // Maximum clock of an overdrive section, the same
    // entry `set_overdrive_clock` writes
    fn overdrive_clock(
        &self,
        bus_id: i32,
        section: &str,
    ) -> DriverResult<i32> {
        let path = self.device_dir(bus_id)?.join(OD_CLOCK_VOLTAGE);
        let table = self.sysfs.read(path)?;

        parse_overdrive_clock(&table, section, OD_MAX_LEVEL)
            .ok_or_else(DriverError::not_supported)
    }

    // Stage the new maximum clock then commit the table with "c"
    fn set_overdrive_clock(
        &self,
        bus_id: i32,
        command: char,
        clock: i32,
    ) -> DriverResult<()> {
        if clock <= 0 {
            return Err(DriverError::invalid_param());
        }

        let path = self.device_dir(bus_id)?.join(OD_CLOCK_VOLTAGE);

        let stage = format!("{command} {OD_MAX_LEVEL} {clock}\n");
        self.sysfs.write_commands(path, &[stage, "c\n".to_string()])
    }
}

impl AmdDriver for SysfsDriver {
    fn get_tdp(&self, bus_id: i32) -> DriverResult<i32> {
        self.read_power_watts(bus_id, POWER_CAP)
    }

    fn set_tdp(&self, bus_id: i32, value: i32) -> DriverResult<()> {
        if value < 0 {
            return Err(DriverError::invalid_param());
        }

        let hwmon = self.hwmon_dir(bus_id)?;
        let microwatts = i64::from(value) * MICROWATTS_PER_WATT;

        self.sysfs
            .write(hwmon.join(POWER_CAP), &format!("{microwatts}\n"))
    }

    fn get_tdp_range(&self, bus_id: i32) -> DriverResult<TdpRange> {
        Ok(TdpRange {
            min: self.read_power_watts(bus_id, POWER_CAP_MIN)?,
            max: self.read_power_watts(bus_id, POWER_CAP_MAX)?,
            default: self.read_power_watts(bus_id, POWER_CAP_DEFAULT)?,
        })
    }

    fn get_memory_clocks(&self, bus_id: i32) -> DriverResult<i32> {
        self.overdrive_clock(bus_id, OD_MEMORY_SECTION)
    }

    fn set_memory_clocks(&self, bus_id: i32, clock: i32) -> DriverResult<()> {
        self.set_overdrive_clock(bus_id, 'm', clock)
    }

    fn get_core_clocks(&self, bus_id: i32) -> DriverResult<i32> {
        self.overdrive_clock(bus_id, OD_CORE_SECTION)
    }

    fn set_core_clocks(&self, bus_id: i32, clock: i32) -> DriverResult<()> {
        self.set_overdrive_clock(bus_id, 's', clock)
    }

    // amdgpu does not expose memory timing straps
    fn get_memory_timings(&self, bus_id: i32) -> DriverResult<String> {
        self.device_dir(bus_id)?;
        Err(DriverError::not_supported())
    }

    fn set_memory_timings(
        &self,
        bus_id: i32,
        _timings: &str,
    ) -> DriverResult<()> {
        self.device_dir(bus_id)?;
        Err(DriverError::not_supported())
    }

    fn reset_memory_timings(&self, bus_id: i32) -> DriverResult<()> {
        self.device_dir(bus_id)?;
        Err(DriverError::not_supported())
    }

    fn get_fan_speed_rpm(&self, bus_id: i32) -> DriverResult<i32> {
        to_i32(self.read_hwmon(bus_id, FAN_INPUT)?)
    }

    fn get_fan_speed_percentage(&self, bus_id: i32) -> DriverResult<i32> {
        let pwm = self.read_hwmon(bus_id, PWM)?;
        let pwm_max = self
            .read_hwmon(bus_id, PWM_MAX)
            .unwrap_or(DEFAULT_PWM_MAX)
            .max(1);

        to_i32((pwm * 100 + pwm_max / 2) / pwm_max)
    }

    fn get_temperature(&self, bus_id: i32) -> DriverResult<i32> {
        to_i32(self.read_hwmon(bus_id, TEMP_INPUT)? / MILLIDEGREES_PER_DEGREE)
    }

    fn get_load_percentage(&self, bus_id: i32) -> DriverResult<i32> {
        let path = self.device_dir(bus_id)?.join(GPU_BUSY_PERCENT);
        self.sysfs.read_parse(path)
    }

    // Older kernels only report the instantaneous power
    fn get_power_usage(&self, bus_id: i32) -> DriverResult<i32> {
        self.read_power_watts(bus_id, POWER_AVERAGE)
            .or_else(|_| self.read_power_watts(bus_id, POWER_INPUT))
    }
}

fn to_i32(value: i64) -> DriverResult<i32> {
    i32::try_from(value).map_err(|_| DriverError::invalid_param())
}

// Extract the PCI bus number from an amdgpu device uevent file,
// e.g. "PCI_SLOT_NAME=0000:03:00.0" gives bus 3
fn parse_uevent_bus_id(uevent: &str) -> Option<i32> {
    let mut is_amdgpu = false;
    let mut bus_id = None;

    for line in uevent.lines() {
        if let Some(driver) = line.strip_prefix("DRIVER=") {
            is_amdgpu = driver.trim() == AMDGPU_DRIVER;
        } else if let Some(slot) = line.strip_prefix("PCI_SLOT_NAME=") {
            bus_id = slot
                .trim()
                .split(':')
                .nth(1)
                .and_then(|bus| i32::from_str_radix(bus, 16).ok());
        }
    }

    if is_amdgpu { bus_id } else { None }
}

// Find a clock entry of an overdrive table section, e.g. "1: 1000MHz"
// under "OD_MCLK:". Sections end at the next header line
fn parse_overdrive_clock(
    table: &str,
    section: &str,
    level: u32,
) -> Option<i32> {
    let mut lines = table.lines().map(str::trim);
    lines.find(|line| line.strip_suffix(':') == Some(section))?;

    for line in lines {
        let Some((index, value)) = line.split_once(':') else {
            continue;
        };
        let Ok(index) = index.trim().parse::<u32>() else {
            // Next section header
            return None;
        };
        if index != level {
            continue;
        }

        let value = value.trim();
        let digits = value
            .char_indices()
            .find(|(_, c)| !c.is_ascii_digit())
            .map_or(value, |(idx, _)| &value[..idx]);

        return digits.parse().ok();
    }

    None
}
