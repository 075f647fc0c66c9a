mod common;

use std::{sync::Arc, time::Duration};

use amdmon::{
    amd_driver::{DriverError, STATUS_NOT_SUPPORTED},
    gpu_device::{
        FanSpeedPercentage, FanSpeedRpm, Load, MemoryTimings, PowerUsage,
        Tdp, Temperature, amd_device::AmdDevice,
    },
    power_settings::PowerSettings,
    tdp::{TdpError, TdpSettingType, TdpSimpleLevel},
};
use common::{BUS_ID, Call, FakeDriver};

fn new_device(
    driver: &Arc<FakeDriver>,
    power_settings: PowerSettings,
) -> AmdDevice<FakeDriver> {
    AmdDevice::new(
        driver.clone(),
        "GPU-test",
        BUS_ID,
        power_settings,
        Duration::from_secs(30),
    )
}

// Create a device and forget the calls made during construction
fn ready_device() -> (Arc<FakeDriver>, AmdDevice<FakeDriver>) {
    let driver = Arc::new(FakeDriver::new());
    let device = new_device(&driver, PowerSettings::default());
    driver.clear_calls();

    (driver, device)
}

#[test]
fn construction_applies_high_level() {
    let driver = Arc::new(FakeDriver::new());
    driver.state().tdp = 120;

    let device = new_device(&driver, PowerSettings::default());

    assert_eq!(driver.calls(), vec![Call::GetTdpRange, Call::SetTdp(200)]);
    assert_eq!(device.tdp_simple(), TdpSimpleLevel::High);
    assert_eq!(device.setting_type(), TdpSettingType::Simple);
    assert_eq!(device.uuid(), "GPU-test");
    assert_eq!(device.bus_id(), BUS_ID);
}

#[test]
fn construction_survives_driver_failure() {
    let driver = Arc::new(FakeDriver::new());
    driver.fail("get_tdp_range", -1);
    driver.state().tdp = 120;

    let device = new_device(&driver, PowerSettings::default());

    assert!(driver.writes().is_empty());
    assert_eq!(driver.state().tdp, 120);
    assert_eq!(device.tdp_simple(), TdpSimpleLevel::High);
}

#[test]
fn percentage_maps_onto_the_device_range() {
    let (driver, device) = ready_device();

    let expected = [(0.0, 100), (0.5, 150), (1.0, 200), (1.5, 250), (2.0, 300)];

    for (percentage, native) in expected {
        device.set_tdp_percentage(percentage).unwrap();
        assert_eq!(driver.state().tdp, native);
    }
}

#[test]
fn range_is_queried_on_every_set() {
    let (driver, device) = ready_device();

    device.set_tdp_percentage(1.0).unwrap();
    driver.state().tdp_range.default = 250;
    device.set_tdp_percentage(1.0).unwrap();

    assert_eq!(
        driver.calls(),
        vec![
            Call::GetTdpRange,
            Call::SetTdp(200),
            Call::GetTdpRange,
            Call::SetTdp(250),
        ]
    );
}

#[test]
fn negative_percentage_is_clamped_to_zero() {
    let (driver, device) = ready_device();

    device.set_tdp_percentage(-0.4).unwrap();
    assert_eq!(driver.state().tdp, 100);

    device.set_tdp_percentage(f64::NAN).unwrap();
    assert_eq!(driver.writes(), vec![Call::SetTdp(100), Call::SetTdp(100)]);
}

#[test]
fn percentage_failure_is_reported() {
    let (driver, device) = ready_device();
    driver.fail("set_tdp", -1);

    let err = device.set_tdp_percentage(0.8).unwrap_err();

    assert_eq!(err, TdpError::Driver(DriverError::generic()));
    assert_eq!(driver.state().tdp, 200);
}

#[test]
fn range_failure_skips_the_write() {
    let (driver, device) = ready_device();
    driver.fail("get_tdp_range", -8);

    assert!(device.set_tdp_percentage(0.8).is_err());
    assert!(driver.writes().is_empty());
}

#[test]
fn simple_levels_apply_fixed_percentages() {
    let (driver, device) = ready_device();

    device.set_tdp_simple(TdpSimpleLevel::Low).unwrap();
    assert_eq!(driver.state().tdp, 160);
    assert_eq!(device.tdp_simple(), TdpSimpleLevel::Low);

    device.set_tdp_simple(TdpSimpleLevel::Medium).unwrap();
    assert_eq!(driver.state().tdp, 180);
    assert_eq!(device.tdp_simple(), TdpSimpleLevel::Medium);
}

#[test]
fn failed_simple_level_keeps_the_previous_one() {
    let (driver, device) = ready_device();
    device.set_tdp_simple(TdpSimpleLevel::Low).unwrap();

    driver.fail("set_tdp", -1);
    assert!(device.set_tdp_simple(TdpSimpleLevel::Medium).is_err());
    assert_eq!(device.tdp_simple(), TdpSimpleLevel::Low);

    driver.recover("set_tdp");
    driver.fail("get_tdp_range", -1);
    assert!(device.set_tdp_simple(TdpSimpleLevel::High).is_err());
    assert_eq!(device.tdp_simple(), TdpSimpleLevel::Low);
}

#[test]
fn unknown_simple_level_falls_back_to_high() {
    let (driver, device) = ready_device();
    device.set_tdp_simple(TdpSimpleLevel::Low).unwrap();

    device.set_tdp_simple_raw(42).unwrap();
    assert_eq!(driver.state().tdp, 200);
    assert_eq!(device.tdp_simple(), TdpSimpleLevel::High);

    device.set_tdp_simple(TdpSimpleLevel::Low).unwrap();
    device.set_tdp_simple_name("turbo").unwrap();
    assert_eq!(device.tdp_simple(), TdpSimpleLevel::High);

    device.set_tdp_simple_name("medium").unwrap();
    assert_eq!(device.tdp_simple(), TdpSimpleLevel::Medium);
}

#[test]
fn disabled_power_settings_block_every_setter() {
    let driver = Arc::new(FakeDriver::new());
    let settings = PowerSettings::new(true);

    let device = new_device(&driver, settings.clone());

    assert_eq!(device.set_tdp_percentage(0.5), Err(TdpError::Disabled));
    assert_eq!(
        device.set_tdp_simple(TdpSimpleLevel::Low),
        Err(TdpError::Disabled)
    );
    assert_eq!(device.set_tdp_simple_raw(99), Err(TdpError::Disabled));
    assert!(driver.calls().is_empty());

    // The flag is shared, enabling it again takes effect immediately
    settings.set_disabled(false);
    device.set_tdp_simple(TdpSimpleLevel::Low).unwrap();
    assert_eq!(driver.state().tdp, 160);
}

#[test]
fn disabling_at_runtime_is_respected() {
    let settings = PowerSettings::default();
    let driver = Arc::new(FakeDriver::new());
    let device = new_device(&driver, settings.clone());
    driver.clear_calls();

    settings.set_disabled(true);

    assert!(device.set_tdp_simple(TdpSimpleLevel::Medium).is_err());
    assert_eq!(device.tdp_simple(), TdpSimpleLevel::High);
    assert!(driver.calls().is_empty());
}

#[test]
fn tdp_percentage_reads_the_lower_half() {
    let (driver, device) = ready_device();

    driver.state().tdp = 150;
    assert_eq!(device.tdp_percentage(), Some(0.5));

    // Running above the default still reads as 100%
    driver.state().tdp = 280;
    assert_eq!(device.tdp_percentage(), Some(1.0));

    driver.fail("get_tdp", -1);
    assert_eq!(device.tdp_percentage(), None);

    driver.recover("get_tdp");
    driver.fail("get_tdp_range", -1);
    assert_eq!(device.tdp_percentage(), None);
}

#[test]
fn setting_type_is_stored() {
    let (_driver, device) = ready_device();

    device.set_setting_type(TdpSettingType::Percentage);
    assert_eq!(device.setting_type(), TdpSettingType::Percentage);
}

#[test]
fn sensors_pass_driver_values_through() {
    let (driver, device) = ready_device();

    assert_eq!(device.fan_speed_rpm(), Some(1200));
    assert_eq!(device.fan_speed_percentage(), Ok(40));
    assert_eq!(device.temperature(), Some(65.0));
    assert_eq!(device.load(), Some(90.0));
    assert_eq!(device.power_usage(), Some(180.0));

    assert_eq!(
        driver.calls(),
        vec![
            Call::GetFanSpeedRpm,
            Call::GetFanSpeedPercentage,
            Call::GetTemperature,
            Call::GetLoadPercentage,
            Call::GetPowerUsage,
        ]
    );
}

#[test]
fn sensor_failures_are_reported_as_missing() {
    let (driver, device) = ready_device();
    for operation in [
        "get_fan_speed_rpm",
        "get_fan_speed_percentage",
        "get_temperature",
        "get_load_percentage",
        "get_power_usage",
    ] {
        driver.fail(operation, STATUS_NOT_SUPPORTED);
    }

    assert_eq!(device.fan_speed_rpm(), None);
    assert_eq!(
        device.fan_speed_percentage(),
        Err(DriverError::new(STATUS_NOT_SUPPORTED))
    );
    assert_eq!(device.temperature(), None);
    assert_eq!(device.load(), None);
    assert_eq!(device.power_usage(), None);
}

#[test]
fn snapshot_collects_every_reading() {
    let (driver, device) = ready_device();
    driver.state().tdp = 150;
    driver.fail("get_load_percentage", -1);

    let data = device.snapshot();

    assert_eq!(data.uuid, "GPU-test");
    assert_eq!(data.bus_id, BUS_ID);
    assert_eq!(data.temperature, Some(65.0));
    assert_eq!(data.load, None);
    assert_eq!(data.fan_speed_percentage, Some(40));
    assert_eq!(data.tdp_percentage, Some(0.5));
    assert_eq!(data.tdp_simple, TdpSimpleLevel::High);
    assert!(driver.writes().is_empty());
}

#[test]
fn memory_timings_are_forwarded() {
    let (driver, device) = ready_device();

    device.set_memory_timings("fast").unwrap();
    assert_eq!(driver.state().memory_timings, "fast");

    device.reset_memory_timings().unwrap();
    assert_eq!(driver.state().memory_timings, "stock");

    driver.fail("set_memory_timings", STATUS_NOT_SUPPORTED);
    assert!(device.set_memory_timings("fast").is_err());
}
