//! End-to-end validation runs against a seeded broker.

use focusprep::config::InstrumentConfig;
use focusprep::error::DeviceError;
use focusprep::factory::{DeviceFactory, DeviceState, ScanMode};
use focusprep::mock_proxy::MockProxy;
use focusprep::probe::WriteAccessProbe;
use focusprep::proxy::{PropValue, Proxy};

fn config(empty_slot_names: &[&str], wheel_filters: &[&str]) -> InstrumentConfig {
    let mut config: InstrumentConfig = toml::from_str(
        r#"
wheels_in_use = ["W2"]
minimum_focuser_positions = 5

[focuser]
name = "FOC_DMY"
resolution = 4.0
absolute_lower_limit = 0
absolute_upper_limit = 5000
lower_limit = 800
upper_limit = 1200
step_size = 50

[ccd]
name = "C0"
binning = "1x1"
window = [-1, -1, -1, -1]
pixel_size = 9.0
base_exposure = 2.5
"#,
    )
    .unwrap();

    config.empty_slot_names = empty_slot_names.iter().map(|s| s.to_string()).collect();
    config.filters = wheel_filters
        .iter()
        .map(|name| {
            toml::from_str(&format!(
                r#"
name = "{name}"
relative_lower_limit = -200
relative_upper_limit = 200
step_size = 50
"#
            ))
            .unwrap()
        })
        .collect();
    config.wheels = vec![toml::from_str(&format!(
        "name = \"W2\"\nfilters = {:?}",
        wheel_filters
    ))
    .unwrap()];
    config.validate().unwrap();
    config
}

fn proxy(foc_def: i64) -> MockProxy {
    MockProxy::new()
        .with_device(
            "C0",
            &[
                ("calculate_stat", PropValue::Int(1)),
                ("wheel", PropValue::Text("W2".to_string())),
            ],
        )
        .with_device(
            "FOC_DMY",
            &[
                ("FOC_DEF", PropValue::Int(foc_def)),
                ("foc_min", PropValue::Int(0)),
                ("foc_max", PropValue::Int(5000)),
            ],
        )
        .with_device("W2", &[("filter", PropValue::Int(0))])
}

// Filter R with offset 0, rel. range [-200, 200] step 50, FOC_DEF 1000 and
// stroke [0, 5000]: nine offsets spanning an absolute window of [800, 1200].
#[test]
fn test_derived_window_within_stroke() {
    let config = config(&["R"], &["R"]);
    let mut proxy = proxy(1000);
    let mut factory = DeviceFactory::new(&config, ScanMode::Normal);
    let devices = factory.build(&mut proxy).unwrap();

    let wheel = &devices.wheels[0];
    let ft = &wheel.filters[0];
    assert!(ft.is_empty_slot());
    assert_eq!(ft.foc_foff.len(), 9);
    assert_eq!(ft.foc_foff.first(), Some(&-200));
    assert_eq!(ft.foc_foff.last(), Some(&200));
    assert_eq!(devices.focuser.foc_def + ft.foc_foff.first().unwrap(), 800);
    assert_eq!(devices.focuser.foc_def + ft.foc_foff.last().unwrap(), 1200);
    assert_eq!(wheel.empty_slots.len(), 1);
}

// Same filter against a stroke capped at 1100: the window no longer fits.
#[test]
fn test_derived_window_exceeding_stroke_fails() {
    let mut config = config(&["R"], &["R"]);
    config.focuser.absolute_upper_limit = 1100;
    config.focuser.lower_limit = 950;
    config.focuser.upper_limit = 1050;
    let mut proxy = proxy(1000);
    let mut factory = DeviceFactory::new(&config, ScanMode::Normal);
    let err = factory.build(&mut proxy).unwrap_err();
    match err {
        DeviceError::OutOfRange {
            subject, abs_upper, ..
        } => {
            assert_eq!(subject, "W2/R");
            assert_eq!(abs_upper, 1100);
        }
        other => panic!("expected OutOfRange, got {other:?}"),
    }
}

// Two empty-offset filters where the drop pattern names the second: the
// wheel keeps clear1 only.
#[test]
fn test_duplicate_empty_slot_pruned() {
    let config = config(&["clear1", "clear2"], &["clear1", "clear2", "R"]);
    let mut proxy = proxy(1000);
    let mut factory = DeviceFactory::new(&config, ScanMode::Normal);
    let devices = factory.build(&mut proxy).unwrap();

    let wheel = &devices.wheels[0];
    let names: Vec<&str> = wheel.filters.iter().map(|ft| ft.name.as_str()).collect();
    assert_eq!(names, vec!["clear1", "R"]);
    assert_eq!(wheel.empty_slots.len(), 1);
    assert_eq!(wheel.empty_slots[0].name, "clear1");
    assert!(factory.unresolved_empty_slots().is_empty());
}

// A timed-out focuser probe reports not writable; the camera and wheel
// probes still run and report independently.
#[test]
fn test_probe_outcomes_are_independent() {
    let config = config(&["R"], &["R"]);
    let mut proxy = proxy(1000);
    let devices = DeviceFactory::new(&config, ScanMode::Normal)
        .build(&mut proxy)
        .unwrap();

    proxy.time_out_on("FOC_DMY", "FOC_DEF");
    let report = WriteAccessProbe::new(&mut proxy).run(&devices);
    assert!(report.ccd_writable);
    assert!(!report.focuser_writable);
    assert!(report.wheel_writable);
    assert!(!report.all_writable());

    // probed devices were perturbed and restored
    assert_eq!(proxy.get_single_value("C0", "calculate_stat").unwrap(), 1);
    assert_eq!(proxy.get_single_value("W2", "filter").unwrap(), 0);
}

// Identical configuration and identical broker state yield identical
// entity sets, run after run.
#[test]
fn test_factory_is_idempotent() {
    let config = config(&["clear1", "clear2"], &["clear1", "R", "clear2", "V"]);

    let mut first_proxy = proxy(1000);
    let first = DeviceFactory::new(&config, ScanMode::Normal)
        .build(&mut first_proxy)
        .unwrap();

    let mut second_proxy = proxy(1000);
    let second = DeviceFactory::new(&config, ScanMode::Normal)
        .build(&mut second_proxy)
        .unwrap();

    assert_eq!(first, second);

    // and a rebuild against the already-used broker matches as well
    let third = DeviceFactory::new(&config, ScanMode::Normal)
        .build(&mut first_proxy)
        .unwrap();
    assert_eq!(first, third);
}

#[test]
fn test_write_verified_state_recorded() {
    let config = config(&["R"], &["R"]);
    let mut proxy = proxy(1000);
    let mut factory = DeviceFactory::new(&config, ScanMode::Normal);
    let devices = factory.build(&mut proxy).unwrap();

    let report = WriteAccessProbe::new(&mut proxy).run(&devices);
    assert!(report.all_writable());
    factory.mark_write_verified(&devices.focuser.name);
    assert_eq!(
        factory.device_state("FOC_DMY"),
        DeviceState::WriteVerified
    );
}

#[test]
fn test_unresolved_duplicate_surfaced() {
    // pinhole is declared empty in the filter table but matches no
    // empty-slot pattern: it stays on the wheel and is flagged
    let mut config = config(&["clear1"], &["clear1", "pinhole", "R"]);
    let pinhole = config
        .filters
        .iter_mut()
        .find(|ft| ft.name == "pinhole")
        .unwrap();
    pinhole.offset_to_empty_slot = Some(0);

    let mut proxy = proxy(1000);
    let mut factory = DeviceFactory::new(&config, ScanMode::Normal);
    let devices = factory.build(&mut proxy).unwrap();

    let wheel = &devices.wheels[0];
    assert_eq!(wheel.filters.len(), 3);
    assert_eq!(wheel.empty_slots.len(), 1);
    assert_eq!(wheel.empty_slots[0].name, "clear1");
    assert_eq!(
        factory.unresolved_empty_slots(),
        &[("W2".to_string(), "pinhole".to_string())]
    );
}
