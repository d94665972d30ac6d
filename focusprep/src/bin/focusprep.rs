//! Pre-flight check of the focus-scan device configuration.
//!
//! Loads the instrument configuration, derives every scan range, validates
//! ranges against the focuser stroke, resolves empty wheel slots and
//! optionally probes device write access. The run is a dry validation
//! against a broker snapshot seeded from the configuration; a live device
//! server client plugs in through the same `Proxy` trait.
//!
//! Exit code 0 when the configuration is usable, 1 on any validation or
//! presence failure.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use focusprep::config::InstrumentConfig;
use focusprep::factory::{DeviceFactory, FocusRange, ScanMode};
use focusprep::mock_proxy::MockProxy;
use focusprep::probe::WriteAccessProbe;
use focusprep::proxy::PropValue;
use focusprep::summary;

/// Focus-scan configuration validator
#[derive(Parser, Debug)]
#[command(name = "focusprep")]
#[command(about = "Validate focuser, filter wheel and camera configuration before a focus scan")]
#[command(version)]
struct Args {
    /// Add more output
    #[arg(long)]
    debug: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    level: String,

    /// Log file name; logs go to the console when unset
    #[arg(long)]
    logfile: Option<String>,

    /// Write the log file to this path
    #[arg(long, value_name = "PATH", default_value = ".")]
    topath: PathBuf,

    /// Log to console even when a log file is set
    #[arg(long)]
    toconsole: bool,

    /// Configuration file path
    #[arg(long, default_value = "focusprep.toml")]
    config: PathBuf,

    /// Print device properties and add more messages
    #[arg(long)]
    verbose: bool,

    /// Check if devices are writable
    #[arg(long)]
    checkwrite: bool,

    /// Focuser range for a blind run, relative to FOC_DEF
    #[arg(
        long,
        num_args = 3,
        value_names = ["LOWER", "UPPER", "STEP"],
        allow_negative_numbers = true,
        long_help = "Focuser range given as \"lower upper step\" in ticks relative to FOC_DEF. \
            Used only during a blind run; overrides the range from the configuration file."
    )]
    focrange: Option<Vec<i64>>,

    /// Exposure time for the camera, seconds
    #[arg(long)]
    exposure: Option<f64>,

    /// Use this FOC_DEF instead of the device-reported value
    #[arg(long)]
    focdef: Option<i64>,

    /// Sweep the focuser range from configuration or --focrange
    #[arg(long)]
    blind: bool,
}

fn init_logging(args: &Args) -> Result<()> {
    let filter = EnvFilter::try_new(&args.level)
        .with_context(|| format!("invalid log level: {}", args.level))?;

    match &args.logfile {
        Some(name) if !args.toconsole => {
            let path = args.topath.join(name);
            let file = std::fs::File::create(&path)
                .with_context(|| format!("cannot create log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
    Ok(())
}

/// Seed a broker snapshot from the configuration for the dry validation.
fn seed_proxy(config: &InstrumentConfig, foc_def: i64) -> MockProxy {
    let wheel_coupling = config.wheels_in_use.first().cloned().unwrap_or_default();
    let mut proxy = MockProxy::new()
        .with_device(
            &config.ccd.name,
            &[
                ("calculate_stat", PropValue::Int(0)),
                ("wheel", PropValue::Text(wheel_coupling)),
            ],
        )
        .with_device(
            &config.focuser.name,
            &[
                ("FOC_DEF", PropValue::Int(foc_def)),
                (
                    "foc_min",
                    PropValue::Int(config.focuser.absolute_lower_limit),
                ),
                (
                    "foc_max",
                    PropValue::Int(config.focuser.absolute_upper_limit),
                ),
            ],
        );
    for wheel in &config.wheels_in_use {
        proxy.set_property(wheel, "filter", PropValue::Int(0));
    }
    proxy
}

fn main() -> Result<()> {
    let mut args = Args::parse();
    if args.verbose {
        args.debug = true;
        args.toconsole = true;
    }
    if args.debug && args.level == "info" {
        args.level = "debug".to_string();
    }
    init_logging(&args)?;

    if args.focrange.is_some() && !args.blind {
        bail!("--focrange has no effect without --blind");
    }
    let range_override = match &args.focrange {
        Some(values) => {
            let (lower, upper, step) = (values[0], values[1], values[2]);
            if lower >= upper || step <= 0 {
                bail!("bad --focrange values: {lower} {upper} {step}");
            }
            Some(FocusRange { lower, upper, step })
        }
        None => None,
    };

    let mut config = InstrumentConfig::load(&args.config)?;
    if let Some(exposure) = args.exposure {
        if exposure <= 0.0 {
            bail!("--exposure must be positive, got {exposure}");
        }
        config.ccd.base_exposure = exposure;
    }

    // FOC_DEF normally comes from the device; the dry run seeds the middle of
    // the configured window unless --focdef pins it.
    let foc_def = args
        .focdef
        .unwrap_or((config.focuser.lower_limit + config.focuser.upper_limit) / 2);
    let mut proxy = seed_proxy(&config, foc_def);

    let mode = if args.blind {
        ScanMode::Blind
    } else {
        ScanMode::Normal
    };
    let mut factory = DeviceFactory::new(&config, mode);
    if let Some(range) = range_override {
        factory = factory.with_range_override(range);
    }

    let devices = match factory.build(&mut proxy) {
        Ok(devices) => devices,
        Err(e) => {
            error!("check not finished: {e}");
            bail!("device validation failed: {e}");
        }
    };

    summary::log_scan_summary(&devices, mode);
    if args.verbose {
        summary::log_device_properties(&devices);
    }

    if args.checkwrite {
        let report = WriteAccessProbe::new(&mut proxy).run(&devices);
        if report.ccd_writable {
            factory.mark_write_verified(&devices.ccd.name);
        }
        if report.focuser_writable {
            factory.mark_write_verified(&devices.focuser.name);
        }
        if let (true, Some(wheel)) = (report.wheel_writable, devices.wheels.first()) {
            factory.mark_write_verified(&wheel.name);
        }
        if !report.all_writable() {
            error!("not all devices are writable");
            bail!("write-access check failed");
        }
    } else {
        info!("skipped check if devices are writable, enable with --checkwrite");
    }

    info!("DONE");
    Ok(())
}
