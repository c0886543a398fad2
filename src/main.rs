//! Corsair device runtime CLI
//!
//! `serve` opens every supported device and runs its driver until Ctrl-C.
//! The other subcommands inspect the bus and the config directory without
//! touching device state.

use std::sync::mpsc;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use linkhub_transport::device_registry::PID_LINK_LCD;
use linkhub_transport::{
    framing_for, DeviceFamily, DiscoveredDevice, HidDiscovery, HidIo, HidTransport,
    TransportDeviceInfo, VENDOR_ID,
};
use tracing::{debug, info, warn};

use linkhub::lcd::{GaugeRenderer, LcdPipeline};
use linkhub::profile::ProfileStore;
use linkhub::rgb::Mode;
use linkhub::{open_device, Attachments, Config, Context, DeviceDriver};

mod cli;
use cli::{Cli, Commands};

/// Interface carrying dial, key and paired-device reports
const CONTROL_INTERFACE: i32 = 2;
/// K70 LUX key scan reports
const K70_LUX_KEY_INTERFACE: i32 = 0;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let dir = Config::resolve_path(cli.config.as_deref());
    let config = Config::load(&dir)
        .with_context(|| format!("loading config from {}", dir.display()))?;

    match cli.command {
        None | Some(Commands::Serve) => serve(config),
        Some(Commands::List) => list(),
        Some(Commands::Profiles { serial }) => profiles(&config, &serial),
        Some(Commands::RgbModes) => {
            for name in Mode::NAMES {
                println!("{name}");
            }
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "linkhub=debug" } else { "linkhub=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn serve(config: Config) -> anyhow::Result<()> {
    let print_metrics = config.settings.print_metrics;
    let ctx = Arc::new(Context::new(config)?);
    let mut discovery = HidDiscovery::new()?;

    let mut drivers: Vec<Arc<dyn DeviceDriver>> = Vec::new();
    for device in discovery.list()? {
        // Driven through the hub that owns it
        if device.family == DeviceFamily::LinkLcd {
            continue;
        }
        let serial = device.info.effective_serial();
        let transport = match discovery.open(&device) {
            Ok(t) => t,
            Err(e) => {
                warn!("{serial}: unable to open {}: {e}", device.info.product());
                continue;
            }
        };
        let attachments = attachments_for(&discovery, &device);
        match open_device(transport, device.family, Arc::clone(&ctx), attachments) {
            Ok(driver) => {
                info!("{serial}: {} running", device.info.product());
                drivers.push(driver);
            }
            Err(e) => warn!("{serial}: {} failed to start: {e}", device.info.product()),
        }
    }
    if drivers.is_empty() {
        warn!("no supported devices found");
    }

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("installing Ctrl-C handler")?;
    let _ = rx.recv();

    info!("stopping {} devices", drivers.len());
    for driver in &drivers {
        driver.stop();
    }
    if print_metrics {
        print!("{}", ctx.metrics.encode()?);
    }
    Ok(())
}

fn attachments_for(discovery: &HidDiscovery, device: &DiscoveredDevice) -> Attachments {
    let info = &device.info;
    let listener_interface = match device.family {
        DeviceFamily::Keyboard | DeviceFamily::Slipstream => Some(CONTROL_INTERFACE),
        DeviceFamily::K70Lux => Some(K70_LUX_KEY_INTERFACE),
        _ => None,
    };
    let listener = listener_interface
        .filter(|&i| i != info.interface)
        .and_then(|i| {
            discovery
                .open_interface(info.vid, info.pid, info.serial.as_deref(), i)
                .map_err(|e| debug!("{}: no listener on interface {i}: {e}", info.effective_serial()))
                .ok()
        });

    let lcd = (device.family == DeviceFamily::LinkHub)
        .then(|| discovery.open_product(VENDOR_ID, PID_LINK_LCD).ok())
        .flatten()
        .map(|io| lcd_pipeline(io, info));

    Attachments { listener, lcd }
}

fn lcd_pipeline(io: Box<dyn HidIo>, hub: &TransportDeviceInfo) -> LcdPipeline {
    let info = TransportDeviceInfo {
        vid: VENDOR_ID,
        pid: PID_LINK_LCD,
        serial: hub.serial.clone(),
        product_name: Some("iCUE LINK LCD".to_string()),
        ..Default::default()
    };
    let transport = HidTransport::new(io, info, framing_for(DeviceFamily::LinkLcd));
    LcdPipeline::new(transport, Box::new(GaugeRenderer::default()))
}

fn list() -> anyhow::Result<()> {
    let mut discovery = HidDiscovery::new()?;
    let devices = discovery.list()?;
    if devices.is_empty() {
        println!("No supported devices found");
        return Ok(());
    }
    for device in devices {
        let info = &device.info;
        println!(
            "{:04x}:{:04x}  {:<14} {:<24} {}",
            info.vid,
            info.pid,
            format!("{:?}", device.family),
            info.product(),
            info.effective_serial()
        );
    }
    Ok(())
}

fn profiles(config: &Config, serial: &str) -> anyhow::Result<()> {
    let store = ProfileStore::load(&config.profiles_dir(), serial)?;
    let names = store.names();
    if names.is_empty() {
        println!("No profiles stored for {serial}");
        return Ok(());
    }
    let active = store.active_name();
    for name in names {
        let marker = if active == Some(name.as_str()) { "*" } else { " " };
        println!("{marker} {name}");
    }
    Ok(())
}
