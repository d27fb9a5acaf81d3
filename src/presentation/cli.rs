//! Command-line front end.

use crate::controller::NapController;
use crate::domain::models::{AppEvent, MessageSeverity, Peripheral, StopReason};
use crate::domain::session::{
    find_preset, options, BreathingMethod, Preset, SessionConfig, PRESETS,
};
use crate::domain::settings::{Settings, SettingsService};
use crate::domain::timer::TimerSnapshot;
use crate::error::ConfigError;
use crate::infrastructure::bluetooth::permissions::{Permission, PermissionPrompter, Rationale};
use crate::infrastructure::bluetooth::service::BluetoothConfig;
use crate::infrastructure::bluetooth::{BluetoothService, BtleplugTransport};
use anyhow::{bail, Context};
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Parser)]
#[command(name = "power-nap", version, about = "Drive a power nap lamp over Bluetooth LE")]
pub struct Cli {
    /// Log level override (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List nearby devices that advertise a name
    Scan {
        /// Scan window in seconds
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Connect to a lamp and run a nap session
    Nap(NapArgs),
    /// Show the built-in presets and the offered choices
    Presets,
}

#[derive(Debug, Args)]
pub struct NapArgs {
    /// Device id as printed by `scan`; defaults to the last lamp used
    #[arg(long)]
    pub device: Option<String>,
    /// Start from a preset, e.g. "Short Nap"
    #[arg(long)]
    pub preset: Option<String>,
    /// Nap length in minutes
    #[arg(long)]
    pub nap: Option<u32>,
    /// Breathing method ("4-7-8" or "Box Breathing")
    #[arg(long)]
    pub method: Option<BreathingMethod>,
    /// Breathing light length in minutes
    #[arg(long)]
    pub breathing_light: Option<u32>,
    /// Wake-up light length in minutes
    #[arg(long)]
    pub wake_up_light: Option<u32>,
    /// Scan window used to find the lamp
    #[arg(long)]
    pub seconds: Option<u64>,
}

impl NapArgs {
    /// Preset (or defaults), then per-field overrides, validated as a whole.
    pub fn session_config(&self) -> Result<SessionConfig, ConfigError> {
        let mut config = match &self.preset {
            Some(title) => find_preset(title)?.config,
            None => SessionConfig::default(),
        };
        if let Some(nap) = self.nap {
            config.nap_duration = nap;
        }
        if let Some(method) = self.method {
            config.breathing_method = method;
        }
        if let Some(minutes) = self.breathing_light {
            config.breathing_light_duration = minutes;
        }
        if let Some(minutes) = self.wake_up_light {
            config.wake_up_light_duration = minutes;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Asks on the terminal. Only used on platforms with runtime grants.
pub struct ConsolePrompter;

#[async_trait]
impl PermissionPrompter for ConsolePrompter {
    async fn request(&self, permission: Permission, rationale: Rationale) -> bool {
        debug!("Prompting for {:?}", permission);
        let question = format!("{}: {} [y/N] ", rationale.title, rationale.message);
        tokio::task::spawn_blocking(move || {
            print!("{}", question);
            let _ = io::stdout().flush();
            let mut answer = String::new();
            io::stdin().read_line(&mut answer).is_ok()
                && matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
        })
        .await
        .unwrap_or(false)
    }
}

pub async fn run(cli: Cli, mut settings: SettingsService) -> anyhow::Result<()> {
    match cli.command {
        Command::Presets => {
            for preset in PRESETS.iter() {
                println!("{}", format_preset(preset));
            }
            println!();
            for line in format_options() {
                println!("{}", line);
            }
            Ok(())
        }
        Command::Scan { seconds } => scan(settings.get(), seconds).await,
        Command::Nap(args) => nap(&args, &mut settings).await,
    }
}

async fn open_bluetooth(
    settings: &Settings,
    seconds: Option<u64>,
    event_sender: mpsc::UnboundedSender<AppEvent>,
) -> anyhow::Result<BluetoothService<BtleplugTransport>> {
    let transport = BtleplugTransport::new()
        .await
        .context("Failed to open the Bluetooth adapter")?;
    let mut config = BluetoothConfig::from(settings);
    if let Some(seconds) = seconds {
        config.scan_window = Duration::from_secs(seconds);
    }
    Ok(BluetoothService::new(
        Arc::new(transport),
        Arc::new(ConsolePrompter),
        config,
        event_sender,
    ))
}

async fn scan(settings: &Settings, seconds: Option<u64>) -> anyhow::Result<()> {
    let (tx, _rx) = mpsc::unbounded_channel();
    let service = open_bluetooth(settings, seconds, tx).await?;

    let mut scan = service.start_scan().await?;
    println!("Scanning... (Ctrl-C to stop)");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let interrupted = loop {
        tokio::select! {
            device = scan.next_device() => match device {
                Some(device) => println!("{}", format_device(&device)),
                None => break false,
            },
            _ = &mut ctrl_c => break true,
        }
    };
    let end = if interrupted {
        scan.cancel().await
    } else {
        scan.finished().await
    };
    debug!("Scan ended: {:?}", end);

    println!("{} device(s) found", service.devices().await.len());
    Ok(())
}

/// Scans until the wanted device shows up, matching by id or by name.
async fn find_device(
    service: &BluetoothService<BtleplugTransport>,
    wanted: &str,
) -> anyhow::Result<Peripheral> {
    let mut scan = service.start_scan().await?;
    while let Some(device) = scan.next_device().await {
        if device.id == wanted || device.name.eq_ignore_ascii_case(wanted) {
            scan.cancel().await;
            return Ok(device);
        }
    }
    bail!("Device {} was not found; is it powered on and in range?", wanted)
}

async fn nap(args: &NapArgs, settings: &mut SettingsService) -> anyhow::Result<()> {
    let config = args.session_config()?;
    let wanted = args
        .device
        .clone()
        .or_else(|| settings.get().last_device_id.clone())
        .context("No device given; pass --device <ID> (see `power-nap scan`)")?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let service = open_bluetooth(settings.get(), args.seconds, tx.clone()).await?;

    println!("Looking for {}...", wanted);
    let device = find_device(&service, &wanted).await?;
    service.connect(&device).await?;
    if let Err(e) = settings.remember_device(&device.id) {
        warn!("Could not remember device: {}", e);
    }

    let controller = NapController::new(Arc::new(service), tx);
    controller.apply_config(config).await?;
    controller.start_session().await;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                print_event(&event);
                if matches!(event, AppEvent::SessionStopped(_)) {
                    break;
                }
            }
            _ = &mut ctrl_c => {
                println!();
                controller.stop_session().await;
                println!("{}", stop_message(StopReason::Stopped));
                break;
            }
        }
    }

    controller.shutdown().await;
    Ok(())
}

fn print_event(event: &AppEvent) {
    match event {
        AppEvent::Tick(snapshot) => {
            print!("\r{}", format_tick(snapshot));
            let _ = io::stdout().flush();
        }
        AppEvent::SessionStopped(_) => {
            println!();
            if let Some(line) = render_event(event) {
                println!("{}", line);
            }
        }
        other => {
            if let Some(line) = render_event(other) {
                println!("{}", line);
            }
        }
    }
}

/// One printable line per event; `None` for events the terminal skips.
pub fn render_event(event: &AppEvent) -> Option<String> {
    match event {
        AppEvent::DeviceFound(_) => None,
        AppEvent::ScanFinished { found } => Some(format!("Scan finished, {} device(s) found", found)),
        AppEvent::ConnectionStatus(status) => Some(format!("Connection: {:?}", status)),
        AppEvent::SessionStarted(config) => Some(format!(
            "Nap started: {} min, {}, breathing light {} min, wake-up light {} min",
            config.nap_duration,
            config.breathing_method,
            config.breathing_light_duration,
            config.wake_up_light_duration
        )),
        AppEvent::SessionStopped(reason) => Some(stop_message(*reason).to_string()),
        AppEvent::Tick(snapshot) => Some(format_tick(snapshot)),
        AppEvent::LogMessage(msg) => match msg.severity {
            MessageSeverity::Info | MessageSeverity::Success => Some(msg.message.clone()),
            MessageSeverity::Warning => Some(format!("warning: {}", msg.message)),
            MessageSeverity::Error => Some(format!("error: {}", msg.message)),
        },
    }
}

fn stop_message(reason: StopReason) -> &'static str {
    match reason {
        StopReason::Expired => "Time's up",
        StopReason::Stopped => "Nap stopped",
        StopReason::Cancelled => "Nap cancelled",
    }
}

pub fn format_tick(snapshot: &TimerSnapshot) -> String {
    format!(
        "{} remaining ({:.0}%)",
        snapshot.display,
        snapshot.progress * 100.0
    )
}

pub fn format_device(device: &Peripheral) -> String {
    match device.rssi {
        Some(rssi) => format!("{:<40} {} ({} dBm)", device.id, device.name, rssi),
        None => format!("{:<40} {}", device.id, device.name),
    }
}

pub fn format_preset(preset: &Preset) -> String {
    let config = &preset.config;
    format!(
        "{:<14} {:>2} min  {:<13} breathing {} min, wake-up {} min",
        preset.title,
        config.nap_duration,
        config.breathing_method,
        config.breathing_light_duration,
        config.wake_up_light_duration
    )
}

/// The choices a settings screen offers for each field.
pub fn format_options() -> Vec<String> {
    fn join(values: &[u32]) -> String {
        values
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }

    let methods: Vec<&str> = BreathingMethod::ALL.iter().map(|m| m.as_str()).collect();
    vec![
        format!("Nap (min):            {}", join(&options::NAP_DURATIONS)),
        format!("Breathing method:     {}", methods.join(", ")),
        format!(
            "Breathing light (min): {}",
            join(&options::BREATHING_LIGHT_DURATIONS)
        ),
        format!(
            "Wake-up light (min):  {}",
            join(&options::WAKE_UP_LIGHT_DURATIONS)
        ),
    ]
}
