mod audio;
mod config;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tokio::signal;

use audio::{
    AlsaBackend, AudioBackend, CancelToken, DeviceRegistry, Passthrough, Port, Relay, RelayError,
    RelayStats, SessionSpec, sampler,
};
use config::Config;

const USAGE: &str = "\
usage: audio_relay_rs [MODE]

modes:
  run                        relay capture -> playback until Ctrl+C (default)
  list [--json]              print every audio device and exit
  loopback [SECS]            relay for SECS seconds, then exit
  record [SECS] [PATH]       capture SECS seconds into a sample container
  replay [PATH]              play a sample container on the playback device
  config                     print the effective configuration

Ctrl+C stops after the current frame; a second Ctrl+C exits at once.

environment overrides:
  RELAY_CAPTURE_DEVICE, RELAY_PLAYBACK_DEVICE, RELAY_SAMPLE_RATE, RELAY_CHANNELS,
  RELAY_SAMPLE_FORMAT, RELAY_FRAME_SIZE, RELAY_RECORD_SECS, RELAY_SAMPLE_PATH";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    Run,
    List { json: bool },
    Loopback { secs: Option<u32> },
    Record { secs: Option<u32>, path: Option<PathBuf> },
    Replay { path: Option<PathBuf> },
    ShowConfig,
    Help,
}

impl Mode {
    fn parse(args: &[String]) -> Result<Self> {
        let parse_secs = |arg: Option<&String>| -> Result<Option<u32>> {
            arg.map(|s| s.parse().with_context(|| format!("Invalid duration '{}'", s)))
                .transpose()
        };

        let mode = match args.first().map(String::as_str) {
            None | Some("run") => Mode::Run,
            Some("list") => match args.get(1).map(String::as_str) {
                None => Mode::List { json: false },
                Some("--json") => Mode::List { json: true },
                Some(other) => bail!("Unknown list option '{}'", other),
            },
            Some("loopback") => Mode::Loopback {
                secs: parse_secs(args.get(1))?,
            },
            Some("record") => Mode::Record {
                secs: parse_secs(args.get(1))?,
                path: args.get(2).map(PathBuf::from),
            },
            Some("replay") => Mode::Replay {
                path: args.get(1).map(PathBuf::from),
            },
            Some("config") => Mode::ShowConfig,
            Some("help" | "-h" | "--help") => Mode::Help,
            Some(other) => bail!("Unknown mode '{}'\n\n{}", other, USAGE),
        };
        Ok(mode)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mode = Mode::parse(&args)?;

    // 加载配置
    let config = Config::new()?.with_env_overrides()?;
    log::debug!("{} v{} starting, mode: {:?}", config.app_name, config.app_version, mode);

    match mode {
        Mode::Help => println!("{}", USAGE),
        Mode::ShowConfig => println!("{}", serde_json::to_string_pretty(&config)?),
        Mode::List { json } => list_devices(&AlsaBackend, json)?,
        Mode::Run => {
            relay(config, None).await?;
        }
        Mode::Loopback { secs } => {
            let secs = secs.unwrap_or(config.record_secs);
            relay(config, Some(secs)).await?;
        }
        Mode::Record { secs, path } => {
            let secs = secs.unwrap_or(config.record_secs);
            let path = path.unwrap_or_else(|| config.sample_path.clone());
            tokio::task::spawn_blocking(move || record_clip(&AlsaBackend, &config, secs, &path))
                .await
                .context("Recording thread panicked")??;
        }
        Mode::Replay { path } => {
            let path = path.unwrap_or_else(|| config.sample_path.clone());
            tokio::task::spawn_blocking(move || replay_clip(&AlsaBackend, &config, &path))
                .await
                .context("Replay thread panicked")??;
        }
    }
    Ok(())
}

/// Human readable output of all audio devices, to find the names to configure.
fn list_devices<B: AudioBackend>(backend: &B, json: bool) -> Result<()> {
    let registry = DeviceRegistry::snapshot(backend).context("Failed to enumerate audio devices")?;
    if json {
        println!("{}", serde_json::to_string_pretty(registry.devices())?);
        return Ok(());
    }
    for d in registry.devices() {
        println!(
            "{:>3}  {:<40} {:<16} {}",
            d.index,
            d.name,
            d.direction.to_string(),
            d.description
        );
    }
    Ok(())
}

/// Run the relay on a blocking thread. `secs` bounds the run; otherwise it goes on
/// until Ctrl+C or a device fault. A second Ctrl+C exits immediately.
async fn relay(config: Config, secs: Option<u32>) -> Result<RelayStats> {
    let format = config.format()?;
    let limit = secs.map(|s| format.frames_for_duration(s) as u64);
    let spec = SessionSpec::symmetric(&config.capture_device, &config.playback_device, format);

    let cancel = CancelToken::new();
    let worker_cancel = cancel.clone();
    let mut worker = tokio::task::spawn_blocking(move || -> Result<RelayStats> {
        let backend = AlsaBackend;
        let registry =
            DeviceRegistry::snapshot(&backend).context("Failed to enumerate audio devices")?;
        let mut relay = Relay::new(backend);
        relay
            .run(&registry, &spec, Box::new(Passthrough), &worker_cancel, limit)
            .map_err(|e| {
                let context = failure_context(&e);
                anyhow::Error::new(e).context(context)
            })
    });

    let joined = tokio::select! {
        // 监听 Ctrl+C 信号
        _ = signal::ctrl_c() => {
            log::info!("Received Ctrl+C, shutting down...");
            cancel.cancel();
            tokio::select! {
                res = &mut worker => res,
                // A device stuck inside a blocking read never reaches the next frame boundary.
                _ = signal::ctrl_c() => {
                    log::warn!("Received second Ctrl+C, exiting without closing devices");
                    std::process::exit(130);
                }
            }
        }
        res = &mut worker => res,
    };
    let stats = joined.context("Relay thread panicked")??;
    log::info!(
        "Finished relaying {} frames ({} bytes)",
        stats.frames,
        stats.bytes
    );
    Ok(stats)
}

fn failure_context(err: &RelayError) -> &'static str {
    if err.is_runtime_fault() {
        "Relay stopped by a device fault"
    } else {
        "Relay failed"
    }
}

/// Record `secs` seconds from the capture device into a sample container.
fn record_clip<B: AudioBackend>(backend: &B, config: &Config, secs: u32, path: &Path) -> Result<()> {
    let format = config.format()?;
    let registry = DeviceRegistry::snapshot(backend).context("Failed to enumerate audio devices")?;
    let device = registry.resolve(&config.capture_device)?;
    let mut capture = backend.open_capture(device, &format)?;

    let count = format.frames_for_duration(secs);
    log::info!("Recording {} seconds of sample audio ({} frames)", secs, count);
    let recorded = sampler::record(&mut capture, count);
    capture.close()?;
    let frames = recorded?;

    sampler::persist(&frames, &format, path)
        .with_context(|| format!("Failed to write sample to {}", path.display()))?;
    Ok(())
}

/// Play a sample container on the playback device, in the format it was recorded in.
fn replay_clip<B: AudioBackend>(backend: &B, config: &Config, path: &Path) -> Result<()> {
    let recording = sampler::load(path)
        .with_context(|| format!("Failed to load sample from {}", path.display()))?;
    let registry = DeviceRegistry::snapshot(backend).context("Failed to enumerate audio devices")?;
    let device = registry.resolve(&config.playback_device)?;
    let mut playback = backend.open_playback(device, &recording.format)?;

    let played = sampler::playback(&mut playback, recording.frames);
    playback.close()?;
    played?;
    Ok(())
}
