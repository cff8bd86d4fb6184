use std::fs;
use std::path::Path;
use serde::Deserialize;

#[derive(Deserialize)]
struct Config {
    application: Application,
    devices: Devices,
    format: Format,
    sampler: Sampler,
}

#[derive(Deserialize)]
struct Application {
    name: String,
    version: String,
}

#[derive(Deserialize)]
struct Devices {
    capture: String,
    playback: String,
}

#[derive(Deserialize)]
struct Format {
    sample_rate: u32,
    channels: u32,
    sample_format: String,
    frame_size: u32,
}

#[derive(Deserialize)]
struct Sampler {
    record_secs: u32,
    path: String,
}

// 在编译时读取 config.toml 并设置环境变量
fn main() {
    println!("cargo:rerun-if-changed=config.toml");

    let config_path = Path::new("config.toml");
    if !config_path.exists() {
        panic!("config.toml not found!");
    }

    let config_str = fs::read_to_string(config_path).expect("Failed to read config.toml");
    let config: Config = toml::from_str(&config_str).expect("Failed to parse config.toml");

    println!("cargo:rustc-env=APP_NAME={}", config.application.name);
    println!("cargo:rustc-env=APP_VERSION={}", config.application.version);

    // 设备名称
    println!("cargo:rustc-env=CAPTURE_DEVICE={}", config.devices.capture);
    println!("cargo:rustc-env=PLAYBACK_DEVICE={}", config.devices.playback);

    // 音频格式
    println!("cargo:rustc-env=SAMPLE_RATE={}", config.format.sample_rate);
    println!("cargo:rustc-env=CHANNELS={}", config.format.channels);
    println!("cargo:rustc-env=SAMPLE_FORMAT={}", config.format.sample_format);
    println!("cargo:rustc-env=FRAME_SIZE={}", config.format.frame_size);

    // 离线采样
    println!("cargo:rustc-env=RECORD_SECS={}", config.sampler.record_secs);
    println!("cargo:rustc-env=SAMPLE_PATH={}", config.sampler.path);
}
