use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::audio::{AudioFormat, SampleFormat};

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub app_name: &'static str,
    pub app_version: &'static str,

    // 设备名称，每次启动时重新解析
    pub capture_device: String,
    pub playback_device: String,

    // 音频格式
    pub sample_rate: u32,
    pub channels: u32,
    pub sample_format: SampleFormat,
    pub frame_size: u32,

    // 离线采样
    pub record_secs: u32,
    pub sample_path: PathBuf,
}

impl Config {
    /// 从编译时设置的环境变量创建配置
    /// 默认值都在编译时从 config.toml 中读取
    pub fn new() -> Result<Self> {
        Ok(Self {
            app_name: env!("APP_NAME"),
            app_version: env!("APP_VERSION"),

            capture_device: env!("CAPTURE_DEVICE").to_string(),
            playback_device: env!("PLAYBACK_DEVICE").to_string(),

            sample_rate: env!("SAMPLE_RATE")
                .parse()
                .context("Failed to parse SAMPLE_RATE")?,
            channels: env!("CHANNELS").parse().context("Failed to parse CHANNELS")?,
            sample_format: env!("SAMPLE_FORMAT")
                .parse()
                .context("Failed to parse SAMPLE_FORMAT")?,
            frame_size: env!("FRAME_SIZE")
                .parse()
                .context("Failed to parse FRAME_SIZE")?,

            record_secs: env!("RECORD_SECS")
                .parse()
                .context("Failed to parse RECORD_SECS")?,
            sample_path: PathBuf::from(env!("SAMPLE_PATH")),
        })
    }

    /// Apply `RELAY_*` overrides from the process environment, so device names can
    /// change without rebuilding.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(v) = lookup("RELAY_CAPTURE_DEVICE") {
            self.capture_device = v;
        }
        if let Some(v) = lookup("RELAY_PLAYBACK_DEVICE") {
            self.playback_device = v;
        }
        if let Some(v) = lookup("RELAY_SAMPLE_RATE") {
            self.sample_rate = v.parse().context("Failed to parse RELAY_SAMPLE_RATE")?;
        }
        if let Some(v) = lookup("RELAY_CHANNELS") {
            self.channels = v.parse().context("Failed to parse RELAY_CHANNELS")?;
        }
        if let Some(v) = lookup("RELAY_SAMPLE_FORMAT") {
            self.sample_format = v.parse().context("Failed to parse RELAY_SAMPLE_FORMAT")?;
        }
        if let Some(v) = lookup("RELAY_FRAME_SIZE") {
            self.frame_size = v.parse().context("Failed to parse RELAY_FRAME_SIZE")?;
        }
        if let Some(v) = lookup("RELAY_RECORD_SECS") {
            self.record_secs = v.parse().context("Failed to parse RELAY_RECORD_SECS")?;
        }
        if let Some(v) = lookup("RELAY_SAMPLE_PATH") {
            self.sample_path = PathBuf::from(v);
        }
        Ok(self)
    }

    pub fn format(&self) -> Result<AudioFormat> {
        AudioFormat::new(
            self.sample_rate,
            self.channels,
            self.sample_format,
            self.frame_size,
        )
        .context("Invalid audio format in configuration")
    }
}
