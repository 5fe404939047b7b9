use anyhow::{Context, Result, ensure};
use clap::ArgMatches;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MIXER_BIN: &str = "ffmpeg";
pub const DEFAULT_PLAYER_BIN: &str = "ffplay";
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;
pub const DEFAULT_CHANNELS: u8 = 2;
pub const DEFAULT_MIC_GAIN: f32 = 1.0;
pub const DEFAULT_MUSIC_GAIN: f32 = 0.3;
pub const DEFAULT_POLL_MS: u64 = 1_000;
pub const DEFAULT_DEBOUNCE_MS: u64 = 5_000;
pub const DEFAULT_WARMUP_MS: u64 = 1_500;
pub const DEFAULT_ENDPOINT: &str = "127.0.0.1:5555";

/// Immutable runtime parameters, resolved once at startup.
///
/// Precedence: built-in defaults, then the optional JSON config file,
/// then command-line flags.
#[derive(Debug, Clone)]
pub struct Config {
    pub music: PathBuf,
    pub mixer_bin: String,
    pub player_bin: String,
    /// Engine-specific microphone selector; `None` picks the OS default.
    pub mic_input: Option<String>,
    pub sample_rate: u32,
    pub channels: u8,
    pub mic_gain: f32,
    /// Music level applied while the camera is in use. The track sits at
    /// zero whenever the camera is idle.
    pub music_gain: f32,
    pub poll_interval: Duration,
    pub debounce_window: Duration,
    pub warmup: Duration,
    pub control_endpoint: SocketAddr,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    mixer_bin: Option<String>,
    player_bin: Option<String>,
    mic_input: Option<String>,
    sample_rate: Option<u32>,
    channels: Option<u8>,
    mic_gain: Option<f32>,
    music_gain: Option<f32>,
    poll_ms: Option<u64>,
    debounce_ms: Option<u64>,
    warmup_ms: Option<u64>,
    endpoint: Option<SocketAddr>,
}

impl Config {
    pub fn new(music: PathBuf) -> Self {
        Config {
            music,
            mixer_bin: DEFAULT_MIXER_BIN.to_string(),
            player_bin: DEFAULT_PLAYER_BIN.to_string(),
            mic_input: None,
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            mic_gain: DEFAULT_MIC_GAIN,
            music_gain: DEFAULT_MUSIC_GAIN,
            poll_interval: Duration::from_millis(DEFAULT_POLL_MS),
            debounce_window: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            warmup: Duration::from_millis(DEFAULT_WARMUP_MS),
            control_endpoint: DEFAULT_ENDPOINT.parse().unwrap(),
        }
    }

    /// Builds the configuration from parsed command-line matches.
    pub fn load(matches: &ArgMatches) -> Result<Config> {
        let music = matches
            .get_one::<String>("music")
            .map(PathBuf::from)
            .context("missing music file argument")?;

        let mut config = Config::new(music);

        if let Some(path) = matches.get_one::<String>("config") {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {path}"))?;
            let file: FileConfig = serde_json::from_str(&raw)
                .with_context(|| format!("parsing config file {path}"))?;
            config.apply_file(file);
        }

        if let Some(bin) = matches.get_one::<String>("mixer-bin") {
            config.mixer_bin = bin.clone();
        }
        if let Some(bin) = matches.get_one::<String>("player-bin") {
            config.player_bin = bin.clone();
        }
        if let Some(input) = matches.get_one::<String>("mic-input") {
            config.mic_input = Some(input.clone());
        }
        if let Some(rate) = matches.get_one::<u32>("sample-rate") {
            config.sample_rate = *rate;
        }
        if let Some(channels) = matches.get_one::<u8>("channels") {
            config.channels = *channels;
        }
        if let Some(gain) = matches.get_one::<f32>("mic-gain") {
            config.mic_gain = *gain;
        }
        if let Some(gain) = matches.get_one::<f32>("music-gain") {
            config.music_gain = *gain;
        }
        if let Some(ms) = matches.get_one::<u64>("poll-ms") {
            config.poll_interval = Duration::from_millis(*ms);
        }
        if let Some(ms) = matches.get_one::<u64>("debounce-ms") {
            config.debounce_window = Duration::from_millis(*ms);
        }
        if let Some(ms) = matches.get_one::<u64>("warmup-ms") {
            config.warmup = Duration::from_millis(*ms);
        }
        if let Some(endpoint) = matches.get_one::<String>("endpoint") {
            config.control_endpoint = endpoint
                .parse()
                .with_context(|| format!("invalid control endpoint {endpoint}"))?;
        }

        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(bin) = file.mixer_bin {
            self.mixer_bin = bin;
        }
        if let Some(bin) = file.player_bin {
            self.player_bin = bin;
        }
        if let Some(input) = file.mic_input {
            self.mic_input = Some(input);
        }
        if let Some(rate) = file.sample_rate {
            self.sample_rate = rate;
        }
        if let Some(channels) = file.channels {
            self.channels = channels;
        }
        if let Some(gain) = file.mic_gain {
            self.mic_gain = gain;
        }
        if let Some(gain) = file.music_gain {
            self.music_gain = gain;
        }
        if let Some(ms) = file.poll_ms {
            self.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = file.debounce_ms {
            self.debounce_window = Duration::from_millis(ms);
        }
        if let Some(ms) = file.warmup_ms {
            self.warmup = Duration::from_millis(ms);
        }
        if let Some(endpoint) = file.endpoint {
            self.control_endpoint = endpoint;
        }
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            !self.poll_interval.is_zero(),
            "poll interval must be greater than zero"
        );
        ensure!(self.sample_rate > 0, "sample rate must be greater than zero");
        ensure!(
            (1..=8).contains(&self.channels),
            "channel count must be between 1 and 8"
        );
        ensure!(self.mic_gain >= 0.0, "mic gain must not be negative");
        ensure!(self.music_gain >= 0.0, "music gain must not be negative");
        Ok(())
    }
}

/// Returns a version as specified in Cargo.toml
pub fn app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn app_name() -> &'static str {
    env!("CARGO_PKG_NAME")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::new(PathBuf::from("music.mp3"));
        assert_eq!(config.mixer_bin, DEFAULT_MIXER_BIN);
        assert_eq!(config.sample_rate, DEFAULT_SAMPLE_RATE);
        assert_eq!(config.poll_interval, Duration::from_millis(DEFAULT_POLL_MS));
        assert!(config.mic_input.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn file_overrides_defaults() {
        let file: FileConfig = serde_json::from_str(
            r#"{"music_gain": 0.5, "poll_ms": 250, "endpoint": "127.0.0.1:6000"}"#,
        )
        .unwrap();

        let mut config = Config::new(PathBuf::from("music.mp3"));
        config.apply_file(file);

        assert_eq!(config.music_gain, 0.5);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.control_endpoint, "127.0.0.1:6000".parse().unwrap());
        // Untouched fields keep their defaults.
        assert_eq!(config.mic_gain, DEFAULT_MIC_GAIN);
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        let parsed: std::result::Result<FileConfig, _> =
            serde_json::from_str(r#"{"volume": 0.5}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let mut config = Config::new(PathBuf::from("music.mp3"));
        config.poll_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
