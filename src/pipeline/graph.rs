//! Engine invocation: argument lists and the mixer filter graph.
//!
//! Everything here is configuration for the external ffmpeg/ffplay pair;
//! no process state lives in this module.

use crate::config::Config;

/// Tag of the runtime-controllable gain filter on the music leg. Commands
/// sent over the control channel address it as `volume@music`.
pub const MUSIC_FILTER: &str = "volume@music";

/// Parameter adjusted at runtime on [`MUSIC_FILTER`].
pub const VOLUME_PARAM: &str = "volume";

// Input-side latency hints, applied to the live capture input.
const LOW_LATENCY_INPUT: &[&str] = &[
    "-fflags", "nobuffer", // keep demuxer buffering shallow
    "-flags", "low_delay", // decoder low-delay mode
];

/// Arguments for the capture/mix/encode leg.
///
/// Input 0 is the live microphone, input 1 the looping music track. The
/// mixed stream leaves on stdout as raw PCM so the playback leg can read
/// it straight from a pipe.
pub fn mixer_args(config: &Config) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-nostdin".into(),
    ];

    args.extend(LOW_LATENCY_INPUT.iter().map(|s| s.to_string()));
    args.extend(mic_input(config));

    args.extend([
        "-stream_loop".into(),
        "-1".into(),
        "-i".into(),
        config.music.display().to_string(),
    ]);

    args.extend([
        "-filter_complex".into(),
        filter_graph(config),
        "-map".into(),
        "[out]".into(),
        "-f".into(),
        "s16le".into(),
        "-ar".into(),
        config.sample_rate.to_string(),
        "-ac".into(),
        config.channels.to_string(),
        "pipe:1".into(),
    ]);

    args
}

/// Arguments for the playback leg: raw PCM on stdin, OS default output.
pub fn player_args(config: &Config) -> Vec<String> {
    vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-nodisp".into(),
        "-fflags".into(),
        "nobuffer".into(),
        "-probesize".into(),
        "32".into(),
        "-f".into(),
        "s16le".into(),
        "-ar".into(),
        config.sample_rate.to_string(),
        "-ac".into(),
        config.channels.to_string(),
        "-i".into(),
        "pipe:0".into(),
    ]
}

/// Builds the mixer filter graph.
///
/// The mic gets a fixed gain, the music a tagged, runtime-controllable
/// gain that starts muted. Both are mixed, resampled to the output rate,
/// and routed through the control filter that binds the loopback command
/// endpoint.
fn filter_graph(config: &Config) -> String {
    format!(
        "[0:a]volume={mic_gain:.2}[mic];\
         [1:a]{music_filter}=0.0[mus];\
         [mic][mus]amix=inputs=2:duration=first:dropout_transition=0[mix];\
         [mix]aresample={rate},azmq=bind_address={bind}[out]",
        mic_gain = config.mic_gain,
        music_filter = MUSIC_FILTER,
        rate = config.sample_rate,
        bind = escaped_bind_address(config),
    )
}

// Colons are filter-option separators, so the endpoint address has to
// escape them.
fn escaped_bind_address(config: &Config) -> String {
    format!(
        "tcp\\://{}\\:{}",
        config.control_endpoint.ip(),
        config.control_endpoint.port()
    )
}

fn mic_input(config: &Config) -> Vec<String> {
    let device = config.mic_input.clone().unwrap_or_else(default_mic_device);
    vec![
        "-f".into(),
        capture_format().into(),
        "-i".into(),
        device,
    ]
}

#[cfg(target_os = "linux")]
fn capture_format() -> &'static str {
    "pulse"
}
#[cfg(target_os = "macos")]
fn capture_format() -> &'static str {
    "avfoundation"
}
#[cfg(target_os = "windows")]
fn capture_format() -> &'static str {
    "dshow"
}
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn capture_format() -> &'static str {
    "alsa"
}

#[cfg(target_os = "linux")]
fn default_mic_device() -> String {
    "default".into()
}
#[cfg(target_os = "macos")]
fn default_mic_device() -> String {
    ":0".into()
}
#[cfg(target_os = "windows")]
fn default_mic_device() -> String {
    "audio=default".into()
}
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn default_mic_device() -> String {
    "default".into()
}
