use clap::{Arg, Command};
use log::{error, info, warn};
use std::time::Duration;
use std::{panic, process};

use crate::config::{Config, app_name, app_version};
use crate::control::MixerControl;
use crate::ducker::Ducker;
use crate::pipeline::Pipeline;
use crate::probe::SystemProbe;
use crate::utils::sos::SignalOfStop;

pub mod config;
pub mod control;
pub mod ducker;
pub mod pipeline;
pub mod probe;
pub mod utils;

const CONNECT_ATTEMPTS: u32 = 5;
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(500);

fn main() {
    tracing_subscriber::fmt::init();

    let matches = Command::new(app_name())
        .version(app_version())
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new("music")
                .value_name("MUSIC_FILE")
                .help("Looping background track to mix behind the microphone.")
                .required(true),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("JSON config file; command-line flags win on conflict."),
        )
        .arg(
            Arg::new("mixer-bin")
                .long("mixer-bin")
                .value_name("PATH")
                .help("Mixing engine executable (ffmpeg-compatible)."),
        )
        .arg(
            Arg::new("player-bin")
                .long("player-bin")
                .value_name("PATH")
                .help("Playback executable (ffplay-compatible)."),
        )
        .arg(
            Arg::new("mic-input")
                .long("mic-input")
                .value_name("DEVICE")
                .help("Engine-specific microphone selector."),
        )
        .arg(
            Arg::new("sample-rate")
                .long("sample-rate")
                .value_name("HZ")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("channels")
                .long("channels")
                .value_name("N")
                .value_parser(clap::value_parser!(u8)),
        )
        .arg(
            Arg::new("mic-gain")
                .long("mic-gain")
                .value_name("GAIN")
                .value_parser(clap::value_parser!(f32)),
        )
        .arg(
            Arg::new("music-gain")
                .long("music-gain")
                .value_name("GAIN")
                .help("Music level while the camera is in use.")
                .value_parser(clap::value_parser!(f32)),
        )
        .arg(
            Arg::new("poll-ms")
                .long("poll-ms")
                .value_name("MS")
                .help("Camera poll interval.")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("debounce-ms")
                .long("debounce-ms")
                .value_name("MS")
                .help("How long the camera must stay idle before the music mutes.")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("warmup-ms")
                .long("warmup-ms")
                .value_name("MS")
                .help("Delay before the first control-channel connect.")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("endpoint")
                .long("endpoint")
                .value_name("ADDR:PORT")
                .help("Loopback address of the mixer's control endpoint."),
        )
        .get_matches();

    let config = match Config::load(&matches) {
        Ok(config) => config,
        Err(e) => {
            error!("invalid configuration: {e:#}");
            process::exit(1);
        }
    };

    // kill the process as soon as a background task panics
    let orig_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        orig_hook(panic_info);
        process::exit(1);
    }));

    let sos = SignalOfStop::new();

    // gracefully close the daemon when receiving SIGINT or SIGTERM
    {
        let sos = sos.clone();
        ctrlc::set_handler(move || {
            info!("shutdown signal received");
            sos.cancel();
        })
        .expect("Error setting Ctrl-C handler");
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to start async runtime: {e}");
            process::exit(1);
        }
    };

    process::exit(runtime.block_on(run(config, sos)));
}

async fn run(config: Config, sos: SignalOfStop) -> i32 {
    let pipeline = match Pipeline::start(&config).await {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("failed to start audio pipeline: {e:#}");
            return 1;
        }
    };

    // One-time warm-up so the engine can bind its control endpoint.
    tokio::select! {
        _ = tokio::time::sleep(config.warmup) => {}
        _ = sos.wait_cancellation() => {}
    }

    let mut control = MixerControl::new(config.control_endpoint);
    if !sos.cancelled() {
        if let Err(e) = control
            .connect_with_retry(CONNECT_ATTEMPTS, CONNECT_RETRY_DELAY)
            .await
        {
            // Degraded: keep polling; sends retry the connection lazily.
            warn!("control endpoint unavailable, music stays muted: {e:#}");
        }
    }

    Ducker::new(Box::new(SystemProbe), control, &config, sos.clone())
        .run()
        .await;

    pipeline.stop().await;
    info!("shutdown complete");
    0
}
