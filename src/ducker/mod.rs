//! The camera-watching control loop.
//!
//! Polls the camera probe on a fixed interval and drives the music gain
//! through the control channel: up the moment the camera goes live, down
//! once it has been idle for the whole debounce window.

pub mod state;

use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;

use crate::config::Config;
use crate::control::MixerControl;
use crate::pipeline::graph::{MUSIC_FILTER, VOLUME_PARAM};
use crate::probe::CameraProbe;
use crate::utils::sos::SignalOfStop;
use state::{ActivityState, VolumeCommand};

pub struct Ducker {
    probe: Box<dyn CameraProbe>,
    control: MixerControl,
    state: ActivityState,
    music_gain: f32,
    poll_interval: Duration,
    debounce_window: Duration,
    sos: SignalOfStop,
}

impl Ducker {
    pub fn new(
        probe: Box<dyn CameraProbe>,
        control: MixerControl,
        config: &Config,
        sos: SignalOfStop,
    ) -> Self {
        Ducker {
            probe,
            control,
            state: ActivityState::new(),
            music_gain: config.music_gain,
            poll_interval: config.poll_interval,
            debounce_window: config.debounce_window,
            sos,
        }
    }

    /// Polls until the shutdown signal fires, then leaves the mix silent
    /// with one final best-effort mute.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let deadline = self.state.pending_deadline();
            // Dummy deadline keeps the branch well-formed while disarmed.
            let off_timer = tokio::time::sleep_until(to_tokio_instant(
                deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600)),
            ));

            tokio::select! {
                _ = self.sos.wait_cancellation() => break,

                _ = ticker.tick() => {
                    let reading = self.probe.probe().await;
                    let command =
                        self.state.observe(reading, Instant::now(), self.debounce_window);
                    if let Some(command) = command {
                        self.apply(command).await;
                    }
                }

                _ = off_timer, if deadline.is_some() => {
                    if let Some(command) = self.state.commit_pending(Instant::now()) {
                        self.apply(command).await;
                    }
                }
            }
        }

        log::info!("control loop stopping, muting music");
        self.apply(VolumeCommand::Mute).await;
    }

    /// Issues one volume command and awaits its reply, so the next command
    /// can never overlap the previous exchange.
    async fn apply(&mut self, command: VolumeCommand) {
        let level = match command {
            VolumeCommand::Raise => {
                log::info!("camera active: raising music to {:.2}", self.music_gain);
                format!("{:.2}", self.music_gain)
            }
            VolumeCommand::Mute => {
                log::info!("camera idle: muting music");
                "0".to_string()
            }
        };

        if let Err(e) = self.control.set(MUSIC_FILTER, VOLUME_PARAM, &level).await {
            // Dropped commands are not fatal; the next transition
            // re-targets the gain anyway.
            log::warn!("volume command failed: {e:#}");
        }
    }
}

fn to_tokio_instant(instant: Instant) -> tokio::time::Instant {
    tokio::time::Instant::from_std(instant)
}
