//! Process supervision for the two-leg audio pipeline.
//!
//! The mixer leg captures the microphone, blends in the looping music
//! track, and writes raw PCM to stdout. The player leg reads that PCM
//! from stdin and renders it on the default output device. The
//! supervisor owns both children, the pump task linking them, and a
//! monitor task that propagates a fault in one leg to the other.

use anyhow::{Context, Result};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use super::graph;
use super::state::PipelineState;
use crate::config::Config;

const EXIT_POLL: Duration = Duration::from_millis(500);

/// Handle to the running pipeline. Created by [`Pipeline::start`],
/// destroyed by [`Pipeline::stop`]; there is no restart.
pub struct Pipeline {
    mixer: Leg,
    player: Leg,
    state: Arc<RwLock<PipelineState>>,
    link: JoinHandle<()>,
    monitor: JoinHandle<()>,
}

#[derive(Clone)]
struct Leg {
    name: &'static str,
    child: Arc<Mutex<Child>>,
}

impl Leg {
    fn new(name: &'static str, child: Child) -> Self {
        Leg {
            name,
            child: Arc::new(Mutex::new(child)),
        }
    }

    async fn try_status(&self) -> Option<ExitStatus> {
        self.child.lock().await.try_wait().ok().flatten()
    }

    /// Terminates the child. Already-exited children are a no-op.
    async fn kill(&self) {
        let mut child = self.child.lock().await;
        if let Err(e) = child.kill().await {
            log::debug!("{}: kill skipped: {e}", self.name);
        }
    }
}

impl Pipeline {
    /// Spawns both legs for `config` and links them.
    pub async fn start(config: &Config) -> Result<Pipeline> {
        let mut mixer = Command::new(&config.mixer_bin);
        mixer.args(graph::mixer_args(config));

        let mut player = Command::new(&config.player_bin);
        player.args(graph::player_args(config));

        log::info!(
            "starting audio pipeline: {} | {}",
            config.mixer_bin,
            config.player_bin
        );
        Self::launch(mixer, player).await
    }

    async fn launch(mut mixer_cmd: Command, mut player_cmd: Command) -> Result<Pipeline> {
        let state = Arc::new(RwLock::new(PipelineState::Starting));

        mixer_cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        let mut mixer = mixer_cmd.spawn().context("spawning mixer process")?;
        let mut mixer_stdout = mixer
            .stdout
            .take()
            .context("capturing mixer stdout")?;

        player_cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        let mut player = match player_cmd.spawn().context("spawning player process") {
            Ok(child) => child,
            Err(e) => {
                // Half-built pipeline; don't leave the mixer running.
                let _ = mixer.kill().await;
                return Err(e);
            }
        };
        let mut player_stdin = match player.stdin.take().context("capturing player stdin") {
            Ok(stdin) => stdin,
            Err(e) => {
                let _ = mixer.kill().await;
                let _ = player.kill().await;
                return Err(e);
            }
        };

        // Pump the mixer's PCM straight into the player. Pipe teardown is
        // the normal way this ends, so those errors stay quiet.
        let link = tokio::spawn(async move {
            match tokio::io::copy(&mut mixer_stdout, &mut player_stdin).await {
                Ok(bytes) => log::debug!("stream link closed after {bytes} bytes"),
                Err(e) if is_pipe_teardown(&e) => log::debug!("stream link: pipe closed"),
                Err(e) => log::warn!("stream link failed: {e}"),
            }
        });

        let mixer = Leg::new("mixer", mixer);
        let player = Leg::new("player", player);

        set_state(
            &state,
            PipelineState::Running {
                started_at: Instant::now(),
            },
        )
        .await;

        let monitor = tokio::spawn(monitor_legs(
            mixer.clone(),
            player.clone(),
            state.clone(),
        ));

        Ok(Pipeline {
            mixer,
            player,
            state,
            link,
            monitor,
        })
    }

    pub async fn state(&self) -> PipelineState {
        *self.state.read().await
    }

    /// Tears the pipeline down. Safe to call repeatedly and safe when the
    /// processes are already gone; every step is a defensive no-op then.
    pub async fn stop(&self) {
        let uptime = {
            let mut state = self.state.write().await;
            if state.is_stopping() {
                log::debug!("pipeline stop already done or in progress");
                return;
            }
            let uptime = state.running_duration();
            if state.can_transition_to(&PipelineState::Stopping) {
                *state = PipelineState::Stopping;
            }
            uptime
        };

        // Unlink first: dropping the pump closes the player's stdin, so
        // both legs see an orderly end of stream before the signals land.
        self.link.abort();
        self.player.kill().await;
        self.mixer.kill().await;
        self.monitor.abort();

        set_state(&self.state, PipelineState::Stopped).await;
        match uptime {
            Some(uptime) => log::info!("audio pipeline stopped after {uptime:?}"),
            None => log::info!("audio pipeline stopped"),
        }
    }
}

/// Watches both legs and propagates a fault: if one exits outside a
/// controlled stop, the other is terminated so nothing keeps feeding a
/// dead pipe.
async fn monitor_legs(mixer: Leg, player: Leg, state: Arc<RwLock<PipelineState>>) {
    let mut tick = tokio::time::interval(EXIT_POLL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tick.tick().await;
        if state.read().await.is_stopping() {
            return;
        }

        let mixer_exit = mixer.try_status().await;
        let player_exit = player.try_status().await;
        if mixer_exit.is_none() && player_exit.is_none() {
            continue;
        }

        // A stop may have started while we were checking.
        if state.read().await.is_stopping() {
            return;
        }

        if let Some(status) = player_exit {
            log::error!("player exited unexpectedly ({status}); stopping mixer");
            mixer.kill().await;
        }
        if let Some(status) = mixer_exit {
            log::error!("mixer exited unexpectedly ({status}); stopping player");
            player.kill().await;
        }

        set_state(&state, PipelineState::Stopped).await;
        return;
    }
}

async fn set_state(state: &RwLock<PipelineState>, target: PipelineState) {
    let mut state = state.write().await;
    if state.can_transition_to(&target) {
        *state = target;
    } else {
        log::warn!("invalid pipeline transition {} -> {}", state, target);
    }
}

fn is_pipe_teardown(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::UnexpectedEof
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipe_teardown_errors_are_recognized() {
        use std::io::{Error, ErrorKind};

        assert!(is_pipe_teardown(&Error::from(ErrorKind::BrokenPipe)));
        assert!(is_pipe_teardown(&Error::from(ErrorKind::ConnectionReset)));
        assert!(!is_pipe_teardown(&Error::from(ErrorKind::PermissionDenied)));
    }

    #[cfg(unix)]
    mod unix {
        use super::super::*;

        fn cmd(program: &str, args: &[&str]) -> Command {
            let mut cmd = Command::new(program);
            cmd.args(args);
            cmd
        }

        #[tokio::test]
        async fn stop_twice_produces_no_error() {
            let pipeline = Pipeline::launch(cmd("sh", &["-c", "sleep 5"]), cmd("cat", &[]))
                .await
                .unwrap();

            pipeline.stop().await;
            assert!(pipeline.state().await.is_stopped());

            // Second stop must return without touching the processes.
            pipeline.stop().await;
            assert!(pipeline.state().await.is_stopped());
        }

        #[tokio::test]
        async fn player_death_takes_down_the_mixer() {
            let pipeline = Pipeline::launch(cmd("sh", &["-c", "sleep 5"]), cmd("true", &[]))
                .await
                .unwrap();

            // The player exits immediately; give the monitor a few polls.
            tokio::time::sleep(EXIT_POLL * 3).await;

            assert!(pipeline.mixer.try_status().await.is_some());
            assert!(pipeline.state().await.is_stopped());
        }

        #[tokio::test]
        async fn stop_with_processes_already_gone_is_safe() {
            let pipeline = Pipeline::launch(cmd("true", &[]), cmd("true", &[]))
                .await
                .unwrap();

            tokio::time::sleep(Duration::from_millis(100)).await;
            pipeline.stop().await;
            assert!(pipeline.state().await.is_stopped());
        }
    }
}
