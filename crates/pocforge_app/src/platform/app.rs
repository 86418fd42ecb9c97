use std::io::Write;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use forge_logging::{forge_debug, forge_warn};
use pocforge_core::{update, AppState, Msg, Phase};

use super::effects::{EffectRunner, EngineParts};
use super::render::Renderer;

const TICK: Duration = Duration::from_millis(75);

/// Drives the pure state machine until it settles, printing progress to `out`.
pub struct Pipeline<W: Write> {
    state: AppState,
    runner: EffectRunner,
    msg_rx: mpsc::Receiver<Msg>,
    renderer: Renderer,
    out: W,
}

impl<W: Write> Pipeline<W> {
    pub fn new(parts: EngineParts, out: W) -> (Self, mpsc::Sender<Msg>) {
        let (msg_tx, msg_rx) = mpsc::channel();
        let pipeline = Self {
            state: AppState::new(),
            runner: EffectRunner::new(parts, msg_tx.clone()),
            msg_rx,
            renderer: Renderer::default(),
            out,
        };
        (pipeline, msg_tx)
    }

    /// Feeds `initial`, then processes messages until the run is finished.
    pub fn run(mut self, initial: Vec<Msg>) -> AppState {
        for msg in initial {
            self.dispatch(msg);
        }
        while !self.state.is_finished() {
            match self.msg_rx.recv_timeout(TICK) {
                Ok(msg) => self.dispatch(msg),
                Err(mpsc::RecvTimeoutError::Timeout) => self.dispatch(Msg::Tick),
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
        if self.state.phase() == Phase::Cancelled {
            self.runner.detach_generation();
        }
        self.runner.join();
        self.state
    }

    fn dispatch(&mut self, msg: Msg) {
        if !matches!(msg, Msg::Tick) {
            forge_debug!("dispatch {msg:?}");
        }
        let state = std::mem::take(&mut self.state);
        let (mut state, effects) = update(state, msg);
        if state.consume_dirty() {
            for line in self.renderer.render(&state.view()) {
                let _ = writeln!(self.out, "{line}");
            }
        }
        self.state = state;
        self.runner.enqueue(effects);
    }
}

/// Sends a cancel request on the first Ctrl-C; a second one exits.
pub fn forward_ctrl_c(msg_tx: mpsc::Sender<Msg>) {
    let spawned = thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    forge_warn!("Ctrl-C handling unavailable: {err}");
                    return;
                }
            };
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                eprintln!("Cancelling, press Ctrl-C again to quit");
                let _ = msg_tx.send(Msg::CancelRequested);
                if tokio::signal::ctrl_c().await.is_ok() {
                    std::process::exit(130);
                }
            });
        });
    if let Err(err) = spawned {
        forge_warn!("Ctrl-C handling unavailable: {err}");
    }
}
