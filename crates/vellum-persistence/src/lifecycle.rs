//! Run/stop handshake shared by every metadata store.
//!
//! `Idle -> Running -> Stopped`. `run` parks on a channel until `stop`
//! sends it an acknowledgement sender, drains, then acknowledges. A store
//! cannot be restarted once stopped.

use std::future::Future;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::error::{PersistenceError, PersistenceResult};

/// Observable lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Running,
    Stopped,
}

enum State {
    Idle,
    Running(mpsc::Sender<oneshot::Sender<()>>),
    Stopped,
}

pub struct Lifecycle {
    name: &'static str,
    state: Mutex<State>,
}

impl Lifecycle {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(State::Idle),
        }
    }

    pub fn state(&self) -> LifecycleState {
        match *self.state.lock() {
            State::Idle => LifecycleState::Idle,
            State::Running(_) => LifecycleState::Running,
            State::Stopped => LifecycleState::Stopped,
        }
    }

    /// Park until stopped, then run `drain` before acknowledging.
    pub async fn run<F, Fut>(&self, drain: F) -> PersistenceResult<()>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = ()> + Send,
    {
        let mut stop_rx = {
            let mut state = self.state.lock();
            match *state {
                State::Idle => {
                    let (tx, rx) = mpsc::channel(1);
                    *state = State::Running(tx);
                    rx
                }
                State::Running(_) => return Err(PersistenceError::AlreadyRunning),
                State::Stopped => return Err(PersistenceError::Stopped),
            }
        };
        info!(store = self.name, "metadata store running");

        let ack = stop_rx.recv().await;
        drain().await;
        info!(store = self.name, "metadata store stopped");
        if let Some(ack) = ack {
            let _ = ack.send(());
        }
        Ok(())
    }

    /// Signal the runner and wait for its acknowledgement.
    pub async fn stop(&self) -> PersistenceResult<()> {
        let stop_tx = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, State::Stopped) {
                State::Running(tx) => tx,
                previous => {
                    *state = previous;
                    debug!(store = self.name, "stop ignored, store not running");
                    return Ok(());
                }
            }
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        if stop_tx.send(ack_tx).await.is_ok() {
            // The runner may have been dropped mid-wait; either way we are done.
            let _ = ack_rx.await;
        }
        Ok(())
    }
}
