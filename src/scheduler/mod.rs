//! Scheduler module for periodic endpoint checks.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::monitor::MonitorEngine;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("scheduler is already running")]
    AlreadyStarted,
    #[error("scheduler has been stopped")]
    Stopped,
}

enum State {
    Idle,
    Running {
        stop_tx: broadcast::Sender<()>,
        task: JoinHandle<()>,
    },
    Stopped,
}

/// Drives [`MonitorEngine::check_all`] on a fixed period.
///
/// Runs once: after [`Scheduler::stop`] a new instance is needed.
pub struct Scheduler {
    engine: Arc<MonitorEngine>,
    period: Duration,
    state: Mutex<State>,
}

impl Scheduler {
    pub fn new(engine: Arc<MonitorEngine>, period: Duration) -> Self {
        Self {
            engine,
            period,
            state: Mutex::new(State::Idle),
        }
    }

    /// Start ticking. The first round runs one period from now.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            State::Running { .. } => return Err(SchedulerError::AlreadyStarted),
            State::Stopped => return Err(SchedulerError::Stopped),
            State::Idle => {}
        }

        let (stop_tx, stop_rx) = broadcast::channel(1);
        let task = tokio::spawn(run_check_loop(self.engine.clone(), self.period, stop_rx));
        *state = State::Running { stop_tx, task };

        tracing::info!("Scheduler started, checking every {:?}", self.period);
        Ok(())
    }

    /// Stop ticking and wait for an in-flight round to finish.
    ///
    /// Safe to call in any state.
    pub async fn stop(&self) {
        let previous = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *state, State::Stopped)
        };

        if let State::Running { stop_tx, task } = previous {
            let _ = stop_tx.send(());
            if let Err(e) = task.await {
                tracing::error!("Scheduler task failed: {}", e);
            }
            tracing::info!("Scheduler stopped");
        }
    }
}

async fn run_check_loop(
    engine: Arc<MonitorEngine>,
    period: Duration,
    mut stop_rx: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    // An overrunning round pushes the next one back instead of bunching up.
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                break;
            }
            _ = interval.tick() => {
                engine.check_all().await;
            }
        }
    }
}
