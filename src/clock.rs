// NETEXP: Perturbation-Driven Multipath Experiments in Emulated Network Topologies
// Copyright (C) 2024-2025 Roland Schmid <roschmi@ethz.ch> and Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//! Waiting during an experiment. All waits go through a [`Clock`], such that tests and dry runs
//! can skip them, and race against a [`CancelToken`].

use std::{sync::Arc, time::Duration};

use tokio::sync::watch;

#[async_trait::async_trait]
pub trait Clock: Send + Sync {
    /// Wait for the given duration.
    async fn sleep(&self, duration: Duration);
}

/// Clock that actually waits.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait::async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock that returns immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipClock;

#[async_trait::async_trait]
impl Clock for SkipClock {
    async fn sleep(&self, duration: Duration) {
        log::debug!("skip waiting for {duration:?}");
    }
}

/// Token to interrupt the waits of a running experiment.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn cancel(&self) {
        // cannot fail, as `self` holds a receiver
        let _ = self.tx.send(true);
    }

    /// Cancel the token. Returns `false` if it was already cancelled before.
    pub fn interrupt(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                // the sender lives as long as any clone of the token
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Outcome of a cancellable wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    Elapsed,
    Cancelled,
}

/// Wait for `duration` on `clock`, unless `cancel` fires first.
pub async fn wait(clock: &dyn Clock, cancel: &CancelToken, duration: Duration) -> Wait {
    if cancel.is_cancelled() {
        return Wait::Cancelled;
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Wait::Cancelled,
        _ = clock.sleep(duration) => Wait::Elapsed,
    }
}
