// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! FIFO event queue between producers and the worker loop

use rj_core::Event;
use std::time::Duration;
use tokio::sync::mpsc;

/// Producer side of the queue. Cheap to clone.
#[derive(Clone)]
pub struct EventQueue {
    tx: mpsc::UnboundedSender<Event>,
}

/// Consumer side, owned by the worker loop
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<Event>,
}

/// Create a connected queue pair
pub fn channel() -> (EventQueue, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventQueue { tx }, EventReceiver { rx })
}

impl EventQueue {
    /// Enqueue an event. Never blocks.
    pub fn push(&self, event: Event) {
        tracing::trace!(job_id = %event.job_id, action = %event.action, "enqueue");
        if let Err(e) = self.tx.send(event) {
            tracing::warn!(
                job_id = %e.0.job_id,
                action = %e.0.action,
                "event queue closed, dropping event"
            );
        }
    }

    /// Enqueue an event once `delay` has elapsed.
    ///
    /// Outside a tokio runtime the delay is skipped and the event is pushed
    /// immediately.
    pub fn push_after(&self, event: Event, delay: Duration) {
        if delay.is_zero() {
            self.push(event);
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let queue = self.clone();
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    queue.push(event);
                });
            }
            Err(_) => {
                tracing::warn!(
                    job_id = %event.job_id,
                    "no runtime for delayed event, enqueueing now"
                );
                self.push(event);
            }
        }
    }
}

impl EventReceiver {
    /// Wait for the next event. `None` once every producer is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Take an event if one is ready
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
