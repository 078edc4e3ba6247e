//! In-flight output computation tracking per module handle.
//!
//! Teardown of a superseded handle waits for calls still running against it.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Notify;

use super::handle::HandleId;

#[derive(Error, Debug)]
pub enum DrainError {
    #[error("Drain timed out with {remaining} computations still running")]
    Timeout { remaining: u32 },
}

#[derive(Default)]
struct Flights {
    running: AtomicU32,
    idle: Notify,
}

/// Counts module calls per handle and lets teardown wait for them.
#[derive(Default)]
pub struct FlightTracker {
    handles: DashMap<HandleId, Arc<Flights>>,
}

impl FlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one call against `handle` until the guard drops.
    pub fn track(&self, handle: HandleId) -> FlightGuard {
        let flights = self.handles.entry(handle).or_default().clone();
        flights.running.fetch_add(1, Ordering::SeqCst);
        FlightGuard { flights }
    }

    pub fn in_flight_count(&self, handle: HandleId) -> u32 {
        self.handles
            .get(&handle)
            .map(|f| f.running.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Wait until nothing is running against `handle`, up to `timeout`.
    pub async fn drain(&self, handle: HandleId, timeout: Duration) -> Result<(), DrainError> {
        let Some(flights) = self.handles.get(&handle).map(|f| f.value().clone()) else {
            return Ok(());
        };

        let settled = tokio::time::timeout(timeout, async {
            loop {
                // Register before checking so a release in between is not missed
                let idle = flights.idle.notified();
                if flights.running.load(Ordering::SeqCst) == 0 {
                    return;
                }
                idle.await;
            }
        })
        .await;

        settled.map_err(|_| DrainError::Timeout {
            remaining: flights.running.load(Ordering::SeqCst),
        })
    }

    /// Forget `handle` once it has been torn down.
    pub fn remove(&self, handle: HandleId) {
        self.handles.remove(&handle);
    }
}

/// Releases one counted call on drop.
pub struct FlightGuard {
    flights: Arc<Flights>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if self.flights.running.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.flights.idle.notify_waiters();
        }
    }
}
