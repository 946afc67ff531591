use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use glam::DVec3;
use lidarloc_3d::pointcloud::PointCloud;

#[derive(Default)]
struct GateState {
    map: Option<Arc<PointCloud>>,
    map_generation: u64,
    fix: Option<DVec3>,
    closed: bool,
}

impl GateState {
    fn snapshot(&self) -> Option<ReadySnapshot> {
        match (&self.map, self.fix) {
            (Some(map), Some(fix)) => Some(ReadySnapshot {
                map: Arc::clone(map),
                map_generation: self.map_generation,
                fix,
            }),
            _ => None,
        }
    }
}

/// The inputs a scan cycle needs, captured once both are available.
#[derive(Debug, Clone)]
pub struct ReadySnapshot {
    /// The latest reference map.
    pub map: Arc<PointCloud>,
    /// Increases every time a new map replaces the previous one.
    pub map_generation: u64,
    /// The latest position fix.
    pub fix: DVec3,
}

/// Tracks the arrival of the reference map and of the position fix.
///
/// The writers never block on the reader: `map_arrived` and `fix_arrived` only take the
/// lock long enough to swap the stored value, while `await_ready` sleeps on a condition
/// variable released by every write.
#[derive(Default)]
pub struct ReadinessGate {
    state: Mutex<GateState>,
    changed: Condvar,
}

impl ReadinessGate {
    /// Create a gate with neither the map nor a fix.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the reference map, the last writer wins.
    ///
    /// Returns the generation of the new map.
    pub fn map_arrived(&self, map: PointCloud) -> u64 {
        let generation = {
            let mut state = self.lock();
            state.map = Some(Arc::new(map));
            state.map_generation += 1;
            state.map_generation
        };
        self.changed.notify_all();
        generation
    }

    /// Store the latest position fix.
    ///
    /// Returns true only for the first fix ever received.
    pub fn fix_arrived(&self, fix: DVec3) -> bool {
        let first = {
            let mut state = self.lock();
            let first = state.fix.is_none();
            state.fix = Some(fix);
            first
        };
        self.changed.notify_all();
        first
    }

    /// Whether both the map and a fix have arrived.
    pub fn is_ready(&self) -> bool {
        let state = self.lock();
        state.map.is_some() && state.fix.is_some()
    }

    /// The current inputs, if both are available.
    pub fn snapshot(&self) -> Option<ReadySnapshot> {
        self.lock().snapshot()
    }

    /// Wake up any waiter and make it give up if the gate is still not ready.
    pub fn close(&self) {
        self.lock().closed = true;
        self.changed.notify_all();
    }

    /// Wait at most `timeout` for both the map and a fix.
    pub(crate) fn wait_for(&self, timeout: Duration) -> GateWait {
        let (state, _) = self
            .changed
            .wait_timeout_while(self.lock(), timeout, |state| {
                state.snapshot().is_none() && !state.closed
            })
            .unwrap_or_else(PoisonError::into_inner);
        match state.snapshot() {
            Some(snapshot) => GateWait::Ready(snapshot),
            None if state.closed => GateWait::Closed,
            None => GateWait::TimedOut,
        }
    }

    /// Block until both the map and a fix are available.
    ///
    /// Warns on every `poll` period spent waiting. Returns `None` once the gate is closed
    /// before becoming ready.
    pub fn await_ready(&self, poll: Duration) -> Option<ReadySnapshot> {
        loop {
            match self.wait_for(poll) {
                GateWait::Ready(snapshot) => return Some(snapshot),
                GateWait::Closed => return None,
                GateWait::TimedOut => log::warn!("Waiting for map and gps data ..."),
            }
        }
    }
}

/// Outcome of a bounded wait on the gate.
#[derive(Debug)]
pub(crate) enum GateWait {
    Ready(ReadySnapshot),
    Closed,
    TimedOut,
}
