use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::{self, Receiver, SyncSender, TrySendError},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use glam::DMat4;

use crate::{
    config::LocalizerConfig,
    error::LocalizationError,
    messages::{FrameBroadcast, PoseMessage, PositionFix, StampedCloud},
    pipeline::{CycleReport, FrameIds, Localizer},
    readiness::ReadinessGate,
    registration::{Aligner, IcpAligner},
    sink::LocalizationSink,
};

/// Threading options of a [`LocalizerNode`].
#[derive(Debug, Clone, Copy)]
pub struct NodeOptions {
    /// Delay between two readiness checks of the worker.
    pub readiness_poll: Duration,
    /// Number of scans buffered while the worker is busy.
    pub scan_queue_capacity: usize,
}

impl From<&LocalizerConfig> for NodeOptions {
    fn from(config: &LocalizerConfig) -> Self {
        Self {
            readiness_poll: config.readiness_poll(),
            scan_queue_capacity: config.scan_queue_capacity,
        }
    }
}

/// Cloneable handle delivering the map and the position fixes.
///
/// Both handlers only update the readiness gate and return, they never wait on the
/// scan worker.
#[derive(Clone)]
pub struct ReadinessInputs {
    gate: Arc<ReadinessGate>,
    sink: Arc<dyn LocalizationSink>,
    frames: FrameIds,
}

impl ReadinessInputs {
    /// Replace the reference map.
    pub fn on_map(&self, map: StampedCloud) {
        log::info!("Got map message: {} points", map.cloud.len());
        self.gate.map_arrived(map.cloud);
    }

    /// Store a position fix, the first one also publishes a seed pose at the fix.
    pub fn on_fix(&self, fix: PositionFix) {
        log::info!("Got GPS message: {:?}", fix.point);
        if !self.gate.fix_arrived(fix.point) {
            return;
        }

        let map_t_sensor = DMat4::from_translation(fix.point);
        self.sink.publish_pose(&PoseMessage::from_transform(
            fix.stamp,
            self.frames.map.clone(),
            &map_t_sensor,
        ));
        self.sink.broadcast_frame(&FrameBroadcast {
            stamp: fix.stamp,
            parent_frame: self.frames.map.clone(),
            child_frame: self.frames.lidar.clone(),
            transform: map_t_sensor,
        });
    }
}

/// Localizer running its scan cycles on a dedicated worker thread.
///
/// Map and fix messages update the readiness gate from the caller's thread. Scans are
/// queued and processed in arrival order, one at a time, once both the map and a fix
/// are available.
pub struct LocalizerNode {
    inputs: ReadinessInputs,
    scans: Option<SyncSender<StampedCloud>>,
    cancelled: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl LocalizerNode {
    /// Start an ICP based localizer from `config`.
    pub fn from_config(
        config: &LocalizerConfig,
        sink: Arc<dyn LocalizationSink>,
    ) -> Result<Self, LocalizationError> {
        let localizer = Localizer::new(config, IcpAligner)?;
        Self::spawn(localizer, sink, NodeOptions::from(config))
    }

    /// Move `localizer` onto a new worker thread.
    pub fn spawn<A: Aligner + 'static>(
        localizer: Localizer<A>,
        sink: Arc<dyn LocalizationSink>,
        options: NodeOptions,
    ) -> Result<Self, LocalizationError> {
        let gate = Arc::new(ReadinessGate::new());
        let cancelled = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::sync_channel(options.scan_queue_capacity);

        let inputs = ReadinessInputs {
            gate: Arc::clone(&gate),
            sink: Arc::clone(&sink),
            frames: localizer.frames().clone(),
        };

        let worker = {
            let cancelled = Arc::clone(&cancelled);
            thread::Builder::new()
                .name("localizer".into())
                .spawn(move || {
                    run_worker(localizer, rx, &gate, sink.as_ref(), &cancelled, options.readiness_poll)
                })
                .map_err(LocalizationError::Spawn)?
        };

        Ok(Self {
            inputs,
            scans: Some(tx),
            cancelled,
            worker: Some(worker),
        })
    }

    /// Handle delivering the map and fixes from other threads.
    pub fn readiness_inputs(&self) -> ReadinessInputs {
        self.inputs.clone()
    }

    /// See [`ReadinessInputs::on_map`].
    pub fn on_map(&self, map: StampedCloud) {
        self.inputs.on_map(map);
    }

    /// See [`ReadinessInputs::on_fix`].
    pub fn on_fix(&self, fix: PositionFix) {
        self.inputs.on_fix(fix);
    }

    /// Queue a scan without waiting.
    ///
    /// The scan is discarded with [`LocalizationError::QueueFull`] when the queue is full.
    pub fn on_scan(&self, scan: StampedCloud) -> Result<(), LocalizationError> {
        log::info!("Got lidar message: {} points", scan.cloud.len());
        let scans = self.scans.as_ref().ok_or(LocalizationError::Disconnected)?;
        match scans.try_send(scan) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(scan)) => {
                log::warn!("scan queue full, dropping scan {}", scan.stamp);
                Err(LocalizationError::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => Err(LocalizationError::Disconnected),
        }
    }

    /// Queue a scan, waiting for room in the queue.
    pub fn on_scan_blocking(&self, scan: StampedCloud) -> Result<(), LocalizationError> {
        let scans = self.scans.as_ref().ok_or(LocalizationError::Disconnected)?;
        scans.send(scan).map_err(|_| LocalizationError::Disconnected)
    }

    /// Stop accepting scans, process the queued ones and flush the log.
    ///
    /// Queued scans are dropped if the map or the fix never arrived.
    pub fn shutdown(&mut self) -> Result<(), LocalizationError> {
        // closing the channel ends the worker loop once the queue is drained
        self.scans.take();
        self.inputs.gate.close();
        match self.worker.take() {
            Some(worker) => worker.join().map_err(|_| LocalizationError::Disconnected),
            None => Ok(()),
        }
    }

    /// Like [`LocalizerNode::shutdown`] but drops the scans still queued.
    pub fn abort(&mut self) -> Result<(), LocalizationError> {
        self.cancelled.store(true, Ordering::SeqCst);
        self.shutdown()
    }
}

impl Drop for LocalizerNode {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("localizer worker did not stop cleanly: {e}");
        }
    }
}

fn run_worker<A: Aligner>(
    mut localizer: Localizer<A>,
    scans: Receiver<StampedCloud>,
    gate: &ReadinessGate,
    sink: &dyn LocalizationSink,
    cancelled: &AtomicBool,
    poll: Duration,
) {
    for scan in scans.iter() {
        if cancelled.load(Ordering::SeqCst) {
            break;
        }
        let Some(ready) = gate.await_ready(poll) else {
            log::warn!("localizer stopped before the map and gps data arrived");
            break;
        };

        match localizer.process_scan(&ready, &scan) {
            Ok(report) => publish(sink, &report),
            Err(e) => log::error!("skipping scan {}: {e}", scan.stamp),
        }
    }

    if let Err(e) = localizer.finish() {
        log::error!("failed to flush the trajectory log: {e}");
    }
}

fn publish(sink: &dyn LocalizationSink, report: &CycleReport) {
    log::debug!(
        "cycle {}: converged {}, fitness {}",
        report.sequence_id,
        report.converged,
        report.fitness
    );
    sink.publish_aligned_scan(&report.outputs.aligned_scan);
    sink.broadcast_frame(&report.outputs.frame);
    sink.publish_pose(&report.outputs.pose);
}
