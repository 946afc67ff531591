use std::sync::mpsc;

use crate::messages::{FrameBroadcast, PoseMessage, StampedCloud};

/// Outbound side of the localizer.
pub trait LocalizationSink: Send + Sync {
    /// The scan of the cycle expressed in the map frame.
    fn publish_aligned_scan(&self, scan: &StampedCloud);

    /// A transform between the map and sensor frames.
    fn broadcast_frame(&self, frame: &FrameBroadcast);

    /// The current pose estimate.
    fn publish_pose(&self, pose: &PoseMessage);
}

/// Sink writing every output to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl LocalizationSink for LogSink {
    fn publish_aligned_scan(&self, scan: &StampedCloud) {
        log::debug!(
            "aligned scan {} in {}: {} points",
            scan.stamp,
            scan.frame_id,
            scan.cloud.len()
        );
    }

    fn broadcast_frame(&self, frame: &FrameBroadcast) {
        log::debug!(
            "frame {} -> {} at {}: {:?}",
            frame.parent_frame,
            frame.child_frame,
            frame.stamp,
            frame.transform.w_axis.truncate()
        );
    }

    fn publish_pose(&self, pose: &PoseMessage) {
        log::info!(
            "pose {} in {}: position {:?} orientation {:?}",
            pose.stamp,
            pose.frame_id,
            pose.position,
            pose.orientation
        );
    }
}

/// One output of the localizer.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// See [`LocalizationSink::publish_aligned_scan`].
    AlignedScan(StampedCloud),
    /// See [`LocalizationSink::broadcast_frame`].
    Frame(FrameBroadcast),
    /// See [`LocalizationSink::publish_pose`].
    Pose(PoseMessage),
}

/// Sink forwarding every output over a channel.
pub struct ChannelSink {
    tx: mpsc::Sender<Output>,
}

impl ChannelSink {
    /// Create the sink and the receiving end of its channel.
    pub fn new() -> (Self, mpsc::Receiver<Output>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }

    fn send(&self, output: Output) {
        if self.tx.send(output).is_err() {
            log::debug!("output receiver dropped");
        }
    }
}

impl LocalizationSink for ChannelSink {
    fn publish_aligned_scan(&self, scan: &StampedCloud) {
        self.send(Output::AlignedScan(scan.clone()));
    }

    fn broadcast_frame(&self, frame: &FrameBroadcast) {
        self.send(Output::Frame(frame.clone()));
    }

    fn publish_pose(&self, pose: &PoseMessage) {
        self.send(Output::Pose(pose.clone()));
    }
}
