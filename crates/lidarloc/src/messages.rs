use glam::{DMat4, DVec3};
use lidarloc_3d::pointcloud::PointCloud;

use crate::frames::{orientation_xyzw, position};

/// Time stamp of a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Stamp {
    /// Seconds.
    pub sec: i64,
    /// Nanoseconds within the second.
    pub nanosec: u32,
}

impl Stamp {
    /// Create a stamp from its two parts.
    pub fn new(sec: i64, nanosec: u32) -> Self {
        Self { sec, nanosec }
    }
}

impl std::fmt::Display for Stamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:09}", self.sec, self.nanosec)
    }
}

/// A point cloud tagged with its acquisition time and frame.
#[derive(Debug, Clone, PartialEq)]
pub struct StampedCloud {
    /// Acquisition time.
    pub stamp: Stamp,
    /// Frame the points are expressed in.
    pub frame_id: String,
    /// The points.
    pub cloud: PointCloud,
}

/// A coarse absolute position in map coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionFix {
    /// Time of the fix.
    pub stamp: Stamp,
    /// Position in the map frame.
    pub point: DVec3,
}

/// Rigid transform between two named frames, `parent_t_child`.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBroadcast {
    /// Time the transform is valid at.
    pub stamp: Stamp,
    /// Frame the transform maps into.
    pub parent_frame: String,
    /// Frame the transform maps from.
    pub child_frame: String,
    /// The transform.
    pub transform: DMat4,
}

/// Position and orientation in a named frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseMessage {
    /// Time of the pose.
    pub stamp: Stamp,
    /// Frame of the pose.
    pub frame_id: String,
    /// Position.
    pub position: [f64; 3],
    /// Orientation as a quaternion, x, y, z, w order.
    pub orientation: [f64; 4],
}

impl PoseMessage {
    /// Pose of the frame placed by `transform`.
    pub fn from_transform(stamp: Stamp, frame_id: impl Into<String>, transform: &DMat4) -> Self {
        Self {
            stamp,
            frame_id: frame_id.into(),
            position: position(transform),
            orientation: orientation_xyzw(transform),
        }
    }
}
