use std::{fs::File, io::Write, path::Path};

use glam::DMat4;
use serde::Serialize;

use crate::frames::{euler_zyx, position};

/// Header row of the trajectory log.
pub const TRAJECTORY_HEADER: [&str; 7] = ["id", "x", "y", "z", "yaw", "pitch", "roll"];

/// Error types for the trajectory log.
#[derive(Debug, thiserror::Error)]
pub enum TrajectoryError {
    /// The log file could not be created or flushed.
    #[error("Failed to write the trajectory log")]
    Io(#[from] std::io::Error),

    /// A row could not be serialized.
    #[error("Failed to write a trajectory record")]
    Csv(#[from] csv::Error),
}

/// One row of the trajectory log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrajectoryRecord {
    /// Sequence id, starting at 1.
    pub id: u64,
    /// Vehicle x in the map frame.
    pub x: f64,
    /// Vehicle y in the map frame.
    pub y: f64,
    /// Always 0, the vehicle is projected on the ground plane.
    pub z: f64,
    /// Vehicle yaw, radians.
    pub yaw: f64,
    /// Vehicle pitch, radians.
    pub pitch: f64,
    /// Vehicle roll, radians.
    pub roll: f64,
}

/// Append-only comma separated log of vehicle poses.
///
/// The header is written on creation and each row is flushed as soon as it is appended.
pub struct TrajectoryWriter<W: Write> {
    writer: csv::Writer<W>,
    last_id: u64,
}

impl TrajectoryWriter<File> {
    /// Create or truncate the log at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, TrajectoryError> {
        let file = File::create(path)?;
        Self::from_writer(file)
    }
}

impl<W: Write> TrajectoryWriter<W> {
    /// Start a log on an arbitrary writer.
    pub fn from_writer(writer: W) -> Result<Self, TrajectoryError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        writer.write_record(TRAJECTORY_HEADER)?;
        writer.flush()?;
        Ok(Self { writer, last_id: 0 })
    }

    /// Append the pose `map_t_vehicle` and return its sequence id.
    pub fn append(&mut self, map_t_vehicle: &DMat4) -> Result<TrajectoryRecord, TrajectoryError> {
        let [x, y, _] = position(map_t_vehicle);
        let angles = euler_zyx(map_t_vehicle);
        let record = TrajectoryRecord {
            id: self.last_id + 1,
            x,
            y,
            z: 0.0,
            yaw: angles.yaw,
            pitch: angles.pitch,
            roll: angles.roll,
        };

        self.writer.serialize(record)?;
        self.writer.flush()?;
        self.last_id = record.id;
        Ok(record)
    }

    /// Id of the last appended record, 0 when empty.
    pub fn last_id(&self) -> u64 {
        self.last_id
    }

    /// Flush any buffered row.
    pub fn flush(&mut self) -> Result<(), TrajectoryError> {
        Ok(self.writer.flush()?)
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(self) -> Result<W, TrajectoryError> {
        self.writer
            .into_inner()
            .map_err(|e| TrajectoryError::Io(e.into_error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;

    #[test]
    fn test_header_and_sequential_ids() -> Result<(), Box<dyn std::error::Error>> {
        let mut writer = TrajectoryWriter::from_writer(Vec::new())?;
        assert_eq!(writer.last_id(), 0);

        let pose = DMat4::from_translation(DVec3::new(1.5, -2.0, 7.0));
        assert_eq!(writer.append(&pose)?.id, 1);
        assert_eq!(writer.append(&pose)?.id, 2);
        assert_eq!(writer.last_id(), 2);

        let contents = String::from_utf8(writer.into_inner()?)?;
        let lines = contents.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "id,x,y,z,yaw,pitch,roll");
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("1,1.5,-2.0,0.0,"));
        assert!(lines[2].starts_with("2,"));
        Ok(())
    }

    #[test]
    fn test_height_is_not_logged() -> Result<(), Box<dyn std::error::Error>> {
        let mut writer = TrajectoryWriter::from_writer(Vec::new())?;
        let record = writer.append(&DMat4::from_translation(DVec3::new(0.0, 0.0, -1.5)))?;
        assert_eq!(record.z, 0.0);
        Ok(())
    }

    #[test]
    fn test_rows_are_flushed_to_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("result.csv");
        let mut writer = TrajectoryWriter::create(&path)?;
        writer.append(&DMat4::IDENTITY)?;

        // readable while the writer is still open
        let contents = std::fs::read_to_string(&path)?;
        assert_eq!(contents.lines().count(), 2);
        Ok(())
    }
}
