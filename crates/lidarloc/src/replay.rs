use std::io::Read;
use std::path::{Path, PathBuf};

use glam::DVec3;
use serde::Deserialize;

use crate::messages::{PositionFix, Stamp};

#[derive(Deserialize)]
struct FixRecord {
    sec: i64,
    nanosec: u32,
    x: f64,
    y: f64,
    z: f64,
}

/// Read position fixes from CSV with the columns `sec,nanosec,x,y,z`.
pub fn read_fixes<R: Read>(reader: R) -> Result<Vec<PositionFix>, csv::Error> {
    csv::Reader::from_reader(reader)
        .deserialize()
        .map(|record| {
            let record: FixRecord = record?;
            Ok(PositionFix {
                stamp: Stamp::new(record.sec, record.nanosec),
                point: DVec3::new(record.x, record.y, record.z),
            })
        })
        .collect()
}

/// Stamp encoded in a `<sec>_<nanosec>` file stem.
pub fn stamp_from_stem(path: &Path) -> Option<Stamp> {
    let stem = path.file_stem()?.to_str()?;
    let (sec, nanosec) = stem.split_once('_')?;
    Some(Stamp::new(sec.parse().ok()?, nanosec.parse().ok()?))
}

/// The `.pcd` files of `dir`, sorted by name.
pub fn scan_paths(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut paths = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "pcd"))
        .collect::<Vec<_>>();
    paths.sort();
    Ok(paths)
}

/// Position fixes released in stamp order, interleaved with the scans of a recording.
///
/// Before a scan stamped `t`, every fix with a stamp up to `t` is due. The first fix is
/// due before the first scan whatever its stamp, so the localizer can always start.
pub struct FixSchedule {
    pending: std::iter::Peekable<std::vec::IntoIter<PositionFix>>,
    started: bool,
}

impl FixSchedule {
    /// Schedule `fixes`, sorted by stamp.
    pub fn new(mut fixes: Vec<PositionFix>) -> Self {
        fixes.sort_by_key(|fix| fix.stamp);
        Self {
            pending: fixes.into_iter().peekable(),
            started: false,
        }
    }

    /// Take the fixes to deliver before a scan stamped `stamp`.
    pub fn due(&mut self, stamp: Stamp) -> Vec<PositionFix> {
        let mut due = Vec::new();
        if !self.started {
            self.started = true;
            due.extend(self.pending.next());
        }
        while let Some(fix) = self.pending.next_if(|fix| fix.stamp <= stamp) {
            due.push(fix);
        }
        due
    }

    /// Number of fixes not delivered yet.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(sec: i64, x: f64) -> PositionFix {
        PositionFix {
            stamp: Stamp::new(sec, 0),
            point: DVec3::new(x, 0.0, 0.0),
        }
    }

    #[test]
    fn test_fixes_follow_scan_stamps() {
        let mut schedule = FixSchedule::new(vec![fix(2, 20.0), fix(0, 0.0), fix(1, 10.0), fix(5, 50.0)]);

        let points = |due: Vec<PositionFix>| due.iter().map(|f| f.point.x).collect::<Vec<_>>();
        assert_eq!(points(schedule.due(Stamp::new(0, 0))), vec![0.0]);
        assert_eq!(points(schedule.due(Stamp::new(2, 0))), vec![10.0, 20.0]);
        assert!(schedule.due(Stamp::new(3, 0)).is_empty());
        assert_eq!(schedule.remaining(), 1);
    }

    #[test]
    fn test_first_fix_is_due_before_any_scan() {
        let mut schedule = FixSchedule::new(vec![fix(10, 1.0), fix(11, 2.0)]);
        let due = schedule.due(Stamp::new(0, 0));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].point.x, 1.0);
        assert!(schedule.due(Stamp::new(5, 0)).is_empty());
        assert_eq!(schedule.due(Stamp::new(11, 0)).len(), 1);
    }

    #[test]
    fn test_read_fixes_csv() -> Result<(), csv::Error> {
        let data = "sec,nanosec,x,y,z\n3,500,1.5,-2.0,0.0\n";
        let fixes = read_fixes(data.as_bytes())?;
        assert_eq!(fixes, vec![PositionFix {
            stamp: Stamp::new(3, 500),
            point: DVec3::new(1.5, -2.0, 0.0),
        }]);
        Ok(())
    }

    #[test]
    fn test_stamp_from_stem() {
        assert_eq!(stamp_from_stem(Path::new("scans/12_250.pcd")), Some(Stamp::new(12, 250)));
        assert_eq!(stamp_from_stem(Path::new("scans/frame.pcd")), None);
    }
}
