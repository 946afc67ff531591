use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use glam::{DMat4, DVec3};
use lidarloc::{
    l3d::pointcloud::PointCloud,
    messages::{PositionFix, Stamp, StampedCloud},
    node::NodeOptions,
    replay::FixSchedule,
    registration::{AlignParams, Aligner, Alignment, RegistrationTarget},
    sink::{ChannelSink, Output},
    Localizer, LocalizationError, LocalizerConfig, LocalizerNode,
};

/// Aligner advancing 0.5 m along x per call and counting the scored candidates.
struct CountingAligner {
    scored: Arc<AtomicUsize>,
}

impl Aligner for CountingAligner {
    fn align(
        &self,
        _source: &PointCloud,
        _target: &RegistrationTarget,
        guess: &DMat4,
        _params: &AlignParams,
    ) -> Result<Alignment, LocalizationError> {
        Ok(Alignment {
            transform: DMat4::from_translation(DVec3::new(0.5, 0.0, 0.0)) * *guess,
            converged: true,
            fitness: 0.0,
            iterations: 1,
        })
    }

    fn fitness_score(
        &self,
        _source: &PointCloud,
        _target: &RegistrationTarget,
        _transform: &DMat4,
        _max_range: f64,
    ) -> f64 {
        self.scored.fetch_add(1, Ordering::SeqCst);
        1.0
    }
}

fn scan(sec: i64) -> StampedCloud {
    StampedCloud {
        stamp: Stamp::new(sec, 0),
        frame_id: "nuscenes_lidar".to_string(),
        cloud: PointCloud::from_points(vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]),
    }
}

fn start(
    dir: &tempfile::TempDir,
) -> Result<(LocalizerNode, std::sync::mpsc::Receiver<Output>, Arc<AtomicUsize>), LocalizationError> {
    let config = LocalizerConfig {
        result_save_path: dir.path().join("result.csv"),
        readiness_poll_ms: 5,
        ..Default::default()
    };
    let scored = Arc::new(AtomicUsize::new(0));
    let localizer = Localizer::new(
        &config,
        CountingAligner {
            scored: Arc::clone(&scored),
        },
    )?;
    let (sink, rx) = ChannelSink::new();
    let node = LocalizerNode::spawn(localizer, Arc::new(sink), NodeOptions::from(&config))?;
    Ok((node, rx, scored))
}

#[test]
fn test_scans_queued_before_readiness_initialize_once() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let (mut node, rx, scored) = start(&dir)?;

    for sec in 0..20 {
        node.on_scan(scan(sec))?;
    }

    // map and fix come from other threads while the worker waits
    let inputs = node.readiness_inputs();
    let feeder = std::thread::spawn(move || {
        inputs.on_fix(PositionFix {
            stamp: Stamp::new(0, 0),
            point: DVec3::new(4.0, -1.0, 0.0),
        });
        inputs.on_map(StampedCloud {
            stamp: Stamp::default(),
            frame_id: "world".to_string(),
            cloud: PointCloud::from_points(vec![[0.0; 3], [3.0, 0.0, 0.0]]),
        });
    });
    feeder.join().expect("feeder panicked");
    node.shutdown()?;

    // one sweep of 32 headings, never repeated
    assert_eq!(scored.load(Ordering::SeqCst), 32);

    let poses = rx
        .try_iter()
        .filter_map(|output| match output {
            Output::Pose(pose) => Some(pose),
            _ => None,
        })
        .collect::<Vec<_>>();
    // the seed pose of the first fix, then one per scan
    assert_eq!(poses.len(), 21);
    assert_eq!(poses[0].position, [4.0, -1.0, 0.0]);
    assert_eq!(poses[1].position, [5.0, -1.0, 0.0]);
    assert_eq!(poses[20].position, [14.5, -1.0, 0.0]);
    Ok(())
}

#[test]
fn test_sequence_ids_have_no_gaps() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let (mut node, _rx, _) = start(&dir)?;
    node.on_map(StampedCloud {
        stamp: Stamp::default(),
        frame_id: "world".to_string(),
        cloud: PointCloud::from_points(vec![[0.0; 3]]),
    });
    node.on_fix(PositionFix {
        stamp: Stamp::default(),
        point: DVec3::ZERO,
    });

    for sec in 0..5 {
        node.on_scan_blocking(scan(sec))?;
        // an empty scan is skipped without consuming an id
        node.on_scan_blocking(StampedCloud {
            cloud: PointCloud::default(),
            ..scan(sec)
        })?;
    }
    node.shutdown()?;

    let mut reader = csv::Reader::from_path(dir.path().join("result.csv"))?;
    let ids = reader
        .records()
        .map(|row| row.map(|row| row[0].parse::<u64>()))
        .collect::<Result<Result<Vec<_>, _>, _>>()??;
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    Ok(())
}

/// Aligner keeping the guess of every alignment.
struct RecordingAligner {
    guesses: Arc<Mutex<Vec<DVec3>>>,
}

impl Aligner for RecordingAligner {
    fn align(
        &self,
        _source: &PointCloud,
        _target: &RegistrationTarget,
        guess: &DMat4,
        _params: &AlignParams,
    ) -> Result<Alignment, LocalizationError> {
        if let Ok(mut guesses) = self.guesses.lock() {
            guesses.push(guess.w_axis.truncate());
        }
        Ok(Alignment {
            transform: *guess,
            converged: true,
            fitness: 0.0,
            iterations: 1,
        })
    }

    fn fitness_score(
        &self,
        _source: &PointCloud,
        _target: &RegistrationTarget,
        _transform: &DMat4,
        _max_range: f64,
    ) -> f64 {
        0.0
    }
}

#[test]
fn test_coarse_search_uses_fix_of_the_first_scan() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let config = LocalizerConfig {
        result_save_path: dir.path().join("result.csv"),
        readiness_poll_ms: 5,
        ..Default::default()
    };
    let guesses = Arc::new(Mutex::new(Vec::new()));
    let localizer = Localizer::new(
        &config,
        RecordingAligner {
            guesses: Arc::clone(&guesses),
        },
    )?;
    let (sink, _rx) = ChannelSink::new();
    let mut node = LocalizerNode::spawn(localizer, Arc::new(sink), NodeOptions::from(&config))?;

    node.on_map(StampedCloud {
        stamp: Stamp::default(),
        frame_id: "world".to_string(),
        cloud: PointCloud::from_points(vec![[0.0; 3]]),
    });

    // a drive of 100 s along x, one fix per second
    let drive = (0..100)
        .map(|sec| PositionFix {
            stamp: Stamp::new(sec, 0),
            point: DVec3::new(sec as f64 * 10.0, 0.0, 0.0),
        })
        .collect();
    let mut fixes = FixSchedule::new(drive);

    let first = scan(0);
    for fix in fixes.due(first.stamp) {
        node.on_fix(fix);
    }
    node.on_scan_blocking(first)?;
    node.shutdown()?;

    assert_eq!(fixes.remaining(), 99);
    let guesses = guesses.lock().map_err(|_| "aligner panicked")?;
    // 32 headings then the tracking step, all at the fix of the scan
    assert_eq!(guesses.len(), 33);
    assert_eq!(guesses[0], DVec3::ZERO);
    Ok(())
}
