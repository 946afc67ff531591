use std::f64::consts::FRAC_PI_2;
use std::sync::Arc;

use glam::{DMat4, DVec3};
use lidarloc::{
    frames::euler_zyx,
    l3d::{linalg::transform_cloud, pointcloud::PointCloud},
    messages::{Stamp, StampedCloud},
    readiness::ReadySnapshot,
    registration::{AlignParams, Aligner, Alignment, IcpAligner, RegistrationTarget},
    Localizer, LocalizationError, LocalizerConfig,
};

/// Square room of 10 m with a floor and one rectangular pillar off center.
fn room() -> PointCloud {
    let mut points = Vec::new();
    let heights = (0..5).map(|k| k as f64 * 0.5);

    for z in heights.clone() {
        for i in 0..20 {
            let s = -5.0 + i as f64 * 0.5;
            points.push([s, -5.0, z]);
            points.push([5.0, s, z]);
            points.push([-s, 5.0, z]);
            points.push([-5.0, -s, z]);
        }
    }

    for i in 1..10 {
        for j in 1..10 {
            points.push([-5.0 + i as f64, -5.0 + j as f64, 0.0]);
        }
    }

    // 2 m x 1 m pillar, its footprint breaks the quarter turn symmetry of the room
    for z in heights.map(|z| z + 0.25) {
        for i in 0..4 {
            let s = i as f64 * 0.5;
            points.push([1.0 + s, 2.0, z]);
            points.push([3.0, 2.0 + s * 0.5, z]);
            points.push([3.0 - s, 3.0, z]);
            points.push([1.0, 3.0 - s * 0.5, z]);
        }
    }

    PointCloud::from_points(points)
}

fn stamped(sec: i64, cloud: PointCloud) -> StampedCloud {
    StampedCloud {
        stamp: Stamp::new(sec, 0),
        frame_id: "nuscenes_lidar".to_string(),
        cloud,
    }
}

fn scenario_config(dir: &tempfile::TempDir) -> LocalizerConfig {
    let mut config = LocalizerConfig {
        result_save_path: dir.path().join("result.csv"),
        // smaller than the point spacing, the clouds are kept as they are
        scan_leaf_size: 0.2,
        map_leaf_size: 0.2,
        ..Default::default()
    };
    config.coarse_search.max_iterations = 50;
    config
}

#[test]
fn test_room_scenario_recovers_quarter_turn() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let map = room();

    let map_t_sensor = DMat4::from_translation(DVec3::new(2.0, 0.0, 0.0)) * DMat4::from_rotation_z(FRAC_PI_2);
    let scan = transform_cloud(&map, &map_t_sensor.inverse());

    let ready = ReadySnapshot {
        map: Arc::new(map),
        map_generation: 1,
        fix: DVec3::new(2.0, 0.0, 0.0),
    };

    let mut localizer = Localizer::new(&scenario_config(&dir), IcpAligner)?;
    let report = localizer.process_scan(&ready, &stamped(0, scan.clone()))?;

    let best = report.coarse_search.expect("first scan runs the coarse search");
    let seed_yaw = euler_zyx(&best.transform).yaw;
    assert!((seed_yaw - FRAC_PI_2).abs() < 0.2, "seed yaw {seed_yaw}");

    let yaw = euler_zyx(&report.map_t_sensor).yaw;
    let translation = report.map_t_sensor.w_axis.truncate();
    assert!((yaw - FRAC_PI_2).abs() < 0.02, "yaw {yaw}");
    assert!(translation.abs_diff_eq(DVec3::new(2.0, 0.0, 0.0), 0.05), "translation {translation}");
    assert!(report.converged);

    // the warm-started cycle stays on the solution
    let second = localizer.process_scan(&ready, &stamped(1, scan))?;
    assert!(second.coarse_search.is_none());
    assert!(second.map_t_sensor.abs_diff_eq(report.map_t_sensor, 1e-3));
    Ok(())
}

/// Aligner placing every scan at the same pose.
struct FixedPose(DMat4);

impl Aligner for FixedPose {
    fn align(
        &self,
        _source: &PointCloud,
        _target: &RegistrationTarget,
        _guess: &DMat4,
        _params: &AlignParams,
    ) -> Result<Alignment, LocalizationError> {
        Ok(Alignment {
            transform: self.0,
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
fn test_logged_vehicle_pose_is_on_the_ground() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let mut config = scenario_config(&dir);
    config.calibration.translation = vec![0.0, 0.0, 1.5];
    config.calibration.rotation = vec![0.0, 0.0, 0.0, 1.0];

    let sensor_pose = DMat4::from_translation(DVec3::new(10.0, 5.0, 0.0));
    let mut localizer = Localizer::new(&config, FixedPose(sensor_pose))?;
    let ready = ReadySnapshot {
        map: Arc::new(PointCloud::from_points(vec![[0.0; 3]])),
        map_generation: 1,
        fix: DVec3::new(10.0, 5.0, 0.0),
    };

    let report = localizer.process_scan(&ready, &stamped(0, PointCloud::from_points(vec![[1.0, 0.0, 0.0]])))?;
    assert_eq!(report.map_t_vehicle.w_axis.z, -1.5);
    assert_eq!((report.record.x, report.record.y, report.record.z), (10.0, 5.0, 0.0));
    localizer.finish()?;

    let mut reader = csv::Reader::from_path(dir.path().join("result.csv"))?;
    assert_eq!(
        reader.headers()?.iter().collect::<Vec<_>>(),
        vec!["id", "x", "y", "z", "yaw", "pitch", "roll"]
    );
    let rows = reader.records().collect::<Result<Vec<_>, _>>()?;
    assert_eq!(rows.len(), 1);
    assert_eq!(&rows[0][0], "1");
    assert_eq!(rows[0][1].parse::<f64>()?, 10.0);
    assert_eq!(rows[0][2].parse::<f64>()?, 5.0);
    assert_eq!(rows[0][3].parse::<f64>()?, 0.0);
    Ok(())
}
