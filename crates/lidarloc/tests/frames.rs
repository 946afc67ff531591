use approx::assert_relative_eq;
use glam::{DMat4, DQuat, DVec3, EulerRot};
use lidarloc::{
    calibration::Calibration,
    frames::{euler_zyx, vehicle_pose},
};

#[test]
fn test_vehicle_pose_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let mount = DQuat::from_euler(EulerRot::ZYX, 0.05, -0.02, 0.01);
    let calibration = Calibration::from_parts(&[0.94, 0.0, 1.84], &mount.to_array())?;

    for k in 0..8 {
        let t = k as f64;
        let map_t_sensor = DMat4::from_rotation_translation(
            DQuat::from_euler(EulerRot::ZYX, 0.8 * t - 3.0, 0.01 * t, -0.02 * t),
            DVec3::new(100.0 + 3.0 * t, -50.0 + t * t, 0.5 * t),
        );

        let map_t_vehicle = vehicle_pose(&map_t_sensor, &calibration);
        let reconstructed = map_t_vehicle * calibration.vehicle_t_sensor();
        assert!(reconstructed.abs_diff_eq(map_t_sensor, 1e-9));
    }
    Ok(())
}

#[test]
fn test_identity_calibration_keeps_pose() {
    let map_t_sensor = DMat4::from_rotation_translation(
        DQuat::from_rotation_z(1.2),
        DVec3::new(10.0, 5.0, 0.0),
    );
    let map_t_vehicle = vehicle_pose(&map_t_sensor, &Calibration::identity());
    assert!(map_t_vehicle.abs_diff_eq(map_t_sensor, 1e-12));
    assert_relative_eq!(euler_zyx(&map_t_vehicle).yaw, 1.2, epsilon = 1e-12);
}
