use std::fs::File;

use glam::DMat4;
use lidarloc_3d::{linalg::transform_cloud, voxel_grid::VoxelGrid};

use crate::{
    calibration::Calibration,
    coarse_search::{CoarseSearch, HeadingCandidate},
    config::LocalizerConfig,
    error::LocalizationError,
    frames::{euler_zyx, vehicle_pose, EulerAngles},
    messages::{FrameBroadcast, PoseMessage, StampedCloud},
    readiness::ReadySnapshot,
    registration::{Aligner, RegistrationTarget},
    tracking::{InitializationState, Tracker},
    trajectory::{TrajectoryRecord, TrajectoryWriter},
};

/// Identifiers of the map and sensor frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameIds {
    /// Frame of the reference map and of the published poses.
    pub map: String,
    /// Frame of the range sensor.
    pub lidar: String,
}

/// Messages produced by one scan cycle.
#[derive(Debug, Clone)]
pub struct CycleOutputs {
    /// The raw scan moved into the map frame.
    pub aligned_scan: StampedCloud,
    /// `lidar_t_map`, parent sensor frame, child map frame.
    pub frame: FrameBroadcast,
    /// Sensor pose in the map frame.
    pub pose: PoseMessage,
}

/// Everything one scan cycle computed.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Sequence id of the trajectory row.
    pub sequence_id: u64,
    /// Registration result, the next warm-start seed.
    pub map_t_sensor: DMat4,
    /// Vehicle pose derived through the calibration.
    pub map_t_vehicle: DMat4,
    /// Orientation of the vehicle.
    pub vehicle_angles: EulerAngles,
    /// Whether the tracking alignment converged.
    pub converged: bool,
    /// Mean squared correspondence distance of the tracking alignment.
    pub fitness: f64,
    /// Winning heading when this cycle ran the coarse search.
    pub coarse_search: Option<HeadingCandidate>,
    /// The logged row.
    pub record: TrajectoryRecord,
    /// Messages to publish.
    pub outputs: CycleOutputs,
}

struct MapCache {
    generation: u64,
    target: RegistrationTarget,
}

/// The localization pipeline state.
///
/// Owns the calibration, the filters, the initialization state with its warm-start seed,
/// the trajectory log with its sequence counter and the downsampled map. Scan cycles are
/// run one at a time through [`Localizer::process_scan`].
pub struct Localizer<A: Aligner> {
    calibration: Calibration,
    frames: FrameIds,
    scan_filter: VoxelGrid,
    map_filter: VoxelGrid,
    aligner: A,
    coarse_search: CoarseSearch,
    tracker: Tracker,
    state: InitializationState,
    trajectory: TrajectoryWriter<File>,
    map: Option<MapCache>,
}

impl<A: Aligner> Localizer<A> {
    /// Validate `config` and open the trajectory log.
    ///
    /// # Errors
    ///
    /// Fails on an invalid configuration or calibration, in which case the localizer must
    /// not start, or when the log cannot be created.
    pub fn new(config: &LocalizerConfig, aligner: A) -> Result<Self, LocalizationError> {
        config.validate()?;
        let calibration = Calibration::try_from(&config.calibration)?;
        let trajectory = TrajectoryWriter::create(&config.result_save_path)?;
        log::info!(
            "localizer initialized, logging to {}",
            config.result_save_path.display()
        );

        Ok(Self {
            calibration,
            frames: FrameIds {
                map: config.map_frame.clone(),
                lidar: config.lidar_frame.clone(),
            },
            scan_filter: VoxelGrid::with_cubic_leaf(config.scan_leaf_size)?,
            map_filter: VoxelGrid::with_cubic_leaf(config.map_leaf_size)?,
            aligner,
            coarse_search: CoarseSearch::new(&config.coarse_search),
            tracker: Tracker::new(&config.tracking),
            state: InitializationState::Pending,
            trajectory,
            map: None,
        })
    }

    /// The configured frame identifiers.
    pub fn frames(&self) -> &FrameIds {
        &self.frames
    }

    /// The current initialization state.
    pub fn state(&self) -> &InitializationState {
        &self.state
    }

    /// The validated calibration.
    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    fn refresh_map(&mut self, ready: &ReadySnapshot) -> Result<(), LocalizationError> {
        let stale = self
            .map
            .as_ref()
            .map_or(true, |cache| cache.generation != ready.map_generation);
        if stale {
            let filtered = self.map_filter.downsample(&ready.map);
            if filtered.is_empty() {
                return Err(LocalizationError::EmptyMap);
            }
            log::info!(
                "map generation {}: {} points, {} after downsampling",
                ready.map_generation,
                ready.map.len(),
                filtered.len()
            );
            self.map = Some(MapCache {
                generation: ready.map_generation,
                target: RegistrationTarget::new(&filtered)?,
            });
        }
        Ok(())
    }

    /// Run one scan cycle.
    ///
    /// The first successful cycle runs the coarse heading search at the fix before the
    /// tracking alignment. A failed cycle consumes no sequence id and leaves the state as
    /// it was.
    pub fn process_scan(
        &mut self,
        ready: &ReadySnapshot,
        scan: &StampedCloud,
    ) -> Result<CycleReport, LocalizationError> {
        let filtered_scan = self.scan_filter.downsample(&scan.cloud);
        if filtered_scan.is_empty() {
            return Err(LocalizationError::EmptyScan);
        }
        log::debug!(
            "scan {}: {} points, {} after downsampling",
            scan.stamp,
            scan.cloud.len(),
            filtered_scan.len()
        );

        self.refresh_map(ready)?;
        let Some(cache) = &self.map else {
            return Err(LocalizationError::EmptyMap);
        };
        let target = &cache.target;

        let mut state = self.state;
        let coarse_search = match state {
            InitializationState::Pending => {
                let result = self
                    .coarse_search
                    .run(&self.aligner, &filtered_scan, target, ready.fix)?;
                log::info!(
                    "coarse search done, best yaw {:.2} with score {}",
                    result.best.heading,
                    result.best.score
                );
                state.initialize(result.best.transform);
                Some(result.best)
            }
            InitializationState::Tracking { .. } => None,
        };

        let alignment = self
            .tracker
            .step(&self.aligner, &mut state, &filtered_scan, target)?;
        let map_t_sensor = alignment.transform;
        let map_t_vehicle = vehicle_pose(&map_t_sensor, &self.calibration);

        let record = self.trajectory.append(&map_t_vehicle)?;
        self.state = state;

        let outputs = self.outputs(scan, &map_t_sensor);
        Ok(CycleReport {
            sequence_id: record.id,
            map_t_sensor,
            map_t_vehicle,
            vehicle_angles: euler_zyx(&map_t_vehicle),
            converged: alignment.converged,
            fitness: alignment.fitness,
            coarse_search,
            record,
            outputs,
        })
    }

    fn outputs(&self, scan: &StampedCloud, map_t_sensor: &DMat4) -> CycleOutputs {
        CycleOutputs {
            aligned_scan: StampedCloud {
                stamp: scan.stamp,
                frame_id: self.frames.map.clone(),
                cloud: transform_cloud(&scan.cloud, map_t_sensor),
            },
            frame: FrameBroadcast {
                stamp: scan.stamp,
                parent_frame: self.frames.lidar.clone(),
                child_frame: self.frames.map.clone(),
                transform: map_t_sensor.inverse(),
            },
            pose: PoseMessage::from_transform(scan.stamp, self.frames.map.clone(), map_t_sensor),
        }
    }

    /// Flush the trajectory log.
    pub fn finish(&mut self) -> Result<(), LocalizationError> {
        self.trajectory.flush()?;
        Ok(())
    }
}
