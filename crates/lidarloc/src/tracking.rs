use glam::DMat4;
use lidarloc_3d::pointcloud::PointCloud;

use crate::{
    config::TrackingConfig,
    error::LocalizationError,
    registration::{AlignParams, Aligner, Alignment, RegistrationTarget},
};

/// Whether the heading sweep has produced a seed yet.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum InitializationState {
    /// No scan has been registered yet.
    #[default]
    Pending,
    /// Registration is warm-started from the last estimate.
    Tracking {
        /// `map_t_sensor` of the previous cycle.
        seed: DMat4,
    },
}

impl InitializationState {
    /// Whether the coarse search has completed.
    pub fn is_initialized(&self) -> bool {
        matches!(self, Self::Tracking { .. })
    }

    /// The warm-start seed, if initialized.
    pub fn seed(&self) -> Option<DMat4> {
        match self {
            Self::Pending => None,
            Self::Tracking { seed } => Some(*seed),
        }
    }

    /// Leave the pending state with `seed`.
    ///
    /// Returns false, leaving the state untouched, when already initialized.
    pub fn initialize(&mut self, seed: DMat4) -> bool {
        match self {
            Self::Pending => {
                *self = Self::Tracking { seed };
                true
            }
            Self::Tracking { .. } => false,
        }
    }
}

/// Per-scan registration warm-started from the previous estimate.
#[derive(Debug, Clone)]
pub struct Tracker {
    params: AlignParams,
}

impl Tracker {
    /// Create the tracker from its configuration.
    pub fn new(config: &TrackingConfig) -> Self {
        Self {
            params: config.align_params(),
        }
    }

    /// Align `scan` from the current seed and move the seed to the result.
    ///
    /// A non converged alignment is still accepted as a best effort estimate.
    pub fn step(
        &self,
        aligner: &dyn Aligner,
        state: &mut InitializationState,
        scan: &PointCloud,
        target: &RegistrationTarget,
    ) -> Result<Alignment, LocalizationError> {
        let InitializationState::Tracking { seed } = state else {
            return Err(LocalizationError::NotInitialized);
        };

        let alignment = aligner.align(scan, target, seed, &self.params)?;
        if alignment.converged {
            log::debug!(
                "Converge after {} iterations, fitness {}",
                alignment.iterations,
                alignment.fitness
            );
        } else {
            log::warn!(
                "No Converge after {} iterations, fitness {}",
                alignment.iterations,
                alignment.fitness
            );
        }

        *seed = alignment.transform;
        Ok(alignment)
    }
}
