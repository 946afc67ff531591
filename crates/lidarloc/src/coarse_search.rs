use std::f64::consts::TAU;

use glam::{DMat4, DVec3};
use lidarloc_3d::pointcloud::PointCloud;

use crate::{
    config::CoarseSearchConfig,
    error::LocalizationError,
    frames::candidate_transform,
    registration::{AlignParams, Aligner, RegistrationTarget},
};

/// Sampled headings `0, step, 2 * step, ...` strictly below a full turn.
pub fn headings(step: f64) -> impl Iterator<Item = f64> {
    (0u32..)
        .map(move |i| i as f64 * step)
        .take_while(|heading| *heading < TAU)
}

/// One evaluated heading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadingCandidate {
    /// Heading of the initial guess, radians.
    pub heading: f64,
    /// Refined `map_t_sensor` of the attempt.
    pub transform: DMat4,
    /// Fitness score of the refined transform, lower is better.
    pub score: f64,
    /// Whether the attempt converged.
    pub converged: bool,
}

/// Outcome of the heading sweep.
#[derive(Debug, Clone)]
pub struct CoarseSearchResult {
    /// The minimum score candidate, the first one on ties.
    pub best: HeadingCandidate,
    /// Every candidate in sweep order.
    pub candidates: Vec<HeadingCandidate>,
}

/// Exhaustive heading sweep around a position fix.
#[derive(Debug, Clone)]
pub struct CoarseSearch {
    yaw_step: f64,
    params: AlignParams,
    score_max_range: f64,
}

impl CoarseSearch {
    /// Create the search from its configuration.
    pub fn new(config: &CoarseSearchConfig) -> Self {
        Self {
            yaw_step: config.yaw_step,
            params: config.align_params(),
            score_max_range: config.score_max_range,
        }
    }

    /// Heading increment in radians.
    pub fn yaw_step(&self) -> f64 {
        self.yaw_step
    }

    /// Align `scan` from every sampled heading at `fix` and keep the lowest score.
    pub fn run(
        &self,
        aligner: &dyn Aligner,
        scan: &PointCloud,
        target: &RegistrationTarget,
        fix: DVec3,
    ) -> Result<CoarseSearchResult, LocalizationError> {
        let mut candidates = Vec::new();
        let mut best: Option<HeadingCandidate> = None;

        for heading in headings(self.yaw_step) {
            let guess = candidate_transform(fix, heading);
            let alignment = aligner.align(scan, target, &guess, &self.params)?;
            let score =
                aligner.fitness_score(scan, target, &alignment.transform, self.score_max_range);

            let candidate = HeadingCandidate {
                heading,
                transform: alignment.transform,
                score,
                converged: alignment.converged,
            };
            log::debug!("heading {heading:.2}: score {score}");

            if best.map_or(true, |b| candidate.score < b.score) {
                log::info!("Update best pose: [{score}] at heading {heading:.2}");
                best = Some(candidate);
            }
            candidates.push(candidate);
        }

        // a positive finite step always yields at least the zero heading
        let best = best.ok_or(LocalizationError::NotInitialized)?;
        Ok(CoarseSearchResult { best, candidates })
    }
}
