#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

mod icp;
pub use icp::*;

mod ops;
pub use ops::{compute_centroids, fit_transformation};
