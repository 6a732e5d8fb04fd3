//! Disease-risk zonation from presence / background point data with a
//! hexagonal self-organizing map.
//!
//! Training: presence + pseudo-absence + absence rows are scaled, mapped onto
//! a SOM, and the prototypes are grouped into ordered risk tiers. The frozen
//! [`ZonationModel`] is then applied per epoch to environmental grids.

pub mod cluster;
pub mod error;
pub mod features;
pub mod grid;
pub mod model;
mod parallel;
pub mod pipeline;
pub mod points;
pub mod pseudo_absence;
pub mod quality;
pub mod raster;
pub mod scaler;
pub mod smooth;
pub mod som;
pub mod topology;
pub mod validation;

pub use cluster::{RiskTier, RiskTierClusterer, TierAssignment};
pub use error::{Result, ZonationError};
pub use features::{FeatureMatrix, Schema};
pub use grid::{Band, EnvGrid};
pub use model::{ResponseCurve, ZonationModel};
pub use pipeline::{apply_to_grid, PipelineConfig, TrainingOutcome, ZonationPipeline};
pub use points::{LatLon, PointRecord, PointSet};
pub use pseudo_absence::{sample_background, PseudoAbsenceSampler};
pub use quality::QualityReport;
pub use raster::{RiskGrid, DEFAULT_NODATA};
pub use scaler::ScalingParameters;
pub use smooth::smooth;
pub use som::{Codebook, SomConfig, SomTrainer, TrainedSom};
pub use topology::HexTopology;
pub use validation::{validate, validate_points, ValidationReport};
