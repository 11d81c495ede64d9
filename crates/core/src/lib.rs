//! Robust Welch-James / ADF tests for between x within contrasts, with
//! trimmed means, winsorized covariances and bootstrap inference.

pub mod analysis;
pub mod data;
pub mod error;
pub mod estimate;
pub mod inference;
pub mod matrix;
pub mod model;
pub mod resample;
pub mod types;

pub use analysis::{BootstrapSummary, WelchJamesResult};
pub use error::{Result, WjglmError};
pub use estimate::Trimming;
pub use inference::{BootstrapConfig, DegeneratePolicy, EffectSizeConfig, PValueMethod, Standardizer};
pub use model::{AnalysisConfig, WelchJamesBuilder, WelchJamesModel};
pub use resample::RandomStream;
