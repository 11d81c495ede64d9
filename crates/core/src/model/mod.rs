mod builder;
mod design;
mod fit;

pub use builder::{AnalysisConfig, WelchJamesBuilder, WelchJamesModel, DEFAULT_TRIM_FRACTION};
pub use design::{design_matrix, group_indicator, GroupLayout};
pub use fit::{Fit, TestDesign};
