mod dispersion;
mod location;

pub use dispersion::{estimate_dispersion, Dispersion};
pub use location::{estimate_location, LocationEstimate, Trimming, MAX_TRIM_FRACTION};
