pub mod io;
pub mod missing;

pub use io::ObservationTable;
pub use missing::{count_missing, drop_missing, is_missing, FilteredObservations};
