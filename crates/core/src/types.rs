/// Number of slots in the fixed-layout results vector
/// (see [`crate::analysis::WelchJamesResult::results`]).
pub const RESULTS_LEN: usize = 8;
