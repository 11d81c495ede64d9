//! Group-stratified bootstrap resampling.
//!
//! All randomness flows through an explicit [`RandomStream`]. Simulation `b`
//! draws from its own generator derived from the stream seed and `b`, so a
//! run is reproducible from its seed alone and the simulations can be
//! evaluated in any order or in parallel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::model::GroupLayout;

static CLOCK_STREAMS: AtomicU64 = AtomicU64::new(0);

/// Seeded source of per-simulation random generators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandomStream {
    seed: u64,
}

impl RandomStream {
    /// Stream for `seed`; `None` or `Some(0)` derives the seed from the wall
    /// clock.
    pub fn new(seed: Option<u64>) -> Self {
        match seed {
            Some(s) if s != 0 => Self { seed: s },
            _ => {
                let nanos = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_nanos() as u64)
                    .unwrap_or(1);
                // Streams created within one clock tick still get distinct seeds.
                let seed = mix_seed(nanos, CLOCK_STREAMS.fetch_add(1, Ordering::Relaxed)).max(1);
                log::debug!("random stream seeded from wall clock: {}", seed);
                Self { seed }
            }
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Independent child stream, e.g. one per Monte Carlo loop of a call.
    pub fn substream(&self, id: u64) -> Self {
        Self {
            seed: mix_seed(self.seed, id ^ 0xA076_1D64_78BD_642F),
        }
    }

    /// Generator for simulation `index`.
    pub fn rng_for(&self, index: u64) -> StdRng {
        StdRng::seed_from_u64(mix_seed(self.seed, index))
    }
}

/// Combine a base seed with a counter (splitmix64 finalizer on both halves).
fn mix_seed(seed: u64, index: u64) -> u64 {
    splitmix64(seed ^ splitmix64(index.wrapping_add(0x9E37_79B9_7F4A_7C15)))
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Resample rows with replacement independently within each group.
///
/// Group `i` receives `n_i` rows drawn uniformly from its own rows; group
/// order and sizes are unchanged.
pub fn resample<R: Rng + ?Sized>(y: &DMatrix<f64>, layout: &GroupLayout, rng: &mut R) -> DMatrix<f64> {
    let mut out = DMatrix::zeros(y.nrows(), y.ncols());
    for group in 0..layout.n_groups() {
        let rows = layout.rows(group);
        let n = rows.len();
        for target in rows.clone() {
            let source = rows.start + rng.gen_range(0..n);
            out.row_mut(target).copy_from(&y.row(source));
        }
    }
    out
}

/// Subtract each group's original location estimate from its resampled
/// rows, so the resample satisfies the null hypothesis.
///
/// `bhat` is the (G x W) matrix of cell locations from the full sample.
pub fn recenter(yb: &DMatrix<f64>, bhat: &DMatrix<f64>, layout: &GroupLayout) -> DMatrix<f64> {
    let mut out = yb.clone();
    for group in 0..layout.n_groups() {
        let centre = bhat.row(group);
        for r in layout.rows(group) {
            let mut row = out.row_mut(r);
            row -= &centre;
        }
    }
    out
}

/// Whether some column is constant within some group of `yb`.
///
/// Such a draw has a zero-variance cell.
pub fn is_degenerate(yb: &DMatrix<f64>, layout: &GroupLayout) -> bool {
    (0..layout.n_groups()).any(|group| {
        let rows = layout.rows(group);
        (0..yb.ncols()).any(|col| {
            let first = yb[(rows.start, col)];
            rows.clone().all(|r| yb[(r, col)] == first)
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> (DMatrix<f64>, GroupLayout) {
        let y = DMatrix::from_row_slice(
            6,
            2,
            &[
                1.0, 10.0, //
                2.0, 20.0, //
                3.0, 30.0, //
                101.0, 110.0, //
                102.0, 120.0, //
                103.0, 130.0,
            ],
        );
        (y, GroupLayout::new(&[3, 3]).unwrap())
    }

    #[test]
    fn test_explicit_seed_is_kept() {
        assert_eq!(RandomStream::new(Some(1000)).seed(), 1000);
        // Zero means "derive from the clock", never a literal zero seed
        assert_ne!(RandomStream::new(Some(0)).seed(), 0);
    }

    #[test]
    fn test_clock_seeded_streams_differ() {
        let a = RandomStream::new(None);
        let b = RandomStream::new(None);
        assert_ne!(a.seed(), 0);
        assert_ne!(a.seed(), b.seed());

        let (y, layout) = data();
        let draws = |s: &RandomStream| (0..20).map(|i| resample(&y, &layout, &mut s.rng_for(i))).collect::<Vec<_>>();
        assert_ne!(draws(&a), draws(&b));
    }

    #[test]
    fn test_resample_is_deterministic() {
        let (y, layout) = data();
        let stream = RandomStream::new(Some(42));
        let a = resample(&y, &layout, &mut stream.rng_for(7));
        let b = resample(&y, &layout, &mut stream.rng_for(7));
        assert_eq!(a, b);
    }

    #[test]
    fn test_substreams_differ() {
        let stream = RandomStream::new(Some(42));
        assert_ne!(stream.substream(0).seed(), stream.substream(1).seed());
        assert_ne!(stream.substream(0).seed(), stream.seed());
    }

    #[test]
    fn test_resample_stays_within_group() {
        let (y, layout) = data();
        let stream = RandomStream::new(Some(3));
        for b in 0..50 {
            let yb = resample(&y, &layout, &mut stream.rng_for(b));
            for r in 0..3 {
                assert!(yb[(r, 0)] < 100.0);
                // Rows are copied whole
                assert_eq!(yb[(r, 1)], yb[(r, 0)] * 10.0);
            }
            for r in 3..6 {
                assert!(yb[(r, 0)] > 100.0);
            }
        }
    }

    #[test]
    fn test_recenter_subtracts_group_location() {
        let (y, layout) = data();
        let bhat = DMatrix::from_row_slice(2, 2, &[2.0, 20.0, 102.0, 120.0]);
        let centred = recenter(&y, &bhat, &layout);
        assert_eq!(centred[(0, 0)], -1.0);
        assert_eq!(centred[(2, 1)], 10.0);
        assert_eq!(centred[(4, 0)], 0.0);
        assert_eq!(centred[(5, 1)], 10.0);
    }

    #[test]
    fn test_degenerate_detection() {
        let (y, layout) = data();
        assert!(!is_degenerate(&y, &layout));

        let mut constant = y.clone();
        for r in 3..6 {
            constant[(r, 1)] = 7.0;
        }
        assert!(is_degenerate(&constant, &layout));
    }
}
