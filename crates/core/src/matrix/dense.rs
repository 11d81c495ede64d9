use nalgebra::DMatrix;

/// Singular values at or below `PINV_TOLERANCE * max(rows, cols) * sigma_max`
/// are treated as zero by [`pseudo_inverse`].
pub const PINV_TOLERANCE: f64 = 1.0e-6;

/// Sweep limit handed to the SVD so a pathological input cannot spin forever.
const SVD_MAX_ITERATIONS: usize = 10_000;

/// Moore-Penrose pseudo-inverse via a thin SVD.
///
/// Used everywhere an inverse would normally appear: rank-deficient or
/// near-singular inputs degrade to a least-squares solution instead of
/// failing. Inputs with non-finite entries (and the rare SVD that does not
/// converge) yield an all-NaN matrix of the transposed shape so the NaN
/// reaches the caller's results.
pub fn pseudo_inverse(a: &DMatrix<f64>) -> DMatrix<f64> {
    let (nrows, ncols) = a.shape();
    if nrows == 0 || ncols == 0 {
        return DMatrix::zeros(ncols, nrows);
    }
    if a.iter().any(|v| !v.is_finite()) {
        return DMatrix::from_element(ncols, nrows, f64::NAN);
    }

    let svd = match a
        .clone()
        .try_svd(true, true, f64::EPSILON, SVD_MAX_ITERATIONS)
    {
        Some(svd) => svd,
        None => {
            log::debug!("pseudo_inverse: SVD did not converge on a {}x{} matrix", nrows, ncols);
            return DMatrix::from_element(ncols, nrows, f64::NAN);
        }
    };

    let (u, v_t) = match (svd.u.as_ref(), svd.v_t.as_ref()) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => return DMatrix::from_element(ncols, nrows, f64::NAN),
    };

    let sigma_max = svd
        .singular_values
        .iter()
        .fold(0.0_f64, |acc, s| acc.max(s.abs()));
    let tolerance = PINV_TOLERANCE * nrows.max(ncols) as f64 * sigma_max;

    let inv_sigma = svd
        .singular_values
        .map(|s| if s.abs() > tolerance { 1.0 / s } else { 0.0 });

    v_t.transpose() * DMatrix::from_diagonal(&inv_sigma) * u.transpose()
}

/// Combined contrast `R = C ⊗ Uᵗ`.
///
/// `c` is (between contrasts x groups), `u` is (conditions x within
/// contrasts); the result has one row per simultaneous constraint and one
/// column per group x condition cell, group-major.
pub fn contrast_matrix(c: &DMatrix<f64>, u: &DMatrix<f64>) -> DMatrix<f64> {
    c.kronecker(&u.transpose())
}

/// Whether `a` is square and symmetric to within `tol` (absolute).
pub fn is_symmetric(a: &DMatrix<f64>, tol: f64) -> bool {
    if a.nrows() != a.ncols() {
        return false;
    }
    let n = a.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            if (a[(i, j)] - a[(j, i)]).abs() > tol {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pseudo_inverse_matches_inverse() {
        let a = DMatrix::from_row_slice(2, 2, &[4.0, 2.0, 2.0, 3.0]);
        let a_pinv = pseudo_inverse(&a);
        let product = &a * &a_pinv;
        for i in 0..2 {
            for j in 0..2 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(product[(i, j)], expected, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_pseudo_inverse_rank_deficient() {
        // Rank one: second row is twice the first
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        let a_pinv = pseudo_inverse(&a);
        let reconstructed = &a * &a_pinv * &a;
        for (x, y) in reconstructed.iter().zip(a.iter()) {
            assert_relative_eq!(*x, *y, epsilon = 1e-10);
        }
        // pinv of [[1,2],[2,4]] is A / 25
        assert_relative_eq!(a_pinv[(0, 0)], 1.0 / 25.0, epsilon = 1e-12);
        assert_relative_eq!(a_pinv[(1, 1)], 4.0 / 25.0, epsilon = 1e-12);
    }

    #[test]
    fn test_pseudo_inverse_rectangular_shape() {
        let a = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
        let a_pinv = pseudo_inverse(&a);
        assert_eq!(a_pinv.shape(), (2, 3));
        assert_relative_eq!(a_pinv[(0, 0)], 1.0, epsilon = 1e-12);
        assert_relative_eq!(a_pinv[(1, 1)], 1.0, epsilon = 1e-12);
        assert_relative_eq!(a_pinv[(0, 2)], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_pseudo_inverse_zero_matrix() {
        let a = DMatrix::<f64>::zeros(3, 3);
        let a_pinv = pseudo_inverse(&a);
        assert!(a_pinv.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_pseudo_inverse_propagates_nan() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, f64::NAN, 0.0, 1.0]);
        let a_pinv = pseudo_inverse(&a);
        assert!(a_pinv.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_contrast_matrix_kronecker() {
        let c = DMatrix::from_row_slice(1, 2, &[1.0, -1.0]);
        let u = DMatrix::from_row_slice(3, 1, &[1.0, 0.0, -1.0]);
        let r = contrast_matrix(&c, &u);
        assert_eq!(r.shape(), (1, 6));
        let expected = [1.0, 0.0, -1.0, -1.0, 0.0, 1.0];
        for (k, &e) in expected.iter().enumerate() {
            assert_relative_eq!(r[(0, k)], e);
        }
    }

    #[test]
    fn test_is_symmetric() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        let b = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.1, 1.0]);
        assert!(is_symmetric(&a, 1e-12));
        assert!(!is_symmetric(&b, 1e-12));
        assert!(!is_symmetric(&DMatrix::zeros(2, 3), 1e-12));
    }
}
