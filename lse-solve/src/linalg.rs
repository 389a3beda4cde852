//! A small dense linear solve used by Levenberg-Marquardt's normal
//! equations. Systems here are sized to a handful of unknowns, which
//! doesn't justify pulling in `nalgebra` for a dependency this small.

/// Solves `a * x = b` for `x` via Gaussian elimination with partial
/// pivoting, where `a` is `n x n` given row-major and `b` has length `n`.
///
/// # Errors
///
/// Returns `Err` if `a` is singular (or numerically indistinguishable
/// from singular) to working precision.
pub fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>, &'static str> {
    let n = b.len();
    debug_assert!(a.len() == n && a.iter().all(|row| row.len() == n));

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .expect("non-empty range");

        if a[pivot_row][col].abs() < 1e-300 {
            return Err("singular matrix");
        }

        a.swap(col, pivot_row);
        b.swap(col, pivot_row);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut sum = b[row];
        for k in (row + 1)..n {
            sum -= a[row][k] * x[k];
        }
        x[row] = sum / a[row][row];
    }
    Ok(x)
}
