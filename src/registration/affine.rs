//! Least-squares affine fit from control-point pairs.
//!
//! The normal equations of `x₂ ≈ a·x₁ + b·y₁ + c` (and likewise for y₂) are
//! accumulated directly into two 3x4 augmented matrices and solved by
//! Gaussian elimination with partial pivoting.

use super::ControlPoint;
use super::error::RegistrationError;

/// Pivot magnitudes below this make the system singular for our purposes.
const PIVOT_EPSILON: f64 = 1e-9;

/// Solve for `[a, b, c, d, e, f]` mapping visible to base coordinates.
pub(crate) fn solve_affine(points: &[ControlPoint]) -> Result<[f64; 6], RegistrationError> {
    let mut abc = [[0.0f64; 4]; 3];
    let mut def = [[0.0f64; 4]; 3];

    for p in points {
        let x1 = p.x_visible as f64;
        let y1 = p.y_visible as f64;
        let x2 = p.x_base as f64;
        let y2 = p.y_base as f64;

        abc[0][0] += x1 * x1;
        abc[0][1] += x1 * y1;
        abc[0][2] += x1;
        abc[0][3] += x1 * x2;
        abc[1][0] += x1 * y1;
        abc[1][1] += y1 * y1;
        abc[1][2] += y1;
        abc[1][3] += y1 * x2;
        abc[2][0] += x1;
        abc[2][1] += y1;
        abc[2][2] += 1.0;
        abc[2][3] += x2;

        def[0][0] += x1 * x1;
        def[0][1] += x1 * y1;
        def[0][2] += x1;
        def[0][3] += x1 * y2;
        def[1][0] += x1 * y1;
        def[1][1] += y1 * y1;
        def[1][2] += y1;
        def[1][3] += y1 * y2;
        def[2][0] += x1;
        def[2][1] += y1;
        def[2][2] += 1.0;
        def[2][3] += y2;
    }

    let [a, b, c] = solve3(&mut abc)?;
    let [d, e, f] = solve3(&mut def)?;
    Ok([a, b, c, d, e, f])
}

/// Solve a 3x3 system in augmented form by Gaussian elimination with
/// partial pivoting.
fn solve3(mat: &mut [[f64; 4]; 3]) -> Result<[f64; 3], RegistrationError> {
    for col in 0..3 {
        let pivot_row = (col..3)
            .max_by(|&a, &b| mat[a][col].abs().total_cmp(&mat[b][col].abs()))
            .unwrap();
        if mat[pivot_row][col].abs() < PIVOT_EPSILON {
            return Err(RegistrationError::DegenerateControlPoints);
        }
        mat.swap(col, pivot_row);

        for row in col + 1..3 {
            let k = mat[row][col] / mat[col][col];
            for c in col..4 {
                mat[row][c] -= k * mat[col][c];
            }
        }
    }

    let mut solution = [0.0f64; 3];
    for row in (0..3).rev() {
        let mut value = mat[row][3];
        for col in row + 1..3 {
            value -= mat[row][col] * solution[col];
        }
        solution[row] = value / mat[row][row];
    }
    Ok(solution)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(x1: i32, y1: i32, x2: i32, y2: i32) -> ControlPoint {
        ControlPoint { x_visible: x1, y_visible: y1, x_base: x2, y_base: y2 }
    }

    fn apply(m: &[f64; 6], x: f64, y: f64) -> (f64, f64) {
        (m[0] * x + m[1] * y + m[2], m[3] * x + m[4] * y + m[5])
    }

    #[test]
    fn test_identity_recovered() {
        let points = [
            pair(0, 0, 0, 0),
            pair(100, 0, 100, 0),
            pair(0, 100, 0, 100),
            pair(100, 100, 100, 100),
            pair(50, 25, 50, 25),
            pair(25, 75, 25, 75),
        ];
        let m = solve_affine(&points).unwrap();
        let expected = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        for (got, want) in m.iter().zip(expected) {
            assert!((got - want).abs() < 1e-3, "got {m:?}");
        }
    }

    #[test]
    fn test_exact_affine_recovered() {
        // (a, b, c, d, e, f) = (0.5, 0.1, 12, -0.2, 0.4, 7)
        let truth = [0.5, 0.1, 12.0, -0.2, 0.4, 7.0];
        let inputs = [(0, 0), (200, 0), (0, 150), (200, 150), (60, 90), (130, 40)];
        let points: Vec<ControlPoint> = inputs
            .iter()
            .map(|&(x, y)| {
                let (bx, by) = apply(&truth, x as f64, y as f64);
                pair(x, y, bx.round() as i32, by.round() as i32)
            })
            .collect();

        let m = solve_affine(&points).unwrap();
        for (got, want) in m.iter().zip(truth) {
            let tolerance = want.abs().max(1.0) * 1e-3;
            assert!((got - want).abs() < tolerance, "got {m:?}");
        }
    }

    #[test]
    fn test_least_squares_over_noisy_overdetermined_set() {
        // Ten points on a pure translation with one pixel of rounding noise.
        let points: Vec<ControlPoint> = (0..10)
            .map(|i| {
                let x = i * 37 % 300;
                let y = i * 91 % 200;
                pair(x, y, x + 15, y - 8)
            })
            .collect();
        let m = solve_affine(&points).unwrap();
        assert!((m[2] - 15.0).abs() < 1e-6);
        assert!((m[5] + 8.0).abs() < 1e-6);
    }

    #[test]
    fn test_collinear_points_rejected() {
        let points = [pair(0, 0, 0, 0), pair(1, 1, 1, 1), pair(2, 2, 2, 2)];
        assert!(matches!(
            solve_affine(&points),
            Err(RegistrationError::DegenerateControlPoints)
        ));
    }
}
