use crate::StrError;
use russell_lab::{mat_inverse, mat_svd, Matrix, Vector};
use russell_tensor::{Mandel, Tensor2, Tensor4};

/// Checks whether the Mandel representation is symmetric (3D or 2D)
pub fn symmetric_mandel(mandel: Mandel) -> bool {
    mandel == Mandel::Symmetric || mandel == Mandel::Symmetric2D
}

/// Computes the ratio between the smallest and largest singular values
///
/// Returns zero if the matrix is null or has non-finite components.
pub fn singular_value_ratio(a: &Matrix) -> Result<f64, StrError> {
    let (m, n) = a.dims();
    if m == 0 || n == 0 {
        return Err("matrix must have at least one row and one column");
    }
    if !a.as_data().iter().all(|v| v.is_finite()) {
        return Ok(0.0);
    }
    let min_mn = usize::min(m, n);
    let mut s = Vector::new(min_mn);
    let mut u = Matrix::new(m, m);
    let mut vt = Matrix::new(n, n);
    let mut acopy = a.clone();
    mat_svd(&mut s, &mut u, &mut vt, &mut acopy)?;
    let mut s_min = f64::MAX;
    let mut s_max = 0.0;
    for k in 0..min_mn {
        s_min = f64::min(s_min, s[k]);
        s_max = f64::max(s_max, s[k]);
    }
    if s_max <= 0.0 {
        return Ok(0.0);
    }
    Ok(s_min / s_max)
}

/// Inverts a square matrix unless it is (nearly) singular
///
/// Returns false if the ratio of extreme singular values is below `tol` or if the
/// inverse contains non-finite values; `ai` is then left in an unspecified state.
pub fn checked_inverse(ai: &mut Matrix, a: &Matrix, tol: f64) -> Result<bool, StrError> {
    let (m, n) = a.dims();
    if m != n {
        return Err("matrix must be square");
    }
    if singular_value_ratio(a)? < tol {
        return Ok(false);
    }
    if mat_inverse(ai, a).is_err() {
        return Ok(false);
    }
    Ok(ai.as_data().iter().all(|v| v.is_finite()))
}

/// Computes the compliance tensor as the inverse of the elasticity tensor
pub fn elastic_compliance(cce: &mut Tensor4, dde: &Tensor4, tol: f64) -> Result<(), StrError> {
    if !checked_inverse(cce.matrix_mut(), dde.matrix(), tol)? {
        return Err("elasticity tensor is not invertible");
    }
    Ok(())
}

/// Computes the contribution ½ (value / tolerance)² to a residual metric
#[inline]
pub fn half_squared_scaled(value: f64, tolerance: f64) -> f64 {
    0.5 * f64::powi(value / tolerance, 2)
}

/// Checks whether all components of a Mandel vector are finite
pub fn t2_is_finite(a: &Tensor2) -> bool {
    a.vector().as_data().iter().all(|v| v.is_finite())
}

/// Checks whether all components of a Mandel matrix are finite
pub fn t4_is_finite(a: &Tensor4) -> bool {
    a.matrix().as_data().iter().all(|v| v.is_finite())
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
