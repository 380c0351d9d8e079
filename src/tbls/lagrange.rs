//! Scalar-field arithmetic and signature-point interpolation.
//!
//! Share x-coordinates are `index + 1`; interpolation is always at zero,
//! which is the only evaluation point the beacon needs.

use super::TblsError;
use blst::{
    blst_bendian_from_scalar, blst_fr, blst_fr_add, blst_fr_from_scalar, blst_fr_from_uint64,
    blst_fr_inverse, blst_fr_mul, blst_fr_sub, blst_p2, blst_p2_add_or_double, blst_p2_affine,
    blst_p2_compress, blst_p2_from_affine, blst_p2_mult, blst_p2_uncompress, blst_scalar,
    blst_scalar_from_bendian, blst_scalar_from_fr, BLST_ERROR,
};

/// Iterations for scalar multiplication, fixed to the field size.
const SCALAR_BITS: usize = 255;

/// Element of the BLS12-381 scalar field.
#[derive(Clone, Copy, Default)]
pub(crate) struct Fr(blst_fr);

impl Fr {
    pub fn one() -> Self {
        Self::from_u64(1)
    }

    pub fn from_u64(value: u64) -> Self {
        let buffer = [value, 0, 0, 0];
        let mut fr = blst_fr::default();
        unsafe { blst_fr_from_uint64(&mut fr, buffer.as_ptr()) };
        Self(fr)
    }

    /// Decodes a 32-byte big-endian scalar.
    pub fn from_bytes_be(bytes: &[u8; 32]) -> Self {
        let mut scalar = blst_scalar::default();
        let mut fr = blst_fr::default();
        unsafe {
            blst_scalar_from_bendian(&mut scalar, bytes.as_ptr());
            blst_fr_from_scalar(&mut fr, &scalar);
        }
        Self(fr)
    }

    pub fn to_bytes_be(self) -> [u8; 32] {
        let mut scalar = blst_scalar::default();
        let mut bytes = [0u8; 32];
        unsafe {
            blst_scalar_from_fr(&mut scalar, &self.0);
            blst_bendian_from_scalar(bytes.as_mut_ptr(), &scalar);
        }
        bytes
    }

    fn to_scalar(self) -> blst_scalar {
        let mut scalar = blst_scalar::default();
        unsafe { blst_scalar_from_fr(&mut scalar, &self.0) };
        scalar
    }

    pub fn is_zero(&self) -> bool {
        self.to_bytes_be() == [0u8; 32]
    }

    pub fn add(&mut self, rhs: &Self) {
        unsafe { blst_fr_add(&mut self.0, &self.0, &rhs.0) };
    }

    pub fn sub(&mut self, rhs: &Self) {
        unsafe { blst_fr_sub(&mut self.0, &self.0, &rhs.0) };
    }

    pub fn mul(&mut self, rhs: &Self) {
        unsafe { blst_fr_mul(&mut self.0, &self.0, &rhs.0) };
    }

    pub fn inverse(&self) -> Option<Self> {
        if self.is_zero() {
            return None;
        }
        let mut fr = blst_fr::default();
        unsafe { blst_fr_inverse(&mut fr, &self.0) };
        Some(Self(fr))
    }
}

/// Evaluates the polynomial with the given coefficients at `x` (Horner).
pub(crate) fn eval_poly(coeffs: &[Fr], x: u64) -> Fr {
    let x = Fr::from_u64(x);
    let mut acc = Fr::default();
    for coeff in coeffs.iter().rev() {
        acc.mul(&x);
        acc.add(coeff);
    }
    acc
}

/// Lagrange basis coefficients at zero for the x-coordinates `index + 1`.
///
/// Indices must be pairwise distinct.
pub(crate) fn weights_at_zero(indices: &[u32]) -> Result<Vec<Fr>, TblsError> {
    let mut weights = Vec::with_capacity(indices.len());
    for &i in indices {
        let xi = Fr::from_u64(u64::from(i) + 1);
        let mut num = Fr::one();
        let mut den = Fr::one();
        for &j in indices {
            if i == j {
                continue;
            }
            let xj = Fr::from_u64(u64::from(j) + 1);
            num.mul(&xj);
            let mut diff = xj;
            diff.sub(&xi);
            den.mul(&diff);
        }
        let inv = den.inverse().ok_or(TblsError::NonInvertibleDenominator)?;
        num.mul(&inv);
        weights.push(num);
    }
    Ok(weights)
}

/// Sums the signature points scaled by their interpolation weights.
///
/// Each share is a compressed G2 point; the result is the compressed
/// interpolation at zero.
pub(crate) fn interpolate_signatures(
    shares: &[(u32, &[u8])],
    weights: &[Fr],
) -> Result<[u8; 96], TblsError> {
    debug_assert_eq!(shares.len(), weights.len());

    let mut acc: Option<blst_p2> = None;
    for ((index, bytes), weight) in shares.iter().zip(weights) {
        if bytes.len() != 96 {
            return Err(TblsError::InvalidShare(*index));
        }
        let mut affine = blst_p2_affine::default();
        let mut point = blst_p2::default();
        let scalar = weight.to_scalar();
        unsafe {
            if blst_p2_uncompress(&mut affine, bytes.as_ptr()) != BLST_ERROR::BLST_SUCCESS {
                return Err(TblsError::InvalidShare(*index));
            }
            blst_p2_from_affine(&mut point, &affine);
            blst_p2_mult(&mut point, &point, scalar.b.as_ptr(), SCALAR_BITS);
        }
        acc = Some(match acc {
            None => point,
            Some(mut sum) => {
                unsafe { blst_p2_add_or_double(&mut sum, &sum, &point) };
                sum
            }
        });
    }

    let sum = acc.ok_or(TblsError::NotEnoughShares {
        required: 1,
        received: 0,
    })?;
    let mut out = [0u8; 96];
    unsafe { blst_p2_compress(out.as_mut_ptr(), &sum) };
    Ok(out)
}
