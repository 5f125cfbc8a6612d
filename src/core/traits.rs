//! Core scalar traits for feti.

use num_complex::Complex;
use num_traits::{Float, FromPrimitive, One, ToPrimitive, Zero};
use std::fmt::Debug;
use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

/// Field scalar carried by primal and dual vectors (real or complex).
///
/// Partition-of-unity weights and inner products live in the associated
/// [`Scalar::Real`] type.
pub trait Scalar:
    Copy
    + Debug
    + PartialEq
    + Send
    + Sync
    + 'static
    + Zero
    + One
    + Neg<Output = Self>
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
{
    /// Underlying real type.
    type Real: Float + FromPrimitive + ToPrimitive + Debug + Send + Sync + 'static;

    /// Embed a real number.
    fn from_real(r: Self::Real) -> Self;
    /// Real part.
    fn re(self) -> Self::Real;
    /// Complex conjugate (identity for real types).
    fn conj(self) -> Self;
    /// Multiply by a real factor.
    fn scale(self, r: Self::Real) -> Self;
    /// Squared modulus.
    fn abs2(self) -> Self::Real;
}

macro_rules! impl_real_scalar {
    ($($t:ty),*) => {$(
        impl Scalar for $t {
            type Real = $t;
            #[inline]
            fn from_real(r: $t) -> Self { r }
            #[inline]
            fn re(self) -> $t { self }
            #[inline]
            fn conj(self) -> Self { self }
            #[inline]
            fn scale(self, r: $t) -> Self { self * r }
            #[inline]
            fn abs2(self) -> $t { self * self }
        }
    )*};
}

macro_rules! impl_complex_scalar {
    ($($t:ty),*) => {$(
        impl Scalar for Complex<$t> {
            type Real = $t;
            #[inline]
            fn from_real(r: $t) -> Self { Complex::new(r, 0.0) }
            #[inline]
            fn re(self) -> $t { self.re }
            #[inline]
            fn conj(self) -> Self { Complex::conj(&self) }
            #[inline]
            fn scale(self, r: $t) -> Self { Complex::new(self.re * r, self.im * r) }
            #[inline]
            fn abs2(self) -> $t { self.norm_sqr() }
        }
    )*};
}

impl_real_scalar!(f32, f64);
impl_complex_scalar!(f32, f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complex_helpers() {
        let z = Complex::new(3.0f64, -4.0);
        assert_eq!(z.abs2(), 25.0);
        assert_eq!(Scalar::conj(z), Complex::new(3.0, 4.0));
        assert_eq!(z.scale(0.5), Complex::new(1.5, -2.0));
        assert_eq!(<Complex<f64> as Scalar>::from_real(2.0), Complex::new(2.0, 0.0));
    }

    #[test]
    fn real_helpers() {
        assert_eq!(Scalar::conj(-2.0f32), -2.0);
        assert_eq!((-2.0f64).scale(0.25), -0.5);
        assert_eq!(3.0f64.re(), 3.0);
    }
}
