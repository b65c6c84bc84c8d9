use crate::geometry::Fp;

/// Square root that treats small negative rounding residue as zero.
#[inline]
pub fn safe_sqrt(x: Fp) -> Fp {
    Fp::max(0.0, x).sqrt()
}

/// Heaviside step: 1 for positive arguments, 0 otherwise.
#[inline]
pub fn chi_plus(x: Fp) -> Fp {
    if x > 0.0 {
        1.0
    } else {
        0.0
    }
}
