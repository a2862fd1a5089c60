//! Small numeric helpers shared by the engine and its test suites, grounded on
//! `gr6j-core::utils`'s `assert_approx_array_eq`/series helpers.

use float_cmp::{approx_eq, F64Margin};

/// Compare two arrays of f64 element-wise within a tolerance, used across the
/// solver/scenario test suites instead of exact equality on floats.
pub fn assert_approx_array_eq(calculated: &[f64], expected: &[f64]) {
    assert_eq!(calculated.len(), expected.len(), "arrays have different lengths");
    let margins = F64Margin { epsilon: 1e-6, ulps: 4 };
    for (i, (&a, &b)) in calculated.iter().zip(expected).enumerate() {
        if !approx_eq!(f64, a, b, margins) {
            panic!(
                r#"assertion failed on item #{i}
                    actual:   {a:?}
                    expected: {b:?}"#
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assert_approx_array_eq_tolerates_epsilon() {
        assert_approx_array_eq(&[1.0000001, 2.0], &[1.0, 2.0]);
    }

    #[test]
    #[should_panic]
    fn assert_approx_array_eq_rejects_mismatch() {
        assert_approx_array_eq(&[1.5], &[1.0]);
    }
}
