//! Change-detection policies.
//!
//! Signals and computeds decide differently whether a new value is a change:
//!
//! - [`strict_eq`] guards signal writes. An equal write is a no-op.
//! - [`loose_eq`] guards computed re-evaluations. An equal result does not
//!   propagate.
//!
//! For ordinary Rust values both are `PartialEq`. They stay two policies
//! because dynamically typed values (see the Python bindings) compare
//! differently under each, and every constructor can swap the policy with
//! `with_equality`.

/// Equality policy: returns `true` when `new` counts as unchanged from `old`.
pub type EqualityFn<T> = fn(old: &T, new: &T) -> bool;

/// Policy used by signal writes.
pub fn strict_eq<T: PartialEq>(old: &T, new: &T) -> bool {
    old == new
}

/// Policy used by computed re-evaluations.
pub fn loose_eq<T: PartialEq>(old: &T, new: &T) -> bool {
    old == new
}

/// Policy that treats every value as a change.
pub fn never_eq<T>(_old: &T, _new: &T) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_is_never_equal() {
        assert!(!strict_eq(&f64::NAN, &f64::NAN));
        assert!(!loose_eq(&f64::NAN, &f64::NAN));
    }

    #[test]
    fn never_eq_ignores_values() {
        assert!(!never_eq(&1, &1));
        assert!(strict_eq(&"a", &"a"));
    }
}
