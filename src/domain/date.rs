// ============================================================
// Layer 3 — Date Domain Type
// ============================================================
// A calendar date mentioned in a passage, as produced by the
// preprocessing step. Any component may be missing; a missing
// component is stored as -1 (the "not found" sentinel).
//
// Comparison rules:
//   - Components are compared in order year → month → day
//   - A component only decides the order if it is known on
//     both sides and the values differ
//   - If nothing decides, the two dates are NOT comparable and
//     neither `is_before` nor `is_after` holds
//
// Example:
//   Date(-1, 5, 1999) vs Date(3, 2, 2001)  → before (years decide)
//   Date(-1, -1, 1999) vs Date(4, 7, 1999) → not comparable
//
// Reference: Rust Book §5 (Structs), §6 (Enums and Option)

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Sentinel used for an unknown date component or an unknown number.
pub const NOT_FOUND: i32 = -1;

/// Sentinel for passage numbers that could not be parsed.
pub const NUMBER_NOT_FOUND: f64 = -1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Date {
    pub day:   i32,
    pub month: i32,
    pub year:  i32,
}

impl Date {
    pub fn new(day: i32, month: i32, year: i32) -> Self {
        Self { day, month, year }
    }

    pub fn has_year(&self) -> bool {
        self.year != NOT_FOUND
    }

    /// Order two dates if some shared known component decides it.
    /// Returns `Some(Equal)` only when every component is known and equal.
    pub fn compare(&self, other: &Date) -> Option<Ordering> {
        let pairs = [
            (self.year, other.year),
            (self.month, other.month),
            (self.day, other.day),
        ];

        let mut all_known_equal = true;
        for (a, b) in pairs {
            if a == NOT_FOUND || b == NOT_FOUND {
                all_known_equal = false;
                continue;
            }
            match a.cmp(&b) {
                Ordering::Equal => {}
                decided => return Some(decided),
            }
        }

        if all_known_equal { Some(Ordering::Equal) } else { None }
    }

    pub fn is_before(&self, other: &Date) -> bool {
        self.compare(other) == Some(Ordering::Less)
    }

    pub fn is_after(&self, other: &Date) -> bool {
        self.compare(other) == Some(Ordering::Greater)
    }

    /// Absolute gap in years, if both years are known.
    pub fn year_difference(&self, other: &Date) -> Option<i64> {
        if !self.has_year() || !other.has_year() {
            return None;
        }
        Some((i64::from(self.year) - i64::from(other.year)).abs())
    }
}

/// True if a passage number value is usable in a comparison.
pub fn is_known_number(value: f64) -> bool {
    value.is_finite() && value != NUMBER_NOT_FOUND
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_years_decide_order() {
        let a = Date::new(-1, 5, 1999);
        let b = Date::new(3, 2, 2001);
        assert!(a.is_before(&b));
        assert!(b.is_after(&a));
    }

    #[test]
    fn test_month_decides_when_year_equal() {
        let a = Date::new(1, 3, 2000);
        let b = Date::new(1, 7, 2000);
        assert!(a.is_before(&b));
    }

    #[test]
    fn test_unknown_never_compares() {
        let unknown = Date::new(-1, -1, -1);
        let known   = Date::new(4, 7, 1999);
        assert!(!unknown.is_before(&known));
        assert!(!unknown.is_after(&known));
        assert_eq!(unknown.compare(&known), None);
    }

    #[test]
    fn test_partial_dates_without_deciding_component() {
        let a = Date::new(-1, -1, 1999);
        let b = Date::new(4, 7, 1999);
        assert_eq!(a.compare(&b), None);
    }

    #[test]
    fn test_year_difference() {
        let a = Date::new(-1, -1, 1990);
        let b = Date::new(2, 2, 1995);
        assert_eq!(a.year_difference(&b), Some(5));
        assert_eq!(a.year_difference(&Date::new(-1, -1, -1)), None);
    }

    #[test]
    fn test_number_sentinel() {
        assert!(is_known_number(3.5));
        assert!(!is_known_number(NUMBER_NOT_FOUND));
        assert!(!is_known_number(f64::NAN));
    }
}
