#![forbid(unsafe_code)]

//! Fractional sibling ordering keys.
//!
//! Siblings within one slot are ordered by a [`FractionalIndex`]: a short
//! base-62 digit string compared lexicographically. Inserting between two
//! existing siblings computes a fresh key strictly between theirs, so no
//! other sibling is ever renumbered.
//!
//! Keys are fractions in `[0, 1)` written without the leading `0.`: the key
//! `"V"` is roughly one half, `"8"` is near the low end. A key never ends
//! in the minimum digit `0`, which guarantees that a strictly smaller key
//! exists below every key and keeps the encoding canonical (trailing zero
//! digits do not change the fraction).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Digit alphabet, ordered so that byte comparison equals digit comparison.
const DIGITS: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

const BASE: u32 = 62;

fn digit_value(c: u8) -> u32 {
    match c {
        b'0'..=b'9' => u32::from(c - b'0'),
        b'A'..=b'Z' => u32::from(c - b'A') + 10,
        b'a'..=b'z' => u32::from(c - b'a') + 36,
        // Unreachable for validated keys; lowest digit keeps ordering sane.
        _ => 0,
    }
}

/// Ordering key for siblings within one (parent, slot) group.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FractionalIndex(String);

impl FractionalIndex {
    /// Parse and validate a key from its string form.
    pub fn from_string(s: impl Into<String>) -> Result<Self, InvalidIndexError> {
        let s = s.into();
        let valid = !s.is_empty()
            && s.bytes().all(|b| b.is_ascii_alphanumeric())
            && !s.ends_with('0');
        if valid {
            Ok(Self(s))
        } else {
            Err(InvalidIndexError { input: s })
        }
    }

    /// The key's string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compute a key strictly between two neighbors.
    ///
    /// `None` bounds are open: `between(None, Some(k))` produces a key below
    /// `k`, `between(Some(k), None)` a key above it, and `between(None,
    /// None)` the midpoint of the whole range. The caller must pass
    /// `lo < hi` when both bounds are present.
    pub fn between(lo: Option<&Self>, hi: Option<&Self>) -> Self {
        if let (Some(lo), Some(hi)) = (lo, hi) {
            debug_assert!(lo < hi, "between() bounds out of order");
        }
        let a = lo.map(|k| k.0.as_bytes()).unwrap_or(b"");
        let b = hi.map(|k| k.0.as_bytes());
        let mut out = String::new();
        midpoint(a, b, &mut out);
        Self(out)
    }

    /// Produce `n` distinct, ordered keys spread evenly over the range.
    ///
    /// Used when seeding a slot with several children at once.
    pub fn evenly_spaced(n: usize) -> Vec<Self> {
        if n == 0 {
            return Vec::new();
        }
        // Enough digits that every value lands strictly inside the range.
        let mut width = 1usize;
        let mut cap = u128::from(BASE);
        while cap < n as u128 + 2 {
            width += 1;
            cap *= u128::from(BASE);
        }
        (1..=n as u128)
            .map(|i| {
                let mut value = i * cap / (n as u128 + 1);
                let mut digits = vec![b'0'; width];
                for slot in digits.iter_mut().rev() {
                    *slot = DIGITS[(value % u128::from(BASE)) as usize];
                    value /= u128::from(BASE);
                }
                while digits.last() == Some(&b'0') {
                    digits.pop();
                }
                Self(digits.into_iter().map(char::from).collect())
            })
            .collect()
    }
}

/// Midpoint of the open interval `(a, b)`, where `a` may be empty (zero)
/// and `b` absent (one). Appends the result to `out`.
fn midpoint(a: &[u8], b: Option<&[u8]>, out: &mut String) {
    if let Some(b) = b {
        // Strip the longest common prefix, padding `a` with zero digits.
        let mut n = 0;
        while n < b.len() && a.get(n).copied().unwrap_or(b'0') == b[n] {
            n += 1;
        }
        if n > 0 {
            for &c in &b[..n] {
                out.push(char::from(c));
            }
            let a_rest = if n < a.len() { &a[n..] } else { &[][..] };
            midpoint(a_rest, Some(&b[n..]), out);
            return;
        }
    }

    let da = a.first().map(|&c| digit_value(c)).unwrap_or(0);
    let db = b
        .and_then(|b| b.first().map(|&c| digit_value(c)))
        .unwrap_or(BASE);

    if db - da > 1 {
        let mid = (da + db) / 2;
        out.push(char::from(DIGITS[mid as usize]));
        return;
    }

    // The first digits are consecutive.
    match b {
        Some(b) if b.len() > 1 => {
            // `b` truncated to its first digit already sits strictly
            // between `a` and `b`.
            out.push(char::from(b[0]));
        }
        _ => {
            // Descend: keep `a`'s first digit and recurse on its tail
            // against an open upper bound.
            out.push(char::from(DIGITS[da as usize]));
            let a_rest = if a.is_empty() { &[][..] } else { &a[1..] };
            midpoint(a_rest, None, out);
        }
    }
}

impl fmt::Display for FractionalIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for FractionalIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FractionalIndex({:?})", self.0)
    }
}

impl From<FractionalIndex> for String {
    fn from(index: FractionalIndex) -> Self {
        index.0
    }
}

impl TryFrom<String> for FractionalIndex {
    type Error = InvalidIndexError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_string(s)
    }
}

/// Error returned for strings that are not canonical ordering keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidIndexError {
    input: String,
}

impl fmt::Display for InvalidIndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid ordering key: {:?}", self.input)
    }
}

impl std::error::Error for InvalidIndexError {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn midpoint_of_open_range() {
        let mid = FractionalIndex::between(None, None);
        assert_eq!(mid.as_str(), "V");
    }

    #[test]
    fn inserts_between_adjacent_digits() {
        let a = FractionalIndex::from_string("A").unwrap();
        let b = FractionalIndex::from_string("B").unwrap();
        let mid = FractionalIndex::between(Some(&a), Some(&b));
        assert!(a < mid && mid < b, "{a} < {mid} < {b}");
    }

    #[test]
    fn inserts_below_first() {
        let a = FractionalIndex::from_string("A").unwrap();
        let below = FractionalIndex::between(None, Some(&a));
        assert!(below < a);
    }

    #[test]
    fn inserts_above_last() {
        let z = FractionalIndex::from_string("z").unwrap();
        let above = FractionalIndex::between(Some(&z), None);
        assert!(above > z);
    }

    #[test]
    fn handles_prefix_neighbors() {
        let a = FractionalIndex::from_string("A").unwrap();
        let b = FractionalIndex::from_string("A1").unwrap();
        let mid = FractionalIndex::between(Some(&a), Some(&b));
        assert!(a < mid && mid < b, "{a} < {mid} < {b}");
    }

    #[test]
    fn keys_never_end_in_zero() {
        let mut lo: Option<FractionalIndex> = None;
        let hi = FractionalIndex::from_string("1").unwrap();
        for _ in 0..40 {
            let mid = FractionalIndex::between(lo.as_ref(), Some(&hi));
            assert!(!mid.as_str().ends_with('0'), "{mid}");
            lo = Some(mid);
        }
    }

    #[test]
    fn repeated_splits_stay_ordered() {
        let mut keys = vec![
            FractionalIndex::from_string("A").unwrap(),
            FractionalIndex::from_string("B").unwrap(),
        ];
        for _ in 0..100 {
            let mid = FractionalIndex::between(Some(&keys[0]), Some(&keys[1]));
            assert!(keys[0] < mid && mid < keys[1]);
            keys[1] = mid;
        }
    }

    #[test]
    fn evenly_spaced_is_ordered_and_distinct() {
        for n in [1, 2, 7, 61, 62, 200] {
            let keys = FractionalIndex::evenly_spaced(n);
            assert_eq!(keys.len(), n);
            for pair in keys.windows(2) {
                assert!(pair[0] < pair[1], "{} !< {}", pair[0], pair[1]);
            }
        }
    }

    #[test]
    fn rejects_malformed_keys() {
        assert!(FractionalIndex::from_string("").is_err());
        assert!(FractionalIndex::from_string("A0").is_err());
        assert!(FractionalIndex::from_string("a b").is_err());
        assert!(FractionalIndex::from_string("Ä").is_err());
    }

    #[test]
    fn serde_round_trip() {
        let key = FractionalIndex::from_string("A0V").unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"A0V\"");
        let back: FractionalIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn serde_rejects_non_canonical() {
        assert!(serde_json::from_str::<FractionalIndex>("\"A0\"").is_err());
    }

    fn arb_key() -> impl Strategy<Value = FractionalIndex> {
        proptest::string::string_regex("[1-9A-Za-z][0-9A-Za-z]{0,6}[1-9A-Za-z]?")
            .expect("valid regex")
            .prop_filter_map("canonical keys only", |s| {
                FractionalIndex::from_string(s).ok()
            })
    }

    proptest! {
        #[test]
        fn between_is_strictly_inside(a in arb_key(), b in arb_key()) {
            prop_assume!(a != b);
            let (lo, hi) = if a < b { (a, b) } else { (b, a) };
            let mid = FractionalIndex::between(Some(&lo), Some(&hi));
            prop_assert!(lo < mid, "{lo} !< {mid}");
            prop_assert!(mid < hi, "{mid} !< {hi}");
        }

        #[test]
        fn between_open_ends(a in arb_key()) {
            let below = FractionalIndex::between(None, Some(&a));
            let above = FractionalIndex::between(Some(&a), None);
            prop_assert!(below < a);
            prop_assert!(a < above);
        }
    }
}
