/// Fractional ordering keys.
///
/// A key is a non-empty string of base-62 digits (`0-9A-Za-z`, which is also
/// ASCII order) that never ends in `0`. Plain byte-wise comparison gives the
/// order, and a key strictly between any two distinct keys can always be built
/// by extending the lower key with more digits. Growth is only bounded by the
/// maximum key length, past which the list has to be reflowed.
use std::fmt;

use serde::{Deserialize, Serialize};

use super::OrderingError;

/// Digit alphabet, in ascending order.
pub const DIGITS: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

const BASE: usize = DIGITS.len();

/// Keys longer than this force a reflow of the list.
pub const DEFAULT_MAX_KEY_LEN: usize = 40;

fn digit_value(byte: u8) -> Option<usize> {
    match byte {
        b'0'..=b'9' => Some((byte - b'0') as usize),
        b'A'..=b'Z' => Some((byte - b'A') as usize + 10),
        b'a'..=b'z' => Some((byte - b'a') as usize + 36),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionKey(String);

impl PositionKey {
    /// Parse a key, rejecting anything that cannot serve as a neighbour.
    pub fn parse(raw: &str) -> Result<Self, OrderingError> {
        let key = Self(raw.to_string());
        if key.is_well_formed() {
            Ok(key)
        } else {
            Err(OrderingError::MalformedKey(raw.to_string()))
        }
    }

    /// Wrap a key received from the server without validating it.
    /// Malformed keys still sort; the owning list is reflowed before any
    /// key is computed next to them.
    pub fn from_server(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_well_formed(&self) -> bool {
        let bytes = self.0.as_bytes();
        !bytes.is_empty()
            && bytes.last() != Some(&b'0')
            && bytes.iter().all(|b| digit_value(*b).is_some())
    }

    /// Key strictly between `lower` and `upper` (`None` is -inf / +inf),
    /// bounded by [`DEFAULT_MAX_KEY_LEN`].
    pub fn between(
        lower: Option<&PositionKey>,
        upper: Option<&PositionKey>,
    ) -> Result<Self, OrderingError> {
        Self::between_with_limit(lower, upper, DEFAULT_MAX_KEY_LEN)
    }

    /// Key strictly between `lower` and `upper`. Fails with
    /// `RequiresReflow` when the bounds are not strictly ordered, when either
    /// bound is malformed, or when the result would exceed `max_len`.
    pub fn between_with_limit(
        lower: Option<&PositionKey>,
        upper: Option<&PositionKey>,
        max_len: usize,
    ) -> Result<Self, OrderingError> {
        let reflow = || OrderingError::RequiresReflow {
            lower: lower.map(|k| k.0.clone()),
            upper: upper.map(|k| k.0.clone()),
        };

        if lower.is_some_and(|k| !k.is_well_formed()) || upper.is_some_and(|k| !k.is_well_formed()) {
            return Err(reflow());
        }
        if let (Some(a), Some(b)) = (lower, upper) {
            if a >= b {
                return Err(reflow());
            }
        }

        let a = lower.map(|k| k.0.as_bytes()).unwrap_or_default();
        let b = upper.map(|k| k.0.as_bytes());
        let key = midpoint(a, b);
        if key.len() > max_len {
            return Err(reflow());
        }
        // midpoint only ever emits bytes from DIGITS
        Ok(Self(key.into_iter().map(char::from).collect()))
    }

    /// `count` ascending keys spread evenly over the key space, all of the
    /// same (minimal) digit width before trailing zeros are trimmed.
    pub fn evenly_spaced(count: usize) -> Vec<PositionKey> {
        if count == 0 {
            return Vec::new();
        }
        let count = count as u128;
        let mut width = 1u32;
        let mut space = BASE as u128;
        while space <= count {
            width += 1;
            space *= BASE as u128;
        }
        (1..=count)
            .map(|i| encode_fixed(i * space / (count + 1), width))
            .collect()
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fractional midpoint of two digit strings. `a` may be empty (-inf), `b`
/// may be absent (+inf). Callers guarantee `a < b` and no trailing zeros.
fn midpoint(a: &[u8], b: Option<&[u8]>) -> Vec<u8> {
    if let Some(b) = b {
        let mut n = 0;
        while n < b.len() && a.get(n).copied().unwrap_or(DIGITS[0]) == b[n] {
            n += 1;
        }
        if n > 0 {
            let mut out = b[..n].to_vec();
            out.extend(midpoint(a.get(n..).unwrap_or_default(), Some(&b[n..])));
            return out;
        }
    }

    let digit_a = a.first().and_then(|d| digit_value(*d)).unwrap_or(0);
    let digit_b = b
        .and_then(|b| b.first())
        .and_then(|d| digit_value(*d))
        .unwrap_or(BASE);

    if digit_b - digit_a > 1 {
        vec![DIGITS[(digit_a + digit_b + 1) / 2]]
    } else if let Some(b) = b.filter(|b| b.len() > 1) {
        vec![b[0]]
    } else {
        let mut out = vec![DIGITS[digit_a]];
        out.extend(midpoint(a.get(1..).unwrap_or_default(), None));
        out
    }
}

fn encode_fixed(mut value: u128, width: u32) -> PositionKey {
    let mut digits = vec![DIGITS[0]; width as usize];
    for slot in digits.iter_mut().rev() {
        *slot = DIGITS[(value % BASE as u128) as usize];
        value /= BASE as u128;
    }
    while digits.last() == Some(&DIGITS[0]) {
        digits.pop();
    }
    PositionKey(digits.into_iter().map(char::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> PositionKey {
        PositionKey::parse(s).unwrap()
    }

    #[test]
    fn test_between_unbounded_is_middle_digit() {
        let mid = PositionKey::between(None, None).unwrap();
        assert_eq!(mid.as_str(), "V");
    }

    #[test]
    fn test_between_simple_gap() {
        let b = PositionKey::between(Some(&key("a")), Some(&key("c"))).unwrap();
        assert_eq!(b.as_str(), "b");
    }

    #[test]
    fn test_between_adjacent_digits_extends() {
        let a = key("a");
        let b = key("b");
        let c = PositionKey::between(Some(&a), Some(&b)).unwrap();
        assert!(a < c && c < b, "{} not between a and b", c);
        assert_eq!(c.as_str(), "aV");
    }

    #[test]
    fn test_between_open_ends() {
        let first = key("a");
        let before = PositionKey::between(None, Some(&first)).unwrap();
        let after = PositionKey::between(Some(&first), None).unwrap();
        assert!(before < first);
        assert!(after > first);
        assert!(before.is_well_formed());
        assert!(after.is_well_formed());
    }

    #[test]
    fn test_between_below_smallest_digit() {
        let one = key("1");
        let below = PositionKey::between(None, Some(&one)).unwrap();
        assert!(below < one);
        assert!(below.is_well_formed());
        let again = PositionKey::between(None, Some(&below)).unwrap();
        assert!(again < below);
        assert!(again.is_well_formed());
    }

    #[test]
    fn test_between_equal_keys_requires_reflow() {
        let a = key("a");
        let err = PositionKey::between(Some(&a), Some(&a)).unwrap_err();
        assert!(matches!(err, OrderingError::RequiresReflow { .. }));
    }

    #[test]
    fn test_between_reversed_keys_requires_reflow() {
        let err = PositionKey::between(Some(&key("c")), Some(&key("a"))).unwrap_err();
        assert!(matches!(err, OrderingError::RequiresReflow { .. }));
    }

    #[test]
    fn test_between_malformed_neighbour_requires_reflow() {
        let legacy = PositionKey::from_server("10");
        assert!(!legacy.is_well_formed());
        let err = PositionKey::between(Some(&legacy), None).unwrap_err();
        assert!(matches!(err, OrderingError::RequiresReflow { .. }));
    }

    #[test]
    fn test_parse_rejects_bad_keys() {
        assert!(PositionKey::parse("").is_err());
        assert!(PositionKey::parse("a0").is_err());
        assert!(PositionKey::parse("a-b").is_err());
        assert!(PositionKey::parse("aZ9").is_ok());
    }

    #[test]
    fn test_length_limit_requires_reflow() {
        let a = key("a");
        let mut upper = key("b");
        let mut hit_limit = false;
        for _ in 0..200 {
            match PositionKey::between_with_limit(Some(&a), Some(&upper), 8) {
                Ok(next) => upper = next,
                Err(OrderingError::RequiresReflow { .. }) => {
                    hit_limit = true;
                    break;
                }
                Err(other) => panic!("unexpected error {other}"),
            }
        }
        assert!(hit_limit);
        assert!(upper.len() <= 8);
    }

    #[test]
    fn test_thousand_insertions_in_one_gap_stay_short() {
        // Deterministic scatter over the gap between two confirmed neighbours.
        let mut keys = vec![key("a"), key("b")];
        let mut seed: u64 = 0x9e37_79b9_7f4a_7c15;
        for _ in 0..1000 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let slot = (seed >> 33) as usize % (keys.len() - 1);
            let c = PositionKey::between(Some(&keys[slot]), Some(&keys[slot + 1]))
                .expect("no reflow inside a scattered gap");
            assert!(keys[slot] < c && c < keys[slot + 1]);
            keys.insert(slot + 1, c);
        }
        assert_eq!(keys.len(), 1002);
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_thousand_insertions_against_one_edge_unbounded() {
        let a = key("a");
        let mut upper = key("b");
        for _ in 0..1000 {
            let c = PositionKey::between_with_limit(Some(&a), Some(&upper), usize::MAX).unwrap();
            assert!(a < c && c < upper);
            assert!(c.is_well_formed());
            upper = c;
        }
    }

    #[test]
    fn test_fifty_insertions_at_same_spot_never_collide() {
        let a = key("a");
        let c = key("c");
        let mut seen = std::collections::HashSet::new();
        let mut upper = c.clone();
        for _ in 0..50 {
            let k = PositionKey::between(Some(&a), Some(&upper)).unwrap();
            assert!(a < k && k < c);
            assert!(seen.insert(k.clone()), "collision on {}", k);
            upper = k;
        }
    }

    #[test]
    fn test_evenly_spaced_ascending_and_well_formed() {
        for count in [1usize, 2, 5, 61, 62, 63, 500] {
            let keys = PositionKey::evenly_spaced(count);
            assert_eq!(keys.len(), count);
            assert!(keys.iter().all(PositionKey::is_well_formed));
            assert!(keys.windows(2).all(|w| w[0] < w[1]), "count {}", count);
        }
        assert!(PositionKey::evenly_spaced(0).is_empty());
    }

    #[test]
    fn test_evenly_spaced_leaves_room_between() {
        let keys = PositionKey::evenly_spaced(3);
        for pair in keys.windows(2) {
            let mid = PositionKey::between(Some(&pair[0]), Some(&pair[1])).unwrap();
            assert!(mid.len() <= 2);
        }
    }

    #[test]
    fn test_serde_is_transparent() {
        let k = key("aV");
        let json = serde_json::to_string(&k).unwrap();
        assert_eq!(json, "\"aV\"");
        let back: PositionKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, k);
    }
}
