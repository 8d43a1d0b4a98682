use std::fmt;

use serde::{Deserialize, Serialize};

const BASE: u32 = 36;
const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Fractional ordering key over base-36 digit strings.
///
/// A key is read as the fraction 0.d1d2d3... in base 36, so lexicographic
/// order on the string equals numeric order on the fraction. Inserting
/// between two siblings takes a midpoint and never renumbers anything.
/// Keys never end in '0': "1" and "10" denote the same fraction, and the
/// canonical spelling is the shorter one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderKey(String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidOrderKey(pub String);

impl fmt::Display for InvalidOrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid order key: {}", self.0)
    }
}

impl std::error::Error for InvalidOrderKey {}

impl OrderKey {
    /// Key for the first element of an empty list: the midpoint of (0, 1).
    pub fn first() -> Self {
        OrderKey("i".to_string())
    }

    /// Parse an externally supplied key, rejecting non-canonical spellings.
    pub fn parse(s: &str) -> Result<Self, InvalidOrderKey> {
        if s.is_empty()
            || s.ends_with('0')
            || !s.bytes().all(|b| DIGITS.contains(&b))
        {
            return Err(InvalidOrderKey(s.to_string()));
        }
        Ok(OrderKey(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A key strictly greater than `k`.
    pub fn after(k: &OrderKey) -> Self {
        OrderKey(midpoint(&k.0, ""))
    }

    /// A key strictly less than `k`.
    pub fn before(k: &OrderKey) -> Self {
        OrderKey(midpoint("", &k.0))
    }

    /// A key strictly between `a` and `b`. Requires `a < b`.
    pub fn between(a: &OrderKey, b: &OrderKey) -> Result<Self, InvalidOrderKey> {
        if a >= b {
            return Err(InvalidOrderKey(format!("{} >= {}", a.0, b.0)));
        }
        Ok(OrderKey(midpoint(&a.0, &b.0)))
    }
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn digit_value(b: u8) -> u32 {
    match b {
        b'0'..=b'9' => (b - b'0') as u32,
        b'a'..=b'z' => (b - b'a' + 10) as u32,
        _ => unreachable!("order keys are validated on construction"),
    }
}

fn digit_char(v: u32) -> char {
    DIGITS[v as usize] as char
}

/// Midpoint of the open interval (a, b), where "" stands for 0 on the left
/// and 1 on the right. Both inputs are canonical (no trailing '0'), and the
/// result is canonical and strictly between them.
fn midpoint(a: &str, b: &str) -> String {
    if !b.is_empty() {
        // Shared prefix passes through unchanged.
        let n = a
            .bytes()
            .zip(b.bytes())
            .take_while(|(x, y)| x == y)
            .count();
        if n > 0 {
            return format!("{}{}", &b[..n], midpoint(&a[n..], &b[n..]));
        }
    }

    let da = a.bytes().next().map(digit_value).unwrap_or(0);
    let db = b.bytes().next().map(digit_value).unwrap_or(BASE);

    if db - da > 1 {
        // Room for a whole digit between the two.
        return digit_char((da + db) / 2).to_string();
    }

    // Consecutive leading digits: keep a's digit and push the problem one
    // position right, where the upper bound becomes 1.
    if a.len() > 1 {
        format!("{}{}", digit_char(da), midpoint(&a[1..], ""))
    } else {
        format!("{}{}", digit_char(da), midpoint("", &b[1..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> OrderKey {
        OrderKey::parse(s).unwrap()
    }

    #[test]
    fn first_is_midpoint_of_unit_interval() {
        assert_eq!(OrderKey::first().as_str(), "i");
    }

    #[test]
    fn after_and_before_order_correctly() {
        let k = OrderKey::first();
        let next = OrderKey::after(&k);
        let prev = OrderKey::before(&k);
        assert!(prev < k);
        assert!(k < next);
    }

    #[test]
    fn between_bisects() {
        let a = key("i");
        let b = key("r");
        let m = OrderKey::between(&a, &b).unwrap();
        assert!(a < m);
        assert!(m < b);
    }

    #[test]
    fn between_adjacent_digits_extends() {
        let a = key("i");
        let b = key("j");
        let m = OrderKey::between(&a, &b).unwrap();
        assert!(a < m);
        assert!(m < b);
        assert!(m.as_str().starts_with('i'));
    }

    #[test]
    fn between_rejects_misordered() {
        let a = key("i");
        assert!(OrderKey::between(&a, &a).is_err());
        assert!(OrderKey::between(&key("j"), &a).is_err());
    }

    #[test]
    fn repeated_insertion_at_head_stays_ordered() {
        let mut k = OrderKey::first();
        let mut all = vec![k.clone()];
        for _ in 0..50 {
            k = OrderKey::before(&k);
            all.push(k.clone());
        }
        for w in all.windows(2) {
            assert!(w[1] < w[0]);
        }
    }

    #[test]
    fn repeated_bisection_stays_ordered_and_canonical() {
        let mut lo = key("1");
        let hi = key("2");
        for _ in 0..80 {
            let m = OrderKey::between(&lo, &hi).unwrap();
            assert!(lo < m && m < hi);
            assert!(!m.as_str().ends_with('0'));
            lo = m;
        }
    }

    #[test]
    fn parse_rejects_bad_keys() {
        assert!(OrderKey::parse("").is_err());
        assert!(OrderKey::parse("a0").is_err());
        assert!(OrderKey::parse("A").is_err());
        assert!(OrderKey::parse("i!").is_err());
        assert!(OrderKey::parse("i").is_ok());
    }
}
