use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::fmt;

/// A key accepted by the storage engine.
///
/// Keys of different kinds order as number < date < string < binary < array,
/// and arrays compare element by element.
#[derive(Debug, Clone)]
pub enum Key {
    Number(f64),
    /// Milliseconds since the Unix epoch
    Date(i64),
    String(String),
    Binary(Vec<u8>),
    Array(Vec<Key>),
}

impl Key {
    fn rank(&self) -> u8 {
        match self {
            Self::Number(_) => 0,
            Self::Date(_) => 1,
            Self::String(_) => 2,
            Self::Binary(_) => 3,
            Self::Array(_) => 4,
        }
    }

    /// Whether the engine can index this key (NaN numbers are rejected)
    pub fn is_valid(&self) -> bool {
        match self {
            Self::Number(n) => !n.is_nan(),
            Self::Array(items) => items.iter().all(Key::is_valid),
            _ => true,
        }
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            // -0.0 and 0.0 are the same key
            (Self::Number(a), Self::Number(b)) => (a + 0.0).total_cmp(&(b + 0.0)),
            (Self::Date(a), Self::Date(b)) => a.cmp(b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Binary(a), Self::Binary(b)) => a.cmp(b),
            (Self::Array(a), Self::Array(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Date(ms) => write!(f, "date({ms})"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Binary(bytes) => write!(f, "binary({} bytes)", bytes.len()),
            Self::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&String> for Key {
    fn from(value: &String) -> Self {
        Self::String(value.clone())
    }
}

impl From<f64> for Key {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

/// Keys are engine numbers, so integers beyond 2^53 round to the nearest
/// representable `f64` and neighbouring values may collide.
impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<u32> for Key {
    fn from(value: u32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<DateTime<Utc>> for Key {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Date(value.timestamp_millis())
    }
}

impl From<Vec<u8>> for Key {
    fn from(value: Vec<u8>) -> Self {
        Self::Binary(value)
    }
}

impl From<&[u8]> for Key {
    fn from(value: &[u8]) -> Self {
        Self::Binary(value.to_vec())
    }
}

impl From<Vec<Key>> for Key {
    fn from(value: Vec<Key>) -> Self {
        Self::Array(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cross_kind_ordering() {
        let mut keys = vec![
            Key::Array(vec![Key::from(1)]),
            Key::from("b"),
            Key::Binary(vec![0]),
            Key::Date(5),
            Key::from(10),
            Key::from("a"),
        ];
        keys.sort();

        assert_eq!(
            keys,
            vec![
                Key::from(10),
                Key::Date(5),
                Key::from("a"),
                Key::from("b"),
                Key::Binary(vec![0]),
                Key::Array(vec![Key::from(1)]),
            ]
        );
    }

    #[test]
    fn test_array_keys_compare_elementwise() {
        let short = Key::from(vec![Key::from("user"), Key::from(1)]);
        let long = Key::from(vec![Key::from("user"), Key::from(1), Key::from(0)]);
        let later = Key::from(vec![Key::from("user"), Key::from(2)]);

        assert!(short < long);
        assert!(long < later);
    }

    #[test]
    fn test_signed_zero_is_one_key() {
        assert_eq!(Key::from(0.0), Key::from(-0.0));
        assert_eq!(Key::from(-0.0).cmp(&Key::from(0.0)), Ordering::Equal);
        assert!(Key::from(-0.0) > Key::from(-1.0));
    }

    #[test]
    fn test_large_integers_round_to_f64() {
        let limit = 1_i64 << 53;
        assert_eq!(Key::from(limit), Key::from(limit + 1));
        assert_ne!(Key::from(limit - 1), Key::from(limit));
    }

    #[test]
    fn test_nan_is_invalid() {
        assert!(!Key::Number(f64::NAN).is_valid());
        assert!(!Key::Array(vec![Key::from("a"), Key::Number(f64::NAN)]).is_valid());
        assert!(Key::from(1.5).is_valid());
    }

    #[test]
    fn test_display() {
        let key = Key::from(vec![Key::from("user"), Key::from(7)]);
        assert_eq!(key.to_string(), "[\"user\", 7]");
    }
}
