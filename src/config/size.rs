//! Human-readable byte sizes for config values such as `"5 GB"`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A byte count that deserializes from either an integer or a string with a
/// decimal (`KB`, `MB`, `GB`, `TB`) or binary (`KiB`, `MiB`, `GiB`, `TiB`) unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawSize", into = "u64")]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<ByteSize> for u64 {
    fn from(size: ByteSize) -> Self {
        size.0
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSize {
    Bytes(u64),
    Text(String),
}

impl TryFrom<RawSize> for ByteSize {
    type Error = String;

    fn try_from(raw: RawSize) -> Result<Self, Self::Error> {
        match raw {
            RawSize::Bytes(n) => Ok(ByteSize(n)),
            RawSize::Text(s) => s.parse(),
        }
    }
}

impl FromStr for ByteSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(s.len());
        let (number, unit) = s.split_at(split);

        let value: f64 = number
            .parse()
            .map_err(|_| format!("invalid size '{s}'"))?;

        let multiplier: u64 = match unit.trim().to_ascii_lowercase().as_str() {
            "" | "b" => 1,
            "k" | "kb" => 1_000,
            "m" | "mb" => 1_000_000,
            "g" | "gb" => 1_000_000_000,
            "t" | "tb" => 1_000_000_000_000,
            "kib" => 1 << 10,
            "mib" => 1 << 20,
            "gib" => 1 << 30,
            "tib" => 1 << 40,
            other => return Err(format!("unknown size unit '{other}' in '{s}'")),
        };

        Ok(ByteSize((value * multiplier as f64).round() as u64))
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} B", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!("5 GB".parse::<ByteSize>().unwrap(), ByteSize(5_000_000_000));
        assert_eq!("16MiB".parse::<ByteSize>().unwrap(), ByteSize(16 * 1024 * 1024));
        assert_eq!("1.5 kb".parse::<ByteSize>().unwrap(), ByteSize(1500));
        assert_eq!("42".parse::<ByteSize>().unwrap(), ByteSize(42));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<ByteSize>().is_err());
        assert!("GB".parse::<ByteSize>().is_err());
        assert!("5 parsecs".parse::<ByteSize>().is_err());
    }

    #[test]
    fn test_deserialize_integer_or_string() {
        #[derive(Deserialize)]
        struct Wrapper {
            a: ByteSize,
            b: ByteSize,
        }

        let w: Wrapper = toml::from_str("a = 1024\nb = \"2 KiB\"").unwrap();
        assert_eq!(w.a, ByteSize(1024));
        assert_eq!(w.b, ByteSize(2048));
    }
}
