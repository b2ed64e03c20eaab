use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use regex::Regex;

static SIZE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*([0-9]+)\s*([kmgtp]?)(?:i?b)?\s*$").expect("size regex")
});

const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];

/// Parses `512`, `4K`, `100M`, `2GiB`, `1tb`... Suffixes are binary.
pub fn parse_size(s: &str) -> Result<u64> {
    let Some(caps) = SIZE.captures(s) else {
        bail!("bad size '{}': expected <number>[K|M|G|T|P]", s.trim());
    };
    let n: u64 = caps[1]
        .parse()
        .with_context(|| format!("size out of range: '{}'", s.trim()))?;
    let shift = match caps[2].to_ascii_lowercase().as_str() {
        "" => 0,
        "k" => 10,
        "m" => 20,
        "g" => 30,
        "t" => 40,
        _ => 50,
    };
    n.checked_mul(1u64 << shift)
        .with_context(|| format!("size out of range: '{}'", s.trim()))
}

/// Human-readable binary size, two decimals above bytes.
pub fn format_size(bytes: u64) -> String {
    let mut unit = 0;
    let mut value = bytes as f64;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_and_suffixed() {
        assert_eq!(parse_size("512").unwrap(), 512);
        assert_eq!(parse_size("4K").unwrap(), 4096);
        assert_eq!(parse_size("100m").unwrap(), 100 << 20);
        assert_eq!(parse_size(" 2GiB ").unwrap(), 2 << 30);
        assert_eq!(parse_size("1TB").unwrap(), 1 << 40);
        assert_eq!(parse_size("3 G").unwrap(), 3 << 30);
    }

    #[test]
    fn parse_rejects_garbage_and_overflow() {
        assert!(parse_size("").is_err());
        assert!(parse_size("-1").is_err());
        assert!(parse_size("1.5G").is_err());
        assert!(parse_size("12X").is_err());
        assert!(parse_size("99999999999P").is_err());
        assert!(parse_size("99999999999999999999999").is_err());
    }

    #[test]
    fn format_picks_unit() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(4 << 20), "4.00 MiB");
        assert_eq!(format_size(1536 << 20), "1.50 GiB");
    }
}
