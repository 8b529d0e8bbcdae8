//! Kubernetes resource quantity canonicalization.
//!
//! Equal quantities written differently ("1000m" and "1", "1024Mi" and "1Gi")
//! canonicalize to the same string, so attribute comparisons can be done on
//! text.

use crate::error::{DevfileError, DevfileResult};
use regex::Regex;
use std::sync::LazyLock;

static QUANTITY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([+-]?)([0-9]+(?:\.[0-9]*)?|\.[0-9]+)([a-zA-Z]*|[eE][+-]?[0-9]+)$").unwrap()
});

const NANO: i128 = 1_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    DecimalSi,
    BinarySi,
    DecimalExponent,
}

/// A parsed quantity held as an integer count of nano-units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quantity {
    nanos: i128,
    format: Format,
}

fn invalid(value: &str, message: impl Into<String>) -> DevfileError {
    DevfileError::InvalidQuantity {
        value: value.to_string(),
        message: message.into(),
    }
}

fn pow(base: i128, exp: u32, value: &str) -> DevfileResult<i128> {
    base.checked_pow(exp)
        .ok_or_else(|| invalid(value, "quantity too large"))
}

impl Quantity {
    pub fn parse(value: &str) -> DevfileResult<Self> {
        let trimmed = value.trim();
        let caps = QUANTITY_REGEX
            .captures(trimmed)
            .ok_or_else(|| invalid(value, "quantities must match the regular expression"))?;

        let negative = &caps[1] == "-";
        let number = &caps[2];
        let suffix = &caps[3];

        let (format, multiplier_nanos, divisor) = match suffix {
            "" => (Format::DecimalSi, NANO, 1),
            "n" => (Format::DecimalSi, 1, 1),
            "u" => (Format::DecimalSi, 1_000, 1),
            "m" => (Format::DecimalSi, 1_000_000, 1),
            "k" => (Format::DecimalSi, NANO * 1_000, 1),
            "M" => (Format::DecimalSi, NANO * pow(10, 6, value)?, 1),
            "G" => (Format::DecimalSi, NANO * pow(10, 9, value)?, 1),
            "T" => (Format::DecimalSi, NANO * pow(10, 12, value)?, 1),
            "P" => (Format::DecimalSi, NANO * pow(10, 15, value)?, 1),
            "E" => (Format::DecimalSi, NANO * pow(10, 18, value)?, 1),
            "Ki" => (Format::BinarySi, NANO * pow(1024, 1, value)?, 1),
            "Mi" => (Format::BinarySi, NANO * pow(1024, 2, value)?, 1),
            "Gi" => (Format::BinarySi, NANO * pow(1024, 3, value)?, 1),
            "Ti" => (Format::BinarySi, NANO * pow(1024, 4, value)?, 1),
            "Pi" => (Format::BinarySi, NANO * pow(1024, 5, value)?, 1),
            "Ei" => (Format::BinarySi, NANO * pow(1024, 6, value)?, 1),
            s if s.starts_with(['e', 'E']) => {
                let exp: i32 = s[1..]
                    .parse()
                    .map_err(|_| invalid(value, "invalid exponent"))?;
                if exp >= 0 {
                    let factor = pow(10, exp as u32, value)?;
                    let nanos = NANO
                        .checked_mul(factor)
                        .ok_or_else(|| invalid(value, "quantity too large"))?;
                    (Format::DecimalExponent, nanos, 1)
                } else if exp >= -9 {
                    (Format::DecimalExponent, pow(10, (9 + exp) as u32, value)?, 1)
                } else {
                    (
                        Format::DecimalExponent,
                        1,
                        pow(10, (-9 - exp) as u32, value)?,
                    )
                }
            }
            other => return Err(invalid(value, format!("unknown suffix {other:?}"))),
        };

        let (int_part, frac_part) = match number.split_once('.') {
            Some((i, f)) => (i, f),
            None => (number, ""),
        };
        let digits = format!("{int_part}{frac_part}");
        let mantissa: i128 = if digits.is_empty() {
            0
        } else {
            digits
                .parse()
                .map_err(|_| invalid(value, "quantity too large"))?
        };
        let scale = pow(10, frac_part.len() as u32, value)?;

        let numerator = mantissa
            .checked_mul(multiplier_nanos)
            .ok_or_else(|| invalid(value, "quantity too large"))?;
        let denominator = scale
            .checked_mul(divisor)
            .ok_or_else(|| invalid(value, "quantity too precise"))?;
        // Sub-nano precision rounds up, matching the API server.
        let mut nanos = numerator / denominator;
        if numerator % denominator != 0 {
            nanos += 1;
        }
        if negative {
            nanos = -nanos;
        }

        Ok(Self { nanos, format })
    }

    /// Canonical text for this quantity.
    pub fn canonical(&self) -> String {
        if self.nanos == 0 {
            return "0".to_string();
        }
        let sign = if self.nanos < 0 { "-" } else { "" };
        let abs = self.nanos.abs();

        if self.format == Format::BinarySi && abs % NANO == 0 {
            let mut whole = abs / NANO;
            let mut index = 0;
            while index < 6 && whole % 1024 == 0 {
                whole /= 1024;
                index += 1;
            }
            let suffix = ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei"][index];
            return format!("{sign}{whole}{suffix}");
        }

        // Largest power of 1000 (in nano-units) that divides the value.
        let mut exponent: i32 = -9;
        let mut mantissa = abs;
        while exponent < 18 && mantissa % 1000 == 0 {
            mantissa /= 1000;
            exponent += 3;
        }

        let suffix = match (self.format, exponent) {
            (Format::DecimalExponent, 0) => String::new(),
            (Format::DecimalExponent, e) => format!("e{e}"),
            (_, -9) => "n".to_string(),
            (_, -6) => "u".to_string(),
            (_, -3) => "m".to_string(),
            (_, 0) => String::new(),
            (_, 3) => "k".to_string(),
            (_, 6) => "M".to_string(),
            (_, 9) => "G".to_string(),
            (_, 12) => "T".to_string(),
            (_, 15) => "P".to_string(),
            (_, _) => "E".to_string(),
        };
        format!("{sign}{mantissa}{suffix}")
    }
}

/// Parse and canonicalize a quantity string.
pub fn canonicalize(value: &str) -> DevfileResult<String> {
    Quantity::parse(value).map(|q| q.canonical())
}
