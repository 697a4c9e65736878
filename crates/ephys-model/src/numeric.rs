// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Numeric parameter values and the two textual forms they take in formulas.
//!
//! Coefficients are written with their default string form, which keeps the
//! integer/float distinction (`-1` versus `2.0`). Values and distances are
//! written with `%.17g`, so they survive a text round trip bit for bit.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Parameter value as supplied by the caller
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Numeric {
    Int(i64),
    Float(f64),
}

impl Numeric {
    pub fn as_f64(self) -> f64 {
        match self {
            Numeric::Int(v) => v as f64,
            Numeric::Float(v) => v,
        }
    }

    /// `%.17g` rendering
    pub fn to_general(self) -> String {
        format_general(self.as_f64(), 17)
    }

    pub fn is_finite(self) -> bool {
        self.as_f64().is_finite()
    }
}

impl PartialEq for Numeric {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Numeric::Int(a), Numeric::Int(b)) => a == b,
            _ => self.as_f64() == other.as_f64(),
        }
    }
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Numeric::Int(v) => write!(f, "{}", v),
            // Debug keeps a fractional part on integral floats ("2.0")
            Numeric::Float(v) => {
                let text = format!("{:?}", v);
                match text.split_once('e') {
                    // Signed exponent with at least two digits: 1e-05, 1e+16
                    Some((mantissa, exponent)) => {
                        let (sign, digits) = match exponent.strip_prefix('-') {
                            Some(digits) => ('-', digits),
                            None => ('+', exponent),
                        };
                        write!(f, "{}e{}{:0>2}", mantissa, sign, digits)
                    }
                    None => f.write_str(&text),
                }
            }
        }
    }
}

impl From<i64> for Numeric {
    fn from(value: i64) -> Self {
        Numeric::Int(value)
    }
}

impl From<i32> for Numeric {
    fn from(value: i32) -> Self {
        Numeric::Int(value as i64)
    }
}

impl From<f64> for Numeric {
    fn from(value: f64) -> Self {
        Numeric::Float(value)
    }
}

/// C `printf("%.<precision>g")` formatting.
pub fn format_general(value: f64, precision: usize) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value < 0.0 { "-inf" } else { "inf" }.to_string();
    }

    let precision = precision.max(1);
    let scientific = format!("{:.*e}", precision - 1, value);
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some(parts) => parts,
        None => return scientific,
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if exponent < -4 || exponent >= precision as i32 {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{}{:02}",
            strip_trailing_zeros(mantissa),
            sign,
            exponent.abs()
        )
    } else {
        let decimals = (precision as i32 - 1 - exponent) as usize;
        strip_trailing_zeros(&format!("{:.*}", decimals, value)).to_string()
    }
}

fn strip_trailing_zeros(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_string_form() {
        assert_eq!(Numeric::from(-1).to_string(), "-1");
        assert_eq!(Numeric::from(2.0).to_string(), "2.0");
        assert_eq!(Numeric::from(0.003).to_string(), "0.003");
    }

    #[test]
    fn test_default_string_exponents() {
        assert_eq!(Numeric::from(1e-5).to_string(), "1e-05");
        assert_eq!(Numeric::from(1e16).to_string(), "1e+16");
        assert_eq!(Numeric::from(2.5e-7).to_string(), "2.5e-07");
        assert_eq!(Numeric::from(-1.5e300).to_string(), "-1.5e+300");
        assert_eq!(Numeric::from(0.0001).to_string(), "0.0001");
        for value in [1e-5, 1e16, 2.5e-7] {
            assert_eq!(Numeric::from(value).to_string().parse::<f64>().unwrap(), value);
        }
    }

    #[test]
    fn test_general_form() {
        assert_eq!(format_general(1.0, 17), "1");
        assert_eq!(format_general(-1.0, 17), "-1");
        assert_eq!(format_general(0.5, 17), "0.5");
        assert_eq!(format_general(0.003, 17), "0.0030000000000000001");
        assert_eq!(format_general(0.1, 17), "0.10000000000000001");
        assert_eq!(format_general(12.5, 17), "12.5");
        assert_eq!(format_general(0.0, 17), "0");
        assert_eq!(format_general(1e20, 17), "1e+20");
        assert_eq!(format_general(1.5e-7, 17), "1.4999999999999999e-07");
        assert_eq!(format_general(123456.0, 3), "1.23e+05");
    }

    #[test]
    fn test_general_form_round_trips() {
        for value in [0.1, 1.0 / 3.0, 12.494_321, -7.25e-3, 6.02e23] {
            let text = format_general(value, 17);
            assert_eq!(text.parse::<f64>().unwrap(), value);
        }
    }

    #[test]
    fn test_mixed_equality() {
        assert_eq!(Numeric::Int(2), Numeric::Float(2.0));
        assert_ne!(Numeric::Int(2), Numeric::Float(2.5));
    }

    #[test]
    fn test_json_keeps_integer_kind() {
        let values: Vec<Numeric> = serde_json::from_str("[-1, 2.0]").unwrap();
        assert!(matches!(values[0], Numeric::Int(-1)));
        assert!(matches!(values[1], Numeric::Float(v) if v == 2.0));
    }
}
