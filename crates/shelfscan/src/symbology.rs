//! Barcode symbologies and check-digit validation.
//!
//! Camera decoders report the symbology they decoded. Keyboard-wedge scanners
//! only send text, so the symbology is inferred from the shape of the symbol.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// A barcode symbology the decoder can be configured to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Symbology {
    /// UPC-A, 12 digits.
    #[serde(rename = "upc")]
    Upc,
    /// UPC-E, 8 digits (zero-suppressed UPC-A).
    #[serde(rename = "upc_e")]
    UpcE,
    /// EAN-13, 13 digits.
    #[serde(rename = "ean")]
    Ean,
    /// EAN-8, 8 digits.
    #[serde(rename = "ean_8")]
    Ean8,
    /// Code 128, any printable ASCII.
    #[serde(rename = "code_128")]
    Code128,
    /// Code 39, uppercase alphanumerics and `-. $/+%`.
    #[serde(rename = "code_39")]
    Code39,
}

impl Symbology {
    /// Every supported symbology.
    pub const ALL: [Symbology; 6] = [
        Self::Upc,
        Self::UpcE,
        Self::Ean,
        Self::Ean8,
        Self::Code128,
        Self::Code39,
    ];

    /// True for the GS1 retail symbologies that carry a mod-10 check digit.
    #[must_use]
    pub fn has_check_digit(self) -> bool {
        matches!(self, Self::Upc | Self::UpcE | Self::Ean | Self::Ean8)
    }

    /// Symbologies whose structure `code` fits, most specific first.
    #[must_use]
    pub fn candidates(code: &str) -> Vec<Symbology> {
        if digits().is_match(code) {
            match code.len() {
                12 => return vec![Self::Upc],
                13 => return vec![Self::Ean],
                8 if code.starts_with(['0', '1']) => return vec![Self::UpcE, Self::Ean8],
                8 => return vec![Self::Ean8],
                _ => {}
            }
        }
        if code39_charset().is_match(code) {
            vec![Self::Code39, Self::Code128]
        } else if !code.is_empty() && code.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
            vec![Self::Code128]
        } else {
            Vec::new()
        }
    }

    /// Check that `code` is a well-formed symbol of this symbology.
    #[must_use]
    pub fn verify(self, code: &str) -> bool {
        match self {
            Self::Upc | Self::Ean | Self::Ean8 => gtin_check_digit_ok(code),
            Self::UpcE => expand_upc_e(code).is_some_and(|upc| gtin_check_digit_ok(&upc)),
            Self::Code128 | Self::Code39 => Self::candidates(code).contains(&self),
        }
    }
}

impl fmt::Display for Symbology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Upc => "UPC-A",
            Self::UpcE => "UPC-E",
            Self::Ean => "EAN-13",
            Self::Ean8 => "EAN-8",
            Self::Code128 => "Code 128",
            Self::Code39 => "Code 39",
        };
        f.write_str(name)
    }
}

/// Pick the symbology to accept `code` as, given the enabled readers.
///
/// Returns `None` when no enabled symbology fits, or when `verify_check_digits`
/// is set and every fitting GS1 symbology fails its check digit.
#[must_use]
pub fn accept(code: &str, enabled: &[Symbology], verify_check_digits: bool) -> Option<Symbology> {
    Symbology::candidates(code)
        .into_iter()
        .filter(|s| enabled.contains(s))
        .find(|s| !verify_check_digits || !s.has_check_digit() || s.verify(code))
}

fn digits() -> &'static Regex {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    DIGITS.get_or_init(|| Regex::new(r"^[0-9]+$").expect("static regex is valid"))
}

fn code39_charset() -> &'static Regex {
    static CODE39: OnceLock<Regex> = OnceLock::new();
    CODE39.get_or_init(|| Regex::new(r"^[0-9A-Z\-. $/+%]+$").expect("static regex is valid"))
}

/// Validate the trailing GS1 mod-10 check digit of a numeric code.
fn gtin_check_digit_ok(code: &str) -> bool {
    if code.len() < 2 || !digits().is_match(code) {
        return false;
    }
    let values: Vec<u32> = code.chars().filter_map(|c| c.to_digit(10)).collect();
    let (body, check) = values.split_at(values.len() - 1);
    // Weight 3 on the digit next to the check digit, alternating leftwards.
    let sum: u32 = body
        .iter()
        .rev()
        .enumerate()
        .map(|(i, d)| if i % 2 == 0 { d * 3 } else { *d })
        .sum();
    (10 - sum % 10) % 10 == check[0]
}

/// Expand an 8-digit UPC-E symbol to its 12-digit UPC-A equivalent.
#[must_use]
pub fn expand_upc_e(code: &str) -> Option<String> {
    if code.len() != 8 || !digits().is_match(code) || !code.starts_with(['0', '1']) {
        return None;
    }
    let d: Vec<char> = code.chars().collect();
    let (system, body, check) = (d[0], &d[1..7], d[7]);
    let middle: String = match body[5] {
        '0' | '1' | '2' => [
            body[0], body[1], body[5], '0', '0', '0', '0', body[2], body[3], body[4],
        ]
        .iter()
        .collect(),
        '3' => [body[0], body[1], body[2], '0', '0', '0', '0', '0', body[3], body[4]]
            .iter()
            .collect(),
        '4' => [body[0], body[1], body[2], body[3], '0', '0', '0', '0', '0', body[4]]
            .iter()
            .collect(),
        _ => [body[0], body[1], body[2], body[3], body[4], '0', '0', '0', '0', body[5]]
            .iter()
            .collect(),
    };
    Some(format!("{system}{middle}{check}"))
}
