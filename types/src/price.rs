//! Locale-formatted price strings to integer minor units and back.
//!
//! Pricing sources return prices the way a French storefront displays them
//! (`"12,50€"`, `"1 234,50 €"`). Everything downstream works in cents, so the
//! conversion happens exactly once, here, without going through `f64`.

use thiserror::Error;

const CURRENCY_SYMBOLS: &[char] = &['€', '$', '£'];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PriceParseError {
    #[error("formatted price is empty")]
    Empty,
    #[error("formatted price {0:?} is negative")]
    Negative(String),
    #[error("formatted price {0:?} is not a decimal number")]
    Invalid(String),
    #[error("formatted price {0:?} does not fit in minor units")]
    Overflow(String),
}

/// Parse a formatted price into minor currency units.
///
/// Whitespace (including the no-break spaces used as thousands separators) and
/// currency symbols are ignored. Either `,` or `.` is accepted as the decimal
/// separator, at most once. Digits past the second decimal are rounded half-up.
pub fn parse_formatted_price(formatted: &str) -> Result<u64, PriceParseError> {
    let cleaned: String = formatted
        .chars()
        .filter(|c| !c.is_whitespace() && !CURRENCY_SYMBOLS.contains(c))
        .collect();

    if cleaned.is_empty() {
        return Err(PriceParseError::Empty);
    }
    if cleaned.starts_with('-') {
        return Err(PriceParseError::Negative(formatted.to_string()));
    }

    let invalid = || PriceParseError::Invalid(formatted.to_string());
    let overflow = || PriceParseError::Overflow(formatted.to_string());

    let (whole, fraction) = match cleaned.split_once([',', '.']) {
        Some((whole, fraction)) => (whole, fraction),
        None => (cleaned.as_str(), ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }

    let whole_units = if whole.is_empty() {
        0
    } else {
        whole.parse::<u64>().map_err(|_| overflow())?
    };

    let digits: Vec<u64> = fraction
        .bytes()
        .map(|b| u64::from(b - b'0'))
        .collect();
    let cents = digits.first().copied().unwrap_or(0) * 10 + digits.get(1).copied().unwrap_or(0);
    let round_up = digits.get(2).is_some_and(|d| *d >= 5);

    whole_units
        .checked_mul(100)
        .and_then(|units| units.checked_add(cents))
        .and_then(|units| units.checked_add(u64::from(round_up)))
        .ok_or_else(overflow)
}

/// Render minor units the way `fr-FR` formats euros: `1 234,50 €`.
#[must_use]
pub fn format_euros(minor_units: u64) -> String {
    let whole = (minor_units / 100).to_string();
    let cents = minor_units % 100;

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }

    format!("{grouped},{cents:02} €")
}
