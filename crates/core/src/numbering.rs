//! Receipt-number and station-code formatting.
//!
//! The remote platform distinguishes a sale from its reversal solely by the
//! sign of the zero-padded `numero` field, so the encode and decode halves
//! here must stay exact inverses of each other.

use cashlink_domain::{CashlinkError, Result};

const RECEIPT_WIDTH: usize = 8;
const STATION_WIDTH: usize = 5;

/// Render a receipt number for the wire: zero-padded to eight digits,
/// `-` prefixed when the record reverses a sale.
pub fn format_receipt(receipt_number: i64, reversal: bool) -> String {
    let base = receipt_number.unsigned_abs();
    if reversal {
        format!("-{:0width$}", base, width = RECEIPT_WIDTH)
    } else {
        format!("{:0width$}", base, width = RECEIPT_WIDTH)
    }
}

/// Reverse [`format_receipt`]: recover the receipt number and the reversal
/// flag from a wire `numero`.
///
/// # Errors
/// Returns `CashlinkError::InvalidInput` when the value is not a (possibly
/// negated) digit string.
pub fn parse_receipt(number: &str) -> Result<(i64, bool)> {
    let trimmed = number.trim();
    let (digits, reversal) = match trimmed.strip_prefix('-') {
        Some(rest) => (rest, true),
        None => (trimmed, false),
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CashlinkError::InvalidInput(format!(
            "malformed record number on the wire: {number:?}"
        )));
    }

    let value = digits.parse::<i64>().map_err(|e| {
        CashlinkError::InvalidInput(format!("record number out of range: {number:?} ({e})"))
    })?;

    Ok((value, reversal))
}

/// Normalize a station id to the platform's five-digit code: digits only,
/// keeping the last five, zero-filled on the left.
pub fn station_code(station_id: i64) -> String {
    let digits: String =
        station_id.unsigned_abs().to_string().chars().filter(char::is_ascii_digit).collect();
    if digits.len() > STATION_WIDTH {
        digits[digits.len() - STATION_WIDTH..].to_string()
    } else {
        format!("{:0>width$}", digits, width = STATION_WIDTH)
    }
}
