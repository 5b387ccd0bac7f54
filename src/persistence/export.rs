//! CSV export of stored quotes.

use std::io::{self, Write};

use rust_decimal::Decimal;

use super::models::StoredQuote;
use crate::domain::units::from_wei;

/// Column names, in output order.
pub const CSV_HEADER: [&str; 10] = [
    "timestamp",
    "datetime",
    "contract",
    "cover_currency",
    "cover_period",
    "requested_amount",
    "cover_amount",
    "reason",
    "price_in_cover_currency",
    "price_in_token",
];

/// Writes `quotes` as CSV with a header row. Prices are in whole units with
/// four decimals.
///
/// # Errors
///
/// Returns any I/O error from `out`, or [`io::ErrorKind::InvalidData`] for a
/// price outside the decimal range.
pub fn write_quotes_csv<W: Write>(quotes: &[StoredQuote], mut out: W) -> io::Result<()> {
    writeln!(out, "{}", CSV_HEADER.join(","))?;
    for quote in quotes {
        let reason = if quote.amount < quote.requested_amount {
            "capacityLimitExceed"
        } else {
            "ok"
        };
        writeln!(
            out,
            "{},{},{},{},{},{},{},{},{:.4},{:.4}",
            quote.generated_at.timestamp_millis(),
            quote.generated_at.to_rfc3339(),
            quote.contract,
            quote.currency,
            quote.period_days,
            quote.requested_amount,
            quote.amount,
            reason,
            whole_units(quote.price)?,
            whole_units(quote.price_in_token)?,
        )?;
    }
    out.flush()
}

fn whole_units(wei: u128) -> io::Result<Decimal> {
    from_wei(wei).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
