//! Interest rate policy table
//!
//! Rates are a fixed regulatory table keyed by term, not a formula. Any
//! term outside the table is rejected; nothing defaults silently.

use rust_decimal::Decimal;

use crate::error::ApiError;

/// Loan terms offered, in weeks.
pub const OFFERED_TERMS: [i32; 4] = [1, 2, 3, 4];

/// Look up the interest rate (as a decimal fraction) for a loan term.
pub fn rate_for(term_weeks: i32) -> Result<Decimal, ApiError> {
    match term_weeks {
        1 => Ok(Decimal::new(15, 2)),
        2 => Ok(Decimal::new(25, 2)),
        3 => Ok(Decimal::new(35, 2)),
        4 => Ok(Decimal::new(45, 2)),
        other => Err(ApiError::InvalidTerm(other)),
    }
}
