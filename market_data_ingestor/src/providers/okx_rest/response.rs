//! OKX v5 response envelope and row decoding.
//!
//! Every endpoint wraps its payload as `{"code": "0", "msg": "", "data": [...]}` with
//! rows encoded as arrays of strings. Rows that fail to decode are skipped, never
//! patched with defaults.

use serde::Deserialize;

use crate::models::{candle::Candle, open_interest::OpenInterestReading};

#[derive(Deserialize, Debug)]
pub struct OkxEnvelope {
    pub code: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: Vec<Vec<String>>,
}

impl OkxEnvelope {
    pub fn is_ok(&self) -> bool {
        self.code == "0"
    }
}

/// `[ts, o, h, l, c, vol, volCcy, volCcyQuote, confirm]`
///
/// Returns `None` for rows that are still forming (`confirm == "0"`) or malformed.
pub fn candle_from_row(row: &[String]) -> Option<Candle> {
    if row.len() < 6 {
        return None;
    }
    if row.get(8).is_some_and(|confirm| confirm == "0") {
        return None;
    }
    let num = |i: usize| row.get(i).and_then(|v| v.parse::<f64>().ok());

    let volume_base = num(6).or_else(|| num(5))?;
    Some(Candle {
        bucket_start: row[0].parse().ok()?,
        open: num(1)?,
        high: num(2)?,
        low: num(3)?,
        close: num(4)?,
        volume_base,
        volume_quote: num(7),
    })
}

/// `[ts, oi, oiCcy, oiUsd]`
pub fn open_interest_from_row(row: &[String]) -> Option<OpenInterestReading> {
    if row.len() < 4 {
        return None;
    }
    let num = |i: usize| row[i].parse::<f64>().ok();
    Some(OpenInterestReading {
        bucket_start: row[0].parse().ok()?,
        open_interest_contracts: num(1)?,
        open_interest_base: num(2)?,
        open_interest_quote: num(3)?,
    })
}
