pub mod public;
pub mod rest;

pub use public::BitvavoPublic;
pub use rest::BitvavoClient;

use serde::Deserialize;

use common::{BestBidAsk, Error, Result};

pub(crate) const BASE_URL: &str = "https://api.bitvavo.com/v2";

// ─── Shared response types ────────────────────────────────────────────────────

/// Error body returned by Bitvavo on any failed call.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ErrorBody {
    error_code: Option<i64>,
    error: Option<String>,
}

/// Map a non-success response (or a success body carrying `errorCode`) to an error.
pub(crate) fn exchange_error(status: reqwest::StatusCode, body: &str) -> Error {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            error_code: Some(code),
            error,
        }) => Error::OrderRejected {
            reason: format!(
                "Bitvavo error {code}: {}",
                error.unwrap_or_else(|| "unknown".into())
            ),
        },
        _ => Error::Http(format!("HTTP {status}: {body}")),
    }
}

pub(crate) fn parse_price(field: &str, value: &str) -> Result<f64> {
    let price: f64 = value
        .trim()
        .parse()
        .map_err(|_| Error::Http(format!("{field} is not a number: '{value}'")))?;
    if price.is_finite() && price > 0.0 {
        Ok(price)
    } else {
        Err(Error::Http(format!("{field} is not a usable price: {price}")))
    }
}

/// `GET /{market}/book?depth=1`
#[derive(Deserialize)]
pub(crate) struct BookResponse {
    #[serde(default)]
    bids: Vec<Vec<String>>,
    #[serde(default)]
    asks: Vec<Vec<String>>,
}

pub(crate) fn parse_book(body: &str) -> Result<BestBidAsk> {
    let book: BookResponse = serde_json::from_str(body)?;
    let top = |levels: &[Vec<String>], side: &str| -> Result<f64> {
        let level = levels
            .first()
            .and_then(|l| l.first())
            .ok_or_else(|| Error::Http(format!("order book has no {side}")))?;
        parse_price(side, level)
    };
    Ok(BestBidAsk {
        bid: top(&book.bids, "bids")?,
        ask: top(&book.asks, "asks")?,
    })
}
