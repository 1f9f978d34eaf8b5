//! Best-effort market price lookup
//!
//! The ledger never consults this module; a quote only informs the value a
//! caller feeds into a transition. Lookups collapse every failure into
//! [`PriceResult::Unavailable`] after logging it, so a missing quote can
//! never be mistaken for a real zero-valued price.

use std::collections::HashMap;
use std::time::Duration;

use log::warn;

/// Outcome of a quote lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PriceResult {
    Price(f64),
    Unavailable,
}

/// A source of spot prices for ticker symbols.
///
/// Implementations are best-effort: they must not panic or error past this
/// boundary, must not retry internally, and must return within the bound
/// the caller configured at construction.
pub trait PriceQuoteClient {
    fn fetch_price(&self, ticker: &str) -> PriceResult;
}

const QUOTE_ENDPOINT: &str = "http://finance.yahoo.com/d/quotes.csv";

/// Scrapes the last-trade price from the Yahoo quotes CSV feed.
pub struct YahooQuoteClient {
    client: reqwest::blocking::Client,
}

impl YahooQuoteClient {
    /// The timeout bounds the whole request; on expiry the lookup reports
    /// `Unavailable` instead of keeping the caller waiting.
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client");

        Self { client }
    }
}

impl PriceQuoteClient for YahooQuoteClient {
    fn fetch_price(&self, ticker: &str) -> PriceResult {
        let url = format!("{QUOTE_ENDPOINT}?s={}&f=l1", ticker.to_uppercase());

        let body = self
            .client
            .get(&url)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.text());
        let body = match body {
            Ok(body) => body,
            Err(e) => {
                warn!("error retrieving price for {ticker}: {e}");
                return PriceResult::Unavailable;
            }
        };

        match body.lines().next().and_then(parse_quote_line) {
            Some(price) => PriceResult::Price(price),
            None => {
                warn!("feed returned no usable quote for {ticker}");
                PriceResult::Unavailable
            }
        }
    }
}

/// Fixed symbol table, for tests and offline runs.
#[derive(Debug, Default)]
pub struct FixedQuoteClient {
    prices: HashMap<String, f64>,
}

impl FixedQuoteClient {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_price(mut self, ticker: &str, price: f64) -> Self {
        self.prices.insert(ticker.to_uppercase(), price);
        self
    }
}

impl PriceQuoteClient for FixedQuoteClient {
    fn fetch_price(&self, ticker: &str) -> PriceResult {
        match self.prices.get(&ticker.to_uppercase()) {
            Some(price) => PriceResult::Price(*price),
            None => PriceResult::Unavailable,
        }
    }
}

// First field of a quotes CSV line. "N/A" and anything that does not parse
// as a finite number is no quote at all.
fn parse_quote_line(line: &str) -> Option<f64> {
    let first = split_csv_fields(line).into_iter().next()?;
    let first = first.trim().trim_matches('"');
    if first.is_empty() || first == "N/A" {
        return None;
    }
    first.parse::<f64>().ok().filter(|p| p.is_finite())
}

// split on commas that sit outside double quotes
fn split_csv_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in line.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);

    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_plain_price() {
        assert_eq!(parse_quote_line("128.45"), Some(128.45));
    }

    #[test]
    fn parses_the_first_field_only() {
        assert_eq!(parse_quote_line("42.0,\"Some Corp, Inc.\",N/A"), Some(42.0));
    }

    #[test]
    fn quoted_commas_do_not_split_fields() {
        let fields = split_csv_fields("\"1,234.50\",second");
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[1], "second");
    }

    #[test]
    fn not_available_is_no_quote() {
        assert_eq!(parse_quote_line("N/A"), None);
    }

    #[test]
    fn garbage_is_no_quote() {
        assert_eq!(parse_quote_line("<html>rate limited</html>"), None);
        assert_eq!(parse_quote_line(""), None);
        assert_eq!(parse_quote_line("NaN"), None);
    }

    #[test]
    fn fixed_client_answers_case_insensitively() {
        let client = FixedQuoteClient::new().set_price("abc", 12.5);

        assert_eq!(client.fetch_price("ABC"), PriceResult::Price(12.5));
        assert_eq!(client.fetch_price("XYZ"), PriceResult::Unavailable);
    }
}
