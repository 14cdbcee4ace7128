//! Bybit REST price fetcher.
//!
//! Prices come from the v5 spot tickers endpoint. `lastPrice` is parsed
//! straight from its decimal string into `FixedPoint`.

use crate::error::FeedError;
use async_trait::async_trait;
use pricestep_core::FixedPoint;
use pricestep_engine::{PriceError, PriceSource};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;

/// Bybit error code for unsupported symbols.
const RET_CODE_INVALID_SYMBOL: i64 = 10001;
/// Bybit error code for rate limiting.
const RET_CODE_RATE_LIMIT: i64 = 10006;

#[derive(Debug, Deserialize)]
struct TickersResponse {
    #[serde(rename = "retCode")]
    ret_code: i64,
    #[serde(rename = "retMsg", default)]
    ret_msg: String,
    #[serde(default)]
    result: Option<TickersResult>,
}

#[derive(Debug, Deserialize)]
struct TickersResult {
    #[serde(default)]
    list: Vec<Ticker>,
}

#[derive(Debug, Deserialize)]
struct Ticker {
    symbol: String,
    #[serde(rename = "lastPrice", default)]
    last_price: String,
}

fn parse_tickers(body: &str) -> Result<Vec<Ticker>, FeedError> {
    let response: TickersResponse = serde_json::from_str(body)?;
    match response.ret_code {
        0 => Ok(response.result.map(|r| r.list).unwrap_or_default()),
        RET_CODE_RATE_LIMIT => Err(FeedError::RateLimitExceeded),
        code => Err(FeedError::Api {
            code,
            message: response.ret_msg,
        }),
    }
}

/// Parse the last traded price of `pair` (e.g. `BTCUSDT`) from a tickers body.
pub fn parse_last_price(body: &str, pair: &str) -> Result<FixedPoint, FeedError> {
    let tickers = match parse_tickers(body) {
        Ok(tickers) => tickers,
        Err(FeedError::Api { code, .. }) if code == RET_CODE_INVALID_SYMBOL => {
            return Err(FeedError::SymbolNotFound(pair.to_string()));
        }
        Err(e) => return Err(e),
    };

    let ticker = tickers
        .iter()
        .find(|t| t.symbol.eq_ignore_ascii_case(pair))
        .ok_or_else(|| FeedError::SymbolNotFound(pair.to_string()))?;

    let price: FixedPoint = ticker
        .last_price
        .parse()
        .map_err(|e| FeedError::ParseError(format!("{}: {}", pair, e)))?;

    if price.is_zero() {
        return Err(FeedError::ParseError(format!("{}: zero last price", pair)));
    }
    Ok(price)
}

/// Base assets of every spot pair quoted in `quote` (`BTCUSDT` -> `BTC`).
pub fn parse_symbol_list(body: &str, quote: &str) -> Result<BTreeSet<String>, FeedError> {
    let tickers = parse_tickers(body)?;
    Ok(tickers
        .into_iter()
        .filter_map(|t| t.symbol.strip_suffix(quote).map(str::to_string))
        .filter(|base| !base.is_empty())
        .collect())
}

/// Bybit REST price fetcher.
#[derive(Debug, Clone)]
pub struct BybitRestFetcher {
    client: reqwest::Client,
    base_url: String,
    quote: String,
}

impl BybitRestFetcher {
    pub const BASE_URL: &'static str = "https://api.bybit.com";
    pub const DEFAULT_QUOTE: &'static str = "USDT";

    /// Create a fetcher with a 10 s request timeout.
    pub fn new(base_url: impl Into<String>, quote: impl Into<String>) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            quote: quote.into().to_uppercase(),
        })
    }

    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// Exchange pair for a base symbol (`BTC` -> `BTCUSDT`).
    pub fn pair_for(&self, symbol: &str) -> String {
        format!("{}{}", symbol.trim().to_uppercase(), self.quote)
    }

    async fn fetch_tickers(&self, pair: Option<&str>) -> Result<String, FeedError> {
        let url = format!("{}/v5/market/tickers", self.base_url);
        let mut request = self.client.get(&url).query(&[("category", "spot")]);
        if let Some(pair) = pair {
            request = request.query(&[("symbol", pair)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.as_u16() == 429 || status.as_u16() == 403 {
            return Err(FeedError::RateLimitExceeded);
        }
        if !status.is_success() {
            return Err(FeedError::ConnectionFailed(format!("HTTP {}", status)));
        }
        Ok(response.text().await?)
    }

    /// Fetch the last price for one base symbol.
    pub async fn fetch_price(&self, symbol: &str) -> Result<FixedPoint, FeedError> {
        let pair = self.pair_for(symbol);
        let body = self.fetch_tickers(Some(&pair)).await?;
        let price = parse_last_price(&body, &pair)?;
        debug!(symbol = symbol, price = %price, "Bybit: fetched price");
        Ok(price)
    }

    /// Fetch all base symbols tradable against the quote currency.
    pub async fn fetch_symbols(&self) -> Result<BTreeSet<String>, FeedError> {
        let body = self.fetch_tickers(None).await?;
        let symbols = parse_symbol_list(&body, &self.quote)?;
        debug!(count = symbols.len(), quote = %self.quote, "Bybit: fetched symbol list");
        Ok(symbols)
    }
}

#[async_trait]
impl PriceSource for BybitRestFetcher {
    async fn get_price(&self, symbol: &str) -> Result<FixedPoint, PriceError> {
        self.fetch_price(symbol).await.map_err(|e| {
            debug!(symbol = symbol, transient = e.is_transient(), error = %e, "Bybit: price lookup failed");
            e.into_price_error(symbol)
        })
    }

    async fn list_symbols(&self) -> Result<BTreeSet<String>, PriceError> {
        self.fetch_symbols()
            .await
            .map_err(|e| PriceError::ListUnavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const BTC_BODY: &str = r#"{
        "retCode": 0,
        "retMsg": "OK",
        "result": {
            "category": "spot",
            "list": [
                {"symbol": "BTCUSDT", "bid1Price": "97120.1", "ask1Price": "97120.2", "lastPrice": "97120.15"}
            ]
        },
        "time": 1700000000000
    }"#;

    #[test]
    fn test_parse_last_price() {
        let price = parse_last_price(BTC_BODY, "BTCUSDT").unwrap();
        assert_eq!(price, "97120.15".parse::<FixedPoint>().unwrap());
    }

    #[test]
    fn test_parse_last_price_sub_cent() {
        let body = r#"{"retCode":0,"retMsg":"OK","result":{"list":[{"symbol":"PEPEUSDT","lastPrice":"0.00001234"}]}}"#;
        let price = parse_last_price(body, "PEPEUSDT").unwrap();
        assert_eq!(price.0, 1234);
    }

    #[test]
    fn test_parse_invalid_symbol() {
        let body = r#"{"retCode":10001,"retMsg":"Not supported symbols","result":{}}"#;
        let err = parse_last_price(body, "NOPEUSDT").unwrap_err();
        assert!(matches!(err, FeedError::SymbolNotFound(ref s) if s == "NOPEUSDT"));
    }

    #[test]
    fn test_parse_empty_list_is_not_found() {
        let body = r#"{"retCode":0,"retMsg":"OK","result":{"list":[]}}"#;
        assert!(matches!(
            parse_last_price(body, "BTCUSDT"),
            Err(FeedError::SymbolNotFound(_))
        ));
    }

    #[test]
    fn test_parse_rate_limited() {
        let body = r#"{"retCode":10006,"retMsg":"Too many visits!","result":{}}"#;
        assert!(matches!(
            parse_last_price(body, "BTCUSDT"),
            Err(FeedError::RateLimitExceeded)
        ));
    }

    #[test]
    fn test_parse_bad_price_string() {
        let body = r#"{"retCode":0,"result":{"list":[{"symbol":"BTCUSDT","lastPrice":""}]}}"#;
        assert!(matches!(
            parse_last_price(body, "BTCUSDT"),
            Err(FeedError::ParseError(_))
        ));
    }

    #[test]
    fn test_parse_malformed_json() {
        assert!(matches!(
            parse_last_price("<html>", "BTCUSDT"),
            Err(FeedError::ParseError(_))
        ));
    }

    #[test]
    fn test_parse_symbol_list_filters_quote() {
        let body = r#"{"retCode":0,"result":{"list":[
            {"symbol":"BTCUSDT","lastPrice":"1"},
            {"symbol":"ETHUSDT","lastPrice":"1"},
            {"symbol":"ETHBTC","lastPrice":"1"},
            {"symbol":"USDT","lastPrice":"1"},
            {"symbol":"SOLUSDC","lastPrice":"1"}
        ]}}"#;
        let symbols = parse_symbol_list(body, "USDT").unwrap();
        assert_eq!(
            symbols.into_iter().collect::<Vec<_>>(),
            vec!["BTC".to_string(), "ETH".to_string()]
        );
    }

    #[test]
    fn test_pair_for() {
        let fetcher = BybitRestFetcher::new("https://api.bybit.com/", "usdt").unwrap();
        assert_eq!(fetcher.pair_for(" btc"), "BTCUSDT");
        assert_eq!(fetcher.quote(), "USDT");
    }
}
