use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use chrono::NaiveDate;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::config::{FetchConfig, MarketConfig};
use crate::error::{AppError, Result};
use crate::models::{CompanyOverview, PriceBar};

/// Result of one endpoint call once the rate-limit sentinel has been checked.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiReply<T> {
    /// The payload carried the rate-limit note instead of data.
    RateLimited(String),
    Data(T),
}

/// The two market-data endpoints, each billed against its own API key.
pub trait MarketData {
    async fn company_overview(&self, ticker: &str) -> Result<ApiReply<CompanyOverview>>;
    async fn daily_prices(&self, ticker: &str) -> Result<ApiReply<Vec<PriceBar>>>;
}

#[derive(Debug, Deserialize)]
struct OverviewResponse {
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Symbol")]
    symbol: Option<String>,
    #[serde(rename = "Name", default, deserialize_with = "optional_text")]
    name: Option<String>,
    #[serde(rename = "Currency", default, deserialize_with = "optional_text")]
    currency: Option<String>,
    #[serde(rename = "Country", default, deserialize_with = "optional_text")]
    country: Option<String>,
    #[serde(rename = "Sector", default, deserialize_with = "optional_text")]
    sector: Option<String>,
    #[serde(rename = "Industry", default, deserialize_with = "optional_text")]
    industry: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DailySeriesResponse {
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Time Series (Daily)")]
    series: Option<BTreeMap<NaiveDate, DailyBar>>,
}

#[derive(Debug, Deserialize)]
struct DailyBar {
    #[serde(rename = "1. open", deserialize_with = "number_text")]
    open: f64,
    #[serde(rename = "2. high", deserialize_with = "number_text")]
    high: f64,
    #[serde(rename = "3. low", deserialize_with = "number_text")]
    low: f64,
    #[serde(rename = "4. close", deserialize_with = "number_text")]
    close: f64,
    // TIME_SERIES_DAILY_ADJUSTED reports volume as field 6.
    #[serde(rename = "5. volume", alias = "6. volume", deserialize_with = "number_text")]
    volume: i64,
}

/// The API sends every value as a string and uses "None" for missing text.
fn optional_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && s != "None" && s != "-"))
}

fn number_text<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let text = String::deserialize(deserializer)?;
    text.trim().parse().map_err(serde::de::Error::custom)
}

fn rate_limit_note(note: Option<String>, information: Option<String>) -> Option<String> {
    note.or(information)
}

fn overview_reply(ticker: &str, response: OverviewResponse) -> Result<ApiReply<CompanyOverview>> {
    if let Some(note) = rate_limit_note(response.note, response.information) {
        return Ok(ApiReply::RateLimited(note));
    }
    if let Some(message) = response.error_message {
        return Err(AppError::MarketApi(format!("overview {ticker}: {message}")));
    }
    if response.symbol.is_none() {
        return Err(AppError::MarketApi(format!("overview {ticker}: empty response")));
    }
    Ok(ApiReply::Data(CompanyOverview {
        name: response.name,
        currency: response.currency,
        country: response.country,
        sector: response.sector,
        industry: response.industry,
    }))
}

fn prices_reply(ticker: &str, response: DailySeriesResponse) -> Result<ApiReply<Vec<PriceBar>>> {
    if let Some(note) = rate_limit_note(response.note, response.information) {
        return Ok(ApiReply::RateLimited(note));
    }
    if let Some(message) = response.error_message {
        return Err(AppError::MarketApi(format!("prices {ticker}: {message}")));
    }
    let series = response
        .series
        .ok_or_else(|| AppError::MarketApi(format!("prices {ticker}: no daily series")))?;

    Ok(ApiReply::Data(
        series
            .into_iter()
            .map(|(date, bar)| PriceBar {
                date,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
            })
            .collect(),
    ))
}

pub struct AlphaVantageClient {
    client: Client,
    api_url: String,
    info_api_key: String,
    price_api_key: String,
}

impl AlphaVantageClient {
    /// Fails when either API key is missing.
    pub fn new(market: &MarketConfig, fetch: &FetchConfig) -> Result<Self> {
        let (info_api_key, price_api_key) = market.api_keys()?;
        let client = Client::builder().timeout(fetch.timeout()).build()?;
        Ok(Self {
            client,
            api_url: market.api_url.clone(),
            info_api_key,
            price_api_key,
        })
    }

    async fn query<R: DeserializeOwned>(&self, function: &str, ticker: &str, api_key: &str) -> Result<R> {
        let url = format!(
            "{}?function={}&symbol={}&outputsize=compact&apikey={}",
            self.api_url,
            function,
            urlencoding::encode(ticker),
            urlencoding::encode(api_key),
        );
        debug!(function, ticker, "Calling market data API");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(AppError::MarketApi(format!(
                "{function} {ticker}: HTTP {}",
                response.status()
            )));
        }
        Ok(response.json::<R>().await?)
    }
}

impl MarketData for AlphaVantageClient {
    async fn company_overview(&self, ticker: &str) -> Result<ApiReply<CompanyOverview>> {
        let response: OverviewResponse = self.query("OVERVIEW", ticker, &self.info_api_key).await?;
        overview_reply(ticker, response)
    }

    async fn daily_prices(&self, ticker: &str) -> Result<ApiReply<Vec<PriceBar>>> {
        let response: DailySeriesResponse = self
            .query("TIME_SERIES_DAILY", ticker, &self.price_api_key)
            .await?;
        prices_reply(ticker, response)
    }
}
