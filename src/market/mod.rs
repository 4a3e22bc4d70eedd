//! Alpha Vantage company overview and daily price pipeline.

mod alphavantage;
mod updater;

pub use alphavantage::{AlphaVantageClient, ApiReply, MarketData};
pub use updater::{StockUpdater, UpdateReport};
