//! Exchange-facing half of the market data synchronizer: the data model, the
//! rate-limited retrying fetcher, and the candle / open-interest sources.

pub mod fetch;
pub mod models;
pub mod providers;
