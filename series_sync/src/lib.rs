//! Keeps a per-(symbol, interval) CSV series in step with the exchange.
//!
//! Each cycle works out the most recently closed bucket ([`clock`]), fetches its
//! candle and open interest concurrently, merges them ([`reconcile`]) and appends the
//! result to an append-only file ([`store`]). [`sync_loop`] drives the cadence,
//! [`backfill`] seeds a fresh file, and [`ledger`] reads files back for audit.

#![warn(missing_docs)]

pub mod backfill;
pub mod clock;
pub mod config;
pub mod ledger;
pub mod reconcile;
pub mod runner;
pub mod store;
pub mod sync_loop;
