//! OHLCV domain model, quote providers and the on-disk CSV working set.
//!
//! The collection step lives here: [`collect::Collector`] pulls bars from a
//! [`providers::DataProvider`] and merges them into the per-series master CSV
//! files under [`io::layout::DataLayout`]. Everything downstream (quality
//! checks, uploads) reads those files back as [`models::bar_series::BarSeries`].

pub mod collect;
pub mod io;
pub mod models;
pub mod providers;
