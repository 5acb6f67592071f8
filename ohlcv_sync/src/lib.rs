//! Delta upload and quality checks for OHLCV series.
//!
//! - [`upload::DeltaUploader`] appends the part of a series newer than a
//!   target's watermark, written once against [`store::StoreHandle`].
//! - [`store`] holds the targets: SQLite and PostgreSQL through diesel, a
//!   Delta Lake warehouse, and an in-memory store for tests.
//! - [`quality::evaluate`] produces advisory findings for one series.

pub mod db;
pub mod models;
pub mod quality;
pub mod schema;
pub mod store;
pub mod tz;
pub mod upload;
