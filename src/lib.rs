//! Discovery of SRA samples sequenced on both short-read and long-read
//! platforms.
//!
//! Two entry points share the same classification logic: a bulk pipeline
//! ([`orchestrator`]) that scans a fixed list of accessions with a worker
//! pool, and an incremental [`search`] driver that pages through an Entrez
//! query until enough hybrid samples are confirmed.

pub mod app;
pub mod batch;
pub mod cancel;
pub mod checkpoint;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetcher;
pub mod grouping;
pub mod input;
pub mod orchestrator;
pub mod output;
pub mod platform;
pub mod progress;
pub mod query;
pub mod retry;
pub mod search;
pub mod sra;
pub mod summary;
