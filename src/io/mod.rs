//! Flat tabular file interfaces: offset-table ingest and result export.

pub mod export;
pub mod ingest;
