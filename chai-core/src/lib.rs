//! CHAI core library: catalog cache, dependency reconciliation, diffing and
//! TeaRank.
//!
//! The main entry point is [`pipeline::IngestPipeline`], which runs one
//! registry's records through Normalize → Diff → Apply → Rank against a
//! [`store::CatalogStore`].

pub mod cache;
pub mod config;
pub mod diff;
pub mod error;
pub mod pipeline;
pub mod rank;
pub mod reconcile;
pub mod store;
pub mod types;
