//! # BNS Indexer
//!
//! Crawls the Blockstack Naming Service and builds a document index of every
//! registered name: its blockchain record, its zone file and the profile the
//! zone file points to.
//!
//! ## Overview
//!
//! A crawl runs as a staged pipeline over bounded queues:
//!
//! - **Discovery**: lists namespaces, then pages through each namespace and
//!   fetches the blockchain record of every name
//! - **Zone files**: one bulk zone file fetch per discovered page
//! - **Profiles**: resolves the profile advertised by a name's zone file
//! - **Persistence**: validates and upserts one document per name
//!
//! Every stage reports upstream block heights to a shared [`Cursor`] and
//! counts its throughput in [`PipelineStats`].

// Pipeline
/// Crawl orchestration
pub mod indexer;
/// Namespace paging and the page-fetch limiter
pub mod page_fetcher;
/// Zone file, profile and persistence worker pools
pub mod pipeline;

// Domain Types
/// Records, batches and stored documents
pub mod record;
/// Zone file parsing
pub mod zonefile;
/// Profile resolution and validation
pub mod profile;

// Infrastructure
/// Naming service RPC client
pub mod client;
/// Document store
pub mod store;
/// PostgreSQL pool and schema setup
pub mod database;
/// Retry with exponential backoff
pub mod retry;
/// Highest observed block height
pub mod cursor;
/// Throughput counters
pub mod stats;
/// Metrics and observability
pub mod metrics;
/// Error types
pub mod error;

// Settings & Configuration
/// Configuration management
pub mod settings;

// Re-exports for convenience
pub use client::{CoreRpcClient, NamingClient};
pub use cursor::Cursor;
pub use error::IndexerError;
pub use indexer::Indexer;
pub use profile::{HttpProfileResolver, ProfileResolver};
pub use settings::Settings;
pub use stats::{PipelineStats, StatsSnapshot};
pub use store::{DocumentStore, PostgresStore};
