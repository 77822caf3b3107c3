//! Data acquisition: Riigikogu API client, checkpointed ingestion, and
//! embedding backfill.

pub mod client;
pub mod embeddings;
pub mod ingest;

pub use client::RiigikoguClient;
pub use embeddings::EmbeddingClient;
pub use ingest::SyncSession;
