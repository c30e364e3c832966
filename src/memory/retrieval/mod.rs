//! Recall side: search payloads and the remote service client.

pub mod client;
pub mod search;

pub use client::{ApiClient, BACKOFF_STEP_MS, Endpoint, HttpTransport, MemoryTransport, TransportFuture};
pub use search::{SearchPayload, build_query, build_search_payload, recall_query_text};
