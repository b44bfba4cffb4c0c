// Application layer - use cases and the capability traits adapters implement
pub mod error;
pub mod exporter;
pub mod fetcher;
pub mod pipeline;
pub mod reconciler;
pub mod remote_source;
pub mod reshaper;
pub mod static_source;
