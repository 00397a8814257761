//! Core feed-monitoring logic.
//!
//! This module contains:
//! - HistoryStore: Append-only record of converted posts
//! - Converter: Post to EPUB conversion
//! - FeedProcessor: One pass over one feed
//! - FeedRegistry: Feed-list reconciliation and the monitor loop

pub mod converter;
pub mod history;
pub mod processor;
pub mod registry;

// Re-export commonly used types
pub use converter::{ConversionError, EpubConverter, PostConverter, DEFAULT_LANGUAGE};
pub use history::{HistoryError, HistoryStore};
pub use processor::{FeedProcessor, ProcessError, ProcessReport};
pub use registry::{
    history_path_for, load_feed_list, parse_feed_list, CycleReport, FeedRegistry,
    ReconcileReport, RegistryError,
};
