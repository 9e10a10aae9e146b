//! Shared types for the indexing pipeline: chain height/locator primitives and
//! the stream/entity vocabulary the rest of the crates build on.

pub mod locator;
pub mod stream;

pub use locator::{ChainedHeader, Locator};
pub use stream::StreamKind;

/// A chain height. Heights are zero-based; genesis is height 0.
pub type Height = u64;
