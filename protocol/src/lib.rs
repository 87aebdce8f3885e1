//! Common types shared between the idveil engine and host embeddings.
//!
//! Everything here is plain data with serde derives: host layers marshal
//! these structures across the embedding boundary as JSON, using the
//! boundary's camelCase field names.

pub mod identifiers;
pub mod status;

pub use identifiers::*;
pub use status::*;
