//! Storage layer for the KATO pattern-matching core.
//!
//! Defines the four storage-adapter interfaces and provides both an
//! in-process adapter of each (suitable for tests and for
//! an embedded single-process deployment) and a durable adapter backed by
//! SurrealDB or Qdrant.

pub mod memory_metadata_store;
pub mod memory_pattern_store;
pub mod memory_session_store;
pub mod memory_vector_index;
pub mod qdrant_vector_index;
pub mod quantize;
pub mod retry;
pub mod surreal_metadata_store;
pub mod surreal_pattern_store;
pub mod surreal_session_store;
pub mod traits;

pub use memory_metadata_store::MemoryMetadataStore;
pub use memory_pattern_store::MemoryPatternStore;
pub use memory_session_store::MemorySessionStore;
pub use memory_vector_index::MemoryVectorIndex;
pub use qdrant_vector_index::QdrantVectorIndex;
pub use quantize::Quantizer;
pub use retry::RetryPolicy;
pub use surreal_metadata_store::SurrealMetadataStore;
pub use surreal_pattern_store::SurrealPatternStore;
pub use surreal_session_store::SurrealSessionStore;
pub use traits::{MetadataStore, PatternStore, SessionRecord, SessionStore, VectorIndexStore};

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::memory_metadata_store::MemoryMetadataStore;
    pub use crate::memory_pattern_store::MemoryPatternStore;
    pub use crate::memory_session_store::MemorySessionStore;
    pub use crate::memory_vector_index::MemoryVectorIndex;
    pub use crate::retry::RetryPolicy;
    pub use crate::traits::{MetadataStore, PatternStore, SessionRecord, SessionStore, VectorIndexStore};
}
