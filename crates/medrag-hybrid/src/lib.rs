//! medrag-hybrid
//!
//! Fusion of the dense and keyword retrievers, category diversification,
//! generation-context formatting, and the `RetrievalEngine` tying them to a
//! corpus.
pub mod context;
pub mod diversify;
pub mod engine;
pub mod fusion;

pub use context::{assemble, minimal_context};
pub use diversify::{diversify, static_fallback};
pub use engine::{EngineStats, GeneratedContext, RetrievalEngine, RetrievalOutcome};
pub use fusion::{fuse, Degradation, FusionOutcome, FusionRetriever, FusionWeights};
