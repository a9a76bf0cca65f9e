//! The retrieval orchestrator: runs both engines, reconciles their ranked
//! lists and applies facet filtering, expansion and degradation policy.

pub mod expand;
pub mod fusion;

mod engine;

pub use engine::HybridEngine;
