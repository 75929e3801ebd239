pub mod analyzer;
pub mod classifier;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod matcher;
pub mod reference;
pub mod report;
pub mod router;
pub mod storage;

pub use analyzer::FaceAnalyzer;
pub use classifier::{classify, PhotoClassifier, PhotoLabelSet};
pub use embedding::{Embedding, Label};
pub use error::{Error, Result};
pub use matcher::{match_embedding, MatchResult};
pub use reference::ReferenceDatabase;

// Re-export vision types for convenience
pub use facesort_vision::{ModelPaths, Pipeline};
