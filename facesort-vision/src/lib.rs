pub mod detector;
pub mod model;
pub mod pipeline;
pub mod recognizer;
pub mod tensor;

// Re-export commonly used types
pub use detector::{Detection, FaceDetector};
pub use pipeline::{ModelPaths, Pipeline};
pub use recognizer::FaceEncoder;
