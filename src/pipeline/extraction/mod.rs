//! Structured extraction: report screenshot → `ExtractedResultItem`s via a
//! vision model.

pub mod analyzer;
pub mod bundling;
pub mod parser;
pub mod prompt;
pub mod vision;

pub use analyzer::StructuredExtractionService;
pub use bundling::bundle_blood_gas;
pub use parser::{parse_extraction, strip_code_fences};
pub use vision::{MockVisionClient, OllamaVisionClient, VisionClient, DEFAULT_VISION_MODEL};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Report image not found: {}", .0.display())]
    MissingImage(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Vision model call failed: {0}")]
    Vision(String),

    #[error("Could not parse extraction output: {0}")]
    Parse(String),
}
