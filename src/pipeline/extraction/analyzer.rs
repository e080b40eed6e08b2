use std::path::Path;
use std::sync::Arc;

use base64::Engine as _;
use tokio::time::Instant;

use super::bundling::bundle_blood_gas;
use super::parser::parse_extraction;
use super::prompt::{EXTRACTION_SYSTEM_PROMPT, EXTRACTION_USER_PROMPT};
use super::vision::VisionClient;
use super::ExtractionError;
use crate::models::ExtractedResultItem;
use crate::pipeline::diagnostic::DiagnosticDump;

/// Screenshot → structured result items.
pub struct StructuredExtractionService {
    client: Arc<dyn VisionClient>,
    model: String,
    diagnostics: DiagnosticDump,
}

impl StructuredExtractionService {
    pub fn new(client: Arc<dyn VisionClient>, model: String, diagnostics: DiagnosticDump) -> Self {
        Self {
            client,
            model,
            diagnostics,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn analyze(&self, image_path: &Path) -> Result<Vec<ExtractedResultItem>, ExtractionError> {
        let image = match tokio::fs::read(image_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ExtractionError::MissingImage(image_path.to_path_buf()))
            }
            Err(e) => return Err(ExtractionError::Io(e)),
        };

        let started = Instant::now();
        let encoded = base64::engine::general_purpose::STANDARD.encode(&image);
        let raw = self
            .client
            .chat_with_image(
                &self.model,
                EXTRACTION_SYSTEM_PROMPT,
                EXTRACTION_USER_PROMPT,
                &encoded,
            )
            .await?;

        let scope = format!(
            "extraction-{}",
            image_path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default()
        );
        self.diagnostics.record_text(&scope, "vision-response.txt", &raw);

        let items = bundle_blood_gas(parse_extraction(&raw)?);

        tracing::info!(
            image = %image_path.display(),
            model = %self.model,
            items = items.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Report analyzed"
        );
        Ok(items)
    }
}
