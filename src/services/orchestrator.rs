// src/services/orchestrator.rs
use crate::config::{ImageSize, MAX_REFERENCE_IMAGES};
use crate::errors::PosterError;
use crate::models::{
    GenerationMeta, GenerationMode, GenerationResult, PosterRequest, ReferenceImage, ResultKind,
};
use crate::services::image_processor::ImageProcessor;
use crate::services::image_provider::{ImageProvider, ProviderError, ProviderImage};
use crate::services::prompt;
use base64::{Engine as _, engine::general_purpose};
use image::ImageFormat as ImgFormat;
use log::info;
use std::sync::Arc;
use std::time::Instant;

/// Uploads decoded and ready for the provider.
#[derive(Debug)]
pub struct PreparedReferences {
    pub mode: GenerationMode,
    pub count: usize,
    /// The single normalized upload or the composed strip; `None` in generate mode.
    pub png: Option<Vec<u8>>,
}

/// Picks generate / edit / edit_compose from the reference count and drives the provider.
pub struct GenerationOrchestrator {
    provider: Arc<dyn ImageProvider>,
    image_processor: Arc<ImageProcessor>,
    size: ImageSize,
}

impl GenerationOrchestrator {
    pub fn new(
        provider: Arc<dyn ImageProvider>,
        image_processor: Arc<ImageProcessor>,
        size: ImageSize,
    ) -> Self {
        Self { provider, image_processor, size }
    }

    #[cfg(test)]
    pub async fn run(
        &self,
        request: &PosterRequest,
        references: Vec<ReferenceImage>,
    ) -> Result<GenerationResult, PosterError> {
        let prepared = self.prepare(references).await?;
        self.generate(request, prepared).await
    }

    /// Decode the uploads and, for more than one, build the reference strip.
    /// Nothing here talks to the provider, so a bad upload costs nothing.
    pub async fn prepare(
        &self,
        mut references: Vec<ReferenceImage>,
    ) -> Result<PreparedReferences, PosterError> {
        references.truncate(MAX_REFERENCE_IMAGES);
        let mode = GenerationMode::for_image_count(references.len());
        let count = references.len();
        if count == 0 {
            return Ok(PreparedReferences { mode, count, png: None });
        }

        let processor = self.image_processor.clone();
        let target_width = self.size.width;

        let png = tokio::task::spawn_blocking(move || {
            let mut normalized = references
                .iter()
                .map(|r| processor.normalize(r))
                .collect::<Result<Vec<_>, _>>()?;

            if normalized.len() == 1 {
                Ok(normalized.remove(0).png)
            } else {
                processor.compose(&normalized, target_width).map(|c| c.png)
            }
        })
        .await
        .map_err(|e| PosterError::Internal(format!("image task failed: {}", e)))??;

        Ok(PreparedReferences { mode, count, png: Some(png) })
    }

    pub async fn generate(
        &self,
        request: &PosterRequest,
        prepared: PreparedReferences,
    ) -> Result<GenerationResult, PosterError> {
        let PreparedReferences { mode, count, png } = prepared;
        let size = self.size.to_string();
        let base_prompt = prompt::compile(request);
        let start = Instant::now();

        let (prompt, output) = match (mode, png) {
            (GenerationMode::Generate, _) | (_, None) => {
                let output = self.provider.generate(&base_prompt, &size).await?;
                (base_prompt, output)
            }
            (GenerationMode::Edit, Some(png)) => {
                let output = self.provider.edit(&base_prompt, png, &size).await?;
                (base_prompt, output)
            }
            (GenerationMode::EditCompose, Some(png)) => {
                let prompt = prompt::with_compose_instruction(&base_prompt, count);
                let output = self.provider.edit(&prompt, png, &size).await?;
                (prompt, output)
            }
        };

        let image = image_reference(output)?;
        info!(
            "Generated poster in {} mode ({}) in {}ms",
            mode.as_str(),
            size,
            start.elapsed().as_millis()
        );

        Ok(GenerationResult {
            kind: ResultKind::Poster,
            image,
            meta: GenerationMeta { prompt, size, mode },
        })
    }
}

/// Data URI for inline results, otherwise the provider URL.
fn image_reference(output: ProviderImage) -> Result<String, PosterError> {
    let non_empty = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
    if let Some(b64) = non_empty(output.b64_json) {
        let bytes = general_purpose::STANDARD.decode(b64.trim()).map_err(|e| {
            ProviderError::InvalidResponse(format!("image is not valid base64: {}", e))
        })?;
        let mime = match image::guess_format(&bytes) {
            Ok(ImgFormat::Jpeg) => "image/jpeg",
            Ok(ImgFormat::WebP) => "image/webp",
            _ => "image/png",
        };
        return Ok(format!("data:{};base64,{}", mime, b64.trim()));
    }
    non_empty(output.url).ok_or(PosterError::ProviderNoImage)
}
