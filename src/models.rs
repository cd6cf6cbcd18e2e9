// src/models.rs
use serde::{Deserialize, Serialize};

/// Raw poster fields as they arrive from either transport, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPosterFields {
    pub title: Option<String>,
    pub poster_notes: Option<String>,
    pub company_name: Option<String>,
    pub brand_color_hex: Option<String>,
    pub poster_vibe: Option<String>,
}

/// Canonical poster request. Only produced by the payload normalizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PosterRequest {
    pub title: String,
    pub poster_notes: String,
    pub company_name: Option<String>,
    pub brand_color_hex: Option<String>,
    pub poster_vibe: Option<PosterVibe>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PosterVibe {
    Professional,
    Friendly,
    Bold,
    Minimal,
    Playful,
    Elegant,
}

impl PosterVibe {
    pub const ALL: [PosterVibe; 6] = [
        PosterVibe::Professional,
        PosterVibe::Friendly,
        PosterVibe::Bold,
        PosterVibe::Minimal,
        PosterVibe::Playful,
        PosterVibe::Elegant,
    ];

    /// Unknown vibes are not an error, they just drop out.
    pub fn parse(raw: &str) -> Option<Self> {
        let wanted = raw.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|v| v.as_str() == wanted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PosterVibe::Professional => "professional",
            PosterVibe::Friendly => "friendly",
            PosterVibe::Bold => "bold",
            PosterVibe::Minimal => "minimal",
            PosterVibe::Playful => "playful",
            PosterVibe::Elegant => "elegant",
        }
    }
}

/// One uploaded reference file, exactly as received.
#[derive(Debug, Clone)]
pub struct ReferenceImage {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// A decoded upload, re-encoded as PNG.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    Generate,
    Edit,
    EditCompose,
}

impl GenerationMode {
    /// Callers are expected to have capped the count already.
    pub fn for_image_count(count: usize) -> Self {
        match count {
            0 => GenerationMode::Generate,
            1 => GenerationMode::Edit,
            _ => GenerationMode::EditCompose,
        }
    }

    /// Discriminator used in cache keys. Both edit flavours share one prefix.
    pub fn cache_prefix(&self) -> &'static str {
        match self {
            GenerationMode::Generate => "gen",
            GenerationMode::Edit | GenerationMode::EditCompose => "edit",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationMode::Generate => "generate",
            GenerationMode::Edit => "edit",
            GenerationMode::EditCompose => "edit_compose",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    Poster,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    #[serde(rename = "type")]
    pub kind: ResultKind,
    /// `data:image/png;base64,...` or an https URL.
    pub image: String,
    pub meta: GenerationMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationMeta {
    pub prompt: String,
    pub size: String,
    pub mode: GenerationMode,
}
