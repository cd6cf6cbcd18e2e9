// src/services/prompt.rs
use crate::models::PosterRequest;

const PREAMBLE: &str = "Design a polished recruiting poster announcing an open role. \
Use clean typography with a clear visual hierarchy and leave comfortable margins.";

const LAYOUT_DIRECTIVE: &str = "Keep all text legible and spelled exactly as given. \
Do not add logos, watermarks or contact details that were not provided.";

const COMPOSE_INSTRUCTION: &str = "The attached reference image is a strip of thumbnails placed side by side. \
Treat every thumbnail as a visual reference and synthesize one cohesive poster from all of them. \
Do not reproduce the strip, its borders or the thumbnails themselves.";

/// Same request, same text. Cached results rely on that.
pub fn compile(request: &PosterRequest) -> String {
    let mut lines = vec![PREAMBLE.to_string()];

    if !request.title.is_empty() {
        lines.push(format!("Headline: \"{}\".", request.title));
    }
    if let Some(company) = &request.company_name {
        lines.push(format!("Hiring company: {}.", company));
    }
    lines.push(format!("Poster content: {}", request.poster_notes));
    if let Some(color) = &request.brand_color_hex {
        lines.push(format!("Use {} as the primary brand color.", color));
    }
    if let Some(vibe) = request.poster_vibe {
        lines.push(format!("Overall vibe: {}.", vibe.as_str()));
    }
    lines.push(LAYOUT_DIRECTIVE.to_string());

    lines.join("\n")
}

/// Prompt for the multi-reference edit call.
pub fn with_compose_instruction(prompt: &str, reference_count: usize) -> String {
    format!(
        "{}\n{} ({} references, left to right.)",
        prompt, COMPOSE_INSTRUCTION, reference_count
    )
}
