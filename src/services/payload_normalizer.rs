// src/services/payload_normalizer.rs
use crate::errors::PosterError;
use crate::models::{PosterRequest, PosterVibe, RawPosterFields};
use serde_json::Value;

pub const MAX_TITLE_CHARS: usize = 120;
pub const MAX_NOTES_CHARS: usize = 220;
pub const MAX_COMPANY_CHARS: usize = 80;

const PREVIEW_CHARS: usize = 80;

/// Validate and canonicalize raw fields. `posterNotes` is the only required field.
pub fn normalize(raw: &RawPosterFields) -> Result<PosterRequest, PosterError> {
    let poster_notes = clamp_trim(raw.poster_notes.as_deref(), MAX_NOTES_CHARS);
    if poster_notes.is_empty() {
        return Err(PosterError::missing_field("posterNotes"));
    }

    let title = clamp_trim(raw.title.as_deref(), MAX_TITLE_CHARS);
    let company_name = Some(clamp_trim(raw.company_name.as_deref(), MAX_COMPANY_CHARS))
        .filter(|c| !c.is_empty());

    Ok(PosterRequest {
        title,
        poster_notes,
        company_name,
        brand_color_hex: raw.brand_color_hex.as_deref().and_then(canonical_hex),
        poster_vibe: raw.poster_vibe.as_deref().and_then(PosterVibe::parse),
    })
}

/// Trim, cut to `max` characters, trim again so a cut never leaves trailing space.
fn clamp_trim(value: Option<&str>, max: usize) -> String {
    let trimmed = value.unwrap_or_default().trim();
    let clamped: String = trimmed.chars().take(max).collect();
    clamped.trim().to_string()
}

/// `#abc`, `abc`, `#a1b2c3` or `a1b2c3` become `#AABBCC`/`#A1B2C3`; anything else is dropped.
fn canonical_hex(raw: &str) -> Option<String> {
    let digits = raw.trim().trim_start_matches('#');
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let expanded = match digits.len() {
        3 => digits.chars().flat_map(|c| [c, c]).collect::<String>(),
        6 => digits.to_string(),
        _ => return None,
    };
    Some(format!("#{}", expanded.to_ascii_uppercase()))
}

/// JSON transport adapter: body is `{ "payload": { ... } }`.
pub fn fields_from_json(body: &[u8]) -> Result<RawPosterFields, PosterError> {
    let value: Value = serde_json::from_slice(body).map_err(|e| {
        PosterError::Validation(format!(
            "Request body is not valid JSON ({}): {}",
            e,
            preview(body)
        ))
    })?;

    let payload = value
        .get("payload")
        .and_then(Value::as_object)
        .ok_or_else(|| PosterError::missing_field("payload"))?;

    let text = |name: &str| payload.get(name).and_then(json_text);
    Ok(RawPosterFields {
        title: text("title"),
        poster_notes: text("posterNotes"),
        company_name: text("companyName"),
        brand_color_hex: text("brandColorHex"),
        poster_vibe: text("posterVibe"),
    })
}

fn json_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Multipart text parts may arrive as binary; decode them leniently.
pub fn text_from_part(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Assign a multipart text field by name. Unknown names are ignored.
pub fn set_multipart_field(fields: &mut RawPosterFields, name: &str, value: String) {
    let slot = match name {
        "title" => &mut fields.title,
        "posterNotes" => &mut fields.poster_notes,
        "companyName" => &mut fields.company_name,
        "brandColorHex" => &mut fields.brand_color_hex,
        "posterVibe" => &mut fields.poster_vibe,
        _ => return,
    };
    *slot = Some(value);
}

fn preview(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let mut shown: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        shown.push('…');
    }
    format!("{:?}", shown)
}
