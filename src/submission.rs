// src/submission.rs
//! Reads a poster submission off the wire, either as JSON or as multipart.

use crate::config::MAX_REFERENCE_IMAGES;
use crate::errors::PosterError;
use crate::models::{RawPosterFields, ReferenceImage};
use crate::services::payload_normalizer::{fields_from_json, set_multipart_field, text_from_part};
use actix_multipart::{Field, Multipart};
use actix_web::{HttpMessage, HttpRequest, web};
use bytes::BytesMut;
use futures_util::TryStreamExt;
use log::debug;

pub const MAX_JSON_BYTES: usize = 64 * 1024;
const MAX_TEXT_FIELD_BYTES: usize = 16 * 1024;

const PRIMARY_IMAGE_FIELDS: [&str; 2] = ["sampleImages", "sampleImages[]"];
const LEGACY_IMAGE_FIELD: &str = "sampleImage";

#[derive(Debug, Default)]
pub struct PosterSubmission {
    pub fields: RawPosterFields,
    /// Upload order, at most [`MAX_REFERENCE_IMAGES`].
    pub references: Vec<ReferenceImage>,
}

pub async fn read_submission(
    req: &HttpRequest,
    payload: web::Payload,
    max_upload_bytes: usize,
) -> Result<PosterSubmission, PosterError> {
    let content_type = req.content_type().to_ascii_lowercase();
    match content_type.as_str() {
        "application/json" => {
            let body = read_body(payload, MAX_JSON_BYTES).await?;
            Ok(PosterSubmission {
                fields: fields_from_json(&body)?,
                references: Vec::new(),
            })
        }
        "multipart/form-data" => {
            read_multipart(Multipart::new(req.headers(), payload), max_upload_bytes).await
        }
        "" => Err(PosterError::Validation(
            "Content-Type must be application/json or multipart/form-data".to_string(),
        )),
        other => Err(PosterError::Validation(format!(
            "Unsupported Content-Type '{}', expected application/json or multipart/form-data",
            other
        ))),
    }
}

async fn read_body(mut payload: web::Payload, limit: usize) -> Result<BytesMut, PosterError> {
    let mut body = BytesMut::new();
    while let Some(chunk) = payload
        .try_next()
        .await
        .map_err(|e| PosterError::Validation(format!("Failed to read request body: {}", e)))?
    {
        if body.len() + chunk.len() > limit {
            return Err(PosterError::PayloadTooLarge(format!(
                "request body exceeds {} bytes",
                limit
            )));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

async fn read_multipart(
    mut multipart: Multipart,
    max_upload_bytes: usize,
) -> Result<PosterSubmission, PosterError> {
    let mut fields = RawPosterFields::default();
    let mut primary = Vec::new();
    let mut legacy = Vec::new();

    while let Some(mut field) = multipart.try_next().await.map_err(malformed)? {
        let content_disposition = field.content_disposition();
        let name = content_disposition.get_name().unwrap_or_default().to_string();
        let filename = content_disposition
            .get_filename()
            .map(str::to_string)
            .unwrap_or_default();
        let content_type = field.content_type().map(|ct| ct.to_string());

        let is_primary = PRIMARY_IMAGE_FIELDS.contains(&name.as_str());
        if is_primary || name == LEGACY_IMAGE_FIELD {
            let slots = if is_primary { &mut primary } else { &mut legacy };
            if slots.len() >= MAX_REFERENCE_IMAGES {
                debug!("Ignoring extra reference image {:?} in {}", filename, name);
                skip_field(&mut field).await?;
                continue;
            }
            let data = read_field(&mut field, max_upload_bytes, &name).await?;
            // Browsers send an empty part for an untouched file input.
            if !data.is_empty() {
                slots.push(ReferenceImage { filename, content_type, data });
            }
        } else {
            let data = read_field(&mut field, MAX_TEXT_FIELD_BYTES, &name).await?;
            set_multipart_field(&mut fields, &name, text_from_part(&data));
        }
    }

    Ok(PosterSubmission {
        fields,
        references: merge_references(primary, legacy),
    })
}

/// Multi-file uploads first, then the legacy single field, capped overall.
pub fn merge_references(
    mut primary: Vec<ReferenceImage>,
    legacy: Vec<ReferenceImage>,
) -> Vec<ReferenceImage> {
    primary.extend(legacy);
    primary.truncate(MAX_REFERENCE_IMAGES);
    primary
}

async fn read_field(field: &mut Field, limit: usize, name: &str) -> Result<Vec<u8>, PosterError> {
    let mut data = Vec::new();
    while let Some(chunk) = field.try_next().await.map_err(malformed)? {
        if data.len() + chunk.len() > limit {
            return Err(PosterError::PayloadTooLarge(format!(
                "field '{}' exceeds {} bytes",
                name, limit
            )));
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}

async fn skip_field(field: &mut Field) -> Result<(), PosterError> {
    while field.try_next().await.map_err(malformed)?.is_some() {}
    Ok(())
}

fn malformed(e: actix_multipart::MultipartError) -> PosterError {
    PosterError::Validation(format!("Malformed multipart body: {}", e))
}
