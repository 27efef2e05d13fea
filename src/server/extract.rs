//! Turn request extraction from multipart or JSON bodies.

use std::sync::Arc;

use axum::Json;
use axum::extract::multipart::Field;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::{debug, warn};

use super::attachment::{AttachmentError, FALLBACK_MIME_TYPE, SpooledUpload};
use super::error::{MissingFields, RelayError};
use super::state::AppState;
use crate::gemini::Part;
use crate::session::SessionId;

/// Raw turn as received, before validation.
///
/// Any spooled image is deleted when this value is dropped.
#[derive(Debug, Default)]
pub struct TurnRequest {
    /// `prompt` field.
    pub prompt: Option<String>,
    /// `sessionId` field.
    pub session_id: Option<String>,
    /// `image` file field.
    pub image: Option<SpooledUpload>,
    /// Image that was refused while the body was read.
    rejected_image: Option<AttachmentError>,
}

/// A turn whose required fields are present.
#[derive(Debug)]
pub struct ValidTurn {
    /// Session the turn belongs to.
    pub session_id: SessionId,
    /// Prompt text.
    pub prompt: String,
    /// Optional image attachment.
    pub image: Option<SpooledUpload>,
}

#[derive(Debug, Deserialize)]
struct JsonTurn {
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default, rename = "sessionId")]
    session_id: Option<String>,
}

impl TurnRequest {
    /// Check that prompt and session id are present and non-empty.
    ///
    /// Missing fields are reported before a refused image.
    ///
    /// # Errors
    /// Returns [`RelayError::Validation`] naming the absent field(s), or
    /// [`RelayError::ImageProcessing`] if the image was refused while reading.
    pub fn validate(self) -> Result<ValidTurn, RelayError> {
        let prompt = self.prompt.filter(|p| !p.is_empty());
        let session_id = self.session_id.and_then(SessionId::parse);

        match (prompt, session_id, self.rejected_image) {
            (Some(prompt), Some(session_id), None) => Ok(ValidTurn {
                session_id,
                prompt,
                image: self.image,
            }),
            (Some(_), Some(_), Some(rejected)) => Err(RelayError::ImageProcessing(rejected)),
            (prompt, session_id, _) => Err(RelayError::Validation(MissingFields {
                prompt: prompt.is_none(),
                session_id: session_id.is_none(),
            })),
        }
    }

    async fn from_multipart(mut multipart: Multipart, state: &AppState) -> Result<Self, RelayError> {
        let mut turn = Self::default();

        loop {
            let field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                // The rest of an oversized body cannot be read.
                Err(_) if turn.rejected_image.is_some() => break,
                Err(e) => return Err(RelayError::BadRequest(e.body_text())),
            };

            let name = field.name().unwrap_or_default().to_owned();
            match name.as_str() {
                "prompt" => turn.prompt = Some(read_text(field).await?),
                "sessionId" => turn.session_id = Some(read_text(field).await?),
                "image" => {
                    // An empty file input still submits a nameless part.
                    if field.file_name().is_some_and(str::is_empty) {
                        continue;
                    }
                    match spool_image(field, state).await {
                        Ok(upload) => turn.image = Some(upload),
                        Err(RelayError::ImageProcessing(e)) => turn.rejected_image = Some(e),
                        Err(e) => return Err(e),
                    }
                }
                other => debug!(field = other, "ignoring unknown multipart field"),
            }
        }

        Ok(turn)
    }
}

impl ValidTurn {
    /// Message parts for the upstream turn: the text, then the image if any.
    ///
    /// The spooled image file is removed before this returns.
    ///
    /// # Errors
    /// Returns [`RelayError::ImageProcessing`] if the image cannot be encoded.
    pub async fn into_parts(self, max_image_bytes: usize) -> Result<Vec<Part>, RelayError> {
        let mut parts = vec![Part::text(self.prompt)];
        if let Some(image) = self.image {
            parts.push(image.encode(max_image_bytes).await?);
        }
        Ok(parts)
    }
}

async fn read_text(field: Field<'_>) -> Result<String, RelayError> {
    field
        .text()
        .await
        .map_err(|e| RelayError::BadRequest(e.body_text()))
}

/// Spool an image field, refusing it as soon as it passes the size limit.
///
/// Hitting the router body limit inside the image counts as an oversized
/// image, not as an unreadable body.
async fn spool_image(mut field: Field<'_>, state: &AppState) -> Result<SpooledUpload, RelayError> {
    let limit = state.uploads.max_image_bytes;
    let mime_type = field.content_type().unwrap_or(FALLBACK_MIME_TYPE).to_owned();
    let mut writer = SpooledUpload::create_in(&state.uploads.dir, mime_type)?;

    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                return Err(AttachmentError::TooLarge {
                    size: writer.size(),
                    limit,
                }
                .into());
            }
            Err(e) => return Err(RelayError::BadRequest(e.body_text())),
        };
        writer.write_chunk(&chunk).await?;
        if writer.size() > limit {
            return Err(AttachmentError::TooLarge {
                size: writer.size(),
                limit,
            }
            .into());
        }
    }

    Ok(writer.finish().await?)
}

impl FromRequest<Arc<AppState>> for TurnRequest {
    type Rejection = RelayError;

    async fn from_request(req: Request, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("multipart/form-data"));

        let extracted = if is_multipart {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| RelayError::BadRequest(e.body_text()))?;
            Self::from_multipart(multipart, state).await
        } else {
            Json::<JsonTurn>::from_request(req, state)
                .await
                .map(|Json(body)| Self {
                    prompt: body.prompt,
                    session_id: body.session_id,
                    ..Self::default()
                })
                .map_err(|e| RelayError::BadRequest(e.body_text()))
        };

        extracted.inspect_err(|e| warn!(error = %e, "failed to read turn request"))
    }
}
