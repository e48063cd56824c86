//! # Transcription Endpoint
//!
//! ## Endpoint: `POST /transcribe`
//!
//! ## Request:
//! Multipart form data with
//! - `file`: exactly one `.wav` file
//! - `instrument` (optional): passed to the transcriber as `{{INSTRUMENT}}`
//!
//! ## Responses:
//! - `200 {"musicXML": "<base64>"}` on success
//! - `200 {"error": "<message>"}` when the transcriber rejects the audio
//! - `400` for malformed or unsupported uploads
//! - `403` when all transcription slots stay busy for the whole wait timeout
//! - `500` for anything that went wrong on our side
//!
//! The slot is taken before the body is read and held until the response is
//! built. Uploaded and produced files are deleted on every path out of the
//! handler.

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::storage::TempFiles;
use crate::transcription::{output_path_for, ConvertError};
use actix_multipart::{Field, Multipart};
use actix_web::{web, HttpResponse};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures_util::stream::StreamExt;
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

const FILE_FIELD: &str = "file";
const INSTRUMENT_FIELD: &str = "instrument";
const MAX_INSTRUMENT_LEN: usize = 64;

#[derive(Debug, Default, Serialize)]
pub struct TranscribeResponse {
    #[serde(rename = "musicXML", skip_serializing_if = "Option::is_none")]
    pub music_xml: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The parts of the multipart form we care about.
#[derive(Debug)]
struct Upload {
    file_name: String,
    data: Vec<u8>,
    instrument: String,
}

pub async fn transcribe(state: web::Data<AppState>, payload: Multipart) -> AppResult<HttpResponse> {
    let _slot = state.limiter.acquire().await.map_err(|e| {
        warn!(error = %e, "Rejecting transcription, no free slot");
        state.increment_busy_rejections();
        AppError::Busy("service too busy".to_string())
    })?;

    let upload = read_upload(payload, state.config.upload.max_file_bytes).await?;

    let ext = file_extension(&upload.file_name);
    if !is_supported_extension(&ext) {
        return Err(AppError::ValidationError(format!("wrong file type: {}", ext)));
    }
    validate_instrument(&upload.instrument)?;

    let id = Uuid::new_v4();
    let mut temp_files = TempFiles::new();

    let started = Instant::now();
    let input = state
        .saver
        .save(&format!("{}{}", id, ext), &upload.data)
        .await
        .map_err(|e| {
            error!(request = %id, error = %e, "Can't save upload");
            AppError::Internal("can not save file".to_string())
        })?;
    temp_files.track(&input);
    // The tool may leave a partial result behind even when it fails.
    temp_files.track(output_path_for(&input));
    info!(request = %id, bytes = upload.data.len(), elapsed_ms = %started.elapsed().as_millis(), "Saved upload");

    let started = Instant::now();
    let output = match state.transcriber.convert(&input, &upload.instrument).await {
        Ok(output) => output,
        Err(ConvertError::Transcribe { message }) => {
            warn!(request = %id, message = %message, "Transcriber rejected input");
            state.increment_transcription_failures();
            return Ok(HttpResponse::Ok().json(TranscribeResponse {
                error: Some(message),
                ..Default::default()
            }));
        }
        Err(ConvertError::Internal(e)) => {
            error!(request = %id, error = %format!("{:#}", e), "Transcription failed");
            return Err(AppError::Internal("can not transcribe file".to_string()));
        }
    };
    temp_files.track(&output);
    info!(request = %id, elapsed_ms = %started.elapsed().as_millis(), "Transcribed");

    let data = tokio::fs::read(&output).await.map_err(|e| {
        error!(request = %id, path = %output.display(), error = %e, "Can't read transcriber output");
        AppError::Internal("can not read result".to_string())
    })?;

    Ok(HttpResponse::Ok().json(TranscribeResponse {
        music_xml: Some(STANDARD.encode(data)),
        ..Default::default()
    }))
}

async fn read_upload(mut payload: Multipart, max_file_bytes: usize) -> AppResult<Upload> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut instrument = String::new();

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| AppError::BadRequest(format!("no multipart form data: {}", e)))?;

        let (name, file_name) = {
            let content_disposition = field
                .content_disposition()
                .ok_or_else(|| AppError::BadRequest("missing content disposition".to_string()))?;
            (
                content_disposition.get_name().unwrap_or_default().to_string(),
                content_disposition.get_filename().map(str::to_string),
            )
        };

        match name.as_str() {
            FILE_FIELD => {
                if file.is_some() {
                    return Err(AppError::BadRequest("multiple files".to_string()));
                }
                let data = read_field(&mut field, max_file_bytes).await?;
                file = Some((file_name.unwrap_or_default(), data));
            }
            INSTRUMENT_FIELD => {
                let data = read_field(&mut field, MAX_INSTRUMENT_LEN * 4).await?;
                instrument = String::from_utf8(data)
                    .map_err(|_| AppError::BadRequest("instrument is not valid UTF-8".to_string()))?
                    .trim()
                    .to_string();
            }
            _ => {
                read_field(&mut field, max_file_bytes).await?;
            }
        }
    }

    let (file_name, data) = file.ok_or_else(|| AppError::BadRequest("no file".to_string()))?;
    Ok(Upload {
        file_name,
        data,
        instrument,
    })
}

async fn read_field(field: &mut Field, limit: usize) -> AppResult<Vec<u8>> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| AppError::BadRequest(format!("can't read file: {}", e)))?;
        if bytes.len() + chunk.len() > limit {
            return Err(AppError::ValidationError(format!("field too large (max: {} bytes)", limit)));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

/// Lower-cased extension with its leading dot, or an empty string.
fn file_extension(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

fn is_supported_extension(ext: &str) -> bool {
    ext == ".wav"
}

/// The instrument ends up in a whitespace-split command line, so only plain
/// identifiers are accepted.
fn validate_instrument(instrument: &str) -> AppResult<()> {
    if instrument.len() > MAX_INSTRUMENT_LEN {
        return Err(AppError::ValidationError(format!(
            "instrument too long (max: {} characters)",
            MAX_INSTRUMENT_LEN
        )));
    }
    if !instrument
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(AppError::ValidationError(format!("wrong instrument: {}", instrument)));
    }
    Ok(())
}
