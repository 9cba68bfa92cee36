//! Multipart form reading shared by the landing page and the books API

use axum::extract::multipart::{Field, Multipart, MultipartError};
use axum::http::StatusCode;

use crate::error::InputError;
use crate::landing::{LandingForm, SelectedFile};

/// Read the landing form fields into `form` in the order the browser sent
/// them. Fields read before a failure stay in `form`.
///
/// An empty file part (no file chosen) is ignored. Files larger than
/// `max_bytes` are rejected.
pub async fn read_landing_form(
    multipart: &mut Multipart,
    form: &mut LandingForm,
    max_bytes: usize,
) -> Result<(), InputError> {
    while let Some(field) = next_field(multipart, max_bytes).await? {
        let name = field.name().unwrap_or("").to_string();
        tracing::debug!(field = %name, file_name = ?field.file_name(), "Received form field");

        match name.as_str() {
            "url" => {
                let url = field
                    .text()
                    .await
                    .map_err(|e| multipart_error(e, max_bytes))?;
                form.set_url(url);
            }
            "file" | "epub" => {
                if let Some(file) = read_file(field, max_bytes).await? {
                    form.select_file(file);
                }
            }
            _ => {}
        }
    }

    Ok(())
}

/// The first non-empty file part
pub async fn read_upload(
    multipart: &mut Multipart,
    max_bytes: usize,
) -> Result<SelectedFile, InputError> {
    while let Some(field) = next_field(multipart, max_bytes).await? {
        if matches!(field.name(), Some("file") | Some("epub")) {
            if let Some(file) = read_file(field, max_bytes).await? {
                return Ok(file);
            }
        }
    }

    tracing::warn!("No file field found in multipart upload");
    Err(InputError::Empty)
}

async fn next_field(
    multipart: &mut Multipart,
    max_bytes: usize,
) -> Result<Option<Field<'_>>, InputError> {
    multipart.next_field().await.map_err(|e| {
        tracing::error!("Failed to read multipart field: {}", e);
        multipart_error(e, max_bytes)
    })
}

/// A body cut off by the request limit is an oversized upload
fn multipart_error(err: MultipartError, max_bytes: usize) -> InputError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        InputError::TooLarge { max: max_bytes }
    } else {
        InputError::Multipart(err.body_text())
    }
}

async fn read_file(field: Field<'_>, max_bytes: usize) -> Result<Option<SelectedFile>, InputError> {
    let name = field.file_name().unwrap_or("").to_string();
    let data = field
        .bytes()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?;

    if name.is_empty() && data.is_empty() {
        return Ok(None);
    }
    if data.len() > max_bytes {
        return Err(InputError::TooLarge { max: max_bytes });
    }

    tracing::debug!(file_name = %name, size = data.len(), "Read file data");
    Ok(Some(SelectedFile { name, data }))
}
