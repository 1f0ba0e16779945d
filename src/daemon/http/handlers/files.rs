//! File lifecycle handlers.

use axum::{
    Json,
    body::Body,
    extract::{
        Multipart, Path, Query, State,
        multipart::{Field, MultipartError},
        rejection::JsonRejection,
    },
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::error;

use super::super::client::ClientMeta;
use super::super::types::{DeleteQuery, MessageResponse, UploadResponse, ValidateResponse};
use super::super::{AppError, SharedState};
use super::check_token_input;
use crate::error::Error;
use crate::lifecycle::{DownloadOutcome, OwnedFile, ServedFile, UploadRequest};

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge
    } else {
        AppError::BadRequest(err.body_text())
    }
}

async fn field_text(field: Field<'_>) -> Result<String, AppError> {
    Ok(field.text().await.map_err(multipart_error)?.trim().to_string())
}

fn parse_number(value: &str, name: &str, default: u32) -> Result<u32, AppError> {
    if value.is_empty() {
        return Ok(default);
    }
    value
        .parse()
        .map_err(|_| AppError::BadRequest(format!("{name} must be a number")))
}

fn parse_flag(value: &str) -> bool {
    matches!(value, "true" | "1" | "on")
}

/// POST /files - Upload a file (multipart).
pub(crate) async fn upload_file(
    State(state): State<SharedState>,
    ClientMeta(client): ClientMeta,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut request = UploadRequest::default();
    let mut data = None;
    let mut part_name = String::new();
    let mut part_type = String::new();
    let mut filename = None;
    let mut media_type = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                part_name = field.file_name().unwrap_or_default().to_string();
                part_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                if bytes.len() > state.max_upload_bytes {
                    return Err(AppError::PayloadTooLarge);
                }
                data = Some(bytes.to_vec());
            },
            "filename" => filename = Some(field_text(field).await?),
            "type" => media_type = Some(field_text(field).await?),
            "email" => {
                let email = field_text(field).await?;
                request.email = (!email.is_empty()).then_some(email);
            },
            "expiry" => {
                let value = field_text(field).await?;
                request.expiry_days = parse_number(&value, "expiry", request.expiry_days)?;
            },
            "count" => {
                request.count = parse_number(&field_text(field).await?, "count", request.count)?;
            },
            "delay" => {
                request.delay_minutes = parse_number(&field_text(field).await?, "delay", 0)?;
            },
            "only-eea" => request.only_eea = parse_flag(&field_text(field).await?),
            "include-other" => {
                request.include_other_european = parse_flag(&field_text(field).await?);
            },
            _ => {},
        }
    }

    request.data = data.ok_or_else(|| AppError::BadRequest("file is required".to_string()))?;
    request.filename = filename.filter(|f| !f.is_empty()).unwrap_or(part_name);
    request.media_type = media_type.filter(|t| !t.is_empty()).unwrap_or(part_type);

    let receipt = match state.manager.upload(request, &client).await {
        Ok(receipt) => receipt,
        Err(Error::Internal(e)) => {
            error!(error = %format!("{e:#}"), "File upload failed");
            return Err(AppError::Internal("file upload failed".to_string()));
        },
        Err(e) => return Err(e.into()),
    };

    let location = format!("/d/{}", receipt.file_id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(UploadResponse {
            message: "file uploaded successfully",
            file_id: receipt.file_id,
            owner_token: receipt.owner_token,
        }),
    ))
}

/// Everything outside RFC 5987 `attr-char`.
const FILENAME_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

fn encode_filename(name: &str) -> String {
    utf8_percent_encode(name, FILENAME_ENCODE).to_string()
}

fn served_response(file: ServedFile) -> Response {
    let encoded = encode_filename(&file.filename);
    let disposition = format!("attachment; filename*=UTF-8''{encoded}");

    let mut response = Response::new(Body::from(file.data));
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&file.media_type) {
        headers.insert(header::CONTENT_TYPE, value.clone());
        headers.insert("x-type", value);
    }
    if let Ok(value) = HeaderValue::from_str(&encoded) {
        headers.insert("x-filename", value);
    }
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    response
}

/// GET /files/:file_id - Download a file.
pub(crate) async fn download_file(
    State(state): State<SharedState>,
    ClientMeta(client): ClientMeta,
    Path(file_id): Path<String>,
) -> Result<Response, AppError> {
    check_token_input(&file_id, "fileId")?;

    match state.manager.download(&file_id, &client).await? {
        DownloadOutcome::Served(file) => Ok(served_response(file)),
        DownloadOutcome::Denied(reason) => Err(Error::PolicyDenied(reason).into()),
        DownloadOutcome::Expired => Err(AppError::NotFound("download count expired".to_string())),
    }
}

/// POST /files/:file_id - Confirm receipt.
pub(crate) async fn confirm_receipt(
    State(state): State<SharedState>,
    ClientMeta(client): ClientMeta,
    Path(file_id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    check_token_input(&file_id, "fileId")?;
    state.manager.confirm(&file_id, &client).await?;
    Ok(Json(MessageResponse::new("receipt confirmed")))
}

/// DELETE /files/:file_id?ownerToken= - Owner deletion.
pub(crate) async fn delete_file(
    State(state): State<SharedState>,
    Path(file_id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<MessageResponse>, AppError> {
    check_token_input(&file_id, "fileId")?;
    let owner_token = query.owner_token.unwrap_or_default();
    check_token_input(&owner_token, "ownerToken")?;

    match state.manager.delete(&file_id, &owner_token).await {
        Ok(()) => Ok(Json(MessageResponse::new("file deleted"))),
        Err(Error::Internal(_)) => Err(AppError::Internal("file deletion failed".to_string())),
        Err(e) => Err(e.into()),
    }
}

/// POST /files/validate - Owner view of several files.
pub(crate) async fn validate_files(
    State(state): State<SharedState>,
    payload: Result<Json<Vec<OwnedFile>>, JsonRejection>,
) -> Result<Json<ValidateResponse>, AppError> {
    let Json(files) = payload.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
    let file_info = state.manager.validate(&files).await?;
    Ok(Json(ValidateResponse { file_info }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_filename() {
        assert_eq!(encode_filename("report.pdf"), "report.pdf");
        assert_eq!(encode_filename("my file.txt"), "my%20file.txt");
        assert_eq!(encode_filename("Grüße.txt"), "Gr%C3%BC%C3%9Fe.txt");
        assert_eq!(encode_filename("a\"b;c"), "a%22b%3Bc");
    }

    #[test]
    fn test_parse_flag() {
        for on in ["true", "1", "on"] {
            assert!(parse_flag(on));
        }
        for off in ["", "false", "0", "off", "yes", "TRUE"] {
            assert!(!parse_flag(off));
        }
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("", "count", 1).unwrap(), 1);
        assert_eq!(parse_number("7", "count", 1).unwrap(), 7);
        assert!(parse_number("seven", "count", 1).is_err());
        assert!(parse_number("-1", "count", 1).is_err());
    }
}
