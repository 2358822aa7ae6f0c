//! Streams locally stored thumbnails from the assets root.

use crate::{errors::AppError, services::thumbnail_store::media_type_for_file, state::AppState};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use std::io;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

/// `GET /assets/{file}`: stream one asset without buffering it.
pub async fn get_asset(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> Result<Response, AppError> {
    if !is_plain_file_name(&file) {
        return Err(AppError::not_found("asset not found"));
    }

    let path = state.assets_root.join(&file);
    let handle = File::open(&path).await.map_err(|err| {
        if err.kind() == io::ErrorKind::NotFound {
            AppError::not_found("asset not found")
        } else {
            AppError::dependency("error reading asset", &err)
        }
    })?;
    let len = handle
        .metadata()
        .await
        .map_err(|err| AppError::dependency("error reading asset", &err))?
        .len();

    let mut response = Response::new(Body::from_stream(ReaderStream::new(handle)));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(media_type_for_file(&file)),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    Ok(response)
}

/// Single path segment, no hidden files, no traversal.
fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains("..")
        && !name
            .bytes()
            .any(|b| b == b'/' || b == b'\\' || b == b'\0' || b.is_ascii_control())
}
