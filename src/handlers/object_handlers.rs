//! HTTP handlers for the index page, uploads, deletes and object downloads.
//! Downloads stream the backend's payload straight through; all storage
//! concerns live behind `ObjectStore`.

use crate::{
    errors::AppError,
    handlers::pages,
    models::object::{ObjectInfo, StoredObject},
    state::AppState,
};
use axum::{
    Form,
    body::Body,
    extract::{FromRequest, Multipart, Query, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, Uri, header},
    response::{Html, IntoResponse, Response},
};
use bytes::Bytes;
use futures::{StreamExt, future, stream};
use serde::Deserialize;
use tracing::{debug, info};

/// Query parameters understood on gated GET routes. A repeated parameter
/// keeps its first value; unknown parameters are ignored.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct AccessQuery {
    pub token: Option<String>,
    /// Names an object to fetch directly from `/`.
    pub filename: Option<String>,
}

impl AccessQuery {
    fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut query = Self::default();
        for (name, value) in pairs {
            let slot = match name.as_str() {
                "token" => &mut query.token,
                "filename" => &mut query.filename,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        query
    }
}

/// Decoded POST body of the index page's forms.
#[derive(Debug, Default, Deserialize)]
pub struct PostForm {
    pub action: Option<String>,
    pub key: Option<String>,
    pub token: Option<String>,
    #[serde(skip)]
    pub file: Option<UploadedFile>,
}

#[derive(Debug)]
pub struct UploadedFile {
    pub name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// `GET /favicon.svg` — the only route that skips the token check.
pub async fn favicon() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "image/svg+xml")],
        pages::FAVICON_SVG,
    )
}

/// `GET /` — direct fetch when `filename` is given, otherwise the token
/// prompt or the listing.
pub async fn index(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let q = AccessQuery::from_pairs(pairs);
    let supplied = q.token.as_deref();

    if let Some(key) = q.filename.as_deref().filter(|k| !k.is_empty()) {
        state.guard.check(supplied)?;
        return fetch_object(&state, key).await;
    }

    if state.guard.is_enabled() && supplied.is_none_or(str::is_empty) {
        return Ok(Html(pages::token_prompt_page()).into_response());
    }
    state.guard.check(supplied)?;

    let objects = state.store.list().await?;
    debug!(count = objects.len(), "listed objects");
    Ok(Html(pages::index_page(&objects, state.guard.token())).into_response())
}

/// `POST /` — delete when `action=delete`, upload otherwise. Redirects back
/// to the index on success.
pub async fn mutate(State(state): State<AppState>, request: Request) -> Result<Response, AppError> {
    let form = read_post_form(request).await?;
    state.guard.check(form.token.as_deref())?;

    if form.action.as_deref() == Some("delete") {
        let key = form
            .key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AppError::bad_request("No file specified"))?;
        state.store.delete(&key).await?;
        info!(key = %key, "deleted object");
    } else {
        let file = form
            .file
            .filter(|f| !f.name.is_empty())
            .ok_or_else(|| AppError::bad_request("No file uploaded"))?;
        let content_type = file.content_type.or_else(|| {
            mime_guess::from_path(&file.name)
                .first()
                .map(|mime| mime.to_string())
        });
        let content = stream::once(future::ready(Ok(file.data))).boxed();
        let stored = state.store.put(&file.name, content_type, content).await?;
        info!(key = %stored.key, size = stored.size_bytes, "uploaded object");
    }

    Ok(redirect_home(state.guard.token()))
}

/// Any method on `/{*key}` — percent-decode the path into a key and stream
/// the object back.
pub async fn fetch_by_path(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
    uri: Uri,
) -> Result<Response, AppError> {
    let q = AccessQuery::from_pairs(pairs);
    state.guard.check(q.token.as_deref())?;

    let raw = uri.path().trim_start_matches('/');
    let key = urlencoding::decode(raw).map_err(|_| AppError::bad_request("Invalid object key"))?;
    fetch_object(&state, &key).await
}

async fn fetch_object(state: &AppState, key: &str) -> Result<Response, AppError> {
    let StoredObject { info, content } = state
        .store
        .get(key)
        .await?
        .ok_or_else(|| AppError::not_found("File not found"))?;
    debug!(key = %info.key, size = info.size_bytes, "serving object");

    let mut response = Response::new(Body::from_stream(content));
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &info);
    Ok(response)
}

/// Collect the form fields from either encoding the index page submits:
/// multipart for uploads, urlencoded for deletes. Any other body yields an
/// empty form, which the guard and field checks then reject.
async fn read_post_form(request: Request) -> Result<PostForm, AppError> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|rej| AppError::new(rej.status(), rej.body_text()))?;
        read_multipart(multipart).await
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(form) = Form::<PostForm>::from_request(request, &())
            .await
            .map_err(|rej| AppError::new(rej.status(), rej.body_text()))?;
        Ok(form)
    } else {
        Ok(PostForm::default())
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<PostForm, AppError> {
    let mut form = PostForm::default();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                // A part without a filename is a plain text field, not a file.
                let Some(file_name) = field.file_name().map(str::to_string) else {
                    continue;
                };
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(multipart_error)?;
                form.file = Some(UploadedFile {
                    name: file_name,
                    content_type,
                    data,
                });
            }
            "action" => form.action = Some(field.text().await.map_err(multipart_error)?),
            "key" => form.key = Some(field.text().await.map_err(multipart_error)?),
            "token" => form.token = Some(field.text().await.map_err(multipart_error)?),
            _ => {}
        }
    }
    Ok(form)
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> AppError {
    AppError::new(err.status(), err.body_text())
}

/// 302 back to the index, keeping the token in the query when one is
/// configured.
fn redirect_home(token: Option<&str>) -> Response {
    (
        StatusCode::FOUND,
        [(header::LOCATION, pages::root_location(token))],
    )
        .into_response()
}

fn set_object_headers(headers: &mut HeaderMap, meta: &ObjectInfo) {
    let content_type = meta
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
    headers.insert(header::CONTENT_TYPE, content_type);

    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from(meta.size_bytes.max(0) as u64),
    );

    if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", meta.etag)) {
        headers.insert(header::ETAG, value);
    }

    let last_modified = meta
        .last_modified
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string();
    if let Ok(value) = HeaderValue::from_str(&last_modified) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}
