//! # API REST
//!
//! REST API implementation for Depot.
//!
//! Handles:
//! - HTTP endpoints with axum over a [`ContentStore`]
//! - Mapping store errors onto HTTP status codes
//! - OpenAPI/Swagger documentation
//!
//! Identity is resolved upstream: every object route carries an owner id that the caller has
//! already authenticated. This crate never looks users up.
//!
//! | Store error            | Status |
//! |------------------------|--------|
//! | `NotFound`             | 404    |
//! | `InvalidPath`          | 400    |
//! | `HashMismatch`         | 422    |
//! | `Timeout`              | 503    |
//! | `Io`, root/config      | 500    |

#![warn(rust_2018_idioms)]

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path as AxumPath, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, put},
    Router,
};
use depot_files::{ContentStore, FilesError, Fingerprint, ObjectMetadata, OwnerId};
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Request header carrying the fingerprint the client expects its upload to hash to.
pub const FINGERPRINT_HEADER: &str = "x-content-fingerprint";

const OCTET_STREAM: &str = "application/octet-stream";

type ApiError = (StatusCode, &'static str);

/// Application state shared across REST API handlers
#[derive(Clone)]
pub struct AppState {
    store: ContentStore,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct PutObjectRes {
    /// Hex digest of the uploaded content
    pub fingerprint: String,
    /// Location of the object relative to the storage root, usable with `GET /paths/{path}`
    pub relative_path: String,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct ObjectMetadataRes {
    pub hash_algorithm: String,
    pub fingerprint: String,
    pub relative_path: String,
    pub size_bytes: u64,
    pub media_type: Option<String>,
    /// RFC 3339 timestamp
    pub stored_at: String,
}

impl From<ObjectMetadata> for ObjectMetadataRes {
    fn from(metadata: ObjectMetadata) -> Self {
        Self {
            hash_algorithm: metadata.hash_algorithm.to_string(),
            fingerprint: metadata.fingerprint.to_string(),
            relative_path: metadata.relative_path.to_string(),
            size_bytes: metadata.size_bytes,
            media_type: metadata.media_type.map(|t| t.to_string()),
            stored_at: metadata.stored_at.to_rfc3339(),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(health, put_object, get_object, object_metadata, get_by_path),
    components(schemas(HealthRes, PutObjectRes, ObjectMetadataRes))
)]
pub struct ApiDoc;

/// Builds the REST router over `store`
///
/// Request bodies larger than `max_upload_bytes` are rejected with `413 Payload Too Large`.
pub fn router(store: ContentStore, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/owners/:owner/versions/:version/objects", put(put_object))
        .route(
            "/owners/:owner/versions/:version/objects/:fingerprint",
            get(get_object),
        )
        .route(
            "/owners/:owner/versions/:version/objects/:fingerprint/metadata",
            get(object_metadata),
        )
        .route("/paths/*path", get(get_by_path))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(AppState { store })
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "Depot REST API is alive".into(),
    })
}

#[utoipa::path(
    put,
    path = "/owners/{owner}/versions/{version}/objects",
    params(
        ("owner" = String, Path, description = "Owner id resolved by the identity layer"),
        ("version" = u32, Path, description = "Version number"),
        ("x-content-fingerprint" = Option<String>, Header, description = "Expected hex digest of the body")
    ),
    request_body(content = String, content_type = "application/octet-stream"),
    responses(
        (status = 201, description = "Object stored (or already present)", body = PutObjectRes),
        (status = 400, description = "Invalid owner, version or fingerprint"),
        (status = 413, description = "Body too large"),
        (status = 422, description = "Body does not match the expected fingerprint"),
        (status = 503, description = "Storage timed out; retry"),
        (status = 500, description = "Internal server error")
    )
)]
/// Store the request body as an object
///
/// Uploading the same bytes again returns the same fingerprint without rewriting the object.
/// When the `x-content-fingerprint` header is present the body is stored only if it hashes to
/// that value.
#[axum::debug_handler]
async fn put_object(
    State(state): State<AppState>,
    AxumPath((owner, version)): AxumPath<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<PutObjectRes>), ApiError> {
    let owner = parse_owner(&owner)?;
    let version = parse_version(&version)?;

    let expected = match headers.get(FINGERPRINT_HEADER) {
        Some(value) => {
            let value = value
                .to_str()
                .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid fingerprint header"))?;
            Some(state.store.parse_fingerprint(value).map_err(files_error)?)
        }
        None => None,
    };

    let fingerprint = match &expected {
        Some(expected) => state
            .store
            .put_verified(&body, &owner, version, expected)
            .await,
        None => state.store.put(&body, &owner, version).await,
    }
    .map_err(files_error)?;

    let relative_path = state
        .store
        .relative_path(&owner, &fingerprint, version)
        .to_string_lossy()
        .into_owned();

    Ok((
        StatusCode::CREATED,
        Json(PutObjectRes {
            fingerprint: fingerprint.to_string(),
            relative_path,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/owners/{owner}/versions/{version}/objects/{fingerprint}",
    params(
        ("owner" = String, Path, description = "Owner id resolved by the identity layer"),
        ("version" = u32, Path, description = "Version number"),
        ("fingerprint" = String, Path, description = "Hex digest returned by the upload")
    ),
    responses(
        (status = 200, description = "Object bytes", content_type = "application/octet-stream"),
        (status = 400, description = "Invalid owner, version or fingerprint"),
        (status = 404, description = "No such object"),
        (status = 422, description = "Stored bytes failed verification"),
        (status = 503, description = "Storage timed out; retry"),
        (status = 500, description = "Internal server error")
    )
)]
/// Read an object by fingerprint
#[axum::debug_handler]
async fn get_object(
    State(state): State<AppState>,
    AxumPath((owner, version, fingerprint)): AxumPath<(String, String, String)>,
) -> Result<Response, ApiError> {
    let (owner, version, fingerprint) = parse_address(&state, &owner, &version, &fingerprint)?;

    let content = state
        .store
        .get_by_fingerprint(&owner, &fingerprint, version)
        .await
        .map_err(files_error)?;

    Ok(bytes_response(content))
}

#[utoipa::path(
    get,
    path = "/owners/{owner}/versions/{version}/objects/{fingerprint}/metadata",
    params(
        ("owner" = String, Path, description = "Owner id resolved by the identity layer"),
        ("version" = u32, Path, description = "Version number"),
        ("fingerprint" = String, Path, description = "Hex digest returned by the upload")
    ),
    responses(
        (status = 200, description = "Object metadata", body = ObjectMetadataRes),
        (status = 400, description = "Invalid owner, version or fingerprint"),
        (status = 404, description = "No such object"),
        (status = 500, description = "Internal server error")
    )
)]
/// Describe an object without returning its bytes
#[axum::debug_handler]
async fn object_metadata(
    State(state): State<AppState>,
    AxumPath((owner, version, fingerprint)): AxumPath<(String, String, String)>,
) -> Result<Json<ObjectMetadataRes>, ApiError> {
    let (owner, version, fingerprint) = parse_address(&state, &owner, &version, &fingerprint)?;

    let metadata = state
        .store
        .stat(&owner, &fingerprint, version)
        .await
        .map_err(files_error)?;

    Ok(Json(metadata.into()))
}

#[utoipa::path(
    get,
    path = "/paths/{path}",
    params(
        ("path" = String, Path, description = "Path relative to the storage root")
    ),
    responses(
        (status = 200, description = "File bytes", content_type = "application/octet-stream"),
        (status = 400, description = "Path escapes the storage root or is not a file"),
        (status = 404, description = "Nothing at that path"),
        (status = 500, description = "Internal server error")
    )
)]
/// Read a stored file by its path under the storage root
#[axum::debug_handler]
async fn get_by_path(
    State(state): State<AppState>,
    AxumPath(path): AxumPath<String>,
) -> Result<Response, ApiError> {
    let content = state.store.get_by_path(&path).await.map_err(files_error)?;
    Ok(bytes_response(content))
}

fn parse_owner(owner: &str) -> Result<OwnerId, ApiError> {
    OwnerId::parse(owner).map_err(|e| {
        tracing::debug!("Rejected owner id: {}", e);
        (StatusCode::BAD_REQUEST, "Invalid owner id")
    })
}

fn parse_version(version: &str) -> Result<u32, ApiError> {
    version
        .parse::<u32>()
        .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid version"))
}

fn parse_address(
    state: &AppState,
    owner: &str,
    version: &str,
    fingerprint: &str,
) -> Result<(OwnerId, u32, Fingerprint), ApiError> {
    Ok((
        parse_owner(owner)?,
        parse_version(version)?,
        state
            .store
            .parse_fingerprint(fingerprint)
            .map_err(files_error)?,
    ))
}

fn bytes_response(content: Vec<u8>) -> Response {
    let content_type = infer::get(&content)
        .map(|kind| kind.mime_type())
        .unwrap_or(OCTET_STREAM);
    ([(header::CONTENT_TYPE, content_type)], content).into_response()
}

/// Maps a store error onto the HTTP status contract
fn files_error(err: FilesError) -> ApiError {
    match err {
        FilesError::NotFound(what) => {
            tracing::debug!("Not found: {}", what);
            (StatusCode::NOT_FOUND, "Not found")
        }
        FilesError::InvalidPath(reason) => {
            tracing::warn!("Invalid path: {}", reason);
            (StatusCode::BAD_REQUEST, "Invalid path")
        }
        FilesError::HashMismatch { expected, actual } => {
            tracing::warn!("Hash mismatch: expected {}, computed {}", expected, actual);
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Content does not match fingerprint",
            )
        }
        FilesError::Timeout(limit) => {
            tracing::warn!("Storage operation timed out after {:?}", limit);
            (StatusCode::SERVICE_UNAVAILABLE, "Storage timed out")
        }
        e @ (FilesError::Io(_)
        | FilesError::InvalidRootDirectory(_)
        | FilesError::InvalidConfig(_)) => {
            tracing::error!("Storage error: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}
