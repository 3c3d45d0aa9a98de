//! HTTP router for the library entry endpoints.
//!
//! This module provides the `EntriesRouter` struct that receives HTTP requests
//! for a library's entries, checks them against the access gate, and dispatches
//! them to the lister or accessor. Authentication happens upstream: callers
//! pass the authenticated user, or `None` for an anonymous request.
//!
//! | Method   | Path                                   | Operation |
//! |----------|----------------------------------------|-----------|
//! | `GET`    | `/api/libraries/{id}/entries`          | list      |
//! | `GET`    | `/api/libraries/{id}/entries/download` | download  |
//! | `DELETE` | `/api/libraries/{id}/entries`          | delete    |

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{ALLOW, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderValue, Method, Request, Response, StatusCode};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use protocol::{AccessRight, ErrorCode, ErrorMessage, FileInfo, Library, LibraryId, User};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::access::{Access, AccessGate, LibraryCatalog};
use crate::entries::{DownloadStream, EntryAccessor, EntryError, EntryLister, PathResolver};

const API_PREFIX: &str = "/api/libraries/";

/// Generic message for every 404, so denials and missing entries look alike.
const NOT_FOUND_MESSAGE: &str = "not found";

const INTERNAL_ERROR_MESSAGE: &str = "internal server error";

/// Errors that can occur while handling an entry request.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No authenticated user was attached to the request.
    #[error("authentication required")]
    Unauthenticated,

    /// A required query parameter was absent.
    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),

    /// Both `parent` and `path` were supplied to a listing.
    #[error("parameters `parent` and `path` are mutually exclusive")]
    ConflictingParameters,

    /// The library does not exist.
    #[error("library {0} not found")]
    LibraryNotFound(LibraryId),

    /// The access gate denied the operation.
    #[error("access to library {library_id} denied for {right:?}")]
    AccessDenied {
        library_id: LibraryId,
        right: AccessRight,
    },

    /// The route exists but not for this method.
    #[error("method {method} not allowed")]
    MethodNotAllowed {
        method: Method,
        allow: &'static str,
    },

    /// No route matches the request path.
    #[error("no route for {0}")]
    RouteNotFound(String),

    /// Entry service error.
    #[error(transparent)]
    Entry(#[from] EntryError),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status for this error.
    ///
    /// This is the only place the error taxonomy is mapped to status codes.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::MissingParameter(_) | ApiError::ConflictingParameters => {
                StatusCode::BAD_REQUEST
            }
            ApiError::LibraryNotFound(_)
            | ApiError::AccessDenied { .. }
            | ApiError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Entry(e) => match e {
                EntryError::PathTraversal(_) | EntryError::NotFound(_) => StatusCode::NOT_FOUND,
                EntryError::InvalidOperation(_) => StatusCode::BAD_REQUEST,
                EntryError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert the error to the JSON error body.
    ///
    /// 404 and 500 bodies never carry details.
    pub fn to_error_message(&self) -> ErrorMessage {
        let status = self.status();
        let code = match status {
            StatusCode::UNAUTHORIZED => ErrorCode::Unauthorized,
            StatusCode::BAD_REQUEST => ErrorCode::BadRequest,
            StatusCode::NOT_FOUND => ErrorCode::NotFound,
            StatusCode::METHOD_NOT_ALLOWED => ErrorCode::MethodNotAllowed,
            _ => ErrorCode::InternalError,
        };

        let message = match code {
            ErrorCode::NotFound => NOT_FOUND_MESSAGE.to_string(),
            ErrorCode::InternalError => INTERNAL_ERROR_MESSAGE.to_string(),
            _ => self.to_string(),
        };

        ErrorMessage::new(code, message)
    }
}

/// Body of a routed response.
#[derive(Debug)]
pub enum ResponseBody {
    /// No content.
    Empty,
    /// A serialized JSON document.
    Json(Bytes),
    /// A file being streamed to the client.
    Download(DownloadStream),
}

impl ResponseBody {
    /// Collect the whole body into memory.
    pub async fn into_bytes(self) -> io::Result<Bytes> {
        match self {
            ResponseBody::Empty => Ok(Bytes::new()),
            ResponseBody::Json(bytes) => Ok(bytes),
            ResponseBody::Download(stream) => stream.read_to_end().await,
        }
    }
}

/// A matched endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    List(LibraryId),
    Download(LibraryId),
    Delete(LibraryId),
}

impl Endpoint {
    /// Match a method and URI path against the entry endpoints.
    fn parse(method: &Method, path: &str) -> Result<Self, ApiError> {
        let not_found = || ApiError::RouteNotFound(path.to_string());

        let rest = path.strip_prefix(API_PREFIX).ok_or_else(not_found)?;
        let segments: Vec<&str> = rest.split('/').collect();

        match segments.as_slice() {
            [id, "entries"] => {
                let library_id = id.parse().map_err(|_| not_found())?;
                match *method {
                    Method::GET => Ok(Endpoint::List(library_id)),
                    Method::DELETE => Ok(Endpoint::Delete(library_id)),
                    _ => Err(ApiError::MethodNotAllowed {
                        method: method.clone(),
                        allow: "GET, DELETE",
                    }),
                }
            }
            [id, "entries", "download"] => {
                let library_id = id.parse().map_err(|_| not_found())?;
                match *method {
                    Method::GET => Ok(Endpoint::Download(library_id)),
                    _ => Err(ApiError::MethodNotAllowed {
                        method: method.clone(),
                        allow: "GET",
                    }),
                }
            }
            _ => Err(not_found()),
        }
    }

    fn library_id(&self) -> LibraryId {
        match self {
            Endpoint::List(id) | Endpoint::Download(id) | Endpoint::Delete(id) => *id,
        }
    }

    fn required_right(&self) -> AccessRight {
        match self {
            Endpoint::List(_) | Endpoint::Download(_) => AccessRight::Read,
            Endpoint::Delete(_) => AccessRight::Write,
        }
    }
}

/// The `parent` and `path` query parameters.
///
/// Only the first occurrence of each is used. Values arrive URL-decoded.
#[derive(Debug, Default, PartialEq, Eq)]
struct EntryQuery {
    parent: Option<String>,
    path: Option<String>,
}

impl EntryQuery {
    fn parse(query: Option<&str>) -> Self {
        let mut parsed = EntryQuery::default();
        let Some(query) = query else {
            return parsed;
        };

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "parent" if parsed.parent.is_none() => parsed.parent = Some(value.into_owned()),
                "path" if parsed.path.is_none() => parsed.path = Some(value.into_owned()),
                _ => {}
            }
        }
        parsed
    }

    fn require_path(&self) -> Result<&str, ApiError> {
        self.path.as_deref().ok_or(ApiError::MissingParameter("path"))
    }
}

/// Router that dispatches entry requests to the lister and accessor.
///
/// The router holds the library catalog and access gate (usually the same
/// store) and is otherwise stateless. Each request builds a fresh
/// [`PathResolver`] for the library's root folder.
pub struct EntriesRouter<S: LibraryCatalog + AccessGate> {
    /// Library lookup and access decisions.
    store: Arc<S>,
    /// Directory listing.
    lister: EntryLister,
    /// Download and delete.
    accessor: EntryAccessor,
}

impl<S: LibraryCatalog + AccessGate> EntriesRouter<S> {
    /// Create a new router over the given store.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            lister: EntryLister::new(),
            accessor: EntryAccessor::new(),
        }
    }

    /// Set the read buffer size used for downloads.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.accessor = self.accessor.with_chunk_size(chunk_size);
        self
    }

    /// Route a request to the appropriate handler.
    ///
    /// The request body is ignored. Errors are rendered into the response;
    /// this never fails.
    pub async fn route<B>(
        &self,
        request: &Request<B>,
        user: Option<&User>,
    ) -> Response<ResponseBody> {
        debug!(
            method = %request.method(),
            uri = %request.uri(),
            user_id = ?user.map(|u| u.id),
            "Routing request"
        );

        match self.dispatch(request, user).await {
            Ok(response) => response,
            Err(e) => error_response(&e),
        }
    }

    async fn dispatch<B>(
        &self,
        request: &Request<B>,
        user: Option<&User>,
    ) -> Result<Response<ResponseBody>, ApiError> {
        let endpoint = Endpoint::parse(request.method(), request.uri().path())?;
        let user = user.ok_or(ApiError::Unauthenticated)?;
        let query = EntryQuery::parse(request.uri().query());

        match endpoint {
            Endpoint::List(_) => {
                if query.parent.is_some() && query.path.is_some() {
                    return Err(ApiError::ConflictingParameters);
                }
                let library = self.authorize(user, &endpoint)?;
                self.handle_list(&library, &query).await
            }
            Endpoint::Download(_) => {
                let path = query.require_path()?;
                let library = self.authorize(user, &endpoint)?;
                self.handle_download(&library, path).await
            }
            Endpoint::Delete(_) => {
                let path = query.require_path()?;
                let library = self.authorize(user, &endpoint)?;
                self.handle_delete(&library, user, path).await
            }
        }
    }

    /// Look up the endpoint's library and check the required right.
    ///
    /// A missing library and a denial produce errors that render identically.
    fn authorize(&self, user: &User, endpoint: &Endpoint) -> Result<Library, ApiError> {
        let library_id = endpoint.library_id();
        let right = endpoint.required_right();

        let library = self
            .store
            .get_library(library_id)
            .map_err(|e| ApiError::Internal(format!("Failed to look up library: {e:#}")))?
            .ok_or(ApiError::LibraryNotFound(library_id))?;

        match self.store.check(user, library_id, right) {
            Ok(Access::Allow) => Ok(library),
            Ok(Access::Deny) => {
                warn!(
                    library_id = %library_id,
                    user_id = %user.id,
                    right = ?right,
                    "Access denied"
                );
                Err(ApiError::AccessDenied { library_id, right })
            }
            Err(e) => Err(ApiError::Internal(format!(
                "Failed to check library access: {e:#}"
            ))),
        }
    }

    // =========================================================================
    // Handlers
    // =========================================================================

    async fn handle_list(
        &self,
        library: &Library,
        query: &EntryQuery,
    ) -> Result<Response<ResponseBody>, ApiError> {
        let resolver = PathResolver::new(&library.root_folder);

        let entries: Vec<FileInfo> = match (&query.path, &query.parent) {
            (Some(path), _) => {
                let resolved = resolver.resolve(path)?;
                self.lister.stat(&resolved).await?.into_iter().collect()
            }
            (None, parent) => {
                let resolved = resolver.resolve(parent.as_deref().unwrap_or(""))?;
                self.lister.list(&resolved).await?
            }
        };

        let body = serde_json::to_vec(&entries)
            .map_err(|e| ApiError::Internal(format!("Failed to serialize entries: {e}")))?;

        let mut response = Response::new(ResponseBody::Json(Bytes::from(body)));
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(response)
    }

    async fn handle_download(
        &self,
        library: &Library,
        path: &str,
    ) -> Result<Response<ResponseBody>, ApiError> {
        let resolved = PathResolver::new(&library.root_folder).resolve(path)?;
        let stream = self.accessor.open(&resolved).await?;

        let content_type = HeaderValue::from_str(stream.content_type())
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
        let disposition = HeaderValue::from_str(&content_disposition(stream.file_name()))
            .map_err(|e| ApiError::Internal(format!("Invalid content disposition: {e}")))?;
        let length = HeaderValue::from(stream.size());

        debug!(
            library_id = %library.id,
            path = %resolved.relative(),
            size = stream.size(),
            "Serving download"
        );

        let mut response = Response::new(ResponseBody::Download(stream));
        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, content_type);
        headers.insert(CONTENT_LENGTH, length);
        headers.insert(CONTENT_DISPOSITION, disposition);
        Ok(response)
    }

    async fn handle_delete(
        &self,
        library: &Library,
        user: &User,
        path: &str,
    ) -> Result<Response<ResponseBody>, ApiError> {
        let resolved = PathResolver::new(&library.root_folder).resolve(path)?;
        self.accessor.remove(&resolved).await?;

        info!(
            library_id = %library.id,
            user_id = %user.id,
            path = %resolved.relative(),
            "Entry delete request completed"
        );

        let mut response = Response::new(ResponseBody::Empty);
        *response.status_mut() = StatusCode::NO_CONTENT;
        Ok(response)
    }
}

/// Render an error as a JSON response.
fn error_response(err: &ApiError) -> Response<ResponseBody> {
    let status = err.status();

    if status.is_server_error() {
        error!(error = %err, "Request failed");
    } else {
        debug!(status = %status, error = %err, "Request rejected");
    }

    let body = match serde_json::to_vec(&err.to_error_message()) {
        Ok(json) => ResponseBody::Json(Bytes::from(json)),
        Err(_) => ResponseBody::Empty,
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let ApiError::MethodNotAllowed { allow, .. } = err {
        headers.insert(ALLOW, HeaderValue::from_static(*allow));
    }
    response
}

/// Build an `attachment` disposition for a file name.
///
/// Names that are not printable ASCII get an ASCII fallback plus an RFC 5987
/// `filename*` parameter.
fn content_disposition(file_name: &str) -> String {
    let printable = file_name.bytes().all(|b| (0x20..0x7f).contains(&b));

    let fallback: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' if printable => format!("\\{c}"),
            ' '..='~' => c.to_string(),
            _ => "_".to_string(),
        })
        .collect();

    if printable {
        format!("attachment; filename=\"{fallback}\"")
    } else {
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            fallback.replace(['"', '\\'], "_"),
            utf8_percent_encode(file_name, NON_ALPHANUMERIC)
        )
    }
}
