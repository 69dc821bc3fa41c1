use std::time::Instant;

use axum::body::{self, Body};
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Multipart, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Json, Response};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;
use vellum_ledger::{mime, LedgerBuilder};
use vellum_repository::{
    CancellationToken, Content, ContentInfo, Id, Ledger, Query as LedgerQuery, Statistics, Tags,
};

use crate::error::{ServerError, ServerResult};
use crate::metrics::MetricsSnapshot;
use crate::router::AppState;

pub const X_RESOURCE_ID: &str = "x-resource-id";
pub const X_DURATION: &str = "x-duration";

/// Content type assumed for a journal `content` part that declares none.
const DEFAULT_PART_TYPE: &str = "application/octet-stream";

// ---------------------------------------------------------------------------
// Request shapes
// ---------------------------------------------------------------------------

/// Query string shared by every resource endpoint.
///
/// `query.author_id=` (present but empty) matches only revisions with an
/// empty author, which is not the same as leaving it out.
#[derive(Debug, Default, Deserialize)]
pub struct ResourceParams {
    pub resource_id: Option<String>,
    #[serde(rename = "query.tags")]
    pub tags: Option<String>,
    #[serde(rename = "query.author_id")]
    pub author_id: Option<String>,
}

impl ResourceParams {
    fn resource_id(&self) -> ServerResult<Id> {
        let raw = self
            .resource_id
            .as_deref()
            .ok_or_else(|| ServerError::BadRequest("missing resource_id".into()))?;
        Id::parse(raw).map_err(|_| ServerError::BadRequest(format!("invalid resource_id {raw:?}")))
    }

    fn query(&self) -> LedgerQuery {
        let mut query = LedgerQuery::new();
        if let Some(tags) = &self.tags {
            query = query.with_tags(tags.split(',').map(str::trim).filter(|t| !t.is_empty()));
        }
        if let Some(author_id) = &self.author_id {
            query = query.with_author(author_id.clone());
        }
        query
    }
}

fn params(params: Result<Query<ResourceParams>, QueryRejection>) -> ServerResult<ResourceParams> {
    params
        .map(|Query(params)| params)
        .map_err(|e| ServerError::BadRequest(e.body_text()))
}

/// Ledger fields a client may set.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LedgerRequest {
    pub name: String,
    pub author_id: String,
    pub tags: Tags,
}

impl LedgerRequest {
    fn parse(data: &[u8]) -> ServerResult<Self> {
        serde_json::from_slice(data)
            .map_err(|e| ServerError::BadRequest(format!("invalid ledger document: {e}")))
    }

    fn from_json_body(headers: &HeaderMap, body: &[u8]) -> ServerResult<Self> {
        let content_type = header_str(headers, header::CONTENT_TYPE).unwrap_or_default();
        if mime::essence(content_type) != "application/json" {
            return Err(ServerError::BadRequest(format!(
                "expected application/json, got {content_type:?}"
            )));
        }
        Self::parse(body)
    }

    fn builder(self, resource_id: Id) -> LedgerBuilder {
        Ledger::builder()
            .resource_id(resource_id)
            .name(self.name)
            .author_id(self.author_id)
            .tags(self.tags.to_vec())
    }
}

#[derive(Debug, Serialize)]
pub struct ResourceResponse {
    pub resource_id: Id,
}

impl From<&Ledger> for ResourceResponse {
    fn from(ledger: &Ledger) -> Self {
        Self {
            resource_id: ledger.resource_id,
        }
    }
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn request_token(state: &AppState) -> CancellationToken {
    state.shutdown.child_token()
}

// ---------------------------------------------------------------------------
// Ledgers
// ---------------------------------------------------------------------------

/// `GET /ledgers/`
pub async fn get_ledger(
    State(state): State<AppState>,
    query: Result<Query<ResourceParams>, QueryRejection>,
) -> ServerResult<Json<Ledger>> {
    let params = params(query)?;
    let ledger = state
        .repository
        .select_ledger(&request_token(&state), params.resource_id()?, &params.query())
        .await?;
    Ok(Json(ledger))
}

/// `POST /ledgers/`
pub async fn post_ledger(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ServerResult<Json<ResourceResponse>> {
    let ledger = LedgerRequest::from_json_body(&headers, &body)?
        .builder(Id::new())
        .build()?;
    let stored = state
        .repository
        .insert_ledger(&request_token(&state), ledger)
        .await?;
    Ok(Json(ResourceResponse::from(&stored)))
}

/// `PUT /ledgers/`
pub async fn put_ledger(
    State(state): State<AppState>,
    query: Result<Query<ResourceParams>, QueryRejection>,
    headers: HeaderMap,
    body: Bytes,
) -> ServerResult<Json<ResourceResponse>> {
    let resource_id = params(query)?.resource_id()?;
    let ledger = LedgerRequest::from_json_body(&headers, &body)?
        .builder(resource_id)
        .build()?;
    let stored = state
        .repository
        .append_ledger(&request_token(&state), resource_id, ledger)
        .await?;
    Ok(Json(ResourceResponse::from(&stored)))
}

/// `PUT /ledgers/fork/`
pub async fn fork_ledger(
    State(state): State<AppState>,
    query: Result<Query<ResourceParams>, QueryRejection>,
    headers: HeaderMap,
    body: Bytes,
) -> ServerResult<Json<ResourceResponse>> {
    let resource_id = params(query)?.resource_id()?;
    let ledger = LedgerRequest::from_json_body(&headers, &body)?
        .builder(resource_id)
        .build()?;
    let forked = state
        .repository
        .fork_ledger(&request_token(&state), resource_id, ledger)
        .await?;
    Ok(Json(ResourceResponse::from(&forked)))
}

/// `DELETE /ledgers/` returns the tombstone revision.
pub async fn delete_ledger(
    State(state): State<AppState>,
    query: Result<Query<ResourceParams>, QueryRejection>,
) -> ServerResult<Json<Ledger>> {
    let resource_id = params(query)?.resource_id()?;
    let tombstone = state
        .repository
        .delete_ledger(&request_token(&state), resource_id)
        .await?;
    Ok(Json(tombstone))
}

/// `GET /ledgers/revisions/`
pub async fn get_revisions(
    State(state): State<AppState>,
    query: Result<Query<ResourceParams>, QueryRejection>,
) -> ServerResult<Json<Vec<Ledger>>> {
    let params = params(query)?;
    let ledgers = state
        .repository
        .select_ledgers(&request_token(&state), params.resource_id()?, &params.query())
        .await?;
    Ok(Json(ledgers))
}

/// `GET /ledgers/fork/revisions/`
pub async fn get_fork_revisions(
    State(state): State<AppState>,
    query: Result<Query<ResourceParams>, QueryRejection>,
) -> ServerResult<Json<Vec<Ledger>>> {
    let resource_id = params(query)?.resource_id()?;
    let ledgers = state
        .repository
        .select_fork_ledgers(&request_token(&state), resource_id)
        .await?;
    Ok(Json(ledgers))
}

// ---------------------------------------------------------------------------
// Contents
// ---------------------------------------------------------------------------

/// `GET /contents/` streams the blob of the latest matching revision.
pub async fn get_content(
    State(state): State<AppState>,
    query: Result<Query<ResourceParams>, QueryRejection>,
) -> ServerResult<Response> {
    let started = Instant::now();
    let params = params(query)?;
    let resource_id = params.resource_id()?;
    let mut content = state
        .repository
        .select_content(&request_token(&state), resource_id, &params.query())
        .await?;
    let stream = content.take_stream()?;
    state.metrics.record_sent(content.size());

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content.content_type())
        .header(header::CONTENT_LENGTH, content.size())
        .header(X_RESOURCE_ID, resource_id.to_string())
        .header(X_DURATION, format!("{:?}", started.elapsed()))
        .body(Body::from_stream(stream))
        .map_err(|e| ServerError::Internal(e.to_string()))
}

/// `POST /contents/` stores a raw body.
///
/// `Content-Type` and `Content-Length` are required, and an oversized
/// length is refused before any of the body is read.
pub async fn post_content(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> ServerResult<Json<ContentInfo>> {
    let content_type = header_str(&headers, header::CONTENT_TYPE)
        .ok_or_else(|| ServerError::BadRequest("missing Content-Type header".into()))?
        .to_string();
    let length: u64 = header_str(&headers, header::CONTENT_LENGTH)
        .ok_or_else(|| ServerError::BadRequest("missing Content-Length header".into()))?
        .parse()
        .map_err(|_| ServerError::BadRequest("malformed Content-Length header".into()))?;
    let limit = state.config.max_content_size;
    if length > limit {
        return Err(ServerError::BadRequest(format!(
            "content of {length} bytes exceeds the {limit} byte limit"
        )));
    }

    let capacity = usize::try_from(length).unwrap_or(usize::MAX);
    let data = body::to_bytes(body, capacity)
        .await
        .map_err(|e| ServerError::BadRequest(format!("could not read body: {e}")))?;
    if data.len() as u64 != length {
        return Err(ServerError::BadRequest(format!(
            "body has {} bytes, Content-Length says {length}",
            data.len()
        )));
    }

    let content = Content::from_bytes(data, content_type)?;
    let stored = state
        .repository
        .put_content(&request_token(&state), content)
        .await?;
    state.metrics.record_received(stored.size());
    Ok(Json(stored.into_info()))
}

// ---------------------------------------------------------------------------
// Journals
// ---------------------------------------------------------------------------

/// A ledger document uploaded together with its content.
struct Journal {
    document: LedgerRequest,
    content: Content,
}

async fn read_journal(
    multipart: Result<Multipart, MultipartRejection>,
) -> ServerResult<Journal> {
    let mut multipart = multipart.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let mut document = None;
    let mut content = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "document" => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::BadRequest(e.body_text()))?;
                document = Some(LedgerRequest::parse(&data)?);
            }
            "content" => {
                let content_type = field.content_type().unwrap_or(DEFAULT_PART_TYPE).to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::BadRequest(e.body_text()))?;
                content = Some(Content::from_bytes(data, content_type)?);
            }
            _ => {}
        }
    }
    Ok(Journal {
        document: document
            .ok_or_else(|| ServerError::BadRequest("missing document part".into()))?,
        content: content.ok_or_else(|| ServerError::BadRequest("missing content part".into()))?,
    })
}

/// Store the journal's content and build its ledger.
async fn store_journal(
    state: &AppState,
    cancel: &CancellationToken,
    journal: Journal,
    resource_id: Id,
) -> ServerResult<Ledger> {
    let stored = state.repository.put_content(cancel, journal.content).await?;
    state.metrics.record_received(stored.size());
    let info = stored.into_info();
    Ok(journal
        .document
        .builder(resource_id)
        .resource(info.address, info.size, info.content_type)
        .build()?)
}

/// `POST /journals/` creates a resource from a document and its content.
pub async fn post_journal(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ServerResult<Json<ResourceResponse>> {
    let journal = read_journal(multipart).await?;
    let cancel = request_token(&state);
    let ledger = store_journal(&state, &cancel, journal, Id::new()).await?;
    let stored = state.repository.insert_ledger(&cancel, ledger).await?;
    Ok(Json(ResourceResponse::from(&stored)))
}

/// `PUT /journals/` appends a document and its content to a resource.
pub async fn put_journal(
    State(state): State<AppState>,
    query: Result<Query<ResourceParams>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ServerResult<Json<ResourceResponse>> {
    let resource_id = params(query)?.resource_id()?;
    let journal = read_journal(multipart).await?;
    let cancel = request_token(&state);
    let ledger = store_journal(&state, &cancel, journal, resource_id).await?;
    let stored = state
        .repository
        .append_ledger(&cancel, resource_id, ledger)
        .await?;
    Ok(Json(ResourceResponse::from(&stored)))
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// `GET /status/`
pub async fn status() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "name": "vellum-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /statistics/`
pub async fn statistics(State(state): State<AppState>) -> ServerResult<Json<Statistics>> {
    let stats = state
        .repository
        .statistics(&request_token(&state))
        .await?;
    Ok(Json(stats))
}

/// `GET /metrics/`
pub async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

pub async fn not_found() -> ServerError {
    ServerError::NotFound
}
