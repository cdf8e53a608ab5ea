//! HTTP API for capsule operations
//!
//! REST surface over the capsule service:
//!
//! ## Capsule API
//! - `POST /capsules` - Create a capsule (optional base64 `content` field)
//! - `GET /capsules/{id}` - Fetch a capsule
//! - `GET /capsules/ledger/{ledger_id}` - Fetch by ledger id
//! - `GET /capsules/creator/{address}` - List by creator
//! - `GET /capsules/recipient/{address}` - List by recipient
//! - `GET /capsules/address/{address}` - List by either party
//! - `PATCH /capsules/{id}/status?status=OPENED` - Administrative override
//! - `POST /capsules/{id}/open?requesterAddress=0x..` - Attempt an open
//! - `GET /capsules/{id}/content` - Fetch sealed content bytes
//! - `GET /capsules/{id}/ledger` - Ledger-side state for reconciliation
//! - `DELETE /capsules/{id}` - Delete a capsule (assets cascade)
//!
//! ## Discovery API
//! - `GET /capsules/explore/popular?limit=10`
//! - `GET /capsules/explore/featured`
//! - `GET /capsules/explore/recent?limit=10`
//! - `GET /capsules/explore/subscribed?limit=10`
//!
//! ## Engagement API
//! - `POST /capsules/{id}/view`, `POST /capsules/{id}/share`
//! - `POST /capsules/{id}/subscribe?userAddress=0x..`
//!
//! ## Operations
//! - `POST /sweep` - Run the readiness sweep now (normally the scheduler's job)
//! - `GET /orphans` - Ledger registrations awaiting reconciliation
//! - `GET /health` - Health check with record-store stats

use std::net::SocketAddr;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::error::CapsuleError;
use crate::model::{AssetDraft, AssetType, CapsuleDraft, CapsuleStatus, ConditionType};
use crate::services::{response, Services};

/// HTTP server state
pub struct HttpServer {
    services: Arc<Services>,
    bind_addr: SocketAddr,
}

/// Request body for creating a capsule - camelCase like the JSON API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCapsuleRequest {
    title: String,
    #[serde(default)]
    description: Option<String>,
    creator_address: String,
    #[serde(default)]
    recipient_address: Option<String>,
    condition_type: ConditionType,
    #[serde(default)]
    condition_data: Option<String>,
    #[serde(default)]
    open_date: Option<DateTime<Utc>>,
    #[serde(default)]
    featured: bool,
    #[serde(default)]
    assets: Vec<AssetRequest>,
    /// Base64-encoded content to seal into the content store
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetRequest {
    asset_type: AssetType,
    value: String,
    #[serde(default)]
    token_address: Option<String>,
    #[serde(default)]
    token_id: Option<String>,
    #[serde(default)]
    token_amount: Option<String>,
}

/// Query parameters carrying a result limit
#[derive(Debug, Deserialize)]
struct LimitQuery {
    #[serde(default = "default_limit")]
    limit: u32,
}

fn default_limit() -> u32 {
    10
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenQuery {
    requester_address: String,
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscribeQuery {
    user_address: String,
}

fn parse_query<T: serde::de::DeserializeOwned>(req: &Request<Incoming>) -> Result<T, CapsuleError> {
    serde_urlencoded::from_str(req.uri().query().unwrap_or(""))
        .map_err(|e| CapsuleError::InvalidInput(format!("Bad query string: {}", e)))
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(services: Arc<Services>, bind_addr: SocketAddr) -> Self {
        Self {
            services,
            bind_addr,
        }
    }

    /// Run the HTTP server
    pub async fn run(self: Arc<Self>) -> Result<(), CapsuleError> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "HTTP server listening");

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { server.handle_request(req).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    warn!(addr = %remote_addr, error = %err, "Connection error");
                }
            });
        }
    }

    /// Route requests to handlers
    async fn handle_request(
        &self,
        req: Request<Incoming>,
    ) -> Result<Response<Full<Bytes>>, hyper::Error> {
        let path = req.uri().path().to_string();
        let method = req.method().clone();

        debug!(method = %method, path = %path, "Incoming request");

        let result = match (method.clone(), path.as_str()) {
            (Method::GET, "/health") => self.handle_health().await,

            (Method::POST, "/capsules") => self.handle_create(req).await,

            (Method::POST, "/sweep") => self.handle_sweep().await,

            (Method::GET, "/orphans") => self.handle_orphans().await,

            (_, p) if p.starts_with("/capsules/") => {
                let rest = p.strip_prefix("/capsules/").unwrap_or("");
                self.route_capsule(req, method, rest).await
            }

            _ => Ok(Response::builder()
                .status(StatusCode::NOT_FOUND)
                .body(Full::new(Bytes::from("Not Found")))
                .unwrap()),
        };

        match result {
            Ok(response) => Ok(response),
            Err(e) => {
                error!(error = %e, "Request error");
                Ok(response::error_response(e))
            }
        }
    }

    /// Route `/capsules/{...}` sub-paths
    async fn route_capsule(
        &self,
        req: Request<Incoming>,
        method: Method,
        rest: &str,
    ) -> Result<Response<Full<Bytes>>, CapsuleError> {
        let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();

        match (method, segments.as_slice()) {
            (Method::GET, ["ledger", ledger_id]) => self.handle_get_by_ledger_id(ledger_id),
            (Method::GET, ["creator", address]) => {
                Ok(response::from_result(self.services.capsules.list_by_creator(address)))
            }
            (Method::GET, ["recipient", address]) => {
                Ok(response::from_result(self.services.capsules.list_by_recipient(address)))
            }
            (Method::GET, ["address", address]) => {
                Ok(response::from_result(self.services.capsules.list_by_address(address)))
            }
            (Method::GET, ["explore", kind]) => self.handle_explore(&req, kind),

            (Method::GET, [id]) => {
                let id = parse_id(id)?;
                Ok(response::from_option(
                    self.services.capsules.get(id),
                    "Capsule not found",
                ))
            }
            (Method::DELETE, [id]) => {
                let id = parse_id(id)?;
                Ok(response::from_delete_result(
                    self.services.capsules.delete(id),
                    "Capsule not found",
                ))
            }
            (Method::PATCH, [id, "status"]) => {
                let id = parse_id(id)?;
                self.handle_update_status(&req, id)
            }
            (Method::POST, [id, "open"]) => {
                let id = parse_id(id)?;
                self.handle_open(&req, id).await
            }
            (Method::GET, [id, "content"]) => {
                let id = parse_id(id)?;
                self.handle_get_content(id).await
            }
            (Method::GET, [id, "ledger"]) => {
                let id = parse_id(id)?;
                Ok(response::from_result(
                    self.services.capsules.ledger_state(id).await,
                ))
            }
            (Method::POST, [id, "view"]) => {
                let id = parse_id(id)?;
                Ok(response::from_result(self.services.capsules.record_view(id)))
            }
            (Method::POST, [id, "share"]) => {
                let id = parse_id(id)?;
                Ok(response::from_result(self.services.capsules.record_share(id)))
            }
            (Method::POST, [id, "subscribe"]) => {
                let id = parse_id(id)?;
                let query: SubscribeQuery = parse_query(&req)?;
                Ok(response::from_result(
                    self.services.capsules.subscribe(id, &query.user_address),
                ))
            }

            _ => Ok(Response::builder()
                .status(StatusCode::NOT_FOUND)
                .body(Full::new(Bytes::from("Not Found")))
                .unwrap()),
        }
    }

    /// Health check endpoint
    async fn handle_health(&self) -> Result<Response<Full<Bytes>>, CapsuleError> {
        let stats = self.services.db.stats()?;
        let body = serde_json::json!({
            "status": "ok",
            "capsules": stats.capsule_count,
            "sealed": stats.sealed_count,
            "opened": stats.opened_count,
            "orphans": stats.orphan_count,
        });

        Ok(response::ok(&body))
    }

    /// POST /capsules - Create a capsule
    async fn handle_create(
        &self,
        req: Request<Incoming>,
    ) -> Result<Response<Full<Bytes>>, CapsuleError> {
        let body = req
            .collect()
            .await
            .map_err(|e| CapsuleError::Internal(format!("Failed to read body: {}", e)))?;
        let request: CreateCapsuleRequest = serde_json::from_slice(&body.to_bytes())?;

        let content = request
            .content
            .as_deref()
            .map(|encoded| {
                BASE64
                    .decode(encoded)
                    .map_err(|e| CapsuleError::InvalidInput(format!("Bad content encoding: {}", e)))
            })
            .transpose()?;

        let draft = CapsuleDraft {
            title: request.title,
            description: request.description,
            creator_address: request.creator_address,
            recipient_address: request.recipient_address,
            condition_type: request.condition_type,
            condition_data: request.condition_data,
            open_date: request.open_date,
            featured: request.featured,
            assets: request
                .assets
                .into_iter()
                .map(|a| AssetDraft {
                    asset_type: a.asset_type,
                    value: a.value,
                    token_address: a.token_address,
                    token_id: a.token_id,
                    token_amount: a.token_amount,
                })
                .collect(),
        };

        Ok(response::from_create_result(
            self.services.capsules.create(draft, content).await,
        ))
    }

    /// GET /capsules/ledger/{ledger_id}
    fn handle_get_by_ledger_id(
        &self,
        ledger_id: &str,
    ) -> Result<Response<Full<Bytes>>, CapsuleError> {
        Ok(response::from_option(
            self.services.capsules.get_by_ledger_id(ledger_id),
            "Capsule not found",
        ))
    }

    /// GET /capsules/explore/{kind}
    fn handle_explore(
        &self,
        req: &Request<Incoming>,
        kind: &str,
    ) -> Result<Response<Full<Bytes>>, CapsuleError> {
        let query: LimitQuery = parse_query(req)?;

        let result = match kind {
            "popular" => self.services.capsules.popular(query.limit),
            "featured" => self.services.capsules.featured(),
            "recent" => self.services.capsules.recently_opened(query.limit),
            "subscribed" => self.services.capsules.most_subscribed(query.limit),
            _ => {
                return Ok(response::not_found("Unknown explore view"));
            }
        };

        Ok(response::from_result(result))
    }

    /// PATCH /capsules/{id}/status?status=...
    fn handle_update_status(
        &self,
        req: &Request<Incoming>,
        id: i64,
    ) -> Result<Response<Full<Bytes>>, CapsuleError> {
        let query: StatusQuery = parse_query(req)?;
        let status = CapsuleStatus::parse(&query.status)
            .ok_or_else(|| CapsuleError::InvalidInput(format!("Unknown status: {}", query.status)))?;

        Ok(response::from_result(
            self.services.capsules.update_status(id, status),
        ))
    }

    /// POST /capsules/{id}/open?requesterAddress=...
    ///
    /// All denial reasons collapse to one uniform answer; the precise
    /// reason stays in the logs.
    async fn handle_open(
        &self,
        req: &Request<Incoming>,
        id: i64,
    ) -> Result<Response<Full<Bytes>>, CapsuleError> {
        let query: OpenQuery = parse_query(req)?;

        match self.services.capsules.open(id, &query.requester_address).await {
            Ok(capsule) => Ok(response::ok(&capsule)),
            Err(
                e @ (CapsuleError::NotFound(_)
                | CapsuleError::Unauthorized(_)
                | CapsuleError::Precondition(_)
                | CapsuleError::Ledger(_)),
            ) => {
                warn!(id = %id, error = %e, "Open denied");
                Ok(response::bad_request("could not open capsule"))
            }
            Err(e) => Err(e),
        }
    }

    /// GET /capsules/{id}/content
    async fn handle_get_content(&self, id: i64) -> Result<Response<Full<Bytes>>, CapsuleError> {
        match self.services.capsules.fetch_content(id).await {
            Ok(data) => Ok(response::binary_response("application/octet-stream", data)),
            Err(CapsuleError::NotFound(msg)) => Ok(response::not_found(&msg)),
            Err(e) => Err(e),
        }
    }

    /// POST /sweep - Run the readiness sweep now
    async fn handle_sweep(&self) -> Result<Response<Full<Bytes>>, CapsuleError> {
        let promoted = self.services.capsules.process_due_capsules()?;
        Ok(response::ok(&serde_json::json!({ "promoted": promoted })))
    }

    /// GET /orphans - Ledger registrations awaiting reconciliation
    async fn handle_orphans(&self) -> Result<Response<Full<Bytes>>, CapsuleError> {
        Ok(response::from_result(self.services.capsules.ledger_orphans()))
    }
}

fn parse_id(raw: &str) -> Result<i64, CapsuleError> {
    raw.parse::<i64>()
        .map_err(|_| CapsuleError::InvalidInput(format!("Bad capsule id: {}", raw)))
}
