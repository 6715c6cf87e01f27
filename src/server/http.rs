//! HTTP server implementation
//!
//! hyper http1 with TokioIo, one task per connection. Routes are matched on
//! method and path segments; every handler returns a `PorticoError` on
//! failure which is rendered once, in `error_response`.

use bytes::Bytes;
use futures::StreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, Limited, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::header::{HeaderName, HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::auth::{extract_token_from_header, Identity, JwtValidator};
use crate::config::Args;
use crate::gateway::Gateway;
use crate::naming::NamingRecordRequest;
use crate::networks::RegisterNetwork;
use crate::types::PorticoError;

type Body = UnsyncBoxBody<Bytes, PorticoError>;
type HandlerResult = Result<Response<Body>, PorticoError>;

/// Largest request body accepted, uploads included
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub gateway: Gateway,
    pub jwt: JwtValidator,
}

pub async fn run(state: Arc<AppState>) -> Result<(), PorticoError> {
    let listener = TcpListener::bind(state.args.listen)
        .await
        .map_err(|e| PorticoError::Internal(format!("bind {}: {}", state.args.listen, e)))?;

    info!("Portico listening on {}", state.args.listen);
    if state.args.dev_mode {
        warn!("Development mode enabled - in-memory persistence may be in use");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<Body>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    debug!("[{}] {} {}", addr, method, path);

    let response = match route(&state, req).await {
        Ok(response) => response,
        Err(RouteError::Unauthorized(message)) => unauthorized_response(&message),
        Err(RouteError::NoRoute) => not_found_response(&path),
        Err(RouteError::Failed(err)) => {
            if err.kind().status_code() >= 500 {
                warn!(method = %method, path = %path, error = %err, "Request failed");
            } else {
                debug!(method = %method, path = %path, error = %err, "Request rejected");
            }
            error_response(&err)
        }
    };
    Ok(response)
}

enum RouteError {
    Unauthorized(String),
    NoRoute,
    Failed(PorticoError),
}

impl From<PorticoError> for RouteError {
    fn from(err: PorticoError) -> Self {
        RouteError::Failed(err)
    }
}

async fn route(state: &AppState, req: Request<Incoming>) -> Result<Response<Body>, RouteError> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let segments: Vec<&str> = path
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    let gateway = &state.gateway;

    // Routes that need no session
    match (&method, segments.as_slice()) {
        (&Method::GET, ["health"]) => {
            return Ok(json_response(StatusCode::OK, &serde_json::json!({ "status": "ok" })));
        }
        (&Method::POST, ["auth", "register"]) => {
            let body: RegisterAccount = read_json(req).await?;
            let view = gateway
                .create_account(&body.address, &body.email, &body.password, body.enterprise)
                .await?;
            return Ok(json_response(StatusCode::CREATED, &view));
        }
        (&Method::POST, ["auth", "login"]) => {
            let body: SignIn = read_json(req).await?;
            let identity = gateway.sign_in(&body.address, &body.password).await?;
            let token = state.jwt.generate_token(&identity)?;
            info!(address = %identity.address, role = %identity.role, "Signed in");
            return Ok(json_response(
                StatusCode::OK,
                &SessionToken {
                    token,
                    address: identity.address,
                    role: identity.role.to_string(),
                    expires_in: state.args.jwt_expiry_seconds,
                },
            ));
        }
        _ => {}
    }

    let caller = authenticate(state, &req)?;
    let query = req.uri().query().unwrap_or("").to_string();

    let response = match (&method, segments.as_slice()) {
        // ---- account ----
        (&Method::POST, ["account", "password"]) => {
            let body: ChangePassword = read_json(req).await?;
            gateway
                .change_password(&caller, &body.current_password, &body.new_password)
                .await?;
            no_content()
        }
        (&Method::GET, ["account", "email"]) => {
            let email = gateway.email_for(&caller).await?;
            json_response(StatusCode::OK, &serde_json::json!({ "email": email }))
        }
        (&Method::GET, ["account", "networks"]) => {
            let networks = gateway.authorized_networks(&caller).await?;
            json_response(StatusCode::OK, &serde_json::json!({ "networks": networks }))
        }
        (&Method::GET, ["account", "keys"]) => {
            let keys = gateway.list_keys(&caller).await?;
            json_response(StatusCode::OK, &serde_json::json!({ "keys": keys }))
        }

        // ---- administration ----
        (&Method::POST, ["admin", "accounts", address, "enabled"]) => {
            let body: SetEnabled = read_json(req).await?;
            gateway
                .set_account_enabled(&caller, address, body.enabled)
                .await?;
            no_content()
        }
        (&Method::POST, ["admin", "networks"]) => {
            let body: RegisterNetwork = read_json(req).await?;
            let view = gateway.register_network(&caller, body).await?;
            json_response(StatusCode::CREATED, &view)
        }
        (&Method::GET, ["admin", "networks", name]) => {
            let view = gateway.get_network(&caller, name).await?;
            json_response(StatusCode::OK, &view)
        }
        (&Method::POST, ["admin", "networks", name, "grants"]) => {
            let body: GrantNetwork = read_json(req).await?;
            gateway.grant_network(&caller, &body.user, name).await?;
            no_content()
        }
        (&Method::GET, ["admin", "pubsub", "subscriptions"]) => {
            let subscriptions = gateway.pubsub_subscriptions(&caller)?;
            json_response(
                StatusCode::OK,
                &serde_json::json!({ "subscriptions": subscriptions }),
            )
        }

        // ---- content ----
        (&Method::POST, ["networks", network, "pins"]) => {
            let body: PinBody = read_json(req).await?;
            let receipt = gateway
                .pin(&caller, network, &body.hash, body.hold_months)
                .await?;
            json_response(StatusCode::ACCEPTED, &receipt)
        }
        (&Method::DELETE, ["networks", network, "pins", hash]) => {
            let receipt = gateway.remove_pin(&caller, network, hash).await?;
            json_response(StatusCode::ACCEPTED, &receipt)
        }
        (&Method::GET, ["networks", network, "pins"]) => {
            let pins = gateway.local_pins(&caller, network).await?;
            json_response(StatusCode::OK, &serde_json::json!({ "pins": pins }))
        }
        (&Method::GET, ["networks", network, "pins", hash]) => {
            let pinned = gateway.check_local_pin(&caller, network, hash).await?;
            json_response(
                StatusCode::OK,
                &serde_json::json!({ "hash": hash, "pinned": pinned }),
            )
        }
        (&Method::POST, ["networks", network, "files"]) => {
            let params: UploadParams = parse_query(&query)?;
            let data = read_body(req).await?;
            let added = gateway
                .add_file(&caller, network, data, params.hold_months)
                .await?;
            json_response(StatusCode::CREATED, &added)
        }
        (&Method::GET, ["networks", network, "objects", hash, "size"]) => {
            let size = gateway.object_size(&caller, network, hash).await?;
            json_response(StatusCode::OK, &serde_json::json!({ "hash": hash, "size": size }))
        }
        (&Method::GET, ["networks", network, "objects", key, "stat"]) => {
            let stat = gateway.object_stat(&caller, network, key).await?;
            json_response(StatusCode::OK, &stat)
        }
        (&Method::GET, ["networks", network, "content", hash]) => {
            let (content_type, headers) = download_params(&query)?;
            let download = gateway
                .download(&caller, network, hash, content_type.as_deref(), headers)
                .await?;
            stream_response(download)?
        }

        // ---- keys ----
        (&Method::POST, ["networks", network, "keys"]) => {
            let body: CreateKey = read_json(req).await?;
            let key = gateway.create_key(&caller, network, &body.name).await?;
            json_response(StatusCode::CREATED, &key)
        }

        // ---- naming records ----
        (&Method::POST, ["ipns", "publish"]) => {
            let body: NamingRecordRequest = read_json(req).await?;
            let published = gateway.publish_naming_record(&caller, body).await?;
            json_response(StatusCode::OK, &published)
        }
        (&Method::GET, ["ipns", record_name]) => {
            let entry = gateway.naming_record(&caller, record_name).await?;
            json_response(
                StatusCode::OK,
                &serde_json::json!({
                    "record_name": entry.record_name,
                    "record_value": entry.record_value,
                    "content_hash": entry.content_hash,
                    "key_name": entry.key_name,
                    "network_name": entry.network_name,
                    "lifetime": entry.lifetime,
                    "ttl": entry.ttl,
                    "last_published": entry.last_published.map(|t| t.to_chrono()),
                }),
            )
        }

        // ---- pubsub ----
        (&Method::POST, ["networks", network, "pubsub", "publish"]) => {
            let body: PubsubPublish = read_json(req).await?;
            gateway
                .pubsub_publish(&caller, network, &body.topic, &body.message)
                .await?;
            no_content()
        }
        (&Method::POST, ["networks", network, "pubsub", "subscriptions"]) => {
            let body: PubsubTopic = read_json(req).await?;
            let info = gateway
                .pubsub_subscribe(&caller, network, &body.topic)
                .await?;
            json_response(StatusCode::ACCEPTED, &info)
        }
        (&Method::DELETE, ["networks", network, "pubsub", "subscriptions", topic]) => {
            gateway.pubsub_unsubscribe(&caller, network, topic).await?;
            no_content()
        }

        _ => return Err(RouteError::NoRoute),
    };

    Ok(response)
}

/// Resolve the caller from the bearer token
fn authenticate(state: &AppState, req: &Request<Incoming>) -> Result<Identity, RouteError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());
    let token = extract_token_from_header(header)
        .ok_or_else(|| RouteError::Unauthorized("missing bearer token".into()))?;

    let result = state.jwt.verify_token(token);
    match result.claims {
        Some(claims) if result.valid => Ok(claims.identity()),
        _ => Err(RouteError::Unauthorized(
            result.error.unwrap_or_else(|| "invalid token".into()),
        )),
    }
}

// ---- request bodies ----

#[derive(Deserialize)]
struct RegisterAccount {
    address: String,
    email: String,
    password: String,
    #[serde(default)]
    enterprise: bool,
}

#[derive(Deserialize)]
struct SignIn {
    address: String,
    password: String,
}

#[derive(Serialize)]
struct SessionToken {
    token: String,
    address: String,
    role: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct ChangePassword {
    current_password: String,
    new_password: String,
}

#[derive(Deserialize)]
struct SetEnabled {
    enabled: bool,
}

#[derive(Deserialize)]
struct GrantNetwork {
    user: String,
}

#[derive(Deserialize)]
struct PinBody {
    hash: String,
    hold_months: u32,
}

#[derive(Deserialize)]
struct UploadParams {
    hold_months: u32,
}

#[derive(Deserialize)]
struct CreateKey {
    name: String,
}

#[derive(Deserialize)]
struct PubsubPublish {
    topic: String,
    message: String,
}

#[derive(Deserialize)]
struct PubsubTopic {
    topic: String,
}

async fn read_body(req: Request<Incoming>) -> Result<Bytes, PorticoError> {
    Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|e| PorticoError::Validation(format!("unreadable request body: {}", e)))
}

async fn read_json<T: DeserializeOwned>(req: Request<Incoming>) -> Result<T, PorticoError> {
    let body = read_body(req).await?;
    serde_json::from_slice(&body)
        .map_err(|e| PorticoError::Validation(format!("invalid JSON body: {}", e)))
}

fn parse_query<T: DeserializeOwned>(query: &str) -> Result<T, PorticoError> {
    serde_urlencoded::from_str(query)
        .map_err(|e| PorticoError::Validation(format!("invalid query: {}", e)))
}

/// `content_type` plus repeated `header` parameters, kept in order
fn download_params(query: &str) -> Result<(Option<String>, Vec<String>), PorticoError> {
    let pairs: Vec<(String, String)> = parse_query(query)?;
    let mut content_type = None;
    let mut headers = Vec::new();
    for (name, value) in pairs {
        match name.as_str() {
            "content_type" => content_type = Some(value),
            "header" => headers.push(value),
            _ => {}
        }
    }
    Ok((content_type, headers))
}

// ---- responses ----

fn full(body: impl Into<Bytes>) -> Body {
    Full::new(body.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

fn with_status(status: StatusCode, body: Body) -> Response<Body> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Body> {
    match serde_json::to_vec(value) {
        Ok(bytes) => {
            let mut response = with_status(status, full(bytes));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => error_response(&PorticoError::Internal(format!("encode response: {}", e))),
    }
}

fn no_content() -> Response<Body> {
    with_status(StatusCode::NO_CONTENT, full(Bytes::new()))
}

fn stream_response(download: crate::gateway::Download) -> Result<Response<Body>, PorticoError> {
    let content_type = HeaderValue::from_str(&download.content_type)
        .map_err(|_| PorticoError::Validation("invalid content type".into()))?;

    let frames = download.body.map(|chunk| chunk.map(Frame::data));
    let mut response = with_status(StatusCode::OK, StreamBody::new(frames).boxed_unsync());
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, content_type);
    headers.insert(CONTENT_LENGTH, HeaderValue::from(download.size));
    for (name, value) in download.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| PorticoError::Validation(format!("invalid header name {}", name)))?;
        let value = HeaderValue::from_str(&value)
            .map_err(|_| PorticoError::Validation(format!("invalid value for header {}", name)))?;
        headers.insert(name, value);
    }
    Ok(response)
}

/// Render an error as `{ "error": { kind, message, completed? } }`
pub fn error_body(err: &PorticoError) -> serde_json::Value {
    let mut error = serde_json::json!({
        "kind": err.kind(),
        "message": err.public_message(),
    });
    if let Some(completed) = err.completed() {
        error["completed"] = serde_json::json!(completed);
    }
    serde_json::json!({ "error": error })
}

fn error_response(err: &PorticoError) -> Response<Body> {
    let status =
        StatusCode::from_u16(err.kind().status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = with_status(status, full(error_body(err).to_string()));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn unauthorized_response(message: &str) -> Response<Body> {
    let body = serde_json::json!({
        "error": { "kind": "unauthorized", "message": message }
    });
    let mut response = with_status(StatusCode::UNAUTHORIZED, full(body.to_string()));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn not_found_response(path: &str) -> Response<Body> {
    let body = serde_json::json!({
        "error": { "kind": "not_found", "message": format!("no route for {}", path) }
    });
    let mut response = with_status(StatusCode::NOT_FOUND, full(body.to_string()));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
