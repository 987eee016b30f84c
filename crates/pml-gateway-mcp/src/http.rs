// crates/pml-gateway-mcp/src/http.rs
// ============================================================================
// Module: HTTP Surface
// Description: Route table registration and the axum transport adapter.
// Purpose: Serve the public HTTP routes through the request dispatcher with
//          auth and CORS on every path.
// Dependencies: axum, pml-gateway-core, pml-gateway-graph,
//               pml-gateway-store-sqlite, tokio-stream
// ============================================================================

//! ## Overview
//! Every HTTP route goes through the ordered dispatcher: graph queries,
//! capability listings and dependency management, metrics, the SSE stream,
//! the JSON-RPC endpoint, and the dashboard redirect. The axum adapter is a
//! single fallback handler that authenticates, dispatches, and attaches the
//! pinned CORS headers to success and error responses alike; preflights are
//! answered before dispatch.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use axum::body::Body;
use axum::http::Request;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::response::sse::Event as SseEvent;
use axum::response::sse::Sse;
use futures::FutureExt;
use futures::StreamExt;
use serde_json::Value;
use serde_json::json;
use tokio_stream::wrappers::ReceiverStream;

use pml_gateway_core::error::GatewayError;
use pml_gateway_core::types::identifiers::CapabilityId;
use pml_gateway_core::types::identifiers::NodeId;
use pml_gateway_core::types::node::NodeKind;
use pml_gateway_graph::EmergenceMetrics;
use pml_gateway_graph::KnowledgeGraph;
use pml_gateway_graph::emergence::HealthSignals;
use pml_gateway_store_sqlite::CapabilityRegistry;
use pml_gateway_store_sqlite::CapabilitySort;
use pml_gateway_store_sqlite::CapabilityStore;
use pml_gateway_store_sqlite::DependencyDirection;
use pml_gateway_store_sqlite::ListOptions;

use crate::auth::AuthGate;
use crate::config::GatewayConfig;
use crate::cors::cors_headers;
use crate::dispatcher::GatewayRequest;
use crate::dispatcher::GatewayResponse;
use crate::dispatcher::RequestDispatcher;
use crate::rpc::JsonRpcRequest;
use crate::rpc::McpService;
use crate::sse::EventStreamManager;
use crate::sse::SseError;

// ============================================================================
// SECTION: Context
// ============================================================================

/// Components behind the HTTP surface.
pub struct HttpContext {
    /// Gateway configuration.
    pub config: GatewayConfig,
    /// Auth gate.
    pub auth: AuthGate,
    /// Knowledge graph; `None` replies 503 on graph routes.
    pub graph: Option<KnowledgeGraph>,
    /// Capability registry.
    pub registry: CapabilityRegistry,
    /// Capability store (dependency edges).
    pub capabilities: CapabilityStore,
    /// SSE fan-out.
    pub sse: EventStreamManager,
    /// JSON-RPC service.
    pub mcp: McpService,
    /// Emergence metrics accumulator.
    pub emergence: Arc<Mutex<EmergenceMetrics>>,
}

/// Default scope applied when the query names none.
const DEFAULT_SCOPE: (&str, &str) = ("local", "default");

// ============================================================================
// SECTION: Route Registration
// ============================================================================

/// Builds the dispatcher with every public route.
///
/// # Errors
///
/// Returns [`GatewayError`] only on duplicate registrations (a wiring
/// defect).
pub fn build_dispatcher(context: &Arc<HttpContext>) -> Result<RequestDispatcher, GatewayError> {
    let mut dispatcher = RequestDispatcher::new();

    dispatcher.get("/health", {
        Arc::new(move |_request: GatewayRequest| {
            async move { GatewayResponse::ok(json!({ "status": "ok" })) }.boxed()
        })
    })?;

    let ctx = Arc::clone(context);
    dispatcher.get("/api/graph/snapshot", {
        Arc::new(move |_request: GatewayRequest| {
            let ctx = Arc::clone(&ctx);
            async move {
                match &ctx.graph {
                    Some(graph) => {
                        let snapshot = graph.snapshot();
                        GatewayResponse::ok(serde_json::to_value(&snapshot).unwrap_or(Value::Null))
                    }
                    None => GatewayResponse::from_error(&GatewayError::Unavailable(
                        "graph engine unavailable".to_string(),
                    )),
                }
            }
            .boxed()
        })
    })?;

    let ctx = Arc::clone(context);
    dispatcher.get("/api/graph/path", {
        Arc::new(move |request: GatewayRequest| {
            let ctx = Arc::clone(&ctx);
            async move { graph_path(&ctx, &request) }.boxed()
        })
    })?;

    let ctx = Arc::clone(context);
    dispatcher.get("/api/graph/related", {
        Arc::new(move |request: GatewayRequest| {
            let ctx = Arc::clone(&ctx);
            async move { graph_related(&ctx, &request) }.boxed()
        })
    })?;

    let ctx = Arc::clone(context);
    dispatcher.get("/api/graph/hypergraph", {
        Arc::new(move |request: GatewayRequest| {
            let ctx = Arc::clone(&ctx);
            async move { graph_hypergraph(&ctx, &request) }.boxed()
        })
    })?;

    let ctx = Arc::clone(context);
    dispatcher.get("/api/capabilities", {
        Arc::new(move |request: GatewayRequest| {
            let ctx = Arc::clone(&ctx);
            async move { list_capabilities(&ctx, &request) }.boxed()
        })
    })?;

    let ctx = Arc::clone(context);
    dispatcher.get("/api/capabilities/:id/dependencies", {
        Arc::new(move |request: GatewayRequest| {
            let ctx = Arc::clone(&ctx);
            async move { get_dependencies(&ctx, &request) }.boxed()
        })
    })?;

    let ctx = Arc::clone(context);
    dispatcher.post("/api/capabilities/:id/dependencies", {
        Arc::new(move |request: GatewayRequest| {
            let ctx = Arc::clone(&ctx);
            async move { add_dependency(&ctx, &request) }.boxed()
        })
    })?;

    let ctx = Arc::clone(context);
    dispatcher.delete("/api/capabilities/:id/dependencies/:dep_id", {
        Arc::new(move |request: GatewayRequest| {
            let ctx = Arc::clone(&ctx);
            async move { remove_dependency(&ctx, &request) }.boxed()
        })
    })?;

    let ctx = Arc::clone(context);
    dispatcher.get("/api/metrics", {
        Arc::new(move |_request: GatewayRequest| {
            let ctx = Arc::clone(&ctx);
            async move { metrics(&ctx) }.boxed()
        })
    })?;

    let ctx = Arc::clone(context);
    dispatcher.get("/events/stream", {
        Arc::new(move |request: GatewayRequest| {
            let ctx = Arc::clone(&ctx);
            async move { open_stream(&ctx, &request) }.boxed()
        })
    })?;

    let ctx = Arc::clone(context);
    dispatcher.post("/mcp", {
        Arc::new(move |request: GatewayRequest| {
            let ctx = Arc::clone(&ctx);
            async move {
                let rpc: JsonRpcRequest = match serde_json::from_value(request.body) {
                    Ok(rpc) => rpc,
                    Err(err) => {
                        return GatewayResponse::from_error(&GatewayError::Validation(format!(
                            "json-rpc: {err}"
                        )));
                    }
                };
                let response = ctx.mcp.handle(rpc).await;
                GatewayResponse::ok(serde_json::to_value(&response).unwrap_or(Value::Null))
            }
            .boxed()
        })
    })?;

    let ctx = Arc::clone(context);
    dispatcher.get("/dashboard", {
        Arc::new(move |_request: GatewayRequest| {
            let ctx = Arc::clone(&ctx);
            async move {
                GatewayResponse::Redirect {
                    location: ctx.config.server.dashboard_origin.clone(),
                }
            }
            .boxed()
        })
    })?;

    Ok(dispatcher)
}

// ============================================================================
// SECTION: Graph Handlers
// ============================================================================

/// Returns the graph or a 503 response.
fn require_graph(context: &HttpContext) -> Result<&KnowledgeGraph, GatewayError> {
    context
        .graph
        .as_ref()
        .ok_or_else(|| GatewayError::Unavailable("graph engine unavailable".to_string()))
}

/// `GET /api/graph/path?from=&to=`.
fn graph_path(context: &HttpContext, request: &GatewayRequest) -> GatewayResponse {
    let run = || -> Result<GatewayResponse, GatewayError> {
        let graph = require_graph(context)?;
        let from = required_query(request, "from")?;
        let to = required_query(request, "to")?;
        let from = parse_node(&from)?;
        let to = parse_node(&to)?;
        let path = graph.shortest_path(&from, &to).unwrap_or_default();
        Ok(GatewayResponse::ok(json!({ "path": path })))
    };
    run().unwrap_or_else(|err| GatewayResponse::from_error(&err))
}

/// `GET /api/graph/related?tool_id=&limit=`.
fn graph_related(context: &HttpContext, request: &GatewayRequest) -> GatewayResponse {
    let run = || -> Result<GatewayResponse, GatewayError> {
        let graph = require_graph(context)?;
        let tool_id = required_query(request, "tool_id")?;
        let node = parse_node(&tool_id)?;
        let limit = request
            .query
            .get("limit")
            .map_or(Ok(10), |raw| {
                raw.parse::<usize>()
                    .map_err(|_| GatewayError::Validation(format!("limit `{raw}`")))
            })?;
        let related = graph.related(&node, limit);
        Ok(GatewayResponse::ok(json!({ "tool_id": tool_id, "related": related })))
    };
    run().unwrap_or_else(|err| GatewayResponse::from_error(&err))
}

/// `GET /api/graph/hypergraph[?include_tools=&min_success_rate=]`.
fn graph_hypergraph(context: &HttpContext, request: &GatewayRequest) -> GatewayResponse {
    let run = || -> Result<GatewayResponse, GatewayError> {
        let graph = require_graph(context)?;
        let include_tools = request
            .query
            .get("include_tools")
            .is_some_and(|raw| raw == "true" || raw == "1");
        let min_success_rate = match request.query.get("min_success_rate") {
            Some(raw) => {
                let value: f64 = raw
                    .parse()
                    .map_err(|_| GatewayError::Validation(format!("min_success_rate `{raw}`")))?;
                if !(0.0..=1.0).contains(&value) {
                    return Err(GatewayError::Validation(format!(
                        "min_success_rate out of range: {value}"
                    )));
                }
                Some(value)
            }
            None => None,
        };
        let snapshot = graph.snapshot();
        let communities = graph.communities();
        let mut groups: HashMap<usize, Vec<Value>> = HashMap::new();
        for node in &snapshot.nodes {
            if !include_tools && node.kind == NodeKind::Tool {
                continue;
            }
            if let Some(min) = min_success_rate
                && node.success_rate.unwrap_or(0.0) < min
            {
                continue;
            }
            let Some(&community) = communities.get(&node.id) else {
                continue;
            };
            groups.entry(community).or_default().push(json!({
                "id": node.id,
                "type": node.kind,
                "name": node.name,
                "success_rate": node.success_rate,
            }));
        }
        let mut hyperedges: Vec<Value> = groups
            .into_iter()
            .map(|(community, members)| json!({ "community": community, "members": members }))
            .collect();
        hyperedges.sort_by_key(|entry| entry["community"].as_u64());
        Ok(GatewayResponse::ok(json!({
            "hyperedges": hyperedges,
            "metadata": snapshot.metadata,
        })))
    };
    run().unwrap_or_else(|err| GatewayResponse::from_error(&err))
}

// ============================================================================
// SECTION: Capability Handlers
// ============================================================================

/// `GET /api/capabilities[?limit=&offset=&min_success_rate=&sort=]`.
fn list_capabilities(context: &HttpContext, request: &GatewayRequest) -> GatewayResponse {
    let run = || -> Result<GatewayResponse, GatewayError> {
        let org = request.query.get("org").map_or(DEFAULT_SCOPE.0, String::as_str);
        let project = request.query.get("project").map_or(DEFAULT_SCOPE.1, String::as_str);
        let scope = pml_gateway_core::types::capability::Scope {
            org: org.to_string(),
            project: project.to_string(),
        };
        let sort = match request.query.get("sort").map(String::as_str) {
            None | Some("updated_at") => CapabilitySort::UpdatedAt,
            Some("usage") => CapabilitySort::Usage,
            Some("success_rate") => CapabilitySort::SuccessRate,
            Some(other) => {
                return Err(GatewayError::Validation(format!("sort `{other}`")));
            }
        };
        let options = ListOptions {
            limit: parse_query_number(request, "limit")?.unwrap_or(0),
            offset: parse_query_number(request, "offset")?.unwrap_or(0),
            min_success_rate: match request.query.get("min_success_rate") {
                Some(raw) => Some(raw.parse().map_err(|_| {
                    GatewayError::Validation(format!("min_success_rate `{raw}`"))
                })?),
                None => None,
            },
            sort,
        };
        let (capabilities, total) = context.registry.list(&scope, &options)?;
        Ok(GatewayResponse::ok(json!({ "capabilities": capabilities, "total": total })))
    };
    run().unwrap_or_else(|err| GatewayResponse::from_error(&err))
}

/// Parses the capability id path param.
fn capability_param(request: &GatewayRequest) -> Result<CapabilityId, GatewayError> {
    let raw = request
        .params
        .get("id")
        .ok_or_else(|| GatewayError::Validation("missing capability id".to_string()))?;
    CapabilityId::parse(raw).map_err(|err| GatewayError::Validation(err.to_string()))
}

/// `GET /api/capabilities/:id/dependencies[?direction=]`.
fn get_dependencies(context: &HttpContext, request: &GatewayRequest) -> GatewayResponse {
    let run = || -> Result<GatewayResponse, GatewayError> {
        let id = capability_param(request)?;
        let direction = match request.query.get("direction").map(String::as_str) {
            None | Some("both") => DependencyDirection::Both,
            Some("from") => DependencyDirection::From,
            Some("to") => DependencyDirection::To,
            Some(other) => {
                return Err(GatewayError::Validation(format!("direction `{other}`")));
            }
        };
        let node = NodeId::capability(&id);
        let edges = context.capabilities.get_dependencies(&node, direction)?;
        Ok(GatewayResponse::ok(json!({ "dependencies": edges })))
    };
    run().unwrap_or_else(|err| GatewayResponse::from_error(&err))
}

/// `POST /api/capabilities/:id/dependencies` with `{to, edge_type?,
/// edge_source?}`.
fn add_dependency(context: &HttpContext, request: &GatewayRequest) -> GatewayResponse {
    let run = || -> Result<GatewayResponse, GatewayError> {
        let id = capability_param(request)?;
        let to_raw = request
            .body
            .get("to")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::Validation("missing `to`".to_string()))?;
        let to = parse_node(to_raw)?;
        let kind = match request.body.get("edge_type").and_then(Value::as_str) {
            None => pml_gateway_core::types::edge::EdgeKind::Dependency,
            Some(label) => pml_gateway_core::types::edge::EdgeKind::parse(label)
                .ok_or_else(|| GatewayError::Validation(format!("edge_type `{label}`")))?,
        };
        let source = match request.body.get("edge_source").and_then(Value::as_str) {
            None => pml_gateway_core::types::edge::EdgeSource::Declared,
            Some(label) => pml_gateway_core::types::edge::EdgeSource::parse(label)
                .ok_or_else(|| GatewayError::Validation(format!("edge_source `{label}`")))?,
        };
        let edge = context.capabilities.add_dependency(&NodeId::capability(&id), &to, kind, source)?;
        Ok(GatewayResponse::ok(json!({ "dependency": edge })))
    };
    run().unwrap_or_else(|err| GatewayResponse::from_error(&err))
}

/// `DELETE /api/capabilities/:id/dependencies/:dep_id`.
fn remove_dependency(context: &HttpContext, request: &GatewayRequest) -> GatewayResponse {
    let run = || -> Result<GatewayResponse, GatewayError> {
        let id = capability_param(request)?;
        let dep_raw = request
            .params
            .get("dep_id")
            .ok_or_else(|| GatewayError::Validation("missing dependency id".to_string()))?;
        let dep = parse_node(dep_raw)?;
        let kind = match request.query.get("edge_type").map(String::as_str) {
            None => pml_gateway_core::types::edge::EdgeKind::Dependency,
            Some(label) => pml_gateway_core::types::edge::EdgeKind::parse(label)
                .ok_or_else(|| GatewayError::Validation(format!("edge_type `{label}`")))?,
        };
        context.capabilities.remove_dependency(&NodeId::capability(&id), &dep, kind)?;
        Ok(GatewayResponse::ok(json!({ "removed": true })))
    };
    run().unwrap_or_else(|err| GatewayResponse::from_error(&err))
}

// ============================================================================
// SECTION: Metrics and Stream Handlers
// ============================================================================

/// `GET /api/metrics`.
fn metrics(context: &HttpContext) -> GatewayResponse {
    let run = || -> Result<GatewayResponse, GatewayError> {
        let graph = require_graph(context)?;
        let mut emergence = match context.emergence.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let sample = emergence.record(graph);
        let recommendations = emergence.recommendations(HealthSignals::default());
        let transition = emergence.phase_transition();
        Ok(GatewayResponse::ok(json!({
            "graph": { "nodes": sample.node_count, "edges": sample.edge_count },
            "entropy": sample.entropy,
            "cluster_stability": sample.stability,
            "trend": emergence.entropy_trend(),
            "phase_transition": transition,
            "recommendations": recommendations,
            "sse_clients": context.sse.client_count(),
        })))
    };
    run().unwrap_or_else(|err| GatewayResponse::from_error(&err))
}

/// `GET /events/stream[?filter=a.*,b.*]`.
fn open_stream(context: &HttpContext, request: &GatewayRequest) -> GatewayResponse {
    let filters: Vec<String> = request
        .query
        .get("filter")
        .map(|raw| {
            raw.split(',')
                .map(|filter| filter.trim().to_string())
                .filter(|filter| !filter.is_empty())
                .collect()
        })
        .unwrap_or_default();
    match context.sse.add_client(filters) {
        Ok(events) => GatewayResponse::EventStream {
            events,
        },
        Err(SseError::TooManyClients {
            max,
        }) => GatewayResponse::Json {
            status: 503,
            body: json!({ "error": "Too many clients", "max": max }),
        },
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads a required query parameter.
fn required_query(request: &GatewayRequest, name: &str) -> Result<String, GatewayError> {
    request
        .query
        .get(name)
        .cloned()
        .ok_or_else(|| GatewayError::Validation(format!("missing `{name}`")))
}

/// Parses an optional numeric query parameter.
fn parse_query_number(
    request: &GatewayRequest,
    name: &str,
) -> Result<Option<usize>, GatewayError> {
    match request.query.get(name) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| GatewayError::Validation(format!("{name} `{raw}`"))),
        None => Ok(None),
    }
}

/// Parses a node id with a validation error on failure.
fn parse_node(raw: &str) -> Result<NodeId, GatewayError> {
    NodeId::parse(raw).map_err(|err| GatewayError::Validation(err.to_string()))
}

// ============================================================================
// SECTION: Axum Adapter
// ============================================================================

/// Builds the axum router over the dispatcher.
///
/// # Errors
///
/// Returns [`GatewayError`] when route registration fails.
pub fn router(context: Arc<HttpContext>) -> Result<axum::Router, GatewayError> {
    let dispatcher = Arc::new(build_dispatcher(&context)?);
    let adapter = move |request: Request<Body>| {
        let context = Arc::clone(&context);
        let dispatcher = Arc::clone(&dispatcher);
        async move { handle_request(context, dispatcher, request).await }
    };
    Ok(axum::Router::new().fallback(adapter))
}

/// Handles one HTTP request end to end.
async fn handle_request(
    context: Arc<HttpContext>,
    dispatcher: Arc<RequestDispatcher>,
    request: Request<Body>,
) -> Response {
    let cors = cors_headers(&context.config);
    let method = request.method().as_str().to_ascii_uppercase();
    let target = request
        .uri()
        .path_and_query()
        .map_or_else(|| request.uri().path().to_string(), |target| target.as_str().to_string());
    let (path, query_raw) = RequestDispatcher::normalize_path(&target);
    let path = path.to_string();
    let query = parse_query(query_raw);
    let headers: HashMap<String, String> = request
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value.to_str().ok().map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect();

    // Preflights are answered before dispatch, with the pinned headers.
    if method == "OPTIONS" {
        return with_cors(StatusCode::OK, json!({}), &cors);
    }

    let auth = match context.auth.authenticate(&method, &path, &headers) {
        Ok(auth) => auth,
        Err(_) => {
            // The rejection body is part of the public contract.
            return with_cors(
                StatusCode::UNAUTHORIZED,
                json!({ "error": "Unauthorized", "message": "Valid API key required" }),
                &cors,
            );
        }
    };

    let Some((handler, params)) = dispatcher.route(&method, &path) else {
        return with_cors(
            StatusCode::NOT_FOUND,
            json!({ "error": "Not Found", "message": format!("no route for {method} {path}") }),
            &cors,
        );
    };

    let body = read_json_body(request).await;
    let gateway_request = GatewayRequest {
        method,
        path,
        query,
        headers,
        body,
        params,
        auth: Some(auth),
    };
    match handler(gateway_request).await {
        GatewayResponse::Json {
            status,
            body,
        } => with_cors(
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body,
            &cors,
        ),
        GatewayResponse::Redirect {
            location,
        } => {
            let mut response =
                Response::builder().status(StatusCode::FOUND).header("Location", location);
            for (name, value) in &cors {
                response = response.header(name, value);
            }
            response.body(Body::empty()).unwrap_or_else(|_| {
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            })
        }
        GatewayResponse::EventStream {
            events,
        } => {
            let stream = ReceiverStream::new(events).map(|event| {
                let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
                Ok::<SseEvent, std::convert::Infallible>(
                    SseEvent::default().event(event.event_type).data(data),
                )
            });
            let mut response = Sse::new(stream).into_response();
            let response_headers = response.headers_mut();
            response_headers
                .insert("Cache-Control", axum::http::HeaderValue::from_static("no-cache"));
            for (name, value) in &cors {
                if let (Ok(name), Ok(value)) = (
                    axum::http::HeaderName::try_from(name.as_str()),
                    axum::http::HeaderValue::try_from(value.as_str()),
                ) {
                    response_headers.insert(name, value);
                }
            }
            response
        }
    }
}

/// Parses a raw query string into a map.
fn parse_query(raw: &str) -> HashMap<String, String> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            Some((name.to_string(), url_decode(value)))
        })
        .collect()
}

/// Percent-decodes a query value (space via `+` included).
fn url_decode(raw: &str) -> String {
    let mut decoded = String::with_capacity(raw.len());
    let mut bytes = raw.bytes();
    while let Some(byte) = bytes.next() {
        match byte {
            b'+' => decoded.push(' '),
            b'%' => {
                let high = bytes.next();
                let low = bytes.next();
                let parsed = match (high, low) {
                    (Some(high), Some(low)) => {
                        let hex = [high, low];
                        std::str::from_utf8(&hex)
                            .ok()
                            .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                    }
                    _ => None,
                };
                match parsed {
                    Some(value) => decoded.push(value as char),
                    None => decoded.push('%'),
                }
            }
            other => decoded.push(other as char),
        }
    }
    decoded
}

/// Reads the request body as JSON, null on absence or parse failure.
async fn read_json_body(request: Request<Body>) -> Value {
    const BODY_LIMIT: usize = 4 * 1024 * 1024;
    match axum::body::to_bytes(request.into_body(), BODY_LIMIT).await {
        Ok(bytes) if !bytes.is_empty() => {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        }
        _ => Value::Null,
    }
}

/// Builds a JSON response with the pinned CORS headers attached.
fn with_cors(status: StatusCode, body: Value, cors: &[(String, String)]) -> Response {
    let mut response = Response::builder()
        .status(status)
        .header("Content-Type", "application/json");
    for (name, value) in cors {
        response = response.header(name, value);
    }
    response
        .body(Body::from(body.to_string()))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
