//! The built-in Model Context Protocol engine
//!
//! One [`McpEngine`] runs per session. It decodes JSON-RPC payloads, negotiates the
//! protocol version on `initialize`, answers the base protocol methods and audits every
//! call. It exposes no tools or resources of its own.

use rust_mcp_sdk::schema::{
    Implementation, InitializeRequest, InitializeResult, JsonrpcMessage, JsonrpcRequest,
    ListResourcesRequest, ListResourcesResult, ListToolsRequest, ListToolsResult, PingRequest,
    ProtocolVersion, ServerCapabilities, ServerCapabilitiesResources, ServerCapabilitiesTools,
};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::mcp::rpc::{
    app_error_to_json_rpc, is_json_rpc_error, json_rpc_error, json_rpc_result,
    request_id_to_value, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND,
};
use crate::session::{SessionId, SessionTransport};

pub const SUPPORTED_PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug)]
pub struct McpEngine {
    session_id: SessionId,
    stateless: bool,
    initialized: bool,
    client_name: Option<String>,
}

impl McpEngine {
    /// In stateless mode there is no back-channel outside a request, and the session may
    /// have been resumed without a handshake, so it counts as initialized from the start.
    pub fn new(session_id: SessionId, stateless: bool) -> Self {
        Self {
            session_id,
            stateless,
            initialized: stateless,
            client_name: None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_stateless(&self) -> bool {
        self.stateless
    }

    /// Handles a single message or a batch. `None` when nothing needs to be sent back.
    pub async fn handle_payload(&mut self, payload: Value) -> Option<Value> {
        let Value::Array(batch) = payload else {
            return self.handle_json_rpc_value(payload).await;
        };

        if batch.is_empty() {
            return Some(Value::Array(vec![json_rpc_error(
                None,
                INVALID_REQUEST,
                "Invalid Request",
            )]));
        }

        let mut responses = Vec::new();
        for item in batch {
            if let Some(response) = self.handle_json_rpc_value(item).await {
                responses.push(response);
            }
        }

        if responses.is_empty() {
            None
        } else {
            Some(Value::Array(responses))
        }
    }

    pub async fn handle_json_rpc_value(&mut self, payload: Value) -> Option<Value> {
        if !payload.is_object() {
            return Some(json_rpc_error(None, INVALID_REQUEST, "Invalid Request"));
        }

        let request_id = payload.get("id").cloned();
        let parsed: JsonrpcMessage = match serde_json::from_value(payload) {
            Ok(message) => message,
            Err(_) => return Some(json_rpc_error(request_id, INVALID_REQUEST, "Invalid Request")),
        };

        match parsed {
            JsonrpcMessage::Request(request) => {
                if let Err(error_response) = validate_request_shape(&request) {
                    return Some(error_response);
                }

                let request_id = request_id_to_value(request.id);
                if request.method.trim().is_empty() {
                    return Some(json_rpc_error(
                        Some(request_id),
                        INVALID_REQUEST,
                        "Invalid Request",
                    ));
                }

                Some(
                    self.handle_json_rpc_request(
                        Some(request_id),
                        request.method,
                        request.params.map(Value::Object),
                    )
                    .await,
                )
            }
            JsonrpcMessage::Notification(notification) => {
                self.handle_notification(&notification.method);
                None
            }
            // replies to server-initiated requests; this engine never issues any
            JsonrpcMessage::ResultResponse(_) | JsonrpcMessage::ErrorResponse(_) => None,
        }
    }

    fn handle_notification(&mut self, method: &str) {
        match method {
            "notifications/initialized" => {
                self.initialized = true;
                info!(
                    session_id = %self.session_id,
                    client = self.client_name.as_deref().unwrap_or("unknown"),
                    "client initialized"
                );
            }
            "" => {}
            other => debug!(session_id = %self.session_id, method = other, "notification ignored"),
        }
    }

    pub async fn handle_json_rpc_request(
        &mut self,
        id: Option<Value>,
        method: String,
        params: Option<Value>,
    ) -> Value {
        let audit_params = redact_audit_params(params.as_ref());

        let response = match method.as_str() {
            "initialize" => self.handle_initialize(id, params.as_ref()),
            "ping" => json_rpc_result(id, json!({})),
            "tools/list" => json_rpc_result(
                id,
                serde_json::to_value(ListToolsResult {
                    meta: None,
                    next_cursor: None,
                    tools: vec![],
                })
                .expect("tools list result serialization"),
            ),
            "resources/list" => json_rpc_result(
                id,
                serde_json::to_value(ListResourcesResult {
                    meta: None,
                    next_cursor: None,
                    resources: vec![],
                })
                .expect("resources list result serialization"),
            ),
            _ => json_rpc_error(id, METHOD_NOT_FOUND, "Method not found"),
        };

        info!(
            session_id = %self.session_id,
            method = %method,
            params = %audit_params,
            outcome = if is_json_rpc_error(&response) { "failure" } else { "success" },
            "mcp action audited"
        );

        response
    }

    fn handle_initialize(&mut self, id: Option<Value>, params: Option<&Value>) -> Value {
        let protocol_version = match negotiate_protocol_version(params) {
            Ok(version) => version,
            Err(err) => return app_error_to_json_rpc(id, err),
        };

        self.client_name = params
            .and_then(|params| params.get("clientInfo"))
            .and_then(|info| info.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let initialize_result = InitializeResult {
            server_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                description: None,
                icons: vec![],
                website_url: None,
            },
            capabilities: ServerCapabilities {
                tools: Some(ServerCapabilitiesTools {
                    list_changed: Some(false),
                }),
                resources: Some(ServerCapabilitiesResources {
                    subscribe: Some(false),
                    list_changed: Some(false),
                }),
                prompts: None,
                ..Default::default()
            },
            protocol_version: protocol_version.into(),
            instructions: None,
            meta: None,
        };

        json_rpc_result(
            id,
            serde_json::to_value(initialize_result).expect("initialize result serialization"),
        )
    }
}

/// Drives one engine until its session closes.
pub async fn serve(mut transport: SessionTransport, mut engine: McpEngine) {
    debug!(
        session_id = %transport.session_id(),
        kind = %transport.kind(),
        stateless = engine.is_stateless(),
        "engine started"
    );

    while let Some(message) = transport.recv().await {
        let response = engine.handle_payload(message.payload().clone()).await;
        if let Err(err) = transport.respond(message, response).await {
            warn!(session_id = %transport.session_id(), error = %err, "engine stopped");
            break;
        }
    }

    debug!(session_id = %transport.session_id(), "engine finished");
}

pub fn validate_request_shape(request: &JsonrpcRequest) -> Result<(), Value> {
    let payload = serde_json::to_value(request).expect("jsonrpc request serialization");
    let request_id = Some(request_id_to_value(request.id.clone()));

    let valid = match request.method.as_str() {
        "tools/list" => serde_json::from_value::<ListToolsRequest>(payload).is_ok(),
        "resources/list" => serde_json::from_value::<ListResourcesRequest>(payload).is_ok(),
        "ping" => serde_json::from_value::<PingRequest>(payload).is_ok(),
        "initialize" => serde_json::from_value::<InitializeRequest>(payload).is_ok(),
        _ => true,
    };

    if valid {
        Ok(())
    } else {
        Err(json_rpc_error(request_id, INVALID_PARAMS, "Invalid params"))
    }
}

/// Clients offering another revision get the one we speak; the client decides whether
/// to continue.
pub fn negotiate_protocol_version(params: Option<&Value>) -> Result<ProtocolVersion, AppError> {
    let offered_version = params
        .and_then(Value::as_object)
        .and_then(|object| object.get("protocolVersion"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|version| !version.is_empty())
        .ok_or_else(|| {
            AppError::bad_request(
                "invalid_protocol_version",
                "initialize params.protocolVersion is required",
            )
        })?;

    if offered_version != SUPPORTED_PROTOCOL_VERSION {
        debug!(
            offered = offered_version,
            supported = SUPPORTED_PROTOCOL_VERSION,
            "answering initialize with supported protocol version"
        );
    }

    Ok(ProtocolVersion::V2024_11_05)
}

pub fn redact_audit_params(params: Option<&Value>) -> Value {
    params.map(redact_audit_value).unwrap_or(Value::Null)
}

pub fn redact_audit_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    if is_sensitive_key(key) {
                        (key.clone(), Value::String("[REDACTED]".to_string()))
                    } else {
                        (key.clone(), redact_audit_value(item))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_audit_value).collect()),
        _ => value.clone(),
    }
}

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase();
    matches!(
        normalized.as_str(),
        "authorization" | "bearer" | "credentials" | "credential" | "api_key" | "apikey"
    ) || normalized.contains("token")
        || normalized.contains("secret")
        || normalized.contains("password")
        || normalized.contains("credential")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> McpEngine {
        McpEngine::new("test-session".into(), false)
    }

    #[test]
    fn redacts_sensitive_fields_in_audit_params() {
        let params = json!({
            "protocolVersion": SUPPORTED_PROTOCOL_VERSION,
            "clientInfo": {
                "name": "inspector",
                "token": "should-not-appear",
                "api_key": "should-not-appear",
                "nested": {
                    "secret": "should-not-appear"
                }
            }
        });

        let redacted = redact_audit_params(Some(&params));

        assert_eq!(redacted["protocolVersion"], json!(SUPPORTED_PROTOCOL_VERSION));
        assert_eq!(redacted["clientInfo"]["name"], json!("inspector"));
        assert_eq!(redacted["clientInfo"]["token"], json!("[REDACTED]"));
        assert_eq!(redacted["clientInfo"]["api_key"], json!("[REDACTED]"));
        assert_eq!(
            redacted["clientInfo"]["nested"]["secret"],
            json!("[REDACTED]")
        );
    }

    #[test]
    fn negotiate_protocol_version_accepts_supported_version() {
        let params = json!({
            "protocolVersion": SUPPORTED_PROTOCOL_VERSION
        });

        let version = negotiate_protocol_version(Some(&params)).expect("supported version");
        assert_eq!(version, ProtocolVersion::V2024_11_05);
    }

    #[test]
    fn negotiate_protocol_version_answers_newer_offers_with_supported() {
        let params = json!({
            "protocolVersion": "2026-01-01"
        });

        let version = negotiate_protocol_version(Some(&params)).expect("fallback version");
        assert_eq!(version, ProtocolVersion::V2024_11_05);
    }

    #[test]
    fn negotiate_protocol_version_requires_a_version() {
        let error = negotiate_protocol_version(Some(&json!({}))).expect_err("missing version");
        assert!(error.to_string().contains("bad request"));
    }

    #[tokio::test]
    async fn initialize_reports_server_info() {
        let mut engine = engine();
        let response = engine
            .handle_payload(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "initialize",
                "params": {
                    "protocolVersion": SUPPORTED_PROTOCOL_VERSION,
                    "clientInfo": {"name": "test-client", "version": "1.0.0"},
                    "capabilities": {}
                }
            }))
            .await
            .expect("initialize response");

        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["protocolVersion"], SUPPORTED_PROTOCOL_VERSION);
        assert_eq!(
            response["result"]["serverInfo"]["name"],
            env!("CARGO_PKG_NAME")
        );
        assert!(response["result"]["capabilities"]["tools"].is_object());
        assert!(!engine.is_initialized());

        let ack = engine
            .handle_payload(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .await;
        assert!(ack.is_none());
        assert!(engine.is_initialized());
        assert_eq!(engine.client_name.as_deref(), Some("test-client"));
    }

    #[tokio::test]
    async fn stateless_engine_starts_initialized() {
        let engine = McpEngine::new("resumed".into(), true);
        assert!(engine.is_initialized());
        assert!(engine.is_stateless());
    }

    #[tokio::test]
    async fn unknown_method_returns_method_not_found() {
        let response = engine()
            .handle_payload(json!({"jsonrpc": "2.0", "id": 5, "method": "browser/click"}))
            .await
            .expect("error response");

        assert_eq!(response["id"], 5);
        assert_eq!(response["error"]["code"], METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn tools_list_is_empty() {
        let response = engine()
            .handle_payload(json!({
                "jsonrpc": "2.0",
                "id": 2,
                "method": "tools/list",
                "params": {}
            }))
            .await
            .expect("tools response");

        assert_eq!(response["result"]["tools"], json!([]));
    }

    #[tokio::test]
    async fn batch_returns_only_request_responses() {
        let response = engine()
            .handle_payload(json!([
                {"jsonrpc": "2.0", "method": "notifications/initialized"},
                {"jsonrpc": "2.0", "id": 100, "method": "ping"},
                {"jsonrpc": "2.0", "id": 200, "method": "tools/list", "params": {}}
            ]))
            .await
            .expect("batch response");

        let responses = response.as_array().expect("batch response array");
        assert_eq!(responses.len(), 2);
        let ids: Vec<i64> = responses
            .iter()
            .filter_map(|item| item["id"].as_i64())
            .collect();
        assert!(ids.contains(&100));
        assert!(ids.contains(&200));
    }

    #[tokio::test]
    async fn empty_batch_is_invalid() {
        let response = engine()
            .handle_payload(json!([]))
            .await
            .expect("error response");

        assert_eq!(response[0]["error"]["code"], INVALID_REQUEST);
    }

    #[tokio::test]
    async fn non_object_payload_is_invalid() {
        let response = engine()
            .handle_payload(json!("ping"))
            .await
            .expect("error response");

        assert_eq!(response["error"]["code"], INVALID_REQUEST);
    }
}
