use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::catalogue::{self, Tool};
use super::client::{Downstream, DownstreamError, IntegrationsClient, ToolAuth};
use super::speech;
use super::types::*;
use crate::AppState;

/// Dispatches MCP tool calls onto the integrations API.
#[derive(Clone)]
pub struct ToolBridge {
    client: IntegrationsClient,
}

impl ToolBridge {
    pub fn new(client: IntegrationsClient) -> Self {
        Self { client }
    }

    /// Run one tool. Always returns a result; failures become `isError` text.
    pub async fn call_tool(
        &self,
        auth: Option<&ToolAuth>,
        name: &str,
        arguments: Value,
    ) -> CallToolResult {
        let Some(tool) = Tool::from_name(name) else {
            return CallToolResult::text(format!("Error: unknown tool '{}'", name), true);
        };
        let Some(auth) = auth else {
            tracing::warn!(tool = name, "Tool call without an auth context");
            return CallToolResult::text(speech::AUTH_UNAVAILABLE, true);
        };

        let arguments = match arguments {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        if let Err(violations) = catalogue::validate(tool, &arguments) {
            return CallToolResult::text(
                format!("Error: invalid arguments for {}: {}", name, violations),
                true,
            );
        }

        tracing::info!(tool = name, auth = ?auth, "Tool call");
        match tool {
            Tool::ListAvailableIntegrations => self.list_integrations(auth).await,
            Tool::SendSms => self.send_sms(auth, &arguments).await,
            Tool::SendEmail => self.send_email(auth, &arguments).await,
            Tool::CreateZoomMeeting => self.create_zoom_meeting(auth, &arguments).await,
            Tool::BookMeeting => self.book_meeting(auth, &arguments).await,
            Tool::BookZohoMeeting => self.book_zoho_meeting(auth, &arguments).await,
        }
    }

    async fn list_integrations(&self, auth: &ToolAuth) -> CallToolResult {
        match self.client.get(auth, "/integrations/list").await {
            Ok(resp) if resp.is_success() => {
                CallToolResult::text(speech::integrations(&resp.body), false)
            }
            Ok(resp) => CallToolResult::text(speech::failure("list integrations", &resp), true),
            Err(e) => CallToolResult::text(speech::transport_failure("list integrations", &e), true),
        }
    }

    async fn send_sms(&self, auth: &ToolAuth, args: &Value) -> CallToolResult {
        let body = json!({
            "phoneNumber": args["phone_number"],
            "message": args["message"],
        });
        self.post_and_speak(auth, "/integrations/send-sms", &body, "send SMS", speech::sms_sent)
            .await
    }

    async fn send_email(&self, auth: &ToolAuth, args: &Value) -> CallToolResult {
        let recipient = args["to_email"].as_str().unwrap_or_default().to_string();
        let mut body = json!({
            "toEmail": args["to_email"],
            "subject": args["subject"],
            "body": args["body"],
        });
        copy_optional(args, "html_body", &mut body, "htmlBody");
        self.post_and_speak(auth, "/integrations/send-email", &body, "send email", |v| {
            speech::email_sent(v, &recipient)
        })
        .await
    }

    async fn create_zoom_meeting(&self, auth: &ToolAuth, args: &Value) -> CallToolResult {
        let mut body = json!({
            "topic": args["topic"],
            "startTime": args["start_time"],
            "durationMinutes": args.get("duration").cloned().unwrap_or(json!(60)),
            "timezone": args.get("timezone").cloned().unwrap_or(json!("UTC")),
        });
        copy_optional(args, "agenda", &mut body, "agenda");
        self.post_and_speak(
            auth,
            "/integrations/create-video-meeting",
            &body,
            "create meeting",
            speech::meeting_created,
        )
        .await
    }

    async fn book_meeting(&self, auth: &ToolAuth, args: &Value) -> CallToolResult {
        let body = booking_body(args);
        match self.client.post(auth, "/integrations/book-meeting", &body).await {
            Ok(resp) if resp.is_success() => {
                CallToolResult::text(speech::booking_confirmed(&resp.body), false)
            }
            Ok(resp) => {
                tracing::warn!(status = resp.status, "Booking rejected by integrations API");
                CallToolResult::text(speech::booking_rejected(&resp), true)
            }
            Err(e) => {
                tracing::error!("Booking call failed: {}", e);
                CallToolResult::text(speech::booking_unreachable(&e), true)
            }
        }
    }

    async fn book_zoho_meeting(&self, auth: &ToolAuth, args: &Value) -> CallToolResult {
        let body = booking_body(args);
        self.post_and_speak(
            auth,
            "/integrations/zoho_bookings/create-booking",
            &body,
            "book appointment",
            speech::zoho_booked,
        )
        .await
    }

    async fn post_and_speak<F>(
        &self,
        auth: &ToolAuth,
        path: &str,
        body: &Value,
        action: &str,
        on_success: F,
    ) -> CallToolResult
    where
        F: FnOnce(&Value) -> String,
    {
        let result: Result<Downstream, DownstreamError> = self.client.post(auth, path, body).await;
        match result {
            Ok(resp) if resp.is_success() => CallToolResult::text(on_success(&resp.body), false),
            Ok(resp) => {
                tracing::warn!(path, status = resp.status, "Tool downstream call rejected");
                CallToolResult::text(speech::failure(action, &resp), true)
            }
            Err(e) => {
                tracing::error!(path, "Tool downstream call failed: {}", e);
                CallToolResult::text(speech::transport_failure(action, &e), true)
            }
        }
    }

    /// Handle one JSON-RPC message. `None` for notifications.
    pub async fn handle(
        &self,
        auth: Option<&ToolAuth>,
        request: JsonRpcRequest,
    ) -> Option<JsonRpcResponse> {
        let Some(id) = request.id.clone() else {
            tracing::debug!(method = %request.method, "MCP notification");
            return None;
        };

        let response = match request.method.as_str() {
            "initialize" => JsonRpcResponse::result(
                id,
                to_value(InitializeResult {
                    protocol_version: PROTOCOL_VERSION,
                    capabilities: ServerCapabilities {
                        tools: ToolsCapability {
                            list_changed: false,
                        },
                    },
                    server_info: Implementation {
                        name: "callhub".into(),
                        version: env!("CARGO_PKG_VERSION").into(),
                    },
                }),
            ),
            "ping" => JsonRpcResponse::result(id, json!({})),
            "tools/list" => JsonRpcResponse::result(
                id,
                to_value(ListToolsResult {
                    tools: catalogue::definitions(),
                }),
            ),
            "tools/call" => {
                let params = request
                    .params
                    .map(serde_json::from_value::<CallToolParams>)
                    .transpose();
                match params {
                    Ok(Some(params)) => {
                        let result = self
                            .call_tool(auth, &params.name, params.arguments.unwrap_or(Value::Null))
                            .await;
                        JsonRpcResponse::result(id, to_value(result))
                    }
                    Ok(None) => JsonRpcResponse::error(id, INVALID_PARAMS, "missing params"),
                    Err(e) => JsonRpcResponse::error(id, INVALID_PARAMS, e.to_string()),
                }
            }
            other => JsonRpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                format!("method '{}' not found", other),
            ),
        };
        Some(response)
    }

    /// Parse and handle a raw frame. Malformed input yields an error response.
    pub async fn handle_value(&self, auth: Option<&ToolAuth>, raw: Value) -> Option<JsonRpcResponse> {
        if !raw.is_object() {
            return Some(JsonRpcResponse::error(
                Value::Null,
                INVALID_REQUEST,
                "expected a JSON-RPC request object",
            ));
        }
        let id = raw.get("id").cloned().unwrap_or(Value::Null);
        match serde_json::from_value::<JsonRpcRequest>(raw) {
            Ok(request) => self.handle(auth, request).await,
            Err(e) => Some(JsonRpcResponse::error(id, INVALID_REQUEST, e.to_string())),
        }
    }
}

fn to_value<T: serde::Serialize>(value: T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn copy_optional(args: &Value, from: &str, body: &mut Value, to: &str) {
    if let (Some(v), Some(obj)) = (args.get(from), body.as_object_mut()) {
        if !v.is_null() {
            obj.insert(to.to_string(), v.clone());
        }
    }
}

fn booking_body(args: &Value) -> Value {
    let mut body = json!({
        "customerName": args["customer_name"],
        "customerEmail": args["customer_email"],
        "bookingDate": args["booking_date"],
        "bookingTime": args["booking_time"],
        "durationMinutes": args.get("duration_minutes").cloned().unwrap_or(json!(30)),
    });
    copy_optional(args, "customer_phone", &mut body, "customerPhone");
    copy_optional(args, "notes", &mut body, "notes");
    copy_optional(args, "timezone", &mut body, "timezone");
    body
}

// ── Transport ──────────────────────────────────────────────────

/// POST /mcp
pub async fn mcp_http(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<Value>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let auth = ToolAuth::from_headers(&headers);
    let raw = match body {
        Ok(Json(raw)) => raw,
        Err(rejection) => {
            return Json(JsonRpcResponse::error(
                Value::Null,
                PARSE_ERROR,
                rejection.body_text(),
            ))
            .into_response();
        }
    };

    match state.bridge.handle_value(auth.as_ref(), raw).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionQuery {
    pub token: Option<String>,
}

/// GET /mcp/ws
///
/// The auth context is fixed for the life of the socket.
pub async fn mcp_ws(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let auth = query
        .token
        .as_deref()
        .and_then(ToolAuth::from_token)
        .or_else(|| ToolAuth::from_headers(&headers));
    if auth.is_none() {
        tracing::warn!("Tool session opened without credentials");
    }

    let bridge = state.bridge.clone();
    ws.on_upgrade(move |socket| async move {
        session(socket, bridge, auth).await;
    })
}

async fn session(socket: WebSocket, bridge: ToolBridge, auth: Option<ToolAuth>) {
    let (mut sink, mut stream) = socket.split();

    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!("Tool session read error: {}", e);
                break;
            }
        };

        let reply = match serde_json::from_str::<Value>(&text) {
            Ok(raw) => bridge.handle_value(auth.as_ref(), raw).await,
            Err(e) => Some(JsonRpcResponse::error(Value::Null, PARSE_ERROR, e.to_string())),
        };

        if let Some(reply) = reply {
            let Ok(encoded) = serde_json::to_string(&reply) else {
                continue;
            };
            if sink.send(Message::Text(encoded)).await.is_err() {
                break;
            }
        }
    }
    tracing::debug!("Tool session closed");
}
