//! The bridge's routes and handlers
//!
//! The browser consoles poll `GET /messages` every couple of seconds and
//! POST through `/send`; both predate this codebase, so their shapes
//! (camelCase `userType`, bare JSON array, 400 on an empty message) are
//! load-bearing. The `/api` routes carry the assessment backend's
//! contract for the same reason.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{Method, header};
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use lantern_core::{GeoPoint, MessageKind, Role, TeamUnit};
use lantern_hazard::{
    DEFAULT_DEPTH_KM, Earthquake, RescueReport, TsunamiAssessment, VictimStatus, assess_tsunami,
};
use lantern_store::{MessageFilter, StoredMessage};

use crate::error::{BridgeError, BridgeResult};
use crate::state::{BridgeState, OutboundRequest, SendOutcome};

/// Build the bridge router
pub fn router(state: BridgeState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(service_info))
        .route("/messages", get(list_messages))
        .route("/send", post(send_message))
        .route("/peers", get(list_peers))
        .route("/api/earthquake/report", post(report_earthquake))
        .route("/api/rescue/report", post(report_rescue))
        .route("/api/rescue/reports", get(list_rescues))
        .route("/api/tsunami/assess", post(assess))
        .layer(cors)
        .with_state(state)
}

/// A message as the pollers see it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayMessage {
    pub content: String,
    pub sender: String,
    #[serde(rename = "userType")]
    pub user_type: String,
    /// When this station archived the message, RFC 3339
    pub timestamp: DateTime<Utc>,
}

impl From<&StoredMessage> for DisplayMessage {
    fn from(stored: &StoredMessage) -> Self {
        Self {
            content: stored.message.content.clone(),
            sender: stored.sender.clone(),
            user_type: stored.message.role.as_str().to_string(),
            timestamp: stored.received_at,
        }
    }
}

/// One row of the presence snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerEntry {
    pub station: String,
    pub nick: Option<String>,
    pub role: String,
    pub unit: Option<String>,
    /// Seconds since the last beacon from this station
    pub seen_secs_ago: u64,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    role: Option<String>,
    #[serde(rename = "userType")]
    user_type: Option<String>,
    unit: Option<String>,
    sender: Option<String>,
    since: Option<String>,
    contains: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl MessagesQuery {
    fn into_filter(self) -> BridgeResult<MessageFilter> {
        let mut filter = MessageFilter::new();

        if let Some(value) = self.role.or(self.user_type) {
            filter = filter.role(parse_role_strict(&value)?);
        }
        if let Some(value) = self.unit {
            let unit = TeamUnit::parse(&value)
                .ok_or_else(|| BridgeError::BadRequest(format!("Unknown unit: {}", value)))?;
            filter = filter.unit(unit);
        }
        if let Some(value) = self.sender {
            filter = filter.sender(value);
        }
        if let Some(value) = self.since {
            filter = filter.since(parse_rfc3339(&value)?);
        }
        if let Some(value) = self.contains {
            filter = filter.contains(value);
        }
        if let Some(value) = self.limit {
            filter = filter.limit(value);
        }
        if let Some(value) = self.offset {
            filter = filter.offset(value);
        }
        Ok(filter)
    }
}

fn parse_role_strict(value: &str) -> BridgeResult<Role> {
    match value {
        "civilian" | "team" | "unknown" => Ok(Role::parse(value)),
        other => Err(BridgeError::BadRequest(format!("Unknown role: {}", other))),
    }
}

fn parse_rfc3339(value: &str) -> BridgeResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| BridgeError::BadRequest(format!("Invalid timestamp: {}", e)))
}

fn decode_body<T: DeserializeOwned>(bytes: &Bytes) -> BridgeResult<T> {
    serde_json::from_slice(bytes).map_err(|e| BridgeError::BadRequest(format!("failed to decode: {}", e)))
}

async fn service_info() -> Json<serde_json::Value> {
    Json(json!({
        "service": "lantern-bridge",
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn list_messages(
    State(state): State<BridgeState>,
    Query(query): Query<MessagesQuery>,
) -> BridgeResult<Json<Vec<DisplayMessage>>> {
    let filter = query.into_filter()?;
    let messages = state.archive.query(&filter)?;
    Ok(Json(messages.iter().map(DisplayMessage::from).collect()))
}

#[derive(Debug, Deserialize)]
struct SendBody {
    message: String,
    #[serde(rename = "userType")]
    user_type: Option<String>,
}

async fn send_message(
    State(state): State<BridgeState>,
    body: Bytes,
) -> BridgeResult<Json<serde_json::Value>> {
    let body: SendBody = decode_body(&body)?;
    if body.message.trim().is_empty() {
        return Err(BridgeError::BadRequest(
            "message must not be empty".to_string(),
        ));
    }

    // Missing userType means a bare client; the original labeled those
    // civilian. Present-but-unrecognized values degrade to unknown.
    let role = body
        .user_type
        .as_deref()
        .map(Role::parse)
        .unwrap_or(Role::Civilian);

    let (request, outcome_rx) = OutboundRequest::new(body.message, role, MessageKind::Text);
    state
        .outbound
        .send(request)
        .await
        .map_err(|_| BridgeError::ChannelClosed)?;

    match outcome_rx.await {
        Ok(SendOutcome::Sent) => Ok(Json(json!({ "status": "sent" }))),
        Ok(SendOutcome::Queued) => Ok(Json(json!({ "status": "queued" }))),
        Err(_) => Err(BridgeError::ChannelClosed),
    }
}

async fn list_peers(State(state): State<BridgeState>) -> Json<Vec<PeerEntry>> {
    let peers = state
        .presence
        .roster()
        .into_iter()
        .map(|known| PeerEntry {
            station: known.id.short(),
            nick: known.nick,
            role: known.role.as_str().to_string(),
            unit: known.unit.map(|u| u.as_str().to_string()),
            seen_secs_ago: known.last_seen.elapsed().as_secs(),
        })
        .collect();
    Json(peers)
}

#[derive(Debug, Deserialize)]
struct EarthquakeBody {
    magnitude: f64,
    latitude: f64,
    longitude: f64,
    depth: Option<f64>,
}

async fn report_earthquake(
    State(state): State<BridgeState>,
    body: Bytes,
) -> BridgeResult<Json<serde_json::Value>> {
    let body: EarthquakeBody = decode_body(&body)?;
    let epicenter = GeoPoint::new(body.latitude, body.longitude)?;
    let quake = Earthquake::with_depth(
        body.magnitude,
        body.depth.unwrap_or(DEFAULT_DEPTH_KM),
        epicenter,
    )?;

    let summary = quake.summary();
    state.board.record_earthquake(quake);

    // Alert the room; the record stands even when the mesh path is down
    let alert = OutboundRequest::fire_and_forget(summary, state.station.role, MessageKind::Alert);
    if state.outbound.send(alert).await.is_err() {
        warn!("Outbound channel closed, earthquake alert not broadcast");
    }

    Ok(Json(json!({ "status": "success" })))
}

#[derive(Debug, Deserialize)]
struct RescueBody {
    victim_id: Option<String>,
    status: VictimStatus,
    #[serde(default)]
    needs: Vec<String>,
    latitude: f64,
    longitude: f64,
}

async fn report_rescue(
    State(state): State<BridgeState>,
    body: Bytes,
) -> BridgeResult<Json<serde_json::Value>> {
    let body: RescueBody = decode_body(&body)?;
    let position = GeoPoint::new(body.latitude, body.longitude)?;

    let mut report = RescueReport::new(body.status, body.needs, position);
    if let Some(victim_id) = body.victim_id {
        report = report.with_victim_id(victim_id);
    }
    state.board.record_rescue(report);

    Ok(Json(json!({ "status": "success" })))
}

#[derive(Debug, Deserialize)]
pub struct SinceQuery {
    since: Option<String>,
}

async fn list_rescues(
    State(state): State<BridgeState>,
    Query(query): Query<SinceQuery>,
) -> BridgeResult<Json<Vec<RescueReport>>> {
    let since = query.since.as_deref().map(parse_rfc3339).transpose()?;
    Ok(Json(state.board.rescues_since(since)))
}

#[derive(Debug, Deserialize)]
struct AssessBody {
    magnitude: f64,
    depth: f64,
    distance_km: f64,
    latitude: f64,
    longitude: f64,
}

async fn assess(body: Bytes) -> BridgeResult<Json<TsunamiAssessment>> {
    let body: AssessBody = decode_body(&body)?;
    let near = GeoPoint::new(body.latitude, body.longitude)?;

    Ok(Json(assess_tsunami(
        body.magnitude,
        body.depth,
        body.distance_km,
        near,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    use lantern_core::{ChatMessage, MessageId, StationId};
    use lantern_hazard::ReportBoard;
    use lantern_mesh::{PresenceBeacon, PresenceBook};
    use lantern_store::MessageArchive;

    use crate::state::StationInfo;

    fn test_state() -> (BridgeState, mpsc::Receiver<OutboundRequest>) {
        let (outbound, outbound_rx) = mpsc::channel(16);
        let id = StationId::new([0xaa; 32]);
        let state = BridgeState::new(
            StationInfo {
                id,
                nick: "base-camp".to_string(),
                role: Role::Team,
                unit: None,
            },
            Arc::new(MessageArchive::in_memory(0)),
            Arc::new(ReportBoard::new()),
            Arc::new(PresenceBook::new(id, Duration::from_secs(90))),
            outbound,
        );
        (state, outbound_rx)
    }

    fn respond_with(mut rx: mpsc::Receiver<OutboundRequest>, outcome: SendOutcome) {
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                if let Some(tx) = request.outcome_tx {
                    let _ = tx.send(outcome);
                }
            }
        });
    }

    async fn get(state: BridgeState, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    async fn post(state: BridgeState, uri: &str, body: &str) -> (StatusCode, Vec<u8>) {
        let response = router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    async fn archive_message(state: &BridgeState, seq: u64, role: Role, content: &str) {
        let message =
            ChatMessage::new(MessageId::new(9, seq), content, role, MessageKind::Text).unwrap();
        state
            .archive
            .append(StoredMessage::local(message))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_service_info() {
        let (state, _rx) = test_state();
        let (status, body) = get(state, "/").await;
        assert_eq!(status, StatusCode::OK);
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "running");
        assert_eq!(parsed["service"], "lantern-bridge");
    }

    #[tokio::test]
    async fn test_messages_poll_shape_and_order() {
        let (state, _rx) = test_state();
        archive_message(&state, 1, Role::Civilian, "need water").await;
        archive_message(&state, 2, Role::Team, "en route").await;

        let (status, body) = get(state, "/messages").await;
        assert_eq!(status, StatusCode::OK);
        let parsed: Vec<DisplayMessage> = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].content, "need water");
        assert_eq!(parsed[0].user_type, "civilian");
        assert_eq!(parsed[1].sender, "Rescue Team");

        // The camelCase key is on the wire
        let raw = String::from_utf8(body).unwrap();
        assert!(raw.contains("\"userType\""));
    }

    #[tokio::test]
    async fn test_messages_role_filter() {
        let (state, _rx) = test_state();
        archive_message(&state, 1, Role::Civilian, "one").await;
        archive_message(&state, 2, Role::Team, "two").await;

        let (status, body) = get(state.clone(), "/messages?role=team").await;
        assert_eq!(status, StatusCode::OK);
        let parsed: Vec<DisplayMessage> = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].content, "two");

        // userType is accepted as an alias
        let (status, body) = get(state, "/messages?userType=civilian").await;
        assert_eq!(status, StatusCode::OK);
        let parsed: Vec<DisplayMessage> = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.len(), 1);
    }

    #[tokio::test]
    async fn test_messages_rejects_unknown_filter_values() {
        let (state, _rx) = test_state();
        let (status, _) = get(state.clone(), "/messages?role=dispatcher").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get(state.clone(), "/messages?unit=submarine").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get(state, "/messages?since=notatime").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_send_accepted_when_broadcast_succeeds() {
        let (state, rx) = test_state();
        respond_with(rx, SendOutcome::Sent);

        let (status, body) = post(state, "/send", r#"{"message":"hello","userType":"team"}"#).await;
        assert_eq!(status, StatusCode::OK);
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "sent");
    }

    #[tokio::test]
    async fn test_send_reports_queued_when_courier_holds_it() {
        let (state, rx) = test_state();
        respond_with(rx, SendOutcome::Queued);

        let (status, body) = post(state, "/send", r#"{"message":"hello"}"#).await;
        assert_eq!(status, StatusCode::OK);
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "queued");
    }

    #[tokio::test]
    async fn test_send_empty_message_is_400() {
        let (state, rx) = test_state();
        respond_with(rx, SendOutcome::Sent);

        let (status, _) = post(state.clone(), "/send", r#"{"message":"   "}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = post(state, "/send", "not json at all").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_send_dead_outbound_is_500() {
        let (state, rx) = test_state();
        drop(rx);

        let (status, body) = post(state, "/send", r#"{"message":"hello"}"#).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(parsed["error"].is_string());
    }

    #[tokio::test]
    async fn test_peers_snapshot() {
        let (state, _rx) = test_state();
        let beacon = PresenceBeacon::new(
            Some("shelter-7".to_string()),
            Role::Civilian,
            None,
        );
        state.presence.observe(StationId::new([0xbb; 32]), &beacon);

        let (status, body) = get(state, "/peers").await;
        assert_eq!(status, StatusCode::OK);
        let parsed: Vec<PeerEntry> = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].nick.as_deref(), Some("shelter-7"));
        assert_eq!(parsed[0].role, "civilian");
    }

    #[tokio::test]
    async fn test_earthquake_report_records_and_alerts() {
        let (state, mut rx) = test_state();

        let (status, body) = post(
            state.clone(),
            "/api/earthquake/report",
            r#"{"magnitude":8.1,"latitude":13.08,"longitude":80.27}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "success");
        assert_eq!(state.board.earthquake_count(), 1);

        // Default depth applies and the alert goes out over the mesh path
        let quakes = state.board.earthquakes_since(None);
        assert_eq!(quakes[0].depth_km, DEFAULT_DEPTH_KM);
        let alert = rx.recv().await.unwrap();
        assert_eq!(alert.kind, MessageKind::Alert);
        assert!(alert.content.contains("magnitude 8.1"));
    }

    #[tokio::test]
    async fn test_earthquake_report_invalid_coordinates_is_400() {
        let (state, _rx) = test_state();
        let (status, _) = post(
            state.clone(),
            "/api/earthquake/report",
            r#"{"magnitude":8.1,"latitude":123.0,"longitude":80.27}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(state.board.earthquake_count(), 0);
    }

    #[tokio::test]
    async fn test_rescue_report_roundtrip() {
        let (state, _rx) = test_state();

        let (status, _) = post(
            state.clone(),
            "/api/rescue/report",
            r#"{"victim_id":"victim-12","status":"trapped","needs":["water"],"latitude":28.61,"longitude":77.21}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = get(state, "/api/rescue/reports").await;
        assert_eq!(status, StatusCode::OK);
        let parsed: Vec<RescueReport> = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].victim_id.as_deref(), Some("victim-12"));
        assert_eq!(parsed[0].status, VictimStatus::Trapped);
    }

    #[tokio::test]
    async fn test_tsunami_assessment_contract() {
        let (state, _rx) = test_state();

        let (status, body) = post(
            state,
            "/api/tsunami/assess",
            r#"{"magnitude":9.0,"depth":25.0,"distance_km":50.0,"latitude":13.08,"longitude":80.27}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["risk_level"], "extreme");
        assert!(parsed["arrival_time_minutes"].is_number());
        assert_eq!(parsed["evacuation_zones"][0]["name"], "High Ground Assembly Point");
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let (state, _rx) = test_state();
        let response = router(state)
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/send")
                    .header("origin", "http://localhost:5173")
                    .header("access-control-request-method", "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let allow_origin = response
            .headers()
            .get("access-control-allow-origin")
            .unwrap();
        assert_eq!(allow_origin, "*");
    }
}
