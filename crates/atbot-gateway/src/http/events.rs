//! Slack Events API ingress: POST /slack/events.
//!
//! Requests are authenticated with the workspace signing secret, decoded,
//! and acknowledged immediately. Command processing runs on a tracked task
//! so Slack never waits on chat round-trips.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use atbot_slack::verify::{SIGNATURE_HEADER, TIMESTAMP_HEADER};
use atbot_slack::{decode_request, verify_signature, SlackRequest};

use crate::app::AppState;

/// Set by Slack on redeliveries of an event it believes we missed.
const RETRY_HEADER: &str = "x-slack-retry-num";

type HandlerError = (StatusCode, Json<Value>);

/// POST /slack/events
///
/// Returns 200 on anything Slack should not retry, 401 on a bad signature
/// and 400 on an undecodable body.
pub async fn events_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, HandlerError> {
    let secret = &state.config.slack.signing_secret;
    if !secret.is_empty() {
        let timestamp = header_str(&headers, TIMESTAMP_HEADER)
            .ok_or_else(|| auth_error("missing timestamp header"))?;
        let signature = header_str(&headers, SIGNATURE_HEADER)
            .ok_or_else(|| auth_error("missing signature header"))?;
        let now = chrono::Utc::now().timestamp();
        verify_signature(secret, timestamp, signature, &body, now)
            .map_err(|e| auth_error(&e.to_string()))?;
    }

    // We already acknowledged the first delivery; a retry would run the command twice.
    if let Some(retry) = header_str(&headers, RETRY_HEADER) {
        debug!(retry, "ignoring slack redelivery");
        return Ok(Json(json!({"ok": true})));
    }

    let request = decode_request(&body, &state.bot_user).map_err(|e| {
        warn!(error = %e, bytes = body.len(), "undecodable events payload");
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid event payload"})),
        )
    })?;

    match request {
        SlackRequest::UrlVerification { challenge } => {
            info!("answering url verification");
            Ok(Json(json!({"challenge": challenge})))
        }
        SlackRequest::Event(event) => {
            state.spawn_event(event);
            Ok(Json(json!({"ok": true})))
        }
        SlackRequest::Ignored => Ok(Json(json!({"ok": true}))),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn auth_error(reason: &str) -> HandlerError {
    warn!(reason, "slack request authentication failed");
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "authentication failed", "reason": reason})),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use axum::Router;
    use tower::ServiceExt;

    use atbot_channels::{ChannelError, ChatTransport, MembershipHandle};
    use atbot_core::config::AtbotConfig;
    use atbot_core::types::{ChannelId, MessageId, MessageTs, UserId};
    use atbot_slack::verify::sign;

    use super::*;
    use crate::app::build_router;

    const SECRET: &str = "test-signing-secret";

    #[derive(Default)]
    struct MockTransport {
        posts: Mutex<Vec<(String, String)>>,
        reactions: Mutex<Vec<String>>,
        seq: AtomicU64,
    }

    #[async_trait]
    impl ChatTransport for MockTransport {
        async fn post_message(
            &self,
            channel: &ChannelId,
            text: &str,
        ) -> Result<MessageTs, ChannelError> {
            let n = self.seq.fetch_add(1, Ordering::SeqCst);
            self.posts
                .lock()
                .unwrap()
                .push((channel.to_string(), text.to_string()));
            Ok(format!("3000.{n:06}").into())
        }

        async fn update_message(&self, _message: &MessageId, _text: &str) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn add_reaction(&self, _message: &MessageId, emoji: &str) -> Result<(), ChannelError> {
            self.reactions.lock().unwrap().push(emoji.to_string());
            Ok(())
        }

        async fn remove_reaction(&self, _message: &MessageId, _emoji: &str) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn open_im(&self, user: &UserId) -> Result<ChannelId, ChannelError> {
            Ok(format!("D{user}").into())
        }

        fn archive_url(&self, message: &MessageId) -> String {
            format!("https://t.slack.com/archives/{}/p{}", message.channel, message.ts)
        }
    }

    fn setup(secret: &str) -> (Arc<AppState>, Arc<MockTransport>, Router) {
        let mut config = AtbotConfig::default();
        config.slack.signing_secret = secret.to_string();
        config.slack.bot_user_id = "UBOT".to_string();
        config.commands.edit_delay_ms = 0;

        let transport = Arc::new(MockTransport::default());
        let (membership, _worker) = MembershipHandle::spawn();
        let state = Arc::new(AppState::new(config, transport.clone(), membership));
        let _janitor = state.module.enable();
        let router = build_router(Arc::clone(&state));
        (state, transport, router)
    }

    fn signed(body: &str) -> Request<Body> {
        let ts = chrono::Utc::now().timestamp().to_string();
        let sig = sign(SECRET, &ts, body.as_bytes()).unwrap();
        Request::builder()
            .method("POST")
            .uri("/slack/events")
            .header(TIMESTAMP_HEADER, ts)
            .header(SIGNATURE_HEADER, sig)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(resp: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn drain(state: &AppState) {
        state.tasks.close();
        state.tasks.wait().await;
        state.tasks.reopen();
    }

    #[tokio::test]
    async fn health_reports_module_state() {
        let (_state, _transport, router) = setup(SECRET);
        let resp = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["commands_enabled"], true);
        assert_eq!(body["tracked_commands"], 0);
    }

    #[tokio::test]
    async fn url_verification_echoes_challenge() {
        let (_state, _transport, router) = setup(SECRET);
        let body = json!({"type": "url_verification", "challenge": "c-42"}).to_string();
        let resp = router.oneshot(signed(&body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["challenge"], "c-42");
    }

    #[tokio::test]
    async fn bad_signature_is_rejected() {
        let (_state, _transport, router) = setup(SECRET);
        let body = json!({"type": "url_verification", "challenge": "c"}).to_string();
        let req = Request::builder()
            .method("POST")
            .uri("/slack/events")
            .header(TIMESTAMP_HEADER, chrono::Utc::now().timestamp().to_string())
            .header(SIGNATURE_HEADER, "v0=deadbeef")
            .body(Body::from(body))
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(resp).await["error"], "authentication failed");
    }

    #[tokio::test]
    async fn missing_headers_are_rejected() {
        let (_state, _transport, router) = setup(SECRET);
        let req = Request::builder()
            .method("POST")
            .uri("/slack/events")
            .body(Body::from("{}"))
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn garbage_body_is_bad_request() {
        let (_state, _transport, router) = setup(SECRET);
        let resp = router.oneshot(signed("not json")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn signed_command_is_processed_and_tracked() {
        let (state, transport, router) = setup(SECRET);
        let body = json!({
            "type": "event_callback",
            "event": {
                "type": "message", "channel": "C1", "user": "U1",
                "text": "<@UBOT> echo hello", "ts": "1700000000.000100"
            }
        })
        .to_string();
        let resp = router.oneshot(signed(&body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        drain(&state).await;
        assert_eq!(state.module.lifecycle().tracker().len(), 1);
        assert_eq!(
            transport.posts.lock().unwrap().as_slice(),
            &[("C1".to_string(), "<@U1>: hello".to_string())]
        );
        assert_eq!(
            transport.reactions.lock().unwrap().as_slice(),
            &["white_check_mark".to_string()]
        );
    }

    #[tokio::test]
    async fn retries_are_acknowledged_but_skipped() {
        let (state, transport, router) = setup("");
        let body = json!({
            "type": "event_callback",
            "event": {
                "type": "message", "channel": "C1", "user": "U1",
                "text": "<@UBOT> echo hello", "ts": "1.1"
            }
        })
        .to_string();
        let req = Request::builder()
            .method("POST")
            .uri("/slack/events")
            .header(RETRY_HEADER, "1")
            .body(Body::from(body))
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        drain(&state).await;
        assert!(state.module.lifecycle().tracker().is_empty());
        assert!(transport.posts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn membership_events_feed_the_actor() {
        let (state, _transport, router) = setup("");
        let body = json!({
            "type": "event_callback",
            "event": { "type": "member_joined_channel", "channel": "C9", "user": "U1" }
        })
        .to_string();
        let req = Request::builder()
            .method("POST")
            .uri("/slack/events")
            .body(Body::from(body))
            .unwrap();
        router.oneshot(req).await.unwrap();

        drain(&state).await;
        let member = state
            .membership
            .is_member(&UserId::from("U1"), &ChannelId::from("C9"))
            .await
            .unwrap();
        assert!(member);
    }
}
