//! Slack Web API client implementing [`ChatTransport`].

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use atbot_channels::{ChannelError, ChatTransport};
use atbot_core::types::{ChannelId, MessageId, MessageTs, UserId};

use crate::error::SlackError;

pub const SLACK_API_BASE: &str = "https://slack.com/api";

pub struct SlackClient {
    http: reqwest::Client,
    token: String,
    base_url: String,
    team_domain: String,
}

impl SlackClient {
    pub fn new(token: impl Into<String>, team_domain: impl Into<String>) -> Result<Self, SlackError> {
        let token = token.into();
        if token.is_empty() {
            return Err(SlackError::NoToken);
        }
        Ok(Self {
            http: reqwest::Client::new(),
            token,
            base_url: SLACK_API_BASE.to_string(),
            team_domain: team_domain.into(),
        })
    }

    /// Point the client at another API root (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// POST a Web API method and return the body of an `ok: true` answer.
    async fn call(&self, method: &str, body: Value) -> Result<Value, SlackError> {
        debug!(method, "slack api call");
        let resp: Value = self
            .http
            .post(format!("{}/{}", self.base_url, method))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if resp["ok"].as_bool() != Some(true) {
            let error = resp["error"].as_str().unwrap_or("unknown_error").to_string();
            return Err(SlackError::Api {
                method: method.to_string(),
                error,
            });
        }
        Ok(resp)
    }

    /// Like [`Self::call`], but treats the `benign` API error code as success.
    async fn call_tolerating(
        &self,
        method: &str,
        body: Value,
        benign: &str,
    ) -> Result<(), SlackError> {
        match self.call(method, body).await {
            Ok(_) => Ok(()),
            Err(SlackError::Api { error, .. }) if error == benign => {
                debug!(method, error = %error, "ignoring benign api error");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// `https://{team}.slack.com/archives/{channel}/p{ts without the dot}`
pub fn archive_url(team_domain: &str, message: &MessageId) -> String {
    format!(
        "https://{}.slack.com/archives/{}/p{}",
        team_domain,
        message.channel,
        message.ts.as_str().replace('.', "")
    )
}

#[async_trait]
impl ChatTransport for SlackClient {
    async fn post_message(&self, channel: &ChannelId, text: &str) -> Result<MessageTs, ChannelError> {
        let method = "chat.postMessage";
        let resp = self
            .call(method, json!({ "channel": channel, "text": text }))
            .await?;
        let ts = resp["ts"].as_str().ok_or(SlackError::MissingField {
            method: method.to_string(),
            field: "ts",
        })?;
        Ok(MessageTs::from(ts))
    }

    async fn update_message(&self, message: &MessageId, text: &str) -> Result<(), ChannelError> {
        self.call(
            "chat.update",
            json!({ "channel": message.channel, "ts": message.ts, "text": text }),
        )
        .await?;
        Ok(())
    }

    async fn add_reaction(&self, message: &MessageId, emoji: &str) -> Result<(), ChannelError> {
        self.call_tolerating(
            "reactions.add",
            json!({ "channel": message.channel, "timestamp": message.ts, "name": emoji }),
            "already_reacted",
        )
        .await?;
        Ok(())
    }

    async fn remove_reaction(&self, message: &MessageId, emoji: &str) -> Result<(), ChannelError> {
        self.call_tolerating(
            "reactions.remove",
            json!({ "channel": message.channel, "timestamp": message.ts, "name": emoji }),
            "no_reaction",
        )
        .await?;
        Ok(())
    }

    async fn open_im(&self, user: &UserId) -> Result<ChannelId, ChannelError> {
        let method = "conversations.open";
        let resp = self.call(method, json!({ "users": user })).await?;
        let id = resp["channel"]["id"].as_str().ok_or(SlackError::MissingField {
            method: method.to_string(),
            field: "channel.id",
        })?;
        Ok(ChannelId::from(id))
    }

    fn archive_url(&self, message: &MessageId) -> String {
        archive_url(&self.team_domain, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::extract::{Path, State};
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Json, Router};

    type Seen = Arc<Mutex<Vec<(String, Option<String>, Value)>>>;

    /// Minimal stand-in for slack.com/api that records every call.
    async fn fake_slack() -> (String, Seen) {
        let seen: Seen = Arc::default();

        async fn handle(
            State(seen): State<Seen>,
            Path(method): Path<String>,
            headers: HeaderMap,
            Json(body): Json<Value>,
        ) -> Json<Value> {
            let auth = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            seen.lock().unwrap().push((method.clone(), auth, body.clone()));
            let reply = match method.as_str() {
                "chat.postMessage" => json!({ "ok": true, "ts": "1700000000.000200" }),
                "conversations.open" => json!({ "ok": true, "channel": { "id": "D123" } }),
                "reactions.add" if body["name"] == "wave" => {
                    json!({ "ok": false, "error": "already_reacted" })
                }
                "chat.update" => json!({ "ok": false, "error": "message_not_found" }),
                _ => json!({ "ok": true }),
            };
            Json(reply)
        }

        let app = Router::new()
            .route("/api/{method}", post(handle))
            .with_state(Arc::clone(&seen));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/api"), seen)
    }

    async fn client() -> (SlackClient, Seen) {
        let (base, seen) = fake_slack().await;
        let client = SlackClient::new("xoxb-test", "acme")
            .unwrap()
            .with_base_url(base);
        (client, seen)
    }

    #[test]
    fn empty_token_is_rejected() {
        assert!(matches!(SlackClient::new("", "acme"), Err(SlackError::NoToken)));
    }

    #[test]
    fn archive_links_drop_the_dot() {
        let id = MessageId::new("C024BE91L", "1355517523.000005");
        assert_eq!(
            archive_url("acme", &id),
            "https://acme.slack.com/archives/C024BE91L/p1355517523000005"
        );
    }

    #[tokio::test]
    async fn post_message_returns_ts_and_sends_bearer() {
        let (client, seen) = client().await;
        let ts = client
            .post_message(&ChannelId::from("C1"), "hello")
            .await
            .unwrap();
        assert_eq!(ts.as_str(), "1700000000.000200");

        let seen = seen.lock().unwrap();
        let (method, auth, body) = &seen[0];
        assert_eq!(method, "chat.postMessage");
        assert_eq!(auth.as_deref(), Some("Bearer xoxb-test"));
        assert_eq!(body["channel"], "C1");
        assert_eq!(body["text"], "hello");
    }

    #[tokio::test]
    async fn open_im_reads_channel_id() {
        let (client, _) = client().await;
        let im = client.open_im(&UserId::from("U1")).await.unwrap();
        assert_eq!(im.as_str(), "D123");
    }

    #[tokio::test]
    async fn already_reacted_is_success() {
        let (client, seen) = client().await;
        let id = MessageId::new("C1", "1.2");
        client.add_reaction(&id, "wave").await.unwrap();
        client.remove_reaction(&id, "wave").await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].2["timestamp"], "1.2");
        assert_eq!(seen[1].0, "reactions.remove");
    }

    #[tokio::test]
    async fn api_error_surfaces_as_channel_error() {
        let (client, _) = client().await;
        let err = client
            .update_message(&MessageId::new("C1", "1.2"), "x")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ChannelError::Api { ref method, ref error }
                if method == "chat.update" && error == "message_not_found"
        ));
    }
}
