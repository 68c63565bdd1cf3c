use std::time::Duration;

use reqwest::{Client, Method, StatusCode, header::AUTHORIZATION};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::{
    common::{
        errors::RestError,
        http::HttpClient,
        types::{ChannelId, GuildId, UserId},
    },
    configs::DiscordConfig,
};

/// Longest rate-limit wait honored before giving up on a request.
const MAX_RETRY_AFTER_SECS: f64 = 30.0;

/// The parts of a guild member object the bot uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildMember {
    pub user_id: UserId,
    pub username: String,
    pub nick: Option<String>,
}

impl GuildMember {
    /// The guild nickname, or the username when none is set.
    pub fn display_name(&self) -> &str {
        self.nick.as_deref().unwrap_or(&self.username)
    }

    fn from_json(v: &Value) -> Option<Self> {
        Some(Self {
            user_id: UserId::from_json(&v["user"]["id"])?,
            username: v["user"]["username"].as_str().unwrap_or_default().to_string(),
            nick: v["nick"].as_str().map(str::to_string),
        })
    }
}

/// Thin client for the Discord HTTP API calls the bot makes.
pub struct DiscordRest {
    client: Client,
    base_url: String,
    token: String,
}

impl DiscordRest {
    pub fn new(config: &DiscordConfig) -> Result<Self, RestError> {
        Ok(Self {
            client: HttpClient::new()?,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    pub async fn create_message(&self, channel_id: ChannelId, content: &str) -> Result<(), RestError> {
        let path = format!("/channels/{}/messages", channel_id);
        let body = json!({ "content": content, "allowed_mentions": { "parse": [] } });
        let resp = self.request(Method::POST, &path, Some(&body)).await?;
        Self::check(resp).await.map(|_| ())
    }

    /// `Ok(None)` when Discord answers 404: the user is not in the guild.
    pub async fn get_member(
        &self,
        guild_id: GuildId,
        user_id: UserId,
    ) -> Result<Option<GuildMember>, RestError> {
        let path = format!("/guilds/{}/members/{}", guild_id, user_id);
        let resp = self.request(Method::GET, &path, None).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: Value = Self::check(resp).await?.json().await?;
        Ok(GuildMember::from_json(&body))
    }

    /// Sends a request, retrying once when Discord rate-limits it.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Response, RestError> {
        let url = format!("{}{}", self.base_url, path);
        let mut is_retry = false;

        loop {
            let mut req = self
                .client
                .request(method.clone(), &url)
                .header(AUTHORIZATION, format!("Bot {}", self.token));
            if let Some(body) = body {
                req = req.json(body);
            }

            let resp = req.send().await?;
            if resp.status() != StatusCode::TOO_MANY_REQUESTS {
                return Ok(resp);
            }

            let retry_after = retry_after(resp).await;
            if is_retry || retry_after > MAX_RETRY_AFTER_SECS {
                warn!("{} {} rate limited for {:.2}s; giving up", method, path, retry_after);
                return Err(RestError::RateLimited { retry_after });
            }
            debug!("{} {} rate limited; retrying in {:.2}s", method, path, retry_after);
            tokio::time::sleep(Duration::from_secs_f64(retry_after)).await;
            is_retry = true;
        }
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, RestError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(RestError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

/// Seconds to wait, from the JSON body or the `Retry-After` header.
async fn retry_after(resp: reqwest::Response) -> f64 {
    let header = resp
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<f64>().ok());
    let body = resp
        .json::<Value>()
        .await
        .ok()
        .and_then(|v| v["retry_after"].as_f64());
    body.or(header).unwrap_or(1.0).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        extract::{Path, State},
        http::{HeaderMap, StatusCode as AxumStatus},
        routing::{get, post},
    };
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    #[derive(Clone, Default)]
    struct Fake {
        posts: Arc<AtomicUsize>,
        limited: usize,
    }

    async fn create_message(
        State(fake): State<Fake>,
        Path(channel): Path<u64>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (AxumStatus, Json<Value>) {
        let n = fake.posts.fetch_add(1, Ordering::SeqCst);
        assert_eq!(headers["authorization"], "Bot secret");
        if n < fake.limited {
            return (
                AxumStatus::TOO_MANY_REQUESTS,
                Json(json!({"message": "You are being rate limited.", "retry_after": 0.01, "global": false})),
            );
        }
        (
            AxumStatus::OK,
            Json(json!({"id": "1", "channel_id": channel.to_string(), "content": body["content"]})),
        )
    }

    async fn get_member(Path((_guild, user)): Path<(u64, u64)>) -> (AxumStatus, Json<Value>) {
        if user == 7 {
            (
                AxumStatus::OK,
                Json(json!({"user": {"id": "7", "username": "gabo"}, "nick": null})),
            )
        } else {
            (AxumStatus::NOT_FOUND, Json(json!({"message": "Unknown Member", "code": 10007})))
        }
    }

    async fn serve(fake: Fake) -> DiscordRest {
        let app = Router::new()
            .route("/channels/{id}/messages", post(create_message))
            .route("/guilds/{guild}/members/{user}", get(get_member))
            .with_state(fake);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        DiscordRest::new(&DiscordConfig {
            token: "secret".into(),
            api_url: format!("http://{}/", addr),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn create_message_retries_once_after_rate_limit() {
        let fake = Fake {
            limited: 1,
            ..Default::default()
        };
        let rest = serve(fake.clone()).await;
        rest.create_message(ChannelId(20), "hello").await.unwrap();
        assert_eq!(fake.posts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn second_rate_limit_is_an_error() {
        let fake = Fake {
            limited: 5,
            ..Default::default()
        };
        let rest = serve(fake.clone()).await;
        let err = rest.create_message(ChannelId(20), "hello").await.unwrap_err();
        assert!(matches!(err, RestError::RateLimited { .. }));
        assert_eq!(fake.posts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_member_is_none() {
        let rest = serve(Fake::default()).await;
        let found = rest.get_member(GuildId(10), UserId(7)).await.unwrap();
        assert_eq!(
            found,
            Some(GuildMember {
                user_id: UserId(7),
                username: "gabo".into(),
                nick: None
            })
        );
        assert_eq!(rest.get_member(GuildId(10), UserId(8)).await.unwrap(), None);
    }

    #[test]
    fn member_display_name_prefers_the_nickname() {
        let member = GuildMember::from_json(&json!({"user": {"id": "7", "username": "gabo"}, "nick": "Gabo"}))
            .unwrap();
        assert_eq!(member.display_name(), "Gabo");

        let member = GuildMember::from_json(&json!({"user": {"id": "7", "username": "gabo"}})).unwrap();
        assert_eq!(member.display_name(), "gabo");
    }
}
