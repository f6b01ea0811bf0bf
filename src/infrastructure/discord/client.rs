//! Discord REST client.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use reqwest::{Client, StatusCode, header};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::dto::ErrorResponse;
use super::metrics::LatencyMetrics;
use crate::domain::entities::{ChannelId, Message, MessageId, UserId};
use crate::domain::{AuthToken, RestError, User};

const DISCORD_API_BASE: &str = "https://discord.com/api/v10";
const USER_AGENT: &str = concat!(
    "DiscordBot (https://github.com/linuxmobile/oxishard, ",
    env!("CARGO_PKG_VERSION"),
    ")"
);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of users kept by the read-through cache.
pub const DEFAULT_USER_CACHE_SIZE: usize = 256;

/// Stateless request/response calls against the REST API.
///
/// Independent of any shard. Every response is timed into the injected
/// [`LatencyMetrics`].
pub struct DiscordClient {
    client: Client,
    base_url: String,
    token: Arc<AuthToken>,
    metrics: Arc<LatencyMetrics>,
    users: Mutex<LruCache<UserId, User>>,
}

impl DiscordClient {
    /// # Errors
    /// Returns error if HTTP client creation fails.
    pub fn new(token: Arc<AuthToken>, metrics: Arc<LatencyMetrics>) -> Result<Self, RestError> {
        Self::with_base_url(DISCORD_API_BASE, token, metrics)
    }

    /// # Errors
    /// Returns error if HTTP client creation fails.
    pub fn with_base_url(
        base_url: impl Into<String>,
        token: Arc<AuthToken>,
        metrics: Arc<LatencyMetrics>,
    ) -> Result<Self, RestError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RestError::unexpected(format!("failed to create HTTP client: {e}")))?;

        let capacity = NonZeroUsize::new(DEFAULT_USER_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);

        Ok(Self {
            client,
            base_url: base_url.into(),
            token,
            metrics,
            users: Mutex::new(LruCache::new(capacity)),
        })
    }

    #[must_use]
    pub fn metrics(&self) -> &LatencyMetrics {
        &self.metrics
    }

    /// The account the token belongs to.
    ///
    /// # Errors
    /// Returns `RestError` on transport, status or decoding failures.
    pub async fn current_user(&self) -> Result<User, RestError> {
        let user: User = self.get("/users/@me").await?;
        self.users.lock().put(user.id(), user.clone());
        Ok(user)
    }

    /// Looks a user up, serving repeated lookups from the cache.
    ///
    /// # Errors
    /// Returns `RestError` on transport, status or decoding failures.
    pub async fn fetch_user(&self, user_id: UserId) -> Result<User, RestError> {
        if let Some(user) = self.cached_user(user_id) {
            debug!(%user_id, "User cache hit");
            return Ok(user);
        }

        let user: User = self.get(&format!("/users/{user_id}")).await?;
        self.users.lock().put(user_id, user.clone());
        Ok(user)
    }

    /// # Errors
    /// Returns `RestError` on transport, status or decoding failures.
    pub async fn fetch_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<Message, RestError> {
        self.get(&format!("/channels/{channel_id}/messages/{message_id}"))
            .await
    }

    #[must_use]
    pub fn cached_user(&self, user_id: UserId) -> Option<User> {
        self.users.lock().get(&user_id).cloned()
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, RestError> {
        let url = format!("{}{path}", self.base_url);
        let started = Instant::now();

        let response = self
            .client
            .get(&url)
            .header(header::AUTHORIZATION, self.token.authorization_header())
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, path, "Failed to reach Discord API");
                if e.is_timeout() {
                    RestError::network("request timed out")
                } else if e.is_connect() {
                    RestError::network("failed to connect to Discord")
                } else {
                    RestError::network(e.to_string())
                }
            })?;

        let latency = started.elapsed();
        self.metrics.record(latency);

        let status = response.status();
        debug!(
            path,
            %status,
            latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
            "REST call completed"
        );

        if !status.is_success() {
            return Err(Self::handle_error_response(path, status, response).await);
        }

        response.json::<T>().await.map_err(|e| {
            warn!(error = %e, path, "Failed to parse response");
            RestError::decode(e.to_string())
        })
    }

    async fn handle_error_response(
        path: &str,
        status: StatusCode,
        response: reqwest::Response,
    ) -> RestError {
        let body = response.json::<ErrorResponse>().await.ok();
        let message = body
            .as_ref()
            .map_or_else(|| format!("HTTP {status}"), |b| b.message.clone());

        match status {
            StatusCode::UNAUTHORIZED => RestError::unauthorized("invalid or expired token"),
            StatusCode::FORBIDDEN => RestError::unauthorized(format!("access denied: {message}")),
            StatusCode::NOT_FOUND => RestError::NotFound {
                path: path.to_string(),
            },
            StatusCode::TOO_MANY_REQUESTS => RestError::RateLimited {
                retry_after_ms: body.as_ref().map_or(5000, ErrorResponse::retry_after_ms),
            },
            StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
                RestError::network("Discord API is temporarily unavailable")
            }
            _ => RestError::unexpected(format!("unexpected response: {status} - {message}")),
        }
    }
}
