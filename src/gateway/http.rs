//! JSON-over-HTTP gateway.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{GatewayError, ServerGateway};
use crate::config::EngineConfig;
use crate::domain::{
    Habit, HabitEdit, HabitId, NewHabit, OwnerId, ReminderUpdate, ToggleCompletion,
    ToggleResponse, UpsertUser, User,
};

const HABITS_PATH: &str = "api/habits";
const REMINDER_PATH: &str = "api/habits/reminder";
const USER_PATH: &str = "api/user";

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Deserialize)]
struct DeleteBody {
    success: bool,
}

/// [`ServerGateway`] talking to the habit API over HTTP.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use habit_sync::gateway::HttpGateway;
///
/// let gateway = HttpGateway::new("http://localhost:3000", Duration::from_secs(10)).unwrap();
/// assert_eq!(gateway.base_url().as_str(), "http://localhost:3000/");
/// ```
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: Url,
}

impl HttpGateway {
    /// Creates a gateway for the API rooted at `base_url`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Scheme, host and optional path prefix of the API
    /// * `timeout` - Per-request timeout
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Network`] if the URL is invalid or the client
    /// cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let mut base_url = Url::parse(base_url).map_err(network)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("habit-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(network)?;
        Ok(Self { client, base_url })
    }

    /// Creates a gateway from the engine configuration.
    ///
    /// # Errors
    ///
    /// See [`HttpGateway::new`].
    pub fn from_config(config: &EngineConfig) -> Result<Self, GatewayError> {
        Self::new(&config.api_base_url, config.request_timeout)
    }

    /// The normalized API root.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url, GatewayError> {
        self.base_url.join(path).map_err(network)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GatewayError> {
        let response = request.send().await.map_err(network)?;
        let status = response.status();
        let body = response.text().await.map_err(network)?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&body).map_or_else(
                |_| {
                    let trimmed = body.trim();
                    if trimmed.is_empty() {
                        status.canonical_reason().unwrap_or("unknown error").to_string()
                    } else {
                        trimmed.to_string()
                    }
                },
                |error_body| error_body.error,
            );
            debug!(status = status.as_u16(), %message, "request rejected");
            return Err(GatewayError::server(status.as_u16(), message));
        }

        serde_json::from_str(&body).map_err(|error| GatewayError::Decode {
            message: error.to_string(),
        })
    }

    async fn send_habit(&self, request: RequestBuilder) -> Result<Habit, GatewayError> {
        self.send::<Option<Habit>>(request)
            .await?
            .ok_or_else(|| GatewayError::Decode {
                message: "response carried no habit".to_string(),
            })
    }
}

fn network(error: impl std::fmt::Display) -> GatewayError {
    GatewayError::Network {
        message: error.to_string(),
    }
}

#[async_trait]
impl ServerGateway for HttpGateway {
    async fn list_habits(&self, owner: OwnerId) -> Result<Vec<Habit>, GatewayError> {
        let request = self
            .client
            .get(self.url(HABITS_PATH)?)
            .query(&[("telegram_id", owner.value())]);
        self.send(request).await
    }

    async fn create_habit(&self, draft: &NewHabit) -> Result<Habit, GatewayError> {
        let request = self.client.post(self.url(HABITS_PATH)?).json(draft);
        self.send_habit(request).await
    }

    async fn toggle_completion(
        &self,
        request: &ToggleCompletion,
    ) -> Result<ToggleResponse, GatewayError> {
        let request = self.client.patch(self.url(HABITS_PATH)?).json(request);
        self.send(request).await
    }

    async fn edit_habit(&self, edit: &HabitEdit) -> Result<Habit, GatewayError> {
        let request = self.client.put(self.url(HABITS_PATH)?).json(edit);
        self.send_habit(request).await
    }

    async fn update_reminder(&self, update: &ReminderUpdate) -> Result<Habit, GatewayError> {
        let request = self.client.patch(self.url(REMINDER_PATH)?).json(update);
        self.send_habit(request).await
    }

    async fn delete_habit(&self, habit_id: &HabitId) -> Result<(), GatewayError> {
        let request = self
            .client
            .delete(self.url(HABITS_PATH)?)
            .query(&[("habit_id", habit_id.as_str())]);
        let body: DeleteBody = self.send(request).await?;
        if body.success {
            Ok(())
        } else {
            Err(GatewayError::server(200, "delete was not acknowledged"))
        }
    }

    async fn upsert_user(&self, request: &UpsertUser) -> Result<User, GatewayError> {
        let request = self.client.post(self.url(USER_PATH)?).json(request);
        self.send::<Option<User>>(request)
            .await?
            .ok_or_else(|| GatewayError::Decode {
                message: "response carried no user".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("http://localhost:3000", "http://localhost:3000/api/habits")]
    #[case("http://localhost:3000/", "http://localhost:3000/api/habits")]
    #[case("https://example.com/app", "https://example.com/app/api/habits")]
    fn routes_are_resolved_under_the_base_url(#[case] base: &str, #[case] expected: &str) {
        let gateway = HttpGateway::new(base, Duration::from_secs(1)).unwrap();

        assert_eq!(gateway.url(HABITS_PATH).unwrap().as_str(), expected);
    }

    #[rstest]
    fn invalid_base_urls_are_rejected() {
        let result = HttpGateway::new("not a url", Duration::from_secs(1));

        assert!(matches!(result, Err(GatewayError::Network { .. })));
    }
}
