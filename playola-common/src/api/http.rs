//! HTTP implementation of [`RemoteApi`] over reqwest + JSON

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{json, Value};
use tracing::debug;

use super::{ApiError, RemoteApi};
use crate::config::ApiConfig;
use crate::model::{CommercialSupply, User};

const USER_AGENT: &str = concat!("playola-station/", env!("CARGO_PKG_VERSION"));

/// Playola REST client
pub struct HttpRemoteApi {
    http_client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
    supply: Arc<dyn CommercialSupply>,
}

impl HttpRemoteApi {
    pub fn new(
        base_url: impl Into<String>,
        auth_token: Option<String>,
        timeout: Duration,
        supply: Arc<dyn CommercialSupply>,
    ) -> Result<Self, ApiError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token,
            supply,
        })
    }

    pub fn from_config(config: &ApiConfig, supply: Arc<dyn CommercialSupply>) -> Result<Self, ApiError> {
        Self::new(
            config.base_url.clone(),
            config.auth_token.clone(),
            Duration::from_secs(config.request_timeout_secs),
            supply,
        )
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, ApiError> {
        let request = match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status.as_u16(), body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }

    fn decode_user(&self, raw: &Value) -> Result<User, ApiError> {
        User::from_value(raw, self.supply.as_ref()).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

impl RemoteApi for HttpRemoteApi {
    fn get_user(&self, user_id: &str) -> BoxFuture<'_, Result<User, ApiError>> {
        let url = self.endpoint(&format!("/v1/users/{}", user_id));
        Box::pin(async move {
            debug!(url = %url, "Fetching user");
            let raw = self.send(self.http_client.get(&url)).await?;
            self.decode_user(&raw)
        })
    }

    fn move_spin(&self, spin_id: &str, new_position: i64) -> BoxFuture<'_, Result<User, ApiError>> {
        let url = self.endpoint(&format!("/v1/spins/{}/move", spin_id));
        Box::pin(async move {
            debug!(url = %url, new_position, "Moving spin");
            let body = json!({ "newPlaylistPosition": new_position });
            let raw = self.send(self.http_client.put(&url).json(&body)).await?;
            self.decode_user(&raw)
        })
    }

    fn report_listening_session(&self, broadcaster_id: &str) -> BoxFuture<'_, Result<(), ApiError>> {
        let url = self.endpoint("/v1/listeningSessions");
        let body = json!({ "userId": broadcaster_id });
        Box::pin(async move {
            self.send(self.http_client.post(&url).json(&body)).await?;
            Ok(())
        })
    }

    fn report_end_of_listening_session(&self) -> BoxFuture<'_, Result<(), ApiError>> {
        let url = self.endpoint("/v1/listeningSessions/endSession");
        Box::pin(async move {
            self.send(self.http_client.post(&url).json(&json!({}))).await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NoCommercials;

    fn client(base: &str) -> HttpRemoteApi {
        HttpRemoteApi::new(base, None, Duration::from_secs(5), Arc::new(NoCommercials)).unwrap()
    }

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let api = client("https://api.example.com/");
        assert_eq!(api.endpoint("/v1/users/u1"), "https://api.example.com/v1/users/u1");
    }

    #[test]
    fn test_decode_user_maps_malformed_payload() {
        let api = client("https://api.example.com");
        let err = api.decode_user(&json!({ "displayName": "no id" })).unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }
}
