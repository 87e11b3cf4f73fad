//! Vapi REST client.

use std::time::Duration;

use async_trait::async_trait;

use super::base::{TelephonyApi, TelephonyError, TelephonyResult};
use super::messages::{Call, CreateCallRequest};

/// Default Vapi API base URL.
pub const VAPI_DEFAULT_BASE_URL: &str = "https://api.vapi.ai";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the Vapi call API.
#[derive(Debug, Clone)]
pub struct VapiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl VapiClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> TelephonyResult<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(TelephonyError::InvalidConfiguration(
                "Vapi API key is required".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TelephonyError::InvalidConfiguration(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn read_call(
        &self,
        response: reqwest::Response,
        operation: &str,
    ) -> TelephonyResult<Call> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                status = status.as_u16(),
                body = %body,
                "Vapi {} failed",
                operation
            );
            return Err(TelephonyError::Api {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Call>()
            .await
            .map_err(|e| TelephonyError::InvalidResponse(format!("Failed to parse response: {e}")))
    }
}

#[async_trait]
impl TelephonyApi for VapiClient {
    async fn create_call(&self, request: &CreateCallRequest) -> TelephonyResult<Call> {
        let response = self
            .client
            .post(format!("{}/call", self.base_url))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| TelephonyError::Network(e.to_string()))?;

        let call = self.read_call(response, "create call").await?;
        tracing::info!(
            call_id = call.id.as_deref().unwrap_or("<missing>"),
            "Vapi call created"
        );
        Ok(call)
    }

    async fn get_call(&self, call_id: &str) -> TelephonyResult<Call> {
        let response = self
            .client
            .get(format!("{}/call/{}", self.base_url, call_id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| TelephonyError::Network(e.to_string()))?;

        self.read_call(response, "get call").await
    }
}
