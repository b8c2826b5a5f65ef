use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::WalletError;

/// JSON-over-HTTP plumbing shared by every remote service.
#[derive(Clone)]
pub struct ServiceClient {
    base_url: String,
    http: reqwest::Client,
}

impl ServiceClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, method: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            method.trim_start_matches('/')
        )
    }

    /// POST a JSON body and decode the JSON reply
    pub async fn post<B, R>(&self, method: &str, body: &B) -> Result<R, WalletError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.url(method);
        log::debug!("POST {}", url);

        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| WalletError::transport(e.to_string()))?;

        Self::decode(method, response).await
    }

    /// GET with query parameters and decode the JSON reply
    pub async fn get<R>(&self, method: &str, query: &[(&str, String)]) -> Result<R, WalletError>
    where
        R: DeserializeOwned,
    {
        let url = self.url(method);
        log::debug!("GET {} {:?}", url, query);

        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| WalletError::transport(e.to_string()))?;

        Self::decode(method, response).await
    }

    async fn decode<R: DeserializeOwned>(
        method: &str,
        response: reqwest::Response,
    ) -> Result<R, WalletError> {
        let status = response.status();
        if status != StatusCode::OK {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            log::warn!("{} returned status {}: {}", method, status, error_text);
            return Err(WalletError::Service {
                status_code: Some(status.as_u16()),
                message: format!("{} returned status code {}: {}", method, status, error_text),
            });
        }

        response.json::<R>().await.map_err(|e| WalletError::Service {
            status_code: Some(status.as_u16()),
            message: format!("{}: invalid response body: {}", method, e),
        })
    }
}
