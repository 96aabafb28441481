use std::time::Duration;

use relay_core::{Scope, StatusNotice};
use relay_logging::relay_debug;
use serde::de::DeserializeOwned;

use crate::{FailureKind, QueryError, RelaySettings};

/// Pull side of document status tracking.
#[async_trait::async_trait]
pub trait StatusSource: Send + Sync {
    /// Documents of the scope's workspace that have not reached a terminal status.
    async fn pending(&self, scope: &Scope) -> Result<Vec<StatusNotice>, QueryError>;

    async fn document_status(&self, document_id: &str) -> Result<StatusNotice, QueryError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestStatusSource {
    base_url: String,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl ReqwestStatusSource {
    pub fn new(settings: &RelaySettings) -> Self {
        Self {
            base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            connect_timeout: settings.connect_timeout(),
            request_timeout: settings.request_timeout(),
        }
    }

    fn build_client(&self) -> Result<reqwest::Client, QueryError> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .build()
            .map_err(|err| QueryError::new(FailureKind::Network, err.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, QueryError> {
        let url = format!("{}{}", self.base_url, path);
        let parsed = reqwest::Url::parse(&url)
            .map_err(|err| QueryError::new(FailureKind::InvalidUrl, err.to_string()))?;
        let client = self.build_client()?;

        relay_debug!("GET {}", parsed);
        let response = client.get(parsed).send().await.map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(QueryError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        let body = response.bytes().await.map_err(map_reqwest_error)?;
        serde_json::from_slice(&body)
            .map_err(|err| QueryError::new(FailureKind::Decode, err.to_string()))
    }
}

#[async_trait::async_trait]
impl StatusSource for ReqwestStatusSource {
    async fn pending(&self, scope: &Scope) -> Result<Vec<StatusNotice>, QueryError> {
        let path = format!("/workspaces/{}/documents/pending", scope.workspace_id);
        let documents: Vec<StatusNotice> = self.get_json(&path).await?;
        Ok(documents
            .into_iter()
            .filter(|notice| !notice.status.is_terminal())
            .collect())
    }

    async fn document_status(&self, document_id: &str) -> Result<StatusNotice, QueryError> {
        self.get_json(&format!("/documents/{document_id}/status")).await
    }
}

fn map_reqwest_error(err: reqwest::Error) -> QueryError {
    if err.is_timeout() {
        return QueryError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_decode() {
        return QueryError::new(FailureKind::Decode, err.to_string());
    }
    QueryError::new(FailureKind::Network, err.to_string())
}
