use bytes::Bytes;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::config::ClonerConfig;
use crate::error::{CloneError, FetchCause, FetchFailure};

/// Retrieves single remote resources.
///
/// One shared client per run. Failures come back as [`FetchFailure`] values;
/// there are no retries.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(config: &ClonerConfig) -> Result<Self, CloneError> {
        let client = Client::builder()
            .timeout(config.fetch_timeout())
            .user_agent(config.user_agent.as_str())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(CloneError::HttpClient)?;

        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Fetch `url`. Anything but a 200 response is a failure.
    pub async fn fetch(&self, url: &str) -> Result<Bytes, FetchFailure> {
        let result = self.try_fetch(url).await;
        match &result {
            Ok(body) => debug!(url, bytes = body.len(), "fetched"),
            Err(failure) => warn!(url, error = %failure.cause, "fetch failed"),
        }
        result
    }

    async fn try_fetch(&self, url: &str) -> Result<Bytes, FetchFailure> {
        let failure = |cause: FetchCause| FetchFailure {
            url: url.to_string(),
            cause,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| failure(e.into()))?;

        if response.status() != StatusCode::OK {
            return Err(failure(FetchCause::Status(response.status())));
        }

        response.bytes().await.map_err(|e| failure(e.into()))
    }
}
