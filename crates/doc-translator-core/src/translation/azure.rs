use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use super::traits::{
    OutcomeStatus, ServiceError, StorageKind, TargetOutcome, TranslationHandle,
    TranslationRequest, TranslationService, TranslationServiceInfo,
};
use crate::config::{Lang, TranslatorConfig};
use crate::error::{Error, Result};

const BATCHES_PATH: &str = "translator/text/batch/v1.1/batches";

/// Azure AI Document Translation (asynchronous batch API)
pub struct AzureDocumentTranslator {
    client: Client,
    /// Resource endpoint, without trailing slash
    pub endpoint: String,
    api_key: String,
    /// Sent as `Ocp-Apim-Subscription-Region` when set
    pub region: Option<String>,
    /// Number of submission attempts
    pub retry_count: u32,
    /// Delay between submission attempts in milliseconds
    pub retry_delay_ms: u64,
    /// Delay between status polls
    pub poll_interval: Duration,
    /// Overall wait limit for one operation
    pub poll_timeout: Option<Duration>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchRequest<'a> {
    inputs: Vec<BatchInput<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchInput<'a> {
    source: BatchSource<'a>,
    storage_type: StorageKind,
    targets: Vec<BatchTarget<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchSource<'a> {
    source_url: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchTarget<'a> {
    target_url: &'a str,
    language: &'a str,
}

#[derive(Debug, Deserialize)]
struct OperationStatus {
    status: String,
    #[serde(default)]
    error: Option<ServiceError>,
}

#[derive(Debug, Deserialize)]
struct DocumentsPage {
    #[serde(default)]
    value: Vec<DocumentStatus>,
    #[serde(rename = "@nextLink", default)]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DocumentStatus {
    status: String,
    to: String,
    #[serde(default)]
    error: Option<ServiceError>,
}

fn is_terminal(status: &str) -> bool {
    matches!(status, "Succeeded" | "Failed" | "ValidationFailed" | "Cancelled")
}

impl AzureDocumentTranslator {
    /// Create a client for the given resource.
    ///
    /// # Panics
    /// Panics if the HTTP client cannot be created, which should only happen
    /// in extreme circumstances (e.g., TLS backend unavailable on the system).
    #[allow(clippy::expect_used)]
    pub fn new(endpoint: String, api_key: String, config: &TranslatorConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            region: config.region.clone(),
            retry_count: config.retry_count.max(1),
            retry_delay_ms: config.retry_delay_ms,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            poll_timeout: config.poll_timeout_secs.map(Duration::from_secs),
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header("Ocp-Apim-Subscription-Key", &self.api_key);
        match self.region {
            Some(ref region) => request.header("Ocp-Apim-Subscription-Region", region),
            None => request,
        }
    }

    /// Submit with retry; returns the operation status URL
    async fn submit_with_retry(&self, body: &BatchRequest<'_>) -> Result<String> {
        let url = format!("{}/{BATCHES_PATH}", self.endpoint);
        let mut last_error = None;

        for attempt in 0..self.retry_count {
            debug!(
                "Translation submit attempt {}/{} to {}",
                attempt + 1,
                self.retry_count,
                url
            );

            match self.authorize(self.client.post(&url).json(body)).send().await {
                Ok(response) => {
                    if response.status().is_success() {
                        if let Some(location) = response
                            .headers()
                            .get("operation-location")
                            .and_then(|v| v.to_str().ok())
                        {
                            return Ok(location.to_string());
                        }
                        last_error = Some(Error::TranslationInvalidResponse(
                            "missing Operation-Location header".to_string(),
                        ));
                    } else if response.status().as_u16() == 429 {
                        let retry_after = response
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse().ok());

                        warn!("Rate limited, retry after {:?}s", retry_after);
                        last_error = Some(Error::TranslationRateLimited { retry_after });

                        let wait_time = retry_after.unwrap_or(5) * 1000;
                        tokio::time::sleep(Duration::from_millis(wait_time)).await;
                        continue;
                    } else if response.status().is_client_error() {
                        // Rejected request: retrying will not help
                        let status = response.status();
                        let body = response.text().await.unwrap_or_default();
                        return Err(Error::TranslationRequest(format!("HTTP {status}: {body}")));
                    } else {
                        let status = response.status();
                        let body = response.text().await.unwrap_or_default();
                        warn!("API error: {} - {}", status, body);
                        last_error =
                            Some(Error::TranslationRequest(format!("HTTP {status}: {body}")));
                    }
                }
                Err(e) => {
                    warn!("Request failed: {}", e);
                    if e.is_timeout() {
                        last_error = Some(Error::TranslationTimeout);
                    } else {
                        last_error = Some(Error::TranslationRequest(e.to_string()));
                    }
                }
            }

            if attempt + 1 < self.retry_count {
                tokio::time::sleep(Duration::from_millis(self.retry_delay_ms)).await;
            }
        }

        error!("Translation submit failed after {} attempts", self.retry_count);
        Err(last_error.unwrap_or(Error::TranslationMaxRetriesExceeded))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|e| Error::TranslationRequest(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::TranslationRequest(format!("HTTP {status}: {body}")));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| Error::TranslationInvalidResponse(e.to_string()))
    }

    async fn wait_for_completion(&self, operation: &str) -> Result<OperationStatus> {
        let started = Instant::now();

        loop {
            let status: OperationStatus = self.get_json(operation).await?;
            if is_terminal(&status.status) {
                debug!("Operation finished with status {}", status.status);
                return Ok(status);
            }

            if let Some(limit) = self.poll_timeout
                && started.elapsed() >= limit
            {
                return Err(Error::TranslationTimeout);
            }

            debug!("Operation status {}, polling again", status.status);
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn documents(&self, operation: &str) -> Result<Vec<DocumentStatus>> {
        let mut documents = Vec::new();
        let mut next = Some(format!("{operation}/documents"));

        while let Some(url) = next {
            let page: DocumentsPage = self.get_json(&url).await?;
            documents.extend(page.value);
            next = page.next_link.filter(|link| !link.is_empty());
        }

        Ok(documents)
    }
}

#[async_trait]
impl TranslationService for AzureDocumentTranslator {
    fn info(&self) -> TranslationServiceInfo {
        TranslationServiceInfo {
            name: "Azure Document Translation",
            remote: true,
        }
    }

    async fn submit(&self, request: &TranslationRequest) -> Result<TranslationHandle> {
        let body = BatchRequest {
            inputs: vec![BatchInput {
                source: BatchSource {
                    source_url: &request.source_url,
                },
                storage_type: request.storage_kind,
                targets: request
                    .targets
                    .iter()
                    .map(|t| BatchTarget {
                        target_url: &t.target_url,
                        language: t.language.as_str(),
                    })
                    .collect(),
            }],
        };

        let operation = self.submit_with_retry(&body).await?;
        Ok(TranslationHandle {
            id: operation,
            languages: request.targets.iter().map(|t| t.language.clone()).collect(),
        })
    }

    async fn await_result(&self, handle: &TranslationHandle) -> Result<Vec<TargetOutcome>> {
        let operation = self.wait_for_completion(&handle.id).await?;
        let documents = self.documents(&handle.id).await?;

        if documents.is_empty() {
            // The whole operation was rejected before any document started
            let error = operation.error.unwrap_or_else(|| ServiceError {
                code: operation.status.clone(),
                message: "operation produced no documents".to_string(),
            });
            return Ok(handle
                .languages
                .iter()
                .map(|lang| TargetOutcome::failed(lang.clone(), &error.code, &error.message))
                .collect());
        }

        Ok(documents
            .into_iter()
            .map(|doc| {
                if doc.status == "Succeeded" {
                    TargetOutcome::succeeded(Lang::new(doc.to))
                } else {
                    TargetOutcome {
                        language: Lang::new(doc.to),
                        status: OutcomeStatus::Failed,
                        error: Some(doc.error.unwrap_or(ServiceError {
                            code: doc.status,
                            message: "document did not complete".to_string(),
                        })),
                    }
                }
            })
            .collect())
    }
}
