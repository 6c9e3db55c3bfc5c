//! Execute Service - Validates and submits Web API requests
//!
//! Wraps the host [`WebApi`] with request validation, batch chunking and an
//! optional notification on the page channel once a batch completes.

use std::sync::Arc;

use pcf_event_bus::SharedChannel;
use pcf_types::{BatchItem, ExecuteRequest, NotificationPayload, RequestError};

use crate::web_api::{WebApi, WebApiResponse};

/// Component type stamped on batch notifications
pub const EXECUTE_COMPONENT_TYPE: &str = "ExecuteMultiple";

#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    #[error("invalid request: {0}")]
    Invalid(#[from] RequestError),
    #[error(transparent)]
    Host(#[from] anyhow::Error),
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("change set at batch position {index} has {size} requests, limit is {max}")]
    ChangeSetTooLarge { index: usize, size: usize, max: usize },
    #[error("batch aborted after {completed} of {total} requests")]
    BatchAborted {
        completed: usize,
        total: usize,
        #[source]
        source: anyhow::Error,
    },
}

/// Result of an `execute_multiple` call
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    /// One response per request, in submission order
    pub responses: Vec<WebApiResponse>,
    pub submitted: usize,
    /// Number of host calls the batch was split into
    pub chunks: usize,
}

impl BatchOutcome {
    pub fn ok(&self) -> usize {
        self.responses.iter().filter(|r| r.ok).count()
    }

    pub fn failed(&self) -> usize {
        self.responses.len() - self.ok()
    }
}

struct Notifier {
    channel: SharedChannel,
    source_id: String,
}

pub struct ExecuteService {
    web_api: Arc<dyn WebApi>,
    max_batch_size: usize,
    notifier: Option<Notifier>,
}

impl ExecuteService {
    pub fn new(web_api: Arc<dyn WebApi>, max_batch_size: usize) -> Self {
        Self {
            web_api,
            max_batch_size: max_batch_size.max(1),
            notifier: None,
        }
    }

    /// Announce completed batches on `channel` as `source_id`
    pub fn with_notifier(mut self, channel: SharedChannel, source_id: impl Into<String>) -> Self {
        self.notifier = Some(Notifier {
            channel,
            source_id: source_id.into(),
        });
        self
    }

    pub fn web_api(&self) -> &Arc<dyn WebApi> {
        &self.web_api
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Validate and run one request; a non-success response is an error
    pub async fn execute(&self, request: &ExecuteRequest) -> Result<WebApiResponse, ExecuteError> {
        request.validate()?;

        log::debug!(
            "Executing {} on '{}'",
            request.operation_name(),
            request.entity_name
        );
        let response = self.web_api.execute(request).await?;

        if !response.ok {
            let message = response
                .error_message()
                .unwrap_or("Unknown error")
                .to_string();
            log::warn!(
                "{} failed with status {}: {}",
                request.operation_name(),
                response.status,
                message
            );
            return Err(ExecuteError::Rejected {
                status: response.status,
                message,
            });
        }

        Ok(response)
    }

    /// Validate and run a batch, splitting it into host calls of at most
    /// `max_batch_size` requests; a change set is never split
    pub async fn execute_multiple(&self, items: &[BatchItem]) -> Result<BatchOutcome, ExecuteError> {
        BatchItem::validate_batch(items)?;

        let chunks = self.chunk(items)?;
        let total: usize = items.iter().map(BatchItem::request_count).sum();
        let mut responses = Vec::with_capacity(total);

        for chunk in &chunks {
            let expected: usize = chunk.iter().map(BatchItem::request_count).sum();
            let chunk_responses = self.web_api.execute_multiple(chunk).await.map_err(|source| {
                ExecuteError::BatchAborted {
                    completed: responses.len(),
                    total,
                    source,
                }
            })?;

            if chunk_responses.len() != expected {
                return Err(ExecuteError::BatchAborted {
                    completed: responses.len(),
                    total,
                    source: anyhow::anyhow!(
                        "host returned {} responses for {} requests",
                        chunk_responses.len(),
                        expected
                    ),
                });
            }
            responses.extend(chunk_responses);
        }

        let outcome = BatchOutcome {
            responses,
            submitted: total,
            chunks: chunks.len(),
        };
        log::info!(
            "Executed {} requests in {} chunk(s), {} failed",
            outcome.submitted,
            outcome.chunks,
            outcome.failed()
        );
        self.notify(&outcome);

        Ok(outcome)
    }

    fn chunk(&self, items: &[BatchItem]) -> Result<Vec<Vec<BatchItem>>, ExecuteError> {
        let mut chunks: Vec<Vec<BatchItem>> = Vec::new();
        let mut current: Vec<BatchItem> = Vec::new();
        let mut current_size = 0;

        for (index, item) in items.iter().enumerate() {
            let size = item.request_count();
            if size > self.max_batch_size {
                return Err(ExecuteError::ChangeSetTooLarge {
                    index,
                    size,
                    max: self.max_batch_size,
                });
            }
            if current_size + size > self.max_batch_size {
                chunks.push(std::mem::take(&mut current));
                current_size = 0;
            }
            current.push(item.clone());
            current_size += size;
        }
        if !current.is_empty() {
            chunks.push(current);
        }

        Ok(chunks)
    }

    fn notify(&self, outcome: &BatchOutcome) {
        let Some(notifier) = &self.notifier else {
            return;
        };

        let report = notifier.channel.publish(NotificationPayload::new(
            format!(
                "Executed {} requests ({} failed)",
                outcome.submitted,
                outcome.failed()
            ),
            EXECUTE_COMPONENT_TYPE,
            notifier.source_id.clone(),
        ));
        if !report.is_clean() {
            log::warn!(
                "Batch notification reached {} listener(s) with {} failure(s)",
                report.delivered,
                report.failures.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::InMemoryWebApi;
    use pcf_event_bus::PageContext;
    use serde_json::json;
    use std::sync::Mutex;

    fn account(name: &str) -> ExecuteRequest {
        ExecuteRequest::create("account", json!({ "name": name }))
    }

    #[tokio::test]
    async fn test_execute_validates_before_calling_host() {
        let api = Arc::new(InMemoryWebApi::new());
        let service = ExecuteService::new(api.clone(), 10);

        let result = service.execute(&ExecuteRequest::create("", json!({}))).await;
        assert!(matches!(result, Err(ExecuteError::Invalid(_))));
        assert_eq!(api.call_count(), 0);
    }

    #[tokio::test]
    async fn test_execute_maps_failed_response_to_rejected() {
        let api = Arc::new(InMemoryWebApi::new());
        let service = ExecuteService::new(api, 10);

        let missing = ExecuteRequest::delete("account", uuid::Uuid::new_v4());
        match service.execute(&missing).await {
            Err(ExecuteError::Rejected { status, .. }) => assert_eq!(status, 404),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_batch_is_chunked_without_splitting_change_sets() {
        let api = Arc::new(InMemoryWebApi::new());
        let service = ExecuteService::new(api.clone(), 3);

        let items = vec![
            BatchItem::from(account("a")),
            BatchItem::from(account("b")),
            BatchItem::ChangeSet(vec![account("c"), account("d")]),
            BatchItem::from(account("e")),
        ];

        let outcome = service.execute_multiple(&items).await.unwrap();
        assert_eq!(outcome.submitted, 5);
        assert_eq!(outcome.chunks, 2);
        assert_eq!(outcome.ok(), 5);
        assert_eq!(api.records("account").len(), 5);
    }

    #[tokio::test]
    async fn test_oversized_change_set_is_rejected() {
        let api = Arc::new(InMemoryWebApi::new());
        let service = ExecuteService::new(api.clone(), 2);

        let items = vec![BatchItem::ChangeSet(vec![
            account("a"),
            account("b"),
            account("c"),
        ])];
        assert!(matches!(
            service.execute_multiple(&items).await,
            Err(ExecuteError::ChangeSetTooLarge { index: 0, size: 3, max: 2 })
        ));
        assert_eq!(api.call_count(), 0);
    }

    #[tokio::test]
    async fn test_batch_publishes_summary() {
        let page = PageContext::default();
        let channel = page.ensure_channel();
        let messages = Arc::new(Mutex::new(Vec::new()));
        let messages_clone = messages.clone();
        let _sub = channel.subscribe(move |p| {
            messages_clone.lock().unwrap().push(p.message.clone());
            Ok(())
        });

        let api = Arc::new(InMemoryWebApi::new());
        let service = ExecuteService::new(api, 10).with_notifier(channel, "ExecuteMultiplePCF");
        service
            .execute_multiple(&[
                BatchItem::from(account("a")),
                BatchItem::from(ExecuteRequest::delete("account", uuid::Uuid::new_v4())),
            ])
            .await
            .unwrap();

        assert_eq!(
            *messages.lock().unwrap(),
            vec!["Executed 2 requests (1 failed)".to_string()]
        );
    }
}
