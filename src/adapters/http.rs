//! HTTP client for the remote execution gateway.
//!
//! Endpoint: POST {endpoint}/tasks
//! Auth: optional Bearer token
//!
//! The request blocks until the executor reports a result. The task's
//! timeout travels inside the descriptor; this client does not enforce it.

use async_trait::async_trait;
use tracing::debug;

use crate::domain::{TaskDescriptor, TaskResponse};

use super::{GatewayError, TaskGateway};

pub struct HttpTaskGateway {
    endpoint: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpTaskGateway {
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token,
            client: reqwest::Client::new(),
        }
    }

    fn tasks_url(&self) -> String {
        format!("{}/tasks", self.endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl TaskGateway for HttpTaskGateway {
    fn name(&self) -> &str {
        "http"
    }

    async fn submit(&self, task: &TaskDescriptor) -> Result<TaskResponse, GatewayError> {
        let url = self.tasks_url();
        debug!(%url, idempotency_key = %task.idempotency_key, "Submitting task");

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Idempotency-Key", &task.idempotency_key)
            .json(task);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout(task.timeout())
            } else {
                GatewayError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<TaskResponse>()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }
}
