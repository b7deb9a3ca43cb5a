// src/gateway.rs
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;
use uuid::Uuid;

use crate::backend::Backend;
use crate::error::{ClientError, ClientResult};
use crate::session::AuthSession;

/// Single path every authenticated backend call goes through. Applies the
/// per-request timeout and hands authorization failures to the session.
pub struct Gateway {
    backend: Arc<dyn Backend>,
    session: Arc<AuthSession>,
    timeout: Duration,
}

impl Gateway {
    pub fn new(backend: Arc<dyn Backend>, session: Arc<AuthSession>, timeout: Duration) -> Self {
        Self { backend, session, timeout }
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn session(&self) -> &Arc<AuthSession> {
        &self.session
    }

    pub async fn call<T, F>(&self, operation: &'static str, request: F) -> ClientResult<T>
    where
        F: Future<Output = ClientResult<T>>,
    {
        let generation = self.session.generation().ok_or(ClientError::NotAuthenticated)?;

        let request_id = Uuid::new_v4();
        let span = tracing::debug_span!("backend_call", operation, %request_id);

        let result = match tokio::time::timeout(self.timeout, request).instrument(span).await {
            Ok(result) => result,
            Err(_) => {
                log::warn!("{} timed out after {:?} ({})", operation, self.timeout, request_id);
                Err(ClientError::Timeout)
            }
        };

        if let Err(e) = &result {
            log::debug!("{} failed ({}): {}", operation, request_id, e);
        }
        self.session.guard(generation, result)
    }
}
