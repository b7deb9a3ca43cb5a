// src/catalog.rs
use std::sync::Arc;

use parking_lot::RwLock;

use crate::backend::DatasetUpload;
use crate::error::{ClientError, ClientResult};
use crate::gateway::Gateway;
use crate::models::{Dataset, DatasetId};
use crate::query::FilterQueryEngine;

/// Destructive-action guard. Returns true to proceed.
pub trait Confirm: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    Cancelled,
}

#[derive(Default)]
struct CatalogState {
    datasets: Vec<Dataset>,
    issued: u64,
    applied: u64,
}

/// Datasets visible to the current user: their own, or every dataset for
/// an administrator.
pub struct DatasetCatalog {
    gateway: Arc<Gateway>,
    state: RwLock<CatalogState>,
}

impl DatasetCatalog {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            state: RwLock::new(CatalogState::default()),
        }
    }

    pub fn datasets(&self) -> Vec<Dataset> {
        self.state.read().datasets.clone()
    }

    pub fn contains(&self, id: DatasetId) -> bool {
        self.state.read().datasets.iter().any(|d| d.id == id)
    }

    /// Keeps the previous list on failure. An older response never
    /// replaces a newer one.
    pub async fn refresh(&self) -> ClientResult<Vec<Dataset>> {
        let seq = {
            let mut state = self.state.write();
            state.issued += 1;
            state.issued
        };

        let datasets = self
            .gateway
            .call("list_datasets", self.gateway.backend().list_datasets())
            .await?;

        let mut state = self.state.write();
        if seq > state.applied {
            state.applied = seq;
            state.datasets = datasets;
        } else {
            log::debug!("Discarding dataset list #{} (already at #{})", seq, state.applied);
        }
        Ok(state.datasets.clone())
    }

    pub async fn create(&self, upload: DatasetUpload) -> ClientResult<Dataset> {
        if !upload.is_csv() {
            return Err(ClientError::validation("Only CSV files are supported"));
        }
        if upload.bytes.is_empty() {
            return Err(ClientError::validation("The selected file is empty"));
        }

        let dataset = self
            .gateway
            .call("create_dataset", self.gateway.backend().create_dataset(&upload))
            .await?;
        log::info!("Uploaded {} as dataset {}", upload.file_name, dataset.id);

        if let Err(e) = self.refresh().await {
            log::warn!("Dataset list not refreshed after upload: {}", e);
        }
        Ok(dataset)
    }

    /// Deletes after confirmation. The list is refreshed afterwards whether
    /// or not the delete succeeded.
    pub async fn remove(
        &self,
        id: DatasetId,
        confirm: &dyn Confirm,
        engine: &FilterQueryEngine,
    ) -> ClientResult<RemoveOutcome> {
        if !confirm.confirm(&format!("Delete dataset #{}? This cannot be undone.", id)) {
            return Ok(RemoveOutcome::Cancelled);
        }

        let result = self
            .gateway
            .call("delete_dataset", self.gateway.backend().delete_dataset(id))
            .await;

        match &result {
            Ok(()) => log::info!("Dataset {} deleted", id),
            Err(e) if e.needs_catalog_refresh() => log::warn!("Dataset {} was already gone: {}", id, e),
            Err(_) => {}
        }

        // Already removed on the server counts as removed for the active view.
        if result.is_ok() || result.as_ref().is_err_and(|e| e.needs_catalog_refresh()) {
            engine.dataset_deleted(id);
        }

        if !result.as_ref().is_err_and(|e| e.is_auth_expired()) {
            if let Err(e) = self.refresh().await {
                log::warn!("Dataset list not refreshed after delete: {}", e);
            }
        }

        result.map(|()| RemoveOutcome::Removed)
    }

    pub fn reset(&self) {
        let mut state = self.state.write();
        state.datasets.clear();
        state.applied = state.issued;
    }
}
