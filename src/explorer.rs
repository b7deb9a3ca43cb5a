// src/explorer.rs
//! Application state store.
//!
//! The explorer owns every component, routes user actions to them and
//! broadcasts an [`ExplorerEvent`] after each state change. Session
//! teardown is observed through the session's event channel and resets
//! every component to the signed-out view.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::admin::{AdminUserRegistry, RemoveUserOutcome, UserEntry};
use crate::backend::{Backend, DatasetUpload, HttpBackend};
use crate::catalog::{Confirm, DatasetCatalog, RemoveOutcome};
use crate::charts::{ChartRenderer, RasterChartRenderer};
use crate::config::Config;
use crate::error::{ClientError, ClientResult};
use crate::export::{ArtifactExporter, DirectorySink, DownloadSink};
use crate::gateway::Gateway;
use crate::models::{Dataset, DatasetId, LoginRequest, RecordFilter, RegisterRequest, User, UserId};
use crate::query::{Completion, FilterQueryEngine, QuerySnapshot};
use crate::session::{AuthSession, FileTokenStore, MemoryTokenStore, SessionEvent, TerminationReason, TokenStore};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum ExplorerEvent {
    SessionStarted(User),
    SessionEnded(TerminationReason),
    DatasetsChanged,
    ViewChanged,
    UsersChanged,
    Failed(String),
}

pub struct Explorer {
    session: Arc<AuthSession>,
    gateway: Arc<Gateway>,
    catalog: DatasetCatalog,
    engine: FilterQueryEngine,
    registry: AdminUserRegistry,
    exporter: ArtifactExporter,
    renderer: Arc<dyn ChartRenderer>,
    session_events: Mutex<broadcast::Receiver<SessionEvent>>,
    events: broadcast::Sender<ExplorerEvent>,
}

impl Explorer {
    pub fn new(
        config: &Config,
        backend: Arc<dyn Backend>,
        session: Arc<AuthSession>,
        sink: Arc<dyn DownloadSink>,
    ) -> Self {
        let gateway = Arc::new(Gateway::new(backend, session.clone(), config.request_timeout()));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            session_events: Mutex::new(session.subscribe()),
            catalog: DatasetCatalog::new(gateway.clone()),
            engine: FilterQueryEngine::new(gateway.clone()),
            registry: AdminUserRegistry::new(gateway.clone()),
            exporter: ArtifactExporter::new(gateway.clone(), sink, config.export.clone()),
            renderer: Arc::new(RasterChartRenderer::default()),
            session,
            gateway,
            events,
        }
    }

    /// HTTP backend, stored session and a directory sink, all from `config`.
    pub fn from_config(config: &Config) -> ClientResult<Self> {
        let store: Box<dyn TokenStore> = if config.session.persist {
            Box::new(FileTokenStore::new(&config.session.store_path))
        } else {
            Box::new(MemoryTokenStore::default())
        };
        let session = Arc::new(AuthSession::restore(store));
        let backend = Arc::new(HttpBackend::new(&config.api, session.clone())?);
        let sink = Arc::new(DirectorySink::new(&config.export.output_dir));

        Ok(Self::new(config, backend, session, sink))
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn ChartRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExplorerEvent> {
        self.events.subscribe()
    }

    // ==================== VIEW STATE ====================

    pub fn current_user(&self) -> Option<User> {
        self.session.current_user()
    }

    pub fn datasets(&self) -> Vec<Dataset> {
        self.catalog.datasets()
    }

    pub fn dataset_labels(&self) -> Vec<String> {
        let show_owner = self
            .current_user()
            .map_or(false, |u| u.role.can_view_all_datasets());
        self.catalog
            .datasets()
            .iter()
            .map(|d| d.display_label(show_owner))
            .collect()
    }

    pub fn query(&self) -> QuerySnapshot {
        self.engine.snapshot()
    }

    pub fn users(&self) -> Vec<UserEntry> {
        self.registry.entries()
    }

    // ==================== SESSION ====================

    pub async fn login(&self, username: &str, password: &str) -> ClientResult<User> {
        let result = self
            .session
            .login(self.gateway.backend(), LoginRequest::new(username, password))
            .await;
        self.finish(result).await
    }

    pub async fn register(&self, username: &str, password: &str, email: Option<String>) -> ClientResult<User> {
        let result = self
            .session
            .register(self.gateway.backend(), RegisterRequest::new(username, password, email))
            .await;
        self.finish(result).await
    }

    pub fn logout(&self) {
        self.session.logout();
        self.sync_session();
    }

    // ==================== DATASETS ====================

    pub async fn refresh_datasets(&self) -> ClientResult<Vec<Dataset>> {
        let result = self.catalog.refresh().await;
        if result.is_ok() {
            self.reconcile_active();
            self.emit(ExplorerEvent::DatasetsChanged);
        }
        self.finish(result).await
    }

    pub async fn upload_dataset(&self, path: &Path) -> ClientResult<Dataset> {
        let result = match DatasetUpload::from_path(path) {
            Ok(upload) => self.catalog.create(upload).await,
            Err(e) => Err(e),
        };
        if result.is_ok() {
            self.emit(ExplorerEvent::DatasetsChanged);
        }
        self.finish(result).await
    }

    pub async fn delete_dataset(&self, id: DatasetId, confirm: &dyn Confirm) -> ClientResult<RemoveOutcome> {
        let had_active = self.engine.active_dataset();
        let result = self.catalog.remove(id, confirm, &self.engine).await;

        if !matches!(result, Ok(RemoveOutcome::Cancelled)) {
            self.emit(ExplorerEvent::DatasetsChanged);
            if had_active != self.engine.active_dataset() {
                self.emit(ExplorerEvent::ViewChanged);
            }
        }
        // The catalog already reconciled itself; only surface the error.
        self.sync_session();
        if let Err(e) = &result {
            self.report(e);
        }
        result
    }

    // ==================== QUERY ====================

    pub async fn select_dataset(&self, id: DatasetId) -> ClientResult<Completion> {
        let result = self.engine.select_dataset(id).await;
        self.after_query(result).await
    }

    pub async fn apply_filter(&self, filter: RecordFilter) -> ClientResult<Completion> {
        let result = self.engine.apply_filter(filter).await;
        self.after_query(result).await
    }

    pub async fn clear_filter(&self) -> ClientResult<Completion> {
        let result = self.engine.clear_filter().await;
        self.after_query(result).await
    }

    async fn after_query(&self, result: ClientResult<Completion>) -> ClientResult<Completion> {
        // A failed selection also changes the view (back to idle).
        if !matches!(result, Ok(Completion::Discarded)) {
            self.emit(ExplorerEvent::ViewChanged);
        }
        self.finish(result).await
    }

    // ==================== EXPORT ====================

    pub async fn export_charts(&self) -> ClientResult<PathBuf> {
        let result = match self.engine.view() {
            Some(view) => self.exporter.export_charts(self.renderer.clone(), &view.summary).await,
            None => Err(ClientError::dataset_not_loaded()),
        };
        self.finish(result).await
    }

    pub async fn download_report(&self, dataset_id: DatasetId) -> ClientResult<PathBuf> {
        let result = self.exporter.request_report(dataset_id).await;
        self.finish(result).await
    }

    pub fn export_records(&self) -> ClientResult<PathBuf> {
        let result = match self.engine.view() {
            Some(view) => self.exporter.export_records(view.dataset_id, &view.records, &view.facets),
            None => Err(ClientError::dataset_not_loaded()),
        };
        if let Err(e) = &result {
            self.report(e);
        }
        result
    }

    // ==================== ADMIN ====================

    pub async fn list_users(&self) -> ClientResult<Vec<UserEntry>> {
        let result = self.registry.list().await.map(|_| self.registry.entries());
        if result.is_ok() {
            self.emit(ExplorerEvent::UsersChanged);
        }
        self.finish(result).await
    }

    pub async fn delete_user(&self, id: UserId, confirm: &dyn Confirm) -> ClientResult<RemoveUserOutcome> {
        let result = self.registry.remove(id, confirm, &self.catalog).await;
        if let Ok(RemoveUserOutcome::Removed) = result {
            self.reconcile_active();
            self.emit(ExplorerEvent::UsersChanged);
            self.emit(ExplorerEvent::DatasetsChanged);
        }
        self.finish(result).await
    }

    // ==================== PLUMBING ====================

    /// Common tail of every action: apply session changes, surface the
    /// error, reconcile the catalog when the server state moved.
    async fn finish<T>(&self, result: ClientResult<T>) -> ClientResult<T> {
        self.sync_session();

        if let Err(e) = &result {
            self.report(e);
            if e.needs_catalog_refresh() && self.session.is_authenticated() {
                match self.catalog.refresh().await {
                    Ok(_) => {
                        self.reconcile_active();
                        self.emit(ExplorerEvent::DatasetsChanged);
                    }
                    Err(refresh_err) => log::warn!("Catalog reconciliation failed: {}", refresh_err),
                }
                self.sync_session();
            }
        }
        result
    }

    fn report(&self, err: &ClientError) {
        if !err.is_auth_expired() {
            self.emit(ExplorerEvent::Failed(err.user_message()));
        }
    }

    /// Clears the view when the active dataset is no longer listed.
    fn reconcile_active(&self) {
        if let Some(active) = self.engine.active_dataset() {
            if !self.catalog.contains(active) && self.engine.dataset_deleted(active) {
                self.emit(ExplorerEvent::ViewChanged);
            }
        }
    }

    /// Drains pending session events and resets on termination.
    pub fn sync_session(&self) {
        let mut receiver = self.session_events.lock();
        loop {
            match receiver.try_recv() {
                Ok(SessionEvent::Started(user)) => self.emit(ExplorerEvent::SessionStarted(user)),
                Ok(SessionEvent::Terminated(reason)) => {
                    self.reset();
                    self.emit(ExplorerEvent::SessionEnded(reason));
                }
                Err(TryRecvError::Lagged(missed)) => {
                    log::warn!("Missed {} session events", missed);
                    if !self.session.is_authenticated() {
                        self.reset();
                        self.emit(ExplorerEvent::SessionEnded(TerminationReason::Unauthorized));
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }

    fn reset(&self) {
        self.catalog.reset();
        self.engine.reset();
        self.registry.reset();
    }

    fn emit(&self, event: ExplorerEvent) {
        let _ = self.events.send(event);
    }
}
