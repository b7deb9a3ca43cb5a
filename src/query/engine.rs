// src/query/engine.rs
//! Dataset selection and filtering.
//!
//! [`QueryMachine`] holds the state and decides, synchronously, whether a
//! response still applies. [`FilterQueryEngine`] drives it: it issues a
//! ticket, awaits the backend without holding the lock, then completes the
//! ticket. Overlapping selections are therefore resolved by stamps alone.

use std::sync::Arc;

use parking_lot::Mutex;
use validator::Validate;

use super::stamp::{Slot, StampRegistry, Ticket};
use crate::error::{ClientError, ClientResult};
use crate::gateway::Gateway;
use crate::models::{DatasetId, EquipmentRecord, FilterFacets, RecordFilter, RecordsPage, SummaryStats};

// ==================== STATE ====================

/// Everything shown for the active dataset. Summary, records and facets
/// always belong to `dataset_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedView {
    pub dataset_id: DatasetId,
    pub filter: RecordFilter,
    pub summary: SummaryStats,
    pub records: Vec<EquipmentRecord>,
    pub facets: FilterFacets,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum QueryState {
    #[default]
    Idle,
    Loaded(LoadedView),
}

impl QueryState {
    pub fn active_dataset(&self) -> Option<DatasetId> {
        match self {
            QueryState::Idle => None,
            QueryState::Loaded(view) => Some(view.dataset_id),
        }
    }

    pub fn view(&self) -> Option<&LoadedView> {
        match self {
            QueryState::Idle => None,
            QueryState::Loaded(view) => Some(view),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuerySnapshot {
    pub state: QueryState,
    pub loading: Option<DatasetId>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied,
    /// A newer request for the same slot was issued, or the dataset went away.
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectTicket {
    pub dataset_id: DatasetId,
    summary: Ticket,
    records: Ticket,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterTicket {
    pub dataset_id: DatasetId,
    pub filter: RecordFilter,
    records: Ticket,
}

// ==================== MACHINE ====================

#[derive(Debug, Default)]
pub struct QueryMachine {
    state: QueryState,
    stamps: StampRegistry,
    pending: Option<SelectTicket>,
    last_error: Option<String>,
}

impl QueryMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &QueryState {
        &self.state
    }

    pub fn loading(&self) -> Option<DatasetId> {
        self.pending.map(|t| t.dataset_id)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn snapshot(&self) -> QuerySnapshot {
        QuerySnapshot {
            state: self.state.clone(),
            loading: self.loading(),
            last_error: self.last_error.clone(),
        }
    }

    /// Valid from any state. Every earlier request loses relevance.
    pub fn begin_select(&mut self, dataset_id: DatasetId) -> SelectTicket {
        self.stamps.clear();
        let ticket = SelectTicket {
            dataset_id,
            summary: self.stamps.issue(Slot::Summary(dataset_id)),
            records: self.stamps.issue(Slot::Records(dataset_id)),
        };
        self.pending = Some(ticket);
        self.last_error = None;
        ticket
    }

    pub fn complete_select(
        &mut self,
        ticket: SelectTicket,
        summary: ClientResult<SummaryStats>,
        records: ClientResult<RecordsPage>,
    ) -> ClientResult<Completion> {
        if !self.stamps.is_current(&ticket.summary) || !self.stamps.is_current(&ticket.records) {
            log::debug!(
                "Discarding stale selection of dataset {} ({:?}/{:?})",
                ticket.dataset_id, ticket.summary.stamp, ticket.records.stamp
            );
            return Ok(Completion::Discarded);
        }
        self.pending = None;

        match (summary, records) {
            (Ok(summary), Ok(page)) => {
                let (records, facets) = page.into_parts();
                self.state = QueryState::Loaded(LoadedView {
                    dataset_id: ticket.dataset_id,
                    filter: RecordFilter::default(),
                    summary,
                    records,
                    facets,
                });
                log::info!("Dataset {} loaded", ticket.dataset_id);
                Ok(Completion::Applied)
            }
            (Err(e), _) | (_, Err(e)) => {
                self.state = QueryState::Idle;
                self.fail(e)
            }
        }
    }

    /// Valid only from `Loaded` with no selection in flight.
    pub fn begin_filter(&mut self, filter: RecordFilter) -> ClientResult<FilterTicket> {
        let filter = filter.normalized();
        filter.validate()?;

        if self.pending.is_some() {
            return Err(ClientError::dataset_loading());
        }
        let dataset_id = self.state.active_dataset().ok_or_else(ClientError::dataset_not_loaded)?;

        Ok(FilterTicket {
            dataset_id,
            filter,
            records: self.stamps.issue(Slot::Records(dataset_id)),
        })
    }

    pub fn complete_filter(
        &mut self,
        ticket: FilterTicket,
        records: ClientResult<RecordsPage>,
    ) -> ClientResult<Completion> {
        let current = self.stamps.is_current(&ticket.records);
        let view = match &mut self.state {
            QueryState::Loaded(view) if current && view.dataset_id == ticket.dataset_id => view,
            _ => {
                log::debug!(
                    "Discarding stale records for dataset {} ({:?})",
                    ticket.dataset_id, ticket.records.stamp
                );
                return Ok(Completion::Discarded);
            }
        };

        match records {
            Ok(page) => {
                let (records, facets) = page.into_parts();
                view.records = records;
                view.facets = facets;
                view.filter = ticket.filter;
                self.last_error = None;
                Ok(Completion::Applied)
            }
            Err(e) => self.fail(e),
        }
    }

    /// Returns true when the active dataset was cleared.
    pub fn dataset_deleted(&mut self, dataset_id: DatasetId) -> bool {
        self.stamps.retire(dataset_id);
        if self.loading() == Some(dataset_id) {
            self.pending = None;
        }

        if self.state.active_dataset() == Some(dataset_id) {
            log::info!("Active dataset {} removed", dataset_id);
            self.state = QueryState::Idle;
            true
        } else {
            false
        }
    }

    /// Back to idle. The stamp counter keeps running, so responses still in
    /// flight from before the reset never match a later ticket.
    pub fn reset(&mut self) {
        self.stamps.clear();
        self.state = QueryState::Idle;
        self.pending = None;
        self.last_error = None;
    }

    fn fail(&mut self, err: ClientError) -> ClientResult<Completion> {
        self.last_error = Some(err.user_message());
        Err(err)
    }
}

// ==================== ENGINE ====================

pub struct FilterQueryEngine {
    gateway: Arc<Gateway>,
    machine: Mutex<QueryMachine>,
}

impl FilterQueryEngine {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            machine: Mutex::new(QueryMachine::new()),
        }
    }

    pub fn snapshot(&self) -> QuerySnapshot {
        self.machine.lock().snapshot()
    }

    pub fn active_dataset(&self) -> Option<DatasetId> {
        self.machine.lock().state().active_dataset()
    }

    pub fn view(&self) -> Option<LoadedView> {
        self.machine.lock().state().view().cloned()
    }

    pub async fn select_dataset(&self, dataset_id: DatasetId) -> ClientResult<Completion> {
        let ticket = self.machine.lock().begin_select(dataset_id);
        let backend = self.gateway.backend();
        let unconstrained = RecordFilter::default();

        let (summary, records) = futures::join!(
            self.gateway.call("get_summary", backend.get_summary(dataset_id)),
            self.gateway.call("get_records", backend.get_records(dataset_id, &unconstrained)),
        );

        self.machine.lock().complete_select(ticket, summary, records)
    }

    pub async fn apply_filter(&self, filter: RecordFilter) -> ClientResult<Completion> {
        let ticket = self.machine.lock().begin_filter(filter)?;
        let records = self
            .gateway
            .call(
                "get_records",
                self.gateway.backend().get_records(ticket.dataset_id, &ticket.filter),
            )
            .await;

        self.machine.lock().complete_filter(ticket, records)
    }

    pub async fn clear_filter(&self) -> ClientResult<Completion> {
        self.apply_filter(RecordFilter::default()).await
    }

    pub fn dataset_deleted(&self, dataset_id: DatasetId) -> bool {
        self.machine.lock().dataset_deleted(dataset_id)
    }

    pub fn reset(&self) {
        self.machine.lock().reset();
    }
}
