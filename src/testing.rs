// src/testing.rs
//! In-memory backend for unit tests.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::backend::{Backend, DatasetUpload, ReportPayload};
use crate::error::{ClientError, ClientResult};
use crate::gateway::Gateway;
use crate::models::*;
use crate::session::{AuthSession, Credential};

#[derive(Default)]
pub struct FakeBackend {
    datasets: Mutex<Vec<Dataset>>,
    records: Mutex<HashMap<DatasetId, Vec<EquipmentRecord>>>,
    users: Mutex<Vec<User>>,
    reports: Mutex<HashMap<DatasetId, ReportPayload>>,
    failures: Mutex<HashMap<&'static str, ClientError>>,
    gates: Mutex<HashMap<DatasetId, Arc<Semaphore>>>,
    users_gate: Mutex<Option<Arc<Semaphore>>>,
    calls: Mutex<Vec<String>>,
    next_id: Mutex<i64>,
}

impl FakeBackend {
    pub fn shared() -> Arc<FakeBackend> {
        Arc::new(FakeBackend { next_id: Mutex::new(100), ..Default::default() })
    }

    pub fn add_dataset(&self, id: DatasetId, owner_id: UserId, records: Vec<EquipmentRecord>) {
        self.datasets.lock().push(Dataset {
            id,
            file: Some(format!("uploads/dataset_{}.csv", id)),
            uploaded_at: None,
            owner: Some(DatasetOwner { id: owner_id, username: format!("user{}", owner_id), email: None }),
        });
        self.records.lock().insert(id, records);
    }

    pub fn add_user(&self, user: User) {
        self.users.lock().push(user);
    }

    pub fn set_report(&self, id: DatasetId, payload: ReportPayload) {
        self.reports.lock().insert(id, payload);
    }

    /// The next call of `operation` fails with `err`.
    pub fn fail_next(&self, operation: &'static str, err: ClientError) {
        self.failures.lock().insert(operation, err);
    }

    /// Summary and records fetches for `id` block until permits are added.
    pub fn hold(&self, id: DatasetId) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.gates.lock().insert(id, gate.clone());
        gate
    }

    /// `list_users` blocks until permits are added.
    pub fn hold_users(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.users_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn dataset_ids(&self) -> Vec<DatasetId> {
        self.datasets.lock().iter().map(|d| d.id).collect()
    }

    fn enter(&self, operation: &'static str) -> ClientResult<()> {
        self.calls.lock().push(operation.to_string());
        match self.failures.lock().remove(operation) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn wait_gate(&self, id: DatasetId) {
        let gate = self.gates.lock().get(&id).cloned();
        pass(gate).await;
    }

    fn records_of(&self, id: DatasetId) -> ClientResult<Vec<EquipmentRecord>> {
        self.records
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| ClientError::ConcurrentModification("Not found.".into()))
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn login(&self, request: &LoginRequest) -> ClientResult<User> {
        self.enter("login")?;
        self.users
            .lock()
            .iter()
            .find(|u| u.username == request.username)
            .cloned()
            .ok_or(ClientError::AuthExpired)
    }

    async fn register(&self, request: &RegisterRequest) -> ClientResult<User> {
        self.enter("register")?;
        let mut users = self.users.lock();
        if users.iter().any(|u| u.username == request.username) {
            return Err(ClientError::validation("Username already exists"));
        }
        let user = User {
            id: users.len() as i64 + 1,
            username: request.username.clone(),
            email: request.email.clone(),
            role: UserRole::Member,
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn list_datasets(&self) -> ClientResult<Vec<Dataset>> {
        self.enter("list_datasets")?;
        Ok(self.datasets.lock().clone())
    }

    async fn create_dataset(&self, _upload: &DatasetUpload) -> ClientResult<Dataset> {
        self.enter("create_dataset")?;
        let id = {
            let mut next = self.next_id.lock();
            *next += 1;
            *next
        };
        self.add_dataset(id, 1, vec![record("pump", 1.0)]);
        self.datasets
            .lock()
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| ClientError::validation("upload failed"))
    }

    async fn delete_dataset(&self, id: DatasetId) -> ClientResult<()> {
        self.enter("delete_dataset")?;
        let mut datasets = self.datasets.lock();
        let before = datasets.len();
        datasets.retain(|d| d.id != id);
        self.records.lock().remove(&id);
        if datasets.len() == before {
            return Err(ClientError::ConcurrentModification("Not found.".into()));
        }
        Ok(())
    }

    async fn get_summary(&self, id: DatasetId) -> ClientResult<SummaryStats> {
        self.enter("get_summary")?;
        self.wait_gate(id).await;
        let records = self.records_of(id)?;
        Ok(summarize(&records))
    }

    async fn get_records(&self, id: DatasetId, filter: &RecordFilter) -> ClientResult<RecordsPage> {
        self.enter("get_records")?;
        self.wait_gate(id).await;
        let matching: Vec<_> = self
            .records_of(id)?
            .into_iter()
            .filter(|r| filter.matches(r))
            .collect();
        Ok(page_of(matching))
    }

    async fn get_report(&self, id: DatasetId) -> ClientResult<ReportPayload> {
        self.enter("get_report")?;
        self.reports
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| ClientError::ConcurrentModification("Not found.".into()))
    }

    async fn list_users(&self) -> ClientResult<Vec<User>> {
        self.enter("list_users")?;
        let gate = self.users_gate.lock().clone();
        pass(gate).await;
        Ok(self.users.lock().clone())
    }

    async fn delete_user(&self, id: UserId) -> ClientResult<()> {
        self.enter("delete_user")?;
        self.users.lock().retain(|u| u.id != id);
        let removed: Vec<DatasetId> = self
            .datasets
            .lock()
            .iter()
            .filter(|d| d.owner_id() == Some(id))
            .map(|d| d.id)
            .collect();
        self.datasets.lock().retain(|d| !removed.contains(&d.id));
        Ok(())
    }
}

async fn pass(gate: Option<Arc<Semaphore>>) {
    if let Some(gate) = gate {
        if let Ok(permit) = gate.acquire().await {
            permit.forget();
        }
    }
}

pub fn summarize(records: &[EquipmentRecord]) -> SummaryStats {
    let n = records.len().max(1) as f64;
    let mut distribution = BTreeMap::new();
    for r in records {
        *distribution.entry(r.equipment_type.clone()).or_insert(0) += 1;
    }
    SummaryStats {
        total_equipment: records.len() as i64,
        average_flowrate: records.iter().map(|r| r.flowrate).sum::<f64>() / n,
        average_pressure: records.iter().map(|r| r.pressure).sum::<f64>() / n,
        average_temperature: records.iter().map(|r| r.temperature).sum::<f64>() / n,
        type_distribution: distribution,
    }
}

pub fn page_of(records: Vec<EquipmentRecord>) -> RecordsPage {
    let range = |f: fn(&EquipmentRecord) -> f64| {
        let values: Vec<f64> = records.iter().map(f).collect();
        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        (!values.is_empty()).then_some(NumericRange { min, max })
    };
    let types: BTreeSet<String> = records.iter().map(|r| r.equipment_type.clone()).collect();

    RecordsPage {
        pressure_range: range(|r| r.pressure),
        temperature_range: range(|r| r.temperature),
        available_types: types.into_iter().collect(),
        name_supported: records.iter().any(|r| r.name.is_some()),
        total: Some(records.len() as i64),
        records,
    }
}

pub fn record(equipment_type: &str, pressure: f64) -> EquipmentRecord {
    EquipmentRecord {
        name: Some(format!("{}-{}", equipment_type, pressure)),
        equipment_type: equipment_type.to_string(),
        flowrate: 100.0 + pressure,
        pressure,
        temperature: 80.0,
    }
}

/// Six pumps (four below 2.0 pressure) and four valves.
pub fn ten_records() -> Vec<EquipmentRecord> {
    let mut records: Vec<_> = [0.5, 1.0, 1.5, 1.8, 2.5, 3.0]
        .iter()
        .map(|p| record("pump", *p))
        .collect();
    records.extend([1.0, 2.0, 3.0, 4.0].iter().map(|p| record("valve", *p)));
    records
}

pub fn member(id: UserId, username: &str) -> User {
    User { id, username: username.into(), email: None, role: UserRole::Member }
}

pub fn admin(id: UserId, username: &str) -> User {
    User { id, username: username.into(), email: None, role: UserRole::Admin }
}

pub fn signed_in(user: User) -> Arc<AuthSession> {
    let session = Arc::new(AuthSession::in_memory());
    session.start(Credential::basic(&user.username, "pw"), user);
    session
}

pub fn gateway(backend: Arc<FakeBackend>) -> Arc<Gateway> {
    gateway_as(backend, member(3, "ann"))
}

pub fn gateway_as(backend: Arc<FakeBackend>, user: User) -> Arc<Gateway> {
    Arc::new(Gateway::new(backend, signed_in(user), Duration::from_secs(5)))
}
