// src/admin.rs
use std::sync::Arc;

use parking_lot::RwLock;

use crate::catalog::{Confirm, DatasetCatalog};
use crate::error::{ClientError, ClientResult};
use crate::gateway::Gateway;
use crate::models::{User, UserId};

#[derive(Debug, Clone, PartialEq)]
pub struct UserEntry {
    pub user: User,
    /// False for the acting user's own account.
    pub deletable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveUserOutcome {
    Removed,
    Cancelled,
    /// The acting user tried to delete themself; nothing was sent.
    SelfDeleteRejected,
}

#[derive(Default)]
struct RegistryState {
    users: Vec<User>,
    issued: u64,
    applied: u64,
}

pub struct AdminUserRegistry {
    gateway: Arc<Gateway>,
    state: RwLock<RegistryState>,
}

impl AdminUserRegistry {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            state: RwLock::new(RegistryState::default()),
        }
    }

    fn acting_admin(&self) -> ClientResult<User> {
        let user = self
            .gateway
            .session()
            .current_user()
            .ok_or(ClientError::NotAuthenticated)?;
        if !user.role.can_manage_users() {
            return Err(ClientError::admin_required());
        }
        Ok(user)
    }

    pub fn entries(&self) -> Vec<UserEntry> {
        let acting = self.gateway.session().current_user().map(|u| u.id);
        self.state
            .read()
            .users
            .iter()
            .map(|user| UserEntry {
                deletable: Some(user.id) != acting,
                user: user.clone(),
            })
            .collect()
    }

    /// An older response, or one that outlived a reset, is dropped.
    pub async fn list(&self) -> ClientResult<Vec<User>> {
        self.acting_admin()?;
        let seq = {
            let mut state = self.state.write();
            state.issued += 1;
            state.issued
        };

        let users = self
            .gateway
            .call("list_users", self.gateway.backend().list_users())
            .await?;

        let mut state = self.state.write();
        if seq > state.applied {
            state.applied = seq;
            state.users = users;
        } else {
            log::debug!("Discarding user list #{} (already at #{})", seq, state.applied);
        }
        Ok(state.users.clone())
    }

    pub async fn remove(
        &self,
        id: UserId,
        confirm: &dyn Confirm,
        catalog: &DatasetCatalog,
    ) -> ClientResult<RemoveUserOutcome> {
        let acting = self.acting_admin()?;
        if acting.id == id {
            log::warn!("{} attempted to delete their own account", acting.username);
            return Ok(RemoveUserOutcome::SelfDeleteRejected);
        }
        if !confirm.confirm(&format!("Delete user #{} and all of their datasets?", id)) {
            return Ok(RemoveUserOutcome::Cancelled);
        }

        self.gateway
            .call("delete_user", self.gateway.backend().delete_user(id))
            .await?;
        log::info!("User {} deleted by {}", id, acting.username);

        let (users, datasets) = futures::join!(self.list(), catalog.refresh());
        if let Err(e) = users {
            log::warn!("User list not refreshed after delete: {}", e);
        }
        if let Err(e) = datasets {
            log::warn!("Dataset list not refreshed after delete: {}", e);
        }
        Ok(RemoveUserOutcome::Removed)
    }

    pub fn reset(&self) {
        let mut state = self.state.write();
        state.users.clear();
        state.applied = state.issued;
    }
}
