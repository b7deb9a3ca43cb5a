// src/session.rs
//! Authenticated session: credential lifecycle, durable storage and the
//! termination signal.
//!
//! The session is created by login/register (or restored from storage) and
//! torn down only through [`AuthSession::terminate`]. Every dependent
//! component observes teardown through [`SessionEvent`]s.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use validator::Validate;

use crate::backend::Backend;
use crate::error::{ClientError, ClientResult};
use crate::models::{LoginRequest, RegisterRequest, User};

const EVENT_CAPACITY: usize = 32;

// ==================== CREDENTIAL ====================

/// HTTP Basic credential, stored in its encoded form.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn basic(username: &str, password: &str) -> Self {
        Credential(STANDARD.encode(format!("{}:{}", username, password)))
    }

    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Credential(encoded.into())
    }

    pub fn encoded(&self) -> &str {
        &self.0
    }

    pub fn header_value(&self) -> String {
        format!("Basic {}", self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

// ==================== DURABLE STORAGE ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSession {
    pub username: String,
    pub credentials: String,
    pub user: User,
    pub saved_at: DateTime<Utc>,
}

/// Durable client storage for the credential. Only [`AuthSession`] touches it.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> ClientResult<Option<StoredSession>>;
    fn save(&self, session: &StoredSession) -> ClientResult<()>;
    fn clear(&self) -> ClientResult<()>;
}

/// JSON file store. The file is owner-readable only on unix.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> ClientResult<Option<StoredSession>> {
        match fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(stored) => Ok(Some(stored)),
                Err(e) => {
                    log::warn!("Ignoring unreadable session file {}: {}", self.path.display(), e);
                    Ok(None)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, session: &StoredSession) -> ClientResult<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut staged = tempfile::NamedTempFile::new_in(&dir)?;
        staged.write_all(&serde_json::to_vec_pretty(session)?)?;
        staged.flush()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(staged.path(), fs::Permissions::from_mode(0o600))?;
        }

        staged.persist(&self.path).map_err(|e| ClientError::Io(e.error))?;
        Ok(())
    }

    fn clear(&self) -> ClientResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-lifetime store, used when persistence is disabled and in tests.
#[derive(Default)]
pub struct MemoryTokenStore {
    slot: Mutex<Option<StoredSession>>,
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> ClientResult<Option<StoredSession>> {
        Ok(self.slot.lock().clone())
    }

    fn save(&self, session: &StoredSession) -> ClientResult<()> {
        *self.slot.lock() = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> ClientResult<()> {
        *self.slot.lock() = None;
        Ok(())
    }
}

// ==================== SESSION ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The backend answered with an authorization failure.
    Unauthorized,
    LoggedOut,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Started(User),
    Terminated(TerminationReason),
}

struct ActiveSession {
    credential: Credential,
    user: User,
    generation: u64,
}

pub struct AuthSession {
    active: RwLock<Option<ActiveSession>>,
    store: Box<dyn TokenStore>,
    events: broadcast::Sender<SessionEvent>,
    generations: AtomicU64,
}

impl AuthSession {
    pub fn new(store: Box<dyn TokenStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            active: RwLock::new(None),
            store,
            events,
            generations: AtomicU64::new(0),
        }
    }

    /// Builds a session and resumes a previously stored credential, if any.
    pub fn restore(store: Box<dyn TokenStore>) -> Self {
        let session = Self::new(store);
        match session.store.load() {
            Ok(Some(stored)) => {
                log::info!("Restored session for {}", stored.username);
                *session.active.write() = Some(ActiveSession {
                    credential: Credential::from_encoded(stored.credentials),
                    user: stored.user,
                    generation: session.next_generation(),
                });
            }
            Ok(None) => {}
            Err(e) => log::warn!("Could not read stored session: {}", e),
        }
        session
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryTokenStore::default()))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.active.read().is_some()
    }

    /// Identifies the current sign-in; every login starts a new generation.
    pub fn generation(&self) -> Option<u64> {
        self.active.read().as_ref().map(|a| a.generation)
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn current_user(&self) -> Option<User> {
        self.active.read().as_ref().map(|a| a.user.clone())
    }

    pub fn authorization(&self) -> Option<String> {
        self.active.read().as_ref().map(|a| a.credential.header_value())
    }

    /// Adds the credential header; leaves the request untouched when unauthenticated.
    pub fn attach(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.authorization() {
            Some(value) => request.header(reqwest::header::AUTHORIZATION, value),
            None => request,
        }
    }

    pub async fn login(&self, backend: &dyn Backend, request: LoginRequest) -> ClientResult<User> {
        request.validate()?;
        let user = backend
            .login(&request)
            .await
            .map_err(invalid_credentials)?;
        self.start(Credential::basic(&request.username, &request.password), user.clone());
        Ok(user)
    }

    pub async fn register(&self, backend: &dyn Backend, request: RegisterRequest) -> ClientResult<User> {
        request.validate()?;
        let user = backend
            .register(&request)
            .await
            .map_err(invalid_credentials)?;
        self.start(Credential::basic(&request.username, &request.password), user.clone());
        Ok(user)
    }

    pub fn start(&self, credential: Credential, user: User) {
        let stored = StoredSession {
            username: user.username.clone(),
            credentials: credential.encoded().to_string(),
            user: user.clone(),
            saved_at: Utc::now(),
        };
        if let Err(e) = self.store.save(&stored) {
            log::warn!("Session for {} is not persisted: {}", user.username, e);
        }

        log::info!("Session started for {} ({})", user.username, user.role);
        let generation = self.next_generation();
        *self.active.write() = Some(ActiveSession { credential, user: user.clone(), generation });
        let _ = self.events.send(SessionEvent::Started(user));
    }

    pub fn logout(&self) {
        self.terminate(TerminationReason::LoggedOut);
    }

    /// The only teardown path: clears the credential, erases storage and
    /// notifies subscribers.
    pub fn terminate(&self, reason: TerminationReason) {
        let previous = self.active.write().take();
        self.finish_termination(previous, reason);
    }

    fn finish_termination(&self, previous: Option<ActiveSession>, reason: TerminationReason) {
        if let Err(e) = self.store.clear() {
            log::error!("Failed to erase stored session: {}", e);
        }

        if let Some(previous) = previous {
            log::warn!("Session for {} terminated: {:?}", previous.user.username, reason);
            let _ = self.events.send(SessionEvent::Terminated(reason));
        }
    }

    /// Passes a backend result through, tearing the session down on an
    /// authorization failure. A failure from a call issued under an earlier
    /// generation leaves the current session alone.
    pub fn guard<T>(&self, generation: u64, result: ClientResult<T>) -> ClientResult<T> {
        if let Err(ClientError::AuthExpired) = &result {
            let previous = {
                let mut active = self.active.write();
                match active.as_ref() {
                    Some(current) if current.generation == generation => active.take(),
                    _ => None,
                }
            };
            match previous {
                Some(previous) => self.finish_termination(Some(previous), TerminationReason::Unauthorized),
                None => log::debug!("Ignoring authorization failure from session generation {}", generation),
            }
        }
        result
    }
}

// A 401 from the auth endpoints means bad credentials, not an expired session.
fn invalid_credentials(err: ClientError) -> ClientError {
    match err {
        ClientError::AuthExpired => ClientError::Validation("Invalid credentials".to_string()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;

    fn user() -> User {
        User { id: 1, username: "ann".into(), email: None, role: UserRole::Member }
    }

    #[test]
    fn test_credential_encoding() {
        let credential = Credential::basic("ann", "s3cret");
        assert_eq!(credential.encoded(), "YW5uOnMzY3JldA==");
        assert_eq!(credential.header_value(), "Basic YW5uOnMzY3JldA==");
        assert_eq!(format!("{:?}", credential), "Credential(<redacted>)");
    }

    #[test]
    fn test_start_and_terminate_notifies_subscribers() {
        let session = AuthSession::in_memory();
        let mut events = session.subscribe();

        session.start(Credential::basic("ann", "pw"), user());
        assert!(session.is_authenticated());
        assert_eq!(events.try_recv().unwrap(), SessionEvent::Started(user()));

        session.terminate(TerminationReason::Unauthorized);
        assert!(!session.is_authenticated());
        assert_eq!(session.authorization(), None);
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::Terminated(TerminationReason::Unauthorized)
        );

        // Terminating an already closed session is silent.
        session.terminate(TerminationReason::Unauthorized);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_guard_terminates_only_on_auth_failure() {
        let session = AuthSession::in_memory();
        session.start(Credential::basic("ann", "pw"), user());

        let generation = session.generation().unwrap();

        let res: ClientResult<()> = session.guard(generation, Err(ClientError::validation("bad input")));
        assert!(res.is_err());
        assert!(session.is_authenticated());

        let res: ClientResult<()> = session.guard(generation, Err(ClientError::AuthExpired));
        assert!(res.unwrap_err().is_auth_expired());
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_auth_failure_from_previous_login_keeps_new_session() {
        let session = AuthSession::in_memory();
        session.start(Credential::basic("ann", "pw"), user());
        let old = session.generation().unwrap();
        session.logout();

        let bob = User { id: 2, username: "bob".into(), email: None, role: UserRole::Member };
        session.start(Credential::basic("bob", "pw"), bob.clone());
        assert_ne!(session.generation(), Some(old));
        let mut events = session.subscribe();

        let res: ClientResult<()> = session.guard(old, Err(ClientError::AuthExpired));
        assert!(res.unwrap_err().is_auth_expired());
        assert_eq!(session.current_user(), Some(bob));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_file_store_persists_and_erases() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let session = AuthSession::new(Box::new(FileTokenStore::new(&path)));
        session.start(Credential::basic("ann", "pw"), user());
        assert!(path.exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        let restored = AuthSession::restore(Box::new(FileTokenStore::new(&path)));
        assert_eq!(restored.current_user(), Some(user()));
        assert_eq!(restored.authorization(), session.authorization());

        restored.logout();
        assert!(!path.exists());
    }

    #[test]
    fn test_corrupt_store_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, b"{not json").unwrap();

        let session = AuthSession::restore(Box::new(FileTokenStore::new(&path)));
        assert!(!session.is_authenticated());
    }
}
