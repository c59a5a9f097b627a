//! # Process-wide session registry.
//!
//! [`SessionRegistry`] owns the single authenticated [`Session`]. Every
//! component holds a clone of the registry and borrows the session per
//! operation; nobody keeps it exclusively.
//!
//! ## Rules
//! - `get()` is idempotent: a live session is returned as-is.
//! - Creation is serialized by one login lock; callers that queue behind an
//!   in-flight login re-check and reuse its result instead of logging in again.
//! - A persisted artifact with a matching credential fingerprint restores the
//!   session without calling the authenticator.
//! - `invalidate()` marks the session expired; the next `get()` logs in again
//!   and ignores the artifact.

use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::{Mutex, RwLock};

use super::auth::{Authenticator, Credentials};
use super::store::{SessionArtifact, SessionStore};
use crate::error::AuthError;
use crate::messenger::{Identity, Messenger};

/// Authentication state as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticated,
    Expired,
}

/// One authenticated handle to the messaging platform.
pub struct Session {
    client: Arc<dyn Messenger>,
    identity: Identity,
    created_at: SystemTime,
}

impl Session {
    pub fn client(&self) -> &dyn Messenger {
        self.client.as_ref()
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }
}

enum Slot {
    Empty,
    Live(Arc<Session>),
    Expired,
}

struct Inner {
    credentials: Credentials,
    auth: Arc<dyn Authenticator>,
    store: Option<SessionStore>,
    slot: RwLock<Slot>,
    login: Mutex<()>,
}

/// Cheap-to-clone handle to the process session.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<Inner>,
}

impl SessionRegistry {
    pub fn new(
        credentials: Credentials,
        auth: Arc<dyn Authenticator>,
        store: Option<SessionStore>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                credentials,
                auth,
                store,
                slot: RwLock::new(Slot::Empty),
                login: Mutex::new(()),
            }),
        }
    }

    /// Returns the live session, creating it on first need.
    pub async fn get(&self) -> Result<Arc<Session>, AuthError> {
        if let Some(session) = self.live().await {
            return Ok(session);
        }

        let _login = self.inner.login.lock().await;
        if let Some(session) = self.live().await {
            return Ok(session);
        }

        let credentials = &self.inner.credentials;
        if credentials.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let expired = matches!(*self.inner.slot.read().await, Slot::Expired);
        let restored = if expired { None } else { self.restore().await };

        let (identity, created_at) = match restored {
            Some(found) => found,
            None => {
                let identity = self.inner.auth.authenticate(credentials).await?;
                let now = SystemTime::now();
                self.persist(&identity, now).await;
                tracing::info!(user_id = identity.user_id, "session authenticated");
                (identity, now)
            }
        };

        let session = Arc::new(Session {
            client: self.inner.auth.connect(credentials),
            identity,
            created_at,
        });
        *self.inner.slot.write().await = Slot::Live(Arc::clone(&session));
        Ok(session)
    }

    /// Marks the current session expired.
    pub async fn invalidate(&self) {
        let mut slot = self.inner.slot.write().await;
        if matches!(*slot, Slot::Live(_)) {
            tracing::warn!("session invalidated, next use re-authenticates");
            *slot = Slot::Expired;
        }
    }

    pub async fn state(&self) -> AuthState {
        match *self.inner.slot.read().await {
            Slot::Empty => AuthState::Unauthenticated,
            Slot::Live(_) => AuthState::Authenticated,
            Slot::Expired => AuthState::Expired,
        }
    }

    async fn live(&self) -> Option<Arc<Session>> {
        match &*self.inner.slot.read().await {
            Slot::Live(session) => Some(Arc::clone(session)),
            _ => None,
        }
    }

    async fn restore(&self) -> Option<(Identity, SystemTime)> {
        let artifact = self.inner.store.as_ref()?.load().await?;
        if artifact.token_fingerprint != self.inner.credentials.fingerprint() {
            tracing::debug!("session artifact belongs to other credentials");
            return None;
        }
        tracing::info!(user_id = artifact.user_id, "session restored from artifact");
        let created_at =
            SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(artifact.created_at);
        Some((artifact.identity(), created_at))
    }

    async fn persist(&self, identity: &Identity, created_at: SystemTime) {
        let Some(store) = &self.inner.store else {
            return;
        };
        let artifact =
            SessionArtifact::new(self.inner.credentials.fingerprint(), identity, created_at);
        if let Err(e) = store.save(&artifact).await {
            tracing::warn!(path = %store.path().display(), error = %e, "cannot persist session artifact");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::FakeAuthenticator;
    use std::time::Duration;

    fn registry(auth: &Arc<FakeAuthenticator>, store: Option<SessionStore>) -> SessionRegistry {
        SessionRegistry::new(Credentials::new("123:secret"), auth.clone(), store)
    }

    #[tokio::test]
    async fn get_is_idempotent() {
        let auth = FakeAuthenticator::arc();
        let reg = registry(&auth, None);

        let a = reg.get().await.unwrap();
        let b = reg.get().await.unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(auth.logins(), 1);
        assert_eq!(reg.state().await, AuthState::Authenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_logins_collapse_into_one() {
        let auth = FakeAuthenticator::arc();
        auth.set_delay(Duration::from_millis(200));
        let reg = registry(&auth, None);

        let mut set = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let reg = reg.clone();
            set.spawn(async move { reg.get().await.map(|s| s.identity().user_id) });
        }
        while let Some(res) = set.join_next().await {
            assert!(res.unwrap().is_ok());
        }
        assert_eq!(auth.logins(), 1);
    }

    #[tokio::test]
    async fn same_credentials_restore_without_login() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let auth = FakeAuthenticator::arc();

        registry(&auth, Some(SessionStore::new(&path))).get().await.unwrap();
        assert_eq!(auth.logins(), 1);

        // a fresh registry plays the role of a restarted process
        let session = registry(&auth, Some(SessionStore::new(&path)))
            .get()
            .await
            .unwrap();
        assert_eq!(auth.logins(), 1);
        assert_eq!(session.identity().user_id, auth.identity().user_id);
    }

    #[tokio::test]
    async fn other_credentials_log_in_again() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let auth = FakeAuthenticator::arc();

        registry(&auth, Some(SessionStore::new(&path))).get().await.unwrap();
        SessionRegistry::new(
            Credentials::new("456:other"),
            auth.clone(),
            Some(SessionStore::new(&path)),
        )
        .get()
        .await
        .unwrap();

        assert_eq!(auth.logins(), 2);
    }

    #[tokio::test]
    async fn missing_credentials_fail() {
        let auth = FakeAuthenticator::arc();
        let reg = SessionRegistry::new(Credentials::new(""), auth.clone(), None);

        assert_eq!(reg.get().await.err(), Some(AuthError::MissingCredentials));
        assert_eq!(auth.logins(), 0);
        assert_eq!(reg.state().await, AuthState::Unauthenticated);
    }

    #[tokio::test]
    async fn rejection_is_reported_and_not_cached() {
        let auth = FakeAuthenticator::arc();
        auth.reject("revoked");
        let reg = registry(&auth, None);

        assert!(matches!(reg.get().await, Err(AuthError::Rejected(_))));

        auth.accept();
        assert!(reg.get().await.is_ok());
        assert_eq!(auth.logins(), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_a_new_login() {
        let dir = tempfile::tempdir().unwrap();
        let auth = FakeAuthenticator::arc();
        let reg = registry(&auth, Some(SessionStore::new(dir.path().join("s.json"))));

        let first = reg.get().await.unwrap();
        reg.invalidate().await;
        assert_eq!(reg.state().await, AuthState::Expired);

        let second = reg.get().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(auth.logins(), 2);
    }
}
