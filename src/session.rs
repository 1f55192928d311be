//! Process-wide view of who is signed in.
//!
//! [`SessionObserver`] owns exactly one auth-state subscription on the
//! gateway. A background task applies sign-in, sign-out and refresh events to
//! a token -> user map; lookups that miss the map go to
//! [`Gateway::current_user`]. Dropping the observer stops the task and
//! releases the subscription.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::gateway::{AuthEvent, Gateway, GatewayError};
use crate::models::{AuthSession, User, UserSession};

/// How long a token resolved through the gateway is trusted without asking again.
const LOOKUP_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct Entry {
    user: User,
    valid_until: Instant,
}

type SessionMap = Arc<RwLock<HashMap<String, Entry>>>;

pub struct SessionObserver {
    gateway: Arc<dyn Gateway>,
    sessions: SessionMap,
    listener: JoinHandle<()>,
}

impl SessionObserver {
    /// Subscribes to the gateway's auth events. Must be called inside a tokio runtime.
    pub fn start(gateway: Arc<dyn Gateway>) -> Self {
        let sessions: SessionMap = Arc::default();
        let mut subscription = gateway.on_auth_state_change();
        let task_sessions = sessions.clone();

        let listener = tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                apply_event(&task_sessions, event);
            }
            debug!("auth event stream closed");
        });

        Self {
            gateway,
            sessions,
            listener,
        }
    }

    /// Resolves a token to its user. Every failure reads as "not signed in".
    pub async fn current_user(&self, access_token: &str) -> Option<User> {
        if access_token.is_empty() {
            return None;
        }
        if let Some(user) = self.cached(access_token) {
            return Some(user);
        }

        match self.gateway.current_user(access_token).await {
            Ok(Some(user)) => {
                remember(&self.sessions, access_token, user.clone(), LOOKUP_TTL);
                Some(user)
            }
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "session check failed, treating as signed out");
                None
            }
        }
    }

    pub async fn resolve(&self, access_token: &str) -> Option<UserSession> {
        let user = self.current_user(access_token).await?;
        Some(UserSession {
            user,
            access_token: access_token.to_string(),
        })
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, GatewayError> {
        let session = self.gateway.sign_in(email, password).await?;
        remember_session(&self.sessions, &session);
        info!(user_id = %session.user.id, "User signed in");
        Ok(session)
    }

    pub async fn sign_out(&self, access_token: &str) -> Result<(), GatewayError> {
        forget(&self.sessions, access_token);
        self.gateway.sign_out(access_token).await?;
        info!("User signed out");
        Ok(())
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthSession, GatewayError> {
        let session = self.gateway.refresh_session(refresh_token).await?;
        remember_session(&self.sessions, &session);
        debug!(user_id = %session.user.id, "Session refreshed");
        Ok(session)
    }

    fn cached(&self, access_token: &str) -> Option<User> {
        let sessions = self.sessions.read().ok()?;
        let entry = sessions.get(access_token)?;
        (entry.valid_until > Instant::now()).then(|| entry.user.clone())
    }
}

impl Drop for SessionObserver {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

fn apply_event(sessions: &SessionMap, event: AuthEvent) {
    match event {
        AuthEvent::SignedIn(session) => {
            debug!(user_id = %session.user.id, "auth event: signed in");
            remember_session(sessions, &session);
        }
        AuthEvent::SignedOut { access_token } => {
            debug!("auth event: signed out");
            forget(sessions, &access_token);
        }
        AuthEvent::TokenRefreshed {
            previous_access_token,
            session,
        } => {
            debug!(user_id = %session.user.id, "auth event: token refreshed");
            forget(sessions, &previous_access_token);
            remember_session(sessions, &session);
        }
    }
}

fn remember_session(sessions: &SessionMap, session: &AuthSession) {
    let ttl = Duration::from_secs(session.expires_in.max(0) as u64).min(LOOKUP_TTL * 60);
    remember(sessions, &session.access_token, session.user.clone(), ttl);
}

fn remember(sessions: &SessionMap, access_token: &str, user: User, ttl: Duration) {
    if let Ok(mut sessions) = sessions.write() {
        let now = Instant::now();
        sessions.retain(|_, entry| entry.valid_until > now);
        sessions.insert(
            access_token.to_string(),
            Entry {
                user,
                valid_until: now + ttl,
            },
        );
    }
}

fn forget(sessions: &SessionMap, access_token: &str) {
    if access_token.is_empty() {
        return;
    }
    if let Ok(mut sessions) = sessions.write() {
        sessions.remove(access_token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::LocalGateway;

    async fn setup() -> (Arc<LocalGateway>, SessionObserver) {
        let local = Arc::new(LocalGateway::open_in_memory().unwrap().with_auto_confirm(true));
        local.sign_up("user@example.com", "secret1").await.unwrap();
        let observer = SessionObserver::start(local.clone());
        (local, observer)
    }

    #[tokio::test]
    async fn unknown_token_is_not_signed_in() {
        let (_, observer) = setup().await;
        assert!(observer.current_user("nope").await.is_none());
        assert!(observer.current_user("").await.is_none());
    }

    #[tokio::test]
    async fn sign_in_then_sign_out() {
        let (_, observer) = setup().await;
        let session = observer.sign_in("user@example.com", "secret1").await.unwrap();

        let user = observer.current_user(&session.access_token).await.unwrap();
        assert_eq!(user.email, "user@example.com");

        observer.sign_out(&session.access_token).await.unwrap();
        assert!(observer.current_user(&session.access_token).await.is_none());
    }

    #[tokio::test]
    async fn events_from_other_callers_are_observed() {
        let (local, observer) = setup().await;
        let session = local.sign_in("user@example.com", "secret1").await.unwrap();
        assert!(observer.current_user(&session.access_token).await.is_some());

        // Sign out behind the observer's back; the event must evict the cache.
        local.sign_out(&session.access_token).await.unwrap();
        for _ in 0..100 {
            if observer.cached(&session.access_token).is_none() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(observer.cached(&session.access_token).is_none());
        assert!(observer.current_user(&session.access_token).await.is_none());
    }

    #[tokio::test]
    async fn refresh_replaces_the_token() {
        let (_, observer) = setup().await;
        let session = observer.sign_in("user@example.com", "secret1").await.unwrap();
        let refreshed = observer.refresh(&session.refresh_token).await.unwrap();

        assert!(observer.current_user(&refreshed.access_token).await.is_some());
        for _ in 0..100 {
            if observer.cached(&session.access_token).is_none() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(observer.current_user(&session.access_token).await.is_none());
    }

    #[tokio::test]
    async fn dropping_the_observer_releases_its_subscription() {
        let (local, observer) = setup().await;
        assert_eq!(local.events().listener_count(), 1);

        drop(observer);
        for _ in 0..100 {
            if local.events().listener_count() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(local.events().listener_count(), 0);
    }
}
