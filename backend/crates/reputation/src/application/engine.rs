//! Reputation Engine
//!
//! Long-lived entry point holding the remote store, the connectivity probe
//! and the configuration. Each login opens a fresh [`Session`].

use std::sync::Arc;

use identity::{AuthGateway, AuthProvider};
use kernel::id::UserId;
use platform::clock::{Clock, SystemClock};
use platform::connectivity::Connectivity;

use crate::application::config::ReputationConfig;
use crate::application::session::Session;
use crate::domain::remote::RemoteDataPort;
use crate::error::{ReputationError, ReputationResult, bounded};

/// Reputation engine
pub struct ReputationEngine<R, C>
where
    R: RemoteDataPort,
    C: Connectivity,
{
    remote: Arc<R>,
    connectivity: Arc<C>,
    config: Arc<ReputationConfig>,
    clock: Arc<dyn Clock>,
}

impl<R, C> ReputationEngine<R, C>
where
    R: RemoteDataPort + Sync + 'static,
    C: Connectivity + Sync + 'static,
{
    pub fn new(remote: Arc<R>, connectivity: Arc<C>, config: Arc<ReputationConfig>) -> Self {
        Self {
            remote,
            connectivity,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    pub fn config(&self) -> &ReputationConfig {
        &self.config
    }

    fn open(&self, user_id: Option<UserId>, is_anonymous: bool) -> Session<R, C> {
        Session::open(
            Arc::clone(&self.remote),
            Arc::clone(&self.connectivity),
            Arc::clone(&self.config),
            Arc::clone(&self.clock),
            user_id,
            is_anonymous,
        )
    }

    /// Session for an account that already exists remotely
    pub fn login_existing(&self, user_id: UserId) -> Session<R, C> {
        tracing::info!(user_id = %user_id, "Session opened");
        self.open(Some(user_id), false)
    }

    /// Create the user node, then open a session for it
    pub async fn create_new_user(&self, user_id: UserId) -> ReputationResult<Session<R, C>> {
        bounded(
            self.config.operation_timeout,
            self.remote.create_user(&user_id),
        )
        .await
        .inspect_err(|e| e.log())?;
        tracing::info!(user_id = %user_id, "User node created");
        Ok(self.login_existing(user_id))
    }

    /// Session without an account: lookups only
    pub fn enter_anonymous(&self, user_id: Option<UserId>) -> Session<R, C> {
        tracing::info!("Anonymous session opened");
        self.open(user_id, true)
    }

    /// Session matching whoever the identity provider has signed in
    pub fn session_for<P>(&self, gateway: &AuthGateway<P>) -> ReputationResult<Session<R, C>>
    where
        P: AuthProvider + Sync + 'static,
    {
        if !gateway.is_logged_in() {
            return Err(ReputationError::Unauthenticated);
        }
        let user_id = gateway.current_user_id();
        if gateway.is_anonymous() {
            return Ok(self.enter_anonymous(user_id));
        }
        let user_id = user_id.ok_or(ReputationError::Unauthenticated)?;
        Ok(self.login_existing(user_id))
    }
}
