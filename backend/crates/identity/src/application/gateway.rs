//! Auth Gateway
//!
//! Thin pass-through to the identity provider. Each asynchronous call is run
//! on its own task and reported as `Loading`, then one terminal signal; the
//! channel closes after the terminal signal.

use std::future::Future;
use std::sync::Arc;

use kernel::id::UserId;
use kernel::signal::Signal;
use platform::deadline::{DeadlineError, with_deadline};
use tokio::sync::mpsc;

use crate::application::config::IdentityConfig;
use crate::domain::credentials;
use crate::domain::provider::AuthProvider;
use crate::error::{AuthFailure, AuthResult};

/// Receiver side of a one-shot auth sequence
pub type AuthSignals = mpsc::Receiver<Signal<()>>;

/// Auth gateway
pub struct AuthGateway<P>
where
    P: AuthProvider,
{
    provider: Arc<P>,
    config: Arc<IdentityConfig>,
}

impl<P> Clone for AuthGateway<P>
where
    P: AuthProvider,
{
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            config: Arc::clone(&self.config),
        }
    }
}

impl<P> AuthGateway<P>
where
    P: AuthProvider + Sync + 'static,
{
    pub fn new(provider: Arc<P>, config: Arc<IdentityConfig>) -> Self {
        Self { provider, config }
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    pub fn is_logged_in(&self) -> bool {
        self.provider.is_logged_in()
    }

    pub fn current_user_id(&self) -> Option<UserId> {
        self.provider.current_user_id()
    }

    pub fn is_anonymous(&self) -> bool {
        self.provider.is_anonymous()
    }

    pub fn sign_out(&self) {
        self.provider.sign_out();
        tracing::info!("Signed out of identity provider");
    }

    /// Sign in without an account
    pub fn sign_in_anonymous(&self) -> AuthSignals {
        let provider = Arc::clone(&self.provider);
        self.run("sign_in_anonymous", async move {
            provider.sign_in_anonymous().await
        })
    }

    /// Sign in with email and password
    pub fn sign_in_with_credentials(&self, email: String, password: String) -> AuthSignals {
        let provider = Arc::clone(&self.provider);
        self.run("sign_in_with_credentials", async move {
            credentials::check_sign_in(&email, &password)?;
            provider.sign_in_with_credentials(&email, &password).await
        })
    }

    /// Register a new account
    pub fn create_account(&self, email: String, password: String) -> AuthSignals {
        let provider = Arc::clone(&self.provider);
        self.run("create_account", async move {
            credentials::check_sign_up(&email, &password)?;
            provider.create_account(&email, &password).await
        })
    }

    fn run<F>(&self, operation: &'static str, call: F) -> AuthSignals
    where
        F: Future<Output = AuthResult<()>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(self.config.signal_buffer.max(2));
        let timeout = self.config.timeout;

        tokio::spawn(async move {
            if tx.send(Signal::Loading).await.is_err() {
                return;
            }
            let outcome = match with_deadline(timeout, call).await {
                Ok(()) => Ok(()),
                Err(DeadlineError::Elapsed(_)) => Err(AuthFailure::Timeout),
                Err(DeadlineError::Failed(failure)) => Err(failure),
            };
            let signal = match outcome {
                Ok(()) => {
                    tracing::info!(operation, "Identity call succeeded");
                    Signal::Success(())
                }
                Err(failure) => {
                    failure.log();
                    Signal::Error(failure.into())
                }
            };
            // Receiver may be gone; the sequence still ends here
            let _ = tx.send(signal).await;
        });

        rx
    }
}
