//! Provider Trait
//!
//! Interface to the hosted identity provider. Implementation lives with the
//! embedding application.

use kernel::id::UserId;

use crate::error::AuthResult;

/// Identity provider trait
#[trait_variant::make(AuthProvider: Send)]
pub trait LocalAuthProvider {
    /// Whether a user (anonymous or full) is signed in
    fn is_logged_in(&self) -> bool;

    /// Id of the signed-in user
    fn current_user_id(&self) -> Option<UserId>;

    /// Whether the signed-in user is anonymous
    fn is_anonymous(&self) -> bool;

    /// Drop the provider-side session
    fn sign_out(&self);

    /// Sign in without an account
    async fn sign_in_anonymous(&self) -> AuthResult<()>;

    /// Sign in with email and password
    async fn sign_in_with_credentials(&self, email: &str, password: &str) -> AuthResult<()>;

    /// Register a new account and sign it in
    async fn create_account(&self, email: &str, password: &str) -> AuthResult<()>;
}
