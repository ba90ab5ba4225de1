//! Credential Format Rules
//!
//! プロバイダへ送信する前に行うローカルの形式チェック。
//! 強度判定や存在確認はプロバイダ側の責務であり、ここでは扱わない。
//!
//! ## 不変条件
//! - メールアドレス: `@` がちょうど1つ、ローカル部・ドメイン部ともに非空、
//!   ドメイン部に `.` を含む、空白を含まない
//! - パスワード: 英数字と `!@#$%^&*` のみ、最大32文字

use crate::error::AuthFailure;

// ============================================================================
// Constants
// ============================================================================

/// Maximum password length accepted by the sign-in form
pub const PASSWORD_MAX_LENGTH: usize = 32;

/// Provider-side minimum for new accounts
pub const PASSWORD_MIN_LENGTH: usize = 6;

/// Allowed special characters in passwords
const ALLOWED_PASSWORD_SPECIALS: &[char] = &['!', '@', '#', '$', '%', '^', '&', '*'];

// ============================================================================
// Checks
// ============================================================================

/// Check the shape of an email address
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty() && !domain.starts_with('.'),
        None => false,
    }
}

/// Check the password charset and maximum length
pub fn is_valid_password(password: &str) -> bool {
    password.chars().count() <= PASSWORD_MAX_LENGTH
        && password
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || ALLOWED_PASSWORD_SPECIALS.contains(&c))
}

/// Validate credentials for sign in
///
/// Malformed input is reported as invalid credentials so the caller cannot
/// tell format errors from wrong passwords.
pub fn check_sign_in(email: &str, password: &str) -> Result<(), AuthFailure> {
    if !is_valid_email(email) || password.is_empty() || !is_valid_password(password) {
        return Err(AuthFailure::InvalidCredentials);
    }
    Ok(())
}

/// Validate credentials for account creation
pub fn check_sign_up(email: &str, password: &str) -> Result<(), AuthFailure> {
    if !is_valid_email(email) {
        return Err(AuthFailure::InvalidInput("email address is malformed".into()));
    }
    if !is_valid_password(password) {
        return Err(AuthFailure::InvalidInput(format!(
            "password must be at most {} letters, digits or {}",
            PASSWORD_MAX_LENGTH,
            ALLOWED_PASSWORD_SPECIALS.iter().collect::<String>()
        )));
    }
    if password.chars().count() < PASSWORD_MIN_LENGTH {
        return Err(AuthFailure::WeakPassword);
    }
    Ok(())
}
