//! Error Kind - Classification of errors
//!
//! Defines the [`ErrorKind`] enum shared by every crate of the workspace.

use serde::Serialize;

/// エラー種別の列挙体
///
/// 非同期処理の終端 `Error(kind)` シグナルとして呼び出し側に届く分類です。
/// 各バリアントは UI 層が分岐に使う安定したコード文字列を持ちます。
///
/// ## Notes
/// * `non_exhaustive` - 将来的に列挙子が追加される可能性があることを示す
///
/// ## Examples
/// ```rust
/// use kernel::error::kind::ErrorKind;
///
/// let kind = ErrorKind::NetworkFailure;
/// assert_eq!(kind.code(), "NETWORK_FAILURE");
/// assert!(kind.is_transient());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ErrorKind {
    /// 通信途中で接続が失われた
    NetworkFailure,
    /// 固定の期限を超過した
    TimeoutFailure,
    /// 匿名ユーザーによる更新操作
    AnonymousUserRestricted,
    /// 認証情報が不正
    InvalidCredentials,
    /// ユーザーが既に存在する
    UserAlreadyExists,
    /// パスワードが弱すぎる
    WeakPassword,
    /// ユーザーが存在しない
    UserNonExistent,
    /// セッションにユーザーが紐付いていない
    Unauthenticated,
    /// 表示中のプレートが確定していない
    NoPlateSelected,
    /// 報告間隔の制限中
    RateLimited,
    /// 入力値が不正
    InvalidInput,
    /// 対象が見つからない
    NotFound,
    /// 内部エラー
    Internal,
}

impl ErrorKind {
    /// 安定したコード文字列を取得
    ///
    /// ## Examples
    /// ```rust
    /// use kernel::error::kind::ErrorKind;
    /// assert_eq!(ErrorKind::TimeoutFailure.code(), "TIMEOUT_FAILURE");
    /// ```
    #[inline]
    pub const fn code(&self) -> &'static str {
        match self {
            ErrorKind::NetworkFailure => "NETWORK_FAILURE",
            ErrorKind::TimeoutFailure => "TIMEOUT_FAILURE",
            ErrorKind::AnonymousUserRestricted => "ANONYMOUS_USER",
            ErrorKind::InvalidCredentials => "INVALID_CREDENTIALS",
            ErrorKind::UserAlreadyExists => "USER_EXISTS_ERROR",
            ErrorKind::WeakPassword => "WEAK_PASSWORD",
            ErrorKind::UserNonExistent => "USER_NON_EXISTENT",
            ErrorKind::Unauthenticated => "UNAUTHENTICATED",
            ErrorKind::NoPlateSelected => "INVALID_PLATE_KEY",
            ErrorKind::RateLimited => "RATE_LIMITED",
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Internal => "INTERNAL",
        }
    }

    /// ユーザー向けの文字列表現を取得
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NetworkFailure => "Network Failure",
            ErrorKind::TimeoutFailure => "Timeout",
            ErrorKind::AnonymousUserRestricted => "Anonymous User Restricted",
            ErrorKind::InvalidCredentials => "Invalid Credentials",
            ErrorKind::UserAlreadyExists => "User Already Exists",
            ErrorKind::WeakPassword => "Weak Password",
            ErrorKind::UserNonExistent => "User Non-Existent",
            ErrorKind::Unauthenticated => "Unauthenticated",
            ErrorKind::NoPlateSelected => "No Plate Selected",
            ErrorKind::RateLimited => "Rate Limited",
            ErrorKind::InvalidInput => "Invalid Input",
            ErrorKind::NotFound => "Not Found",
            ErrorKind::Internal => "Internal Error",
        }
    }

    /// 再試行で解消し得るエラーかどうか
    ///
    /// 自動リトライは行わない。呼び出し側が判断するための情報のみ提供する。
    #[inline]
    pub const fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::NetworkFailure | ErrorKind::TimeoutFailure)
    }

    /// 認証プロバイダ由来のエラーかどうか
    #[inline]
    pub const fn is_auth_error(&self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidCredentials
                | ErrorKind::UserAlreadyExists
                | ErrorKind::WeakPassword
                | ErrorKind::UserNonExistent
        )
    }

    /// ログに残すべき内部エラーかどうか
    #[inline]
    pub const fn is_internal(&self) -> bool {
        matches!(self, ErrorKind::Internal)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
