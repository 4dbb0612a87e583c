//! Account classification hook.
//!
//! Parlor does not know what kind of account a platform user is. The host
//! application implements [`AccountDirectory`] (usually by asking the chat
//! platform), and the desk calls it before opening a challenge so that
//! nobody can challenge the bot itself or another automated account.

use std::collections::HashSet;

use parlor_protocol::UserId;

use crate::ChallengeError;

/// What kind of account a user id belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountKind {
    /// A person. The only kind that can be challenged.
    Human,
    /// Another bot, webhook, or system account.
    Automated,
    /// The account this bot runs as.
    Myself,
}

/// Classifies platform accounts.
///
/// # Example
///
/// ```rust
/// use parlor_challenge::{AccountDirectory, AccountKind, ChallengeError};
/// use parlor_protocol::UserId;
///
/// /// Treats every id below 1000 as a system account.
/// struct ReservedRange;
///
/// impl AccountDirectory for ReservedRange {
///     async fn classify(&self, user: UserId) -> Result<AccountKind, ChallengeError> {
///         Ok(if user.0 < 1000 { AccountKind::Automated } else { AccountKind::Human })
///     }
/// }
/// ```
pub trait AccountDirectory: Send + Sync + 'static {
    /// Classifies `user`.
    ///
    /// # Errors
    /// [`ChallengeError::Directory`] if the lookup itself failed.
    fn classify(
        &self,
        user: UserId,
    ) -> impl std::future::Future<Output = Result<AccountKind, ChallengeError>> + Send;
}

/// A fixed directory: the bot, a set of known automated accounts, and
/// everyone else human.
#[derive(Debug, Clone)]
pub struct KnownAccounts {
    bot: UserId,
    automated: HashSet<UserId>,
}

impl KnownAccounts {
    pub fn new(bot: UserId) -> Self {
        Self {
            bot,
            automated: HashSet::new(),
        }
    }

    /// Marks `user` as automated.
    pub fn with_automated(mut self, user: UserId) -> Self {
        self.automated.insert(user);
        self
    }

    pub fn bot(&self) -> UserId {
        self.bot
    }
}

impl AccountDirectory for KnownAccounts {
    async fn classify(&self, user: UserId) -> Result<AccountKind, ChallengeError> {
        Ok(if user == self.bot {
            AccountKind::Myself
        } else if self.automated.contains(&user) {
            AccountKind::Automated
        } else {
            AccountKind::Human
        })
    }
}
