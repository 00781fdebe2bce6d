use thiserror::Error;

/// Failure of a call against the chat platform.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// HTTP 404. Callers decide whether this means "empty" or "missing".
    #[error("not found: {0}")]
    NotFound(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("platform API error: {0}")]
    Api(String),
}

impl PlatformError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, PlatformError::NotFound(_))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, PlatformError::Timeout(_) | PlatformError::RateLimited(_))
    }
}

/// Failure of one channel's indexing pass. None of these advance the watermark.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),

    #[error("bot account id is unknown")]
    MissingBotAccount,

    #[error("no channel settings for channel {0}")]
    MissingChannelSettings(u64),
}

impl IndexError {
    /// Transient failures: the next interval retries from the same watermark.
    pub fn is_retryable(&self) -> bool {
        match self {
            IndexError::Platform(e) => e.is_retryable(),
            _ => false,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            IndexError::MissingBotAccount | IndexError::MissingChannelSettings(_)
        )
    }
}

/// Stable reasons a mark-solution request is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    NotInGuild,
    NotInThread,
    SolutionIsBotMessage,
    NoParentChannel,
    MarkSolutionDisabled,
    QuestionNotFound,
    SolutionIsQuestion,
    NoPermission,
    AlreadySolvedViaTag,
    AlreadySolvedViaReaction,
    AlreadySolvedInStore,
}

impl RejectReason {
    pub fn code(self) -> &'static str {
        match self {
            RejectReason::NotInGuild => "NOT_IN_GUILD",
            RejectReason::NotInThread => "NOT_IN_THREAD",
            RejectReason::SolutionIsBotMessage => "SOLUTION_IS_BOT_MESSAGE",
            RejectReason::NoParentChannel => "NO_PARENT_CHANNEL",
            RejectReason::MarkSolutionDisabled => "MARK_SOLUTION_DISABLED",
            RejectReason::QuestionNotFound => "QUESTION_NOT_FOUND",
            RejectReason::SolutionIsQuestion => "SOLUTION_IS_QUESTION",
            RejectReason::NoPermission => "NO_PERMISSION",
            RejectReason::AlreadySolvedViaTag => "ALREADY_SOLVED_VIA_TAG",
            RejectReason::AlreadySolvedViaReaction => "ALREADY_SOLVED_VIA_REACTION",
            RejectReason::AlreadySolvedInStore => "ALREADY_SOLVED_IN_STORE",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            RejectReason::NotInGuild => "Solutions can only be marked inside a server.",
            RejectReason::NotInThread => "Solutions can only be marked inside a thread.",
            RejectReason::SolutionIsBotMessage => {
                "A message sent by this bot cannot be marked as a solution."
            }
            RejectReason::NoParentChannel => "Could not find the parent channel of this thread.",
            RejectReason::MarkSolutionDisabled => {
                "Marking solutions is not enabled for this channel."
            }
            RejectReason::QuestionNotFound => "Could not find the root message of this thread.",
            RejectReason::SolutionIsQuestion => {
                "The question message cannot be marked as its own solution."
            }
            RejectReason::NoPermission => {
                "Only the question author or a moderator can mark a solution."
            }
            RejectReason::AlreadySolvedViaTag
            | RejectReason::AlreadySolvedViaReaction
            | RejectReason::AlreadySolvedInStore => "This question is already marked as solved.",
        }
    }

    pub fn is_already_solved(self) -> bool {
        matches!(
            self,
            RejectReason::AlreadySolvedViaTag
                | RejectReason::AlreadySolvedViaReaction
                | RejectReason::AlreadySolvedInStore
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: RejectReason,
    pub message: String,
}

impl From<RejectReason> for Rejection {
    fn from(reason: RejectReason) -> Self {
        Self {
            reason,
            message: reason.message().to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum MarkSolutionError {
    #[error("{} ({})", .0.message, .0.reason.code())]
    Rejected(Rejection),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),

    /// The gateway has not identified the bot yet, so bot-authored
    /// solutions cannot be told apart.
    #[error("bot account id is unknown")]
    MissingBotAccount,
}

impl MarkSolutionError {
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            MarkSolutionError::Rejected(r) => Some(r),
            _ => None,
        }
    }
}

impl From<RejectReason> for MarkSolutionError {
    fn from(reason: RejectReason) -> Self {
        MarkSolutionError::Rejected(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(IndexError::from(PlatformError::Timeout(30)).is_retryable());
        assert!(IndexError::from(PlatformError::RateLimited("slow down".into())).is_retryable());
        assert!(!IndexError::from(PlatformError::Api("500".into())).is_retryable());
        assert!(!IndexError::MissingBotAccount.is_retryable());
        assert!(IndexError::MissingBotAccount.is_configuration());
    }

    #[test]
    fn test_rejection_display_carries_code() {
        let err = MarkSolutionError::from(RejectReason::NotInGuild);
        let text = err.to_string();
        assert!(text.contains("NOT_IN_GUILD"));
        assert_eq!(err.rejection().map(|r| r.reason), Some(RejectReason::NotInGuild));
    }
}
