use thiserror::Error;

use crate::approval::SessionId;
use crate::approval::SessionState;
use crate::entitlement::LimitDecision;
use crate::entitlement::SubscriptionTier;
use crate::proposal::ProposalId;

/// Evidence log failures. A decision is not durable until its append succeeds.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("evidence log I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("evidence record encoding failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("evidence log unavailable: {0}")]
    Unavailable(String),
}

/// Reasons a skill run produced no proposal.
#[derive(Debug, Error)]
pub enum SkillFailure {
    #[error("empty input")]
    EmptyInput,
    #[error("skill {skill} does not accept {kind} input")]
    UnsupportedInput { skill: &'static str, kind: &'static str },
    #[error("input is {len} characters; the limit is {max}")]
    InputTooLong { len: usize, max: usize },
    #[error("unknown skill: {0}")]
    UnknownSkill(String),
    #[error("skill {skill} requires the {} plan", .required.label())]
    NotEntitled {
        skill: &'static str,
        required: SubscriptionTier,
    },
    #[error("{}", .0.reason.as_deref().unwrap_or("quota exceeded"))]
    QuotaExceeded(LimitDecision),
    #[error("classification failed: {0}")]
    Classification(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SkillFailure {
    /// Input problems the user can fix by re-entering text.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyInput | Self::UnsupportedInput { .. } | Self::InputTooLong { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("unknown session {0}")]
    UnknownSession(SessionId),
    #[error("unknown proposal {0}")]
    UnknownProposal(ProposalId),
    #[error("proposal {proposal_id} is already routed to {session_id}")]
    AlreadyRouted {
        proposal_id: ProposalId,
        session_id: SessionId,
    },
    #[error("already decided")]
    AlreadyDecided {
        session_id: SessionId,
        state: SessionState,
    },
    #[error("session {session_id} is {} and not under review", .state.label())]
    NotUnderReview {
        session_id: SessionId,
        state: SessionState,
    },
    #[error("session {session_id} was not returned for another round (state: {})", .state.label())]
    NotReturned {
        session_id: SessionId,
        state: SessionState,
    },
    #[error("session {session_id} was already followed up by {by}")]
    AlreadySuperseded { session_id: SessionId, by: SessionId },
    #[error("invalid decision: {0}")]
    InvalidDecision(String),
    #[error("proposal requires a biometric-verified signer")]
    BiometricRequired,
    #[error("{0} has already signed this session")]
    DuplicateSigner(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ApprovalError {
    /// Decide/present was called on a session in the wrong state.
    pub fn is_session_state_error(&self) -> bool {
        matches!(
            self,
            Self::AlreadyDecided { .. } | Self::NotUnderReview { .. } | Self::NotReturned { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("failed to read approval policy: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse approval policy: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Union returned by the [`crate::service::OperatorService`] facade.
#[derive(Debug, Error)]
pub enum OperatorError {
    #[error(transparent)]
    Skill(#[from] SkillFailure),
    #[error(transparent)]
    Approval(#[from] ApprovalError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
