use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;

use serde::Deserialize;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::error::ApprovalError;
use crate::events::SessionEvent;
use crate::events::SessionEvents;
use crate::persistence::EvidenceEvent;
use crate::persistence::EvidenceLog;
use crate::persistence::Receipt;
use crate::proposal::ConsequenceTier;
use crate::proposal::ProposalId;
use crate::proposal::ProposalPack;
use crate::proposal::RequiredApprovals;
use crate::skill_registry::SkillId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl SessionId {
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        input
            .strip_prefix("sess-")
            .unwrap_or(input)
            .parse()
            .ok()
            .map(Self)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sess-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Pending,
    UnderReview,
    Approved,
    ApprovedPartial,
    Rejected,
    RevisionRequested,
    Escalated,
}

impl SessionState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::UnderReview => "under_review",
            Self::Approved => "approved",
            Self::ApprovedPartial => "approved_partial",
            Self::Rejected => "rejected",
            Self::RevisionRequested => "revision_requested",
            Self::Escalated => "escalated",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::ApprovedPartial | Self::Rejected)
    }

    /// Closed, but waiting on a new proposal or a higher authority.
    pub fn is_returned(self) -> bool {
        matches!(self, Self::RevisionRequested | Self::Escalated)
    }

    pub fn is_decided(self) -> bool {
        self.is_terminal() || self.is_returned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decision {
    Approve,
    ApprovePartial {
        steps: Vec<usize>,
    },
    RequestRevision {
        note: String,
    },
    Escalate {
        note: String,
    },
    Reject {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl Decision {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::ApprovePartial { .. } => "approve_partial",
            Self::RequestRevision { .. } => "request_revision",
            Self::Escalate { .. } => "escalate",
            Self::Reject { .. } => "reject",
        }
    }

    pub fn resulting_state(&self) -> SessionState {
        match self {
            Self::Approve => SessionState::Approved,
            Self::ApprovePartial { .. } => SessionState::ApprovedPartial,
            Self::RequestRevision { .. } => SessionState::RevisionRequested,
            Self::Escalate { .. } => SessionState::Escalated,
            Self::Reject { .. } => SessionState::Rejected,
        }
    }

    /// Approvals collect signatures; every other decision takes effect at once.
    pub fn needs_signers(&self) -> bool {
        matches!(self, Self::Approve | Self::ApprovePartial { .. })
    }

    fn validate(&self, step_count: usize) -> Result<(), ApprovalError> {
        match self {
            Self::Approve | Self::Reject { .. } => Ok(()),
            Self::ApprovePartial { steps } => {
                if steps.is_empty() {
                    return Err(ApprovalError::InvalidDecision(
                        "partial approval must name at least one step".to_string(),
                    ));
                }
                if let Some(step) = steps.iter().find(|step| **step >= step_count) {
                    return Err(ApprovalError::InvalidDecision(format!(
                        "step {step} does not exist; the proposal has {step_count} step(s)"
                    )));
                }
                let mut unique = steps.clone();
                unique.sort_unstable();
                unique.dedup();
                if unique.len() != steps.len() {
                    return Err(ApprovalError::InvalidDecision(
                        "partial approval lists a step twice".to_string(),
                    ));
                }
                if unique.len() == step_count {
                    return Err(ApprovalError::InvalidDecision(
                        "partial approval covers every step; approve instead".to_string(),
                    ));
                }
                Ok(())
            }
            Self::RequestRevision { note } | Self::Escalate { note } => {
                if note.trim().is_empty() {
                    return Err(ApprovalError::InvalidDecision(format!(
                        "{} needs a note",
                        self.label()
                    )));
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reviewer {
    pub id: String,
    pub biometric_verified: bool,
}

impl Reviewer {
    pub fn new(id: impl Into<String>, biometric_verified: bool) -> Self {
        Self {
            id: id.into(),
            biometric_verified,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub signer: String,
    pub biometric_verified: bool,
    pub decision: Decision,
    pub seq: u64,
    pub at_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub decision: Decision,
    pub decided_by: String,
    pub seq: u64,
    pub at_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalSession {
    pub id: SessionId,
    pub proposal_id: ProposalId,
    pub skill_id: SkillId,
    pub risk_tier: ConsequenceTier,
    pub required: RequiredApprovals,
    pub step_count: usize,
    pub state: SessionState,
    pub signatures: Vec<Signature>,
    pub decision: Option<DecisionRecord>,
    pub supersedes: Option<SessionId>,
    pub routed_at_ms: i64,
}

impl ApprovalSession {
    pub(crate) fn routed(
        id: SessionId,
        proposal_id: ProposalId,
        skill_id: SkillId,
        risk_tier: ConsequenceTier,
        required: RequiredApprovals,
        step_count: usize,
        supersedes: Option<SessionId>,
        routed_at_ms: i64,
    ) -> Self {
        Self {
            id,
            proposal_id,
            skill_id,
            risk_tier,
            required: required.normalized(),
            step_count,
            state: SessionState::Pending,
            signatures: Vec::new(),
            decision: None,
            supersedes,
            routed_at_ms,
        }
    }

    pub fn remaining_signers(&self) -> u8 {
        let signed = u8::try_from(self.signatures.len()).unwrap_or(u8::MAX);
        self.required.signer_count.saturating_sub(signed)
    }

    pub(crate) fn record_signature(&mut self, signature: Signature) {
        self.signatures.push(signature);
    }

    pub(crate) fn record_decision(&mut self, record: DecisionRecord) {
        self.state = record.decision.resulting_state();
        self.decision = Some(record);
    }

    fn check_decidable(&self) -> Result<(), ApprovalError> {
        match self.state {
            SessionState::UnderReview => Ok(()),
            SessionState::Pending => Err(ApprovalError::NotUnderReview {
                session_id: self.id,
                state: self.state,
            }),
            state => Err(ApprovalError::AlreadyDecided {
                session_id: self.id,
                state,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecideOutcome {
    /// More signers are needed before the approval takes effect.
    SignatureRecorded {
        session: ApprovalSession,
        seq: u64,
        remaining: u8,
    },
    Decided {
        session: ApprovalSession,
        seq: u64,
    },
}

impl DecideOutcome {
    pub fn session(&self) -> &ApprovalSession {
        match self {
            Self::SignatureRecorded { session, .. } | Self::Decided { session, .. } => session,
        }
    }

    pub fn seq(&self) -> u64 {
        match self {
            Self::SignatureRecorded { seq, .. } | Self::Decided { seq, .. } => *seq,
        }
    }

    pub fn into_session(self) -> ApprovalSession {
        match self {
            Self::SignatureRecorded { session, .. } | Self::Decided { session, .. } => session,
        }
    }
}

#[derive(Debug, Default)]
struct SessionTable {
    sessions: BTreeMap<SessionId, ApprovalSession>,
    by_proposal: HashMap<ProposalId, SessionId>,
    next_id: u64,
}

impl SessionTable {
    fn check_supersedable(&self, previous: SessionId) -> Result<(), ApprovalError> {
        let session = self
            .sessions
            .get(&previous)
            .ok_or(ApprovalError::UnknownSession(previous))?;
        if !session.state.is_returned() {
            return Err(ApprovalError::NotReturned {
                session_id: previous,
                state: session.state,
            });
        }
        if let Some(next) = self
            .sessions
            .values()
            .find(|candidate| candidate.supersedes == Some(previous))
        {
            return Err(ApprovalError::AlreadySuperseded {
                session_id: previous,
                by: next.id,
            });
        }
        Ok(())
    }

    fn insert(&mut self, session: ApprovalSession) {
        self.by_proposal.insert(session.proposal_id, session.id);
        self.next_id = self.next_id.max(session.id.0.saturating_add(1));
        self.sessions.insert(session.id, session);
    }
}

/// Owns every approval session. Transitions are serialized through one lock
/// and only take effect after their evidence record has been appended.
/// Events are published under the same lock, in log order.
pub struct SessionStore {
    log: Arc<dyn EvidenceLog>,
    table: Mutex<SessionTable>,
    events: SessionEvents,
}

impl SessionStore {
    pub fn new(log: Arc<dyn EvidenceLog>) -> Self {
        Self {
            log,
            table: Mutex::new(SessionTable {
                next_id: 1,
                ..SessionTable::default()
            }),
            events: SessionEvents::new(),
        }
    }

    /// Rebuild from sessions recovered by replaying the evidence log.
    pub fn restore(log: Arc<dyn EvidenceLog>, sessions: Vec<ApprovalSession>) -> Self {
        let store = Self::new(log);
        {
            let mut table = store.lock();
            for session in sessions {
                table.insert(session);
            }
        }
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionTable> {
        self.table.lock().unwrap_or_else(|err| err.into_inner())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn get(&self, id: SessionId) -> Option<ApprovalSession> {
        self.lock().sessions.get(&id).cloned()
    }

    pub fn list(&self) -> Vec<ApprovalSession> {
        self.lock().sessions.values().cloned().collect()
    }

    pub fn session_for_proposal(&self, proposal_id: ProposalId) -> Option<SessionId> {
        self.lock().by_proposal.get(&proposal_id).copied()
    }

    /// Returned sessions may start one new round; anything else is refused.
    pub fn check_supersedable(&self, previous: SessionId) -> Result<(), ApprovalError> {
        self.lock().check_supersedable(previous)
    }

    /// Creates a `pending` session. A proposal is routed at most once, and a
    /// returned session is superseded by at most one later round.
    pub fn route(
        &self,
        proposal: &ProposalPack,
        supersedes: Option<SessionId>,
    ) -> Result<ApprovalSession, ApprovalError> {
        let mut table = self.lock();
        if let Some(existing) = table.by_proposal.get(&proposal.id) {
            return Err(ApprovalError::AlreadyRouted {
                proposal_id: proposal.id,
                session_id: *existing,
            });
        }
        if let Some(previous) = supersedes {
            table.check_supersedable(previous)?;
        }
        let id = SessionId(table.next_id);
        let receipt = self.log.append(EvidenceEvent::SessionRouted {
            session_id: id,
            proposal_id: proposal.id,
            skill_id: proposal.skill_id,
            risk_tier: proposal.risk_tier(),
            required: proposal.approvals,
            step_count: proposal.steps.len(),
            supersedes,
        })?;
        let session = ApprovalSession::routed(
            id,
            proposal.id,
            proposal.skill_id,
            proposal.risk_tier(),
            proposal.approvals,
            proposal.steps.len(),
            supersedes,
            receipt.ts_ms,
        );
        table.insert(session.clone());
        self.events.publish(SessionEvent::from(&session));
        tracing::info!(
            session_id = %id,
            proposal_id = %proposal.id,
            risk_tier = proposal.risk_tier().label(),
            seq = receipt.seq,
            "session routed"
        );
        Ok(session)
    }

    /// `pending` → `under_review`. Presenting a session already under review
    /// is a no-op.
    pub fn present(&self, id: SessionId) -> Result<ApprovalSession, ApprovalError> {
        let mut table = self.lock();
        let session = table
            .sessions
            .get_mut(&id)
            .ok_or(ApprovalError::UnknownSession(id))?;
        match session.state {
            SessionState::Pending => {}
            SessionState::UnderReview => return Ok(session.clone()),
            state => {
                return Err(ApprovalError::AlreadyDecided {
                    session_id: id,
                    state,
                })
            }
        }
        let receipt = self.log.append(EvidenceEvent::SessionPresented {
            session_id: id,
            proposal_id: session.proposal_id,
            risk_tier: session.risk_tier,
        })?;
        session.state = SessionState::UnderReview;
        self.events.publish(SessionEvent::from(&*session));
        tracing::debug!(session_id = %id, seq = receipt.seq, "session under review");
        Ok(session.clone())
    }

    /// Records a reviewer's decision. Only sessions under review accept one;
    /// the first writer wins and later callers see `AlreadyDecided`.
    pub fn decide(
        &self,
        id: SessionId,
        decision: Decision,
        reviewer: &Reviewer,
    ) -> Result<DecideOutcome, ApprovalError> {
        let mut table = self.lock();
        let session = table
            .sessions
            .get_mut(&id)
            .ok_or(ApprovalError::UnknownSession(id))?;
        session.check_decidable()?;
        if reviewer.id.trim().is_empty() {
            return Err(ApprovalError::InvalidDecision(
                "reviewer id is required".to_string(),
            ));
        }
        decision.validate(session.step_count)?;

        if !decision.needs_signers() {
            let receipt = self.append_decision(session, &decision, reviewer)?;
            return Ok(self.finish(session, decision, reviewer, receipt));
        }

        if session.required.biometric && !reviewer.biometric_verified {
            return Err(ApprovalError::BiometricRequired);
        }
        if session
            .signatures
            .iter()
            .any(|signature| signature.signer == reviewer.id)
        {
            return Err(ApprovalError::DuplicateSigner(reviewer.id.clone()));
        }
        if let Some(first) = session.signatures.first() {
            if first.decision != decision {
                return Err(ApprovalError::InvalidDecision(format!(
                    "co-signers must agree: pending {} but got {}",
                    first.decision.label(),
                    decision.label()
                )));
            }
        }

        if session.remaining_signers() > 1 {
            let receipt = self.log.append(EvidenceEvent::SignatureRecorded {
                session_id: id,
                proposal_id: session.proposal_id,
                risk_tier: session.risk_tier,
                decision: decision.clone(),
                signer: reviewer.id.clone(),
                biometric_verified: reviewer.biometric_verified,
            })?;
            session.record_signature(Signature {
                signer: reviewer.id.clone(),
                biometric_verified: reviewer.biometric_verified,
                decision,
                seq: receipt.seq,
                at_ms: receipt.ts_ms,
            });
            let remaining = session.remaining_signers();
            self.events.publish(SessionEvent::from(&*session));
            tracing::info!(
                session_id = %id,
                signer = %reviewer.id,
                remaining,
                seq = receipt.seq,
                "signature recorded"
            );
            return Ok(DecideOutcome::SignatureRecorded {
                session: session.clone(),
                seq: receipt.seq,
                remaining,
            });
        }

        let receipt = self.append_decision(session, &decision, reviewer)?;
        session.record_signature(Signature {
            signer: reviewer.id.clone(),
            biometric_verified: reviewer.biometric_verified,
            decision: decision.clone(),
            seq: receipt.seq,
            at_ms: receipt.ts_ms,
        });
        Ok(self.finish(session, decision, reviewer, receipt))
    }

    fn append_decision(
        &self,
        session: &ApprovalSession,
        decision: &Decision,
        reviewer: &Reviewer,
    ) -> Result<Receipt, ApprovalError> {
        let mut signers: Vec<String> = session
            .signatures
            .iter()
            .map(|signature| signature.signer.clone())
            .collect();
        if decision.needs_signers() {
            signers.push(reviewer.id.clone());
        }
        Ok(self.log.append(EvidenceEvent::DecisionRecorded {
            session_id: session.id,
            proposal_id: session.proposal_id,
            risk_tier: session.risk_tier,
            decision: decision.clone(),
            decided_by: reviewer.id.clone(),
            biometric_verified: reviewer.biometric_verified,
            signers,
        })?)
    }

    fn finish(
        &self,
        session: &mut ApprovalSession,
        decision: Decision,
        reviewer: &Reviewer,
        receipt: Receipt,
    ) -> DecideOutcome {
        session.record_decision(DecisionRecord {
            decision,
            decided_by: reviewer.id.clone(),
            seq: receipt.seq,
            at_ms: receipt.ts_ms,
        });
        self.events.publish(SessionEvent::from(&*session));
        tracing::info!(
            session_id = %session.id,
            proposal_id = %session.proposal_id,
            state = session.state.label(),
            seq = receipt.seq,
            "decision recorded"
        );
        DecideOutcome::Decided {
            session: session.clone(),
            seq: receipt.seq,
        }
    }
}

#[cfg(test)]
mod tests;
