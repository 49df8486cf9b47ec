use std::sync::Arc;

use chrono::TimeZone;
use chrono::Utc;

pub(super) use super::ApprovalSession;
pub(super) use super::DecideOutcome;
pub(super) use super::Decision;
pub(super) use super::Reviewer;
pub(super) use super::SessionId;
pub(super) use super::SessionState;
pub(super) use super::SessionStore;
pub(super) use crate::clock::Clock;
pub(super) use crate::clock::FixedClock;
pub(super) use crate::error::ApprovalError;
pub(super) use crate::persistence::replay;
pub(super) use crate::persistence::EvidenceEvent;
pub(super) use crate::persistence::EvidenceLog;
pub(super) use crate::persistence::MemoryEvidenceLog;
pub(super) use crate::proposal::analyze_steps;
pub(super) use crate::proposal::ActionVerb;
pub(super) use crate::proposal::ExecutionStep;
pub(super) use crate::proposal::ProposalId;
pub(super) use crate::proposal::ProposalPack;
pub(super) use crate::proposal::RequiredApprovals;
pub(super) use crate::skill_registry::InputKind;
pub(super) use crate::skill_registry::SkillId;
pub(super) use crate::skill_registry::TargetSystem;

mod concurrency;

fn clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap(),
    ))
}

fn memory_log() -> Arc<MemoryEvidenceLog> {
    Arc::new(MemoryEvidenceLog::new(clock()))
}

fn store_with(log: Arc<MemoryEvidenceLog>) -> SessionStore {
    SessionStore::new(log)
}

fn proposal(id: u64, verbs: &[ActionVerb], approvals: RequiredApprovals) -> ProposalPack {
    let steps: Vec<ExecutionStep> = verbs
        .iter()
        .enumerate()
        .map(|(index, verb)| {
            ExecutionStep::new(
                index,
                *verb,
                TargetSystem::Mail,
                format!("{} item {index}", verb.label()),
                0,
            )
        })
        .collect();
    ProposalPack {
        id: ProposalId(id),
        skill_id: SkillId::InboxTriage,
        input_kind: InputKind::EmailThread,
        created_at_ms: 0,
        summary: "triage".to_string(),
        risk: analyze_steps(&steps),
        steps,
        approvals,
        revision_of: None,
    }
}

fn single_signer() -> RequiredApprovals {
    RequiredApprovals::default()
}

fn reviewer(id: &str) -> Reviewer {
    Reviewer::new(id, false)
}

fn verified(id: &str) -> Reviewer {
    Reviewer::new(id, true)
}

/// Routes and presents a proposal, returning the session under review.
fn under_review(store: &SessionStore, pack: &ProposalPack) -> ApprovalSession {
    let session = store.route(pack, None).expect("route");
    store.present(session.id).expect("present")
}

fn kinds(log: &MemoryEvidenceLog) -> Vec<&'static str> {
    log.load()
        .expect("load")
        .iter()
        .map(|record| record.event.kind())
        .collect()
}
