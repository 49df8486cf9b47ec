use std::sync::Arc;
use std::sync::Mutex;

use tokio::sync::broadcast;

use crate::access_report::access_report;
use crate::access_report::AccessReport;
use crate::approval::ApprovalSession;
use crate::approval::DecideOutcome;
use crate::approval::Decision;
use crate::approval::Reviewer;
use crate::approval::SessionId;
use crate::approval::SessionStore;
use crate::clock::Clock;
use crate::config::Config;
use crate::entitlement::tier_satisfies;
use crate::entitlement::EntitlementSource;
use crate::entitlement::LimitDecision;
use crate::entitlement::LimitKind;
use crate::entitlement::QuotaGate;
use crate::entitlement::SubscriptionTier;
use crate::error::ApprovalError;
use crate::error::OperatorError;
use crate::error::SkillFailure;
use crate::error::StorageError;
use crate::events::SessionEvent;
use crate::persistence::export_json;
use crate::persistence::replay;
use crate::persistence::EvidenceEvent;
use crate::persistence::EvidenceLog;
use crate::policy_engine::ApprovalPolicy;
use crate::proposal::ProposalId;
use crate::proposal::ProposalPack;
use crate::proposal::ProposalStore;
use crate::runner::SkillClassifier;
use crate::runner::SkillInput;
use crate::runner::SkillRunner;

/// Collaborators injected into [`OperatorService::open`].
pub struct OperatorDeps {
    pub config: Config,
    pub clock: Arc<dyn Clock>,
    pub entitlements: Arc<dyn EntitlementSource>,
    pub classifier: Arc<dyn SkillClassifier>,
    pub log: Arc<dyn EvidenceLog>,
    pub policy: ApprovalPolicy,
}

/// The one process-wide entry point for presentation layers. Nothing here
/// carries out a proposed action.
pub struct OperatorService {
    config: Config,
    clock: Arc<dyn Clock>,
    entitlements: Arc<dyn EntitlementSource>,
    gate: QuotaGate,
    runner: SkillRunner,
    proposals: ProposalStore,
    sessions: SessionStore,
    log: Arc<dyn EvidenceLog>,
    // Held across a whole revise or escalation round.
    follow_ups: Mutex<()>,
}

impl OperatorService {
    /// Builds the service and resumes from whatever the evidence log holds.
    pub fn open(deps: OperatorDeps) -> Result<Self, StorageError> {
        let OperatorDeps {
            config,
            clock,
            entitlements,
            classifier,
            log,
            policy,
        } = deps;

        let ledger = replay(&log.load()?);
        let runner = SkillRunner::new(
            classifier,
            policy,
            Arc::clone(&clock),
            config.skills.max_input_chars,
        );
        runner.resume_after(ledger.last_proposal_id);
        let proposals = ProposalStore::new();
        for proposal in ledger.proposals {
            proposals.insert(proposal);
        }
        let sessions = SessionStore::restore(Arc::clone(&log), ledger.sessions);
        tracing::debug!(
            proposals = proposals.len(),
            last_seq = ledger.last_seq,
            classifier = runner.classifier_name(),
            "operator service resumed from evidence log"
        );

        Ok(Self {
            gate: QuotaGate::new(config.quota.clone()),
            config,
            clock,
            entitlements,
            runner,
            proposals,
            sessions,
            log,
            follow_ups: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tier(&self) -> SubscriptionTier {
        self.entitlements.tier()
    }

    /// Never errors. If usage cannot be read, metered actions are denied.
    pub fn check_quota(&self, action: &str) -> LimitDecision {
        let now = self.clock.now();
        match self.entitlements.usage(now) {
            Ok(usage) => self.gate.check(action, self.tier(), &usage, now),
            Err(err) => {
                tracing::warn!(action, error = %err, "usage counters unavailable");
                match LimitKind::parse(action) {
                    Some(kind) => {
                        LimitDecision::deny(Some(kind), "Usage counters unavailable", None)
                    }
                    None => self
                        .gate
                        .check(action, self.tier(), &Default::default(), now),
                }
            }
        }
    }

    /// Generates and stores a proposal. Input is validated first, then tier
    /// and quota are checked before the classifier runs.
    pub fn run_skill(
        &self,
        skill_id: &str,
        input: &SkillInput,
    ) -> Result<Arc<ProposalPack>, OperatorError> {
        self.generate(skill_id, input, None)
    }

    fn generate(
        &self,
        skill_id: &str,
        input: &SkillInput,
        revision_of: Option<ProposalId>,
    ) -> Result<Arc<ProposalPack>, OperatorError> {
        let (spec, _) = self.runner.validate(skill_id, input)?;
        let tier = self.tier();
        if !tier_satisfies(tier, spec.min_tier) {
            return Err(SkillFailure::NotEntitled {
                skill: spec.id.as_str(),
                required: spec.min_tier,
            }
            .into());
        }
        let now = self.clock.now();
        let usage = self.entitlements.usage(now)?;
        for kind in [LimitKind::ExecutionsWeekly, LimitKind::MemoryItems] {
            let decision = self.gate.check_limit(kind, tier, &usage, now);
            if !decision.allowed {
                tracing::info!(
                    skill_id = spec.id.as_str(),
                    limit = kind.label(),
                    "skill run blocked by quota"
                );
                return Err(SkillFailure::QuotaExceeded(decision).into());
            }
        }

        let mut pack = self.runner.run(spec.id.as_str(), input)?;
        pack.revision_of = revision_of;
        self.store_proposal(pack)
    }

    fn store_proposal(&self, pack: ProposalPack) -> Result<Arc<ProposalPack>, OperatorError> {
        let receipt = self.log.append(EvidenceEvent::ProposalGenerated {
            proposal: pack.clone(),
        })?;
        tracing::info!(
            proposal_id = %pack.id,
            skill_id = pack.skill_id.as_str(),
            risk_tier = pack.risk_tier().label(),
            seq = receipt.seq,
            "proposal generated"
        );
        Ok(self.proposals.insert(pack))
    }

    /// Routes a stored proposal and presents it, returning the session under
    /// review.
    pub fn route_for_approval(
        &self,
        proposal_id: ProposalId,
    ) -> Result<ApprovalSession, OperatorError> {
        self.route_round(proposal_id, None)
    }

    fn route_round(
        &self,
        proposal_id: ProposalId,
        supersedes: Option<SessionId>,
    ) -> Result<ApprovalSession, OperatorError> {
        let pack = self
            .proposals
            .get(proposal_id)
            .ok_or(ApprovalError::UnknownProposal(proposal_id))?;
        let routed = self.sessions.route(&pack, supersedes)?;
        Ok(self.sessions.present(routed.id)?)
    }

    pub fn record_decision(
        &self,
        session_id: SessionId,
        decision: Decision,
        reviewer: &Reviewer,
    ) -> Result<DecideOutcome, OperatorError> {
        Ok(self.sessions.decide(session_id, decision, reviewer)?)
    }

    /// Next round after `revision_requested` or `escalated`: reruns the skill
    /// on new text and routes the result into a new session.
    pub fn revise(
        &self,
        session_id: SessionId,
        text: &str,
    ) -> Result<ApprovalSession, OperatorError> {
        let _round = self.lock_follow_ups();
        let previous = self.returned_proposal(session_id)?;
        let input = SkillInput {
            kind: previous.input_kind,
            text: text.to_string(),
        };
        let pack = self.generate(previous.skill_id.as_str(), &input, Some(previous.id))?;
        self.route_round(pack.id, Some(session_id))
    }

    /// Reissues the returned proposal for a higher authority: one more signer
    /// and biometric verification.
    pub fn escalate_round(&self, session_id: SessionId) -> Result<ApprovalSession, OperatorError> {
        let _round = self.lock_follow_ups();
        let previous = self.returned_proposal(session_id)?;
        let pack = self.runner.reissue_for_escalation(&previous);
        let pack = self.store_proposal(pack)?;
        self.route_round(pack.id, Some(session_id))
    }

    /// Only one follow-up round is generated at a time, so a returned session
    /// is checked and superseded without another round slipping in between.
    fn lock_follow_ups(&self) -> std::sync::MutexGuard<'_, ()> {
        self.follow_ups.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn returned_proposal(&self, session_id: SessionId) -> Result<Arc<ProposalPack>, OperatorError> {
        let session = self
            .sessions
            .get(session_id)
            .ok_or(ApprovalError::UnknownSession(session_id))?;
        self.sessions.check_supersedable(session_id)?;
        Ok(self
            .proposals
            .get(session.proposal_id)
            .ok_or(ApprovalError::UnknownProposal(session.proposal_id))?)
    }

    pub fn session(&self, session_id: SessionId) -> Option<ApprovalSession> {
        self.sessions.get(session_id)
    }

    pub fn proposal(&self, proposal_id: ProposalId) -> Option<Arc<ProposalPack>> {
        self.proposals.get(proposal_id)
    }

    pub fn sessions(&self) -> Vec<ApprovalSession> {
        self.sessions.list()
    }

    pub fn export_evidence(&self) -> Result<String, OperatorError> {
        Ok(export_json(&self.log.load()?)?)
    }

    pub fn access_report(&self) -> Result<AccessReport, OperatorError> {
        let now = self.clock.now();
        let usage = self.entitlements.usage(now)?;
        Ok(access_report(&self.gate, self.tier(), &usage, now))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sessions.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::approval::SessionState;
    use crate::clock::FixedClock;
    use crate::persistence::JsonlEvidenceLog;
    use crate::persistence::MemoryEvidenceLog;
    use crate::proposal::ActionVerb;
    use crate::proposal::ConsequenceTier;
    use crate::runner::ClassifierError;
    use crate::runner::ClassifierOutput;
    use crate::runner::ProposedAction;
    use crate::skill_registry::SkillSpec;
    use crate::usage::LedgerEntitlements;

    /// Maps the first word of the input to a verb.
    struct VerbClassifier;

    impl SkillClassifier for VerbClassifier {
        fn name(&self) -> &'static str {
            "verb"
        }

        fn classify(
            &self,
            _skill: &SkillSpec,
            input: &SkillInput,
        ) -> Result<ClassifierOutput, ClassifierError> {
            let verb = match input.text.split_whitespace().next() {
                Some("pay") => ActionVerb::Payment,
                Some("send") => ActionVerb::Send,
                Some("move") => ActionVerb::Modify,
                Some("fail") => return Err(ClassifierError("model offline".to_string())),
                _ => ActionVerb::Draft,
            };
            Ok(ClassifierOutput {
                summary: String::new(),
                actions: vec![ProposedAction {
                    verb,
                    target: None,
                    description: input.text.clone(),
                    external_recipients: 0,
                }],
            })
        }
    }

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 10, 21, 9, 0, 0).unwrap(),
        ))
    }

    fn service_with(
        tier: SubscriptionTier,
        log: Arc<dyn EvidenceLog>,
        clock: Arc<FixedClock>,
        config: Config,
    ) -> OperatorService {
        OperatorService::open(OperatorDeps {
            entitlements: Arc::new(LedgerEntitlements::new(
                tier,
                config.quota.week_start,
                Arc::clone(&log),
            )),
            config,
            clock,
            classifier: Arc::new(VerbClassifier),
            log,
            policy: ApprovalPolicy::builtin(),
        })
        .expect("open service")
    }

    fn service(tier: SubscriptionTier) -> (OperatorService, Arc<MemoryEvidenceLog>) {
        let clock = clock();
        let log = Arc::new(MemoryEvidenceLog::new(clock.clone()));
        let service = service_with(tier, log.clone(), clock, Config::default());
        (service, log)
    }

    fn text(text: &str) -> SkillInput {
        SkillInput::free_text(text)
    }

    #[test]
    fn run_route_reject_then_second_decision_fails() {
        let (service, log) = service(SubscriptionTier::Free);
        let pack = service
            .run_skill("inbox_triage", &text("draft a polite decline"))
            .expect("run");
        assert!(pack.risk_tier() <= ConsequenceTier::Medium);
        assert!(!pack.approvals.biometric);

        let session = service.route_for_approval(pack.id).expect("route");
        assert_eq!(session.state, SessionState::UnderReview);

        let outcome = service
            .record_decision(
                session.id,
                Decision::Reject { reason: None },
                &Reviewer::new("ana", false),
            )
            .expect("reject");
        assert_eq!(outcome.session().state, SessionState::Rejected);

        let err = service
            .record_decision(session.id, Decision::Approve, &Reviewer::new("ana", false))
            .expect_err("second decision");
        assert!(matches!(
            err,
            OperatorError::Approval(ApprovalError::AlreadyDecided { .. })
        ));
        assert_eq!(
            service.session(session.id).map(|s| s.state),
            Some(SessionState::Rejected)
        );
        assert_eq!(log.load().expect("load").len(), 4);
    }

    #[test]
    fn stored_proposals_read_back_identically() {
        let (service, _log) = service(SubscriptionTier::Pro);
        let pack = service
            .run_skill("calendar_defrag", &text("move standup to thursday"))
            .expect("run");
        let first = service.proposal(pack.id).expect("stored");
        let second = service.proposal(pack.id).expect("stored");
        assert_eq!(first, second);
        assert_eq!(*first, *pack);
    }

    #[test]
    fn tier_gating_precedes_classification() {
        let (service, log) = service(SubscriptionTier::Free);
        let err = service
            .run_skill("delegation_router", &text("send to team"))
            .expect_err("locked");
        assert!(matches!(
            err,
            OperatorError::Skill(SkillFailure::NotEntitled {
                required: SubscriptionTier::Team,
                ..
            })
        ));
        assert!(log.load().expect("load").is_empty());
    }

    #[test]
    fn weekly_quota_blocks_runs_with_reset_time() {
        let clock = clock();
        let log = Arc::new(MemoryEvidenceLog::new(clock.clone()));
        let mut config = Config::default();
        config.quota.free_executions_weekly = 2;
        let service = service_with(SubscriptionTier::Free, log, clock.clone(), config);

        for _ in 0..2 {
            service
                .run_skill("meeting_prep", &text("draft agenda"))
                .expect("within quota");
        }
        let err = service
            .run_skill("meeting_prep", &text("draft agenda"))
            .expect_err("over quota");
        let OperatorError::Skill(SkillFailure::QuotaExceeded(decision)) = err else {
            panic!("expected a quota failure");
        };
        assert_eq!(decision.reason.as_deref(), Some("Weekly limit reached"));
        assert_eq!(
            decision.reset_at,
            Some(Utc.with_ymd_and_hms(2026, 10, 26, 0, 0, 0).unwrap())
        );
        assert!(!service.check_quota("executions_weekly").allowed);
        assert!(service.check_quota("export_pdf").allowed);

        clock.set(Utc.with_ymd_and_hms(2026, 10, 26, 0, 0, 0).unwrap());
        assert!(service.check_quota("executionsWeekly").allowed);
        service
            .run_skill("meeting_prep", &text("draft agenda"))
            .expect("new week");
    }

    #[test]
    fn classifier_and_input_failures_store_nothing() {
        let (service, log) = service(SubscriptionTier::Free);
        let err = service
            .run_skill("inbox_triage", &text("   "))
            .expect_err("empty");
        assert!(matches!(err, OperatorError::Skill(SkillFailure::EmptyInput)));
        let err = service
            .run_skill("inbox_triage", &text("fail please"))
            .expect_err("classifier");
        assert!(matches!(
            err,
            OperatorError::Skill(SkillFailure::Classification(ref msg)) if msg == "model offline"
        ));
        assert!(log.load().expect("load").is_empty());
    }

    #[test]
    fn blank_input_is_an_input_error_even_at_the_limit() {
        use crate::entitlement::StaticEntitlements;
        use crate::entitlement::UsageSnapshot;

        let clock = clock();
        let log = Arc::new(MemoryEvidenceLog::new(clock.clone()));
        let service = OperatorService::open(OperatorDeps {
            config: Config::default(),
            clock,
            entitlements: Arc::new(StaticEntitlements {
                tier: SubscriptionTier::Free,
                usage: UsageSnapshot {
                    executions_this_week: 10,
                    memory_items: 0,
                },
            }),
            classifier: Arc::new(VerbClassifier),
            log: log.clone(),
            policy: ApprovalPolicy::builtin(),
        })
        .expect("open service");

        let err = service
            .run_skill("inbox_triage", &text("   "))
            .expect_err("blank");
        assert!(matches!(err, OperatorError::Skill(SkillFailure::EmptyInput)));
        let err = service
            .run_skill("inbox_triage", &text("draft reply"))
            .expect_err("over quota");
        assert!(matches!(
            err,
            OperatorError::Skill(SkillFailure::QuotaExceeded(_))
        ));
        assert!(log.load().expect("load").is_empty());
    }

    #[test]
    fn unavailable_log_surfaces_storage_error() {
        let (service, log) = service(SubscriptionTier::Pro);
        let pack = service
            .run_skill("inbox_triage", &text("draft reply"))
            .expect("run");
        let session = service.route_for_approval(pack.id).expect("route");

        log.set_available(false);
        let err = service
            .record_decision(session.id, Decision::Approve, &Reviewer::new("ana", false))
            .expect_err("offline");
        assert!(matches!(
            err,
            OperatorError::Approval(ApprovalError::Storage(_))
        ));
        assert_eq!(
            service.session(session.id).map(|s| s.state),
            Some(SessionState::UnderReview)
        );
        assert!(!service.check_quota("memory_items").allowed);
        assert!(service.export_evidence().is_err());
    }

    #[test]
    fn revise_starts_a_linked_round_with_a_new_proposal() {
        let (service, _log) = service(SubscriptionTier::Free);
        let pack = service
            .run_skill("inbox_triage", &text("send the full thread"))
            .expect("run");
        let session = service.route_for_approval(pack.id).expect("route");

        let err = service.revise(session.id, "draft a summary").expect_err("not returned");
        assert!(matches!(
            err,
            OperatorError::Approval(ApprovalError::NotReturned { .. })
        ));

        service
            .record_decision(
                session.id,
                Decision::RequestRevision {
                    note: "summarize instead".to_string(),
                },
                &Reviewer::new("ana", false),
            )
            .expect("request revision");
        let next = service.revise(session.id, "draft a summary").expect("revise");
        assert_eq!(next.supersedes, Some(session.id));
        assert_eq!(next.state, SessionState::UnderReview);
        assert_ne!(next.proposal_id, pack.id);

        let revised = service.proposal(next.proposal_id).expect("revised");
        assert_eq!(revised.revision_of, Some(pack.id));
        assert_eq!(revised.risk_tier(), ConsequenceTier::Low);
        assert_eq!(service.proposal(pack.id).expect("original").steps, pack.steps);

        let err = service.revise(session.id, "again").expect_err("already superseded");
        assert!(matches!(
            err,
            OperatorError::Approval(ApprovalError::AlreadySuperseded { .. })
        ));
    }

    #[test]
    fn escalation_round_requires_more_signers() {
        let (service, _log) = service(SubscriptionTier::Free);
        let pack = service
            .run_skill("inbox_triage", &text("move the offsite"))
            .expect("run");
        assert_eq!(pack.approvals.signer_count, 1);
        let session = service.route_for_approval(pack.id).expect("route");
        service
            .record_decision(
                session.id,
                Decision::Escalate {
                    note: "needs manager".to_string(),
                },
                &Reviewer::new("ana", false),
            )
            .expect("escalate");

        let next = service.escalate_round(session.id).expect("next round");
        assert_eq!(next.required.signer_count, 2);
        assert!(next.required.biometric);

        let first = service
            .record_decision(next.id, Decision::Approve, &Reviewer::new("ana", true))
            .expect("first signer");
        assert!(matches!(first, DecideOutcome::SignatureRecorded { remaining: 1, .. }));
        let done = service
            .record_decision(next.id, Decision::Approve, &Reviewer::new("lee", true))
            .expect("second signer");
        assert_eq!(done.session().state, SessionState::Approved);
    }

    #[test]
    fn racing_escalations_generate_a_single_round() {
        use std::sync::Barrier;
        use std::thread;

        let (service, log) = service(SubscriptionTier::Free);
        let service = Arc::new(service);
        let pack = service
            .run_skill("inbox_triage", &text("move the offsite"))
            .expect("run");
        let session = service.route_for_approval(pack.id).expect("route");
        service
            .record_decision(
                session.id,
                Decision::Escalate {
                    note: "needs manager".to_string(),
                },
                &Reviewer::new("ana", false),
            )
            .expect("escalate");

        let barrier = Arc::new(Barrier::new(4));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let service = Arc::clone(&service);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    service.escalate_round(session.id)
                })
            })
            .collect();
        let results: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().expect("thread"))
            .collect();
        assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
        assert!(results.iter().all(|result| match result {
            Ok(_) => true,
            Err(err) => matches!(
                err,
                OperatorError::Approval(ApprovalError::AlreadySuperseded { .. })
            ),
        }));

        let generated = log
            .load()
            .expect("load")
            .iter()
            .filter(|record| record.event.kind() == "proposal_generated")
            .count();
        assert_eq!(generated, 2);
        assert_eq!(service.sessions().len(), 2);
    }

    #[test]
    fn subscribers_observe_transitions() {
        let (service, _log) = service(SubscriptionTier::Free);
        let mut rx = service.subscribe();
        let pack = service
            .run_skill("inbox_triage", &text("draft reply"))
            .expect("run");
        let session = service.route_for_approval(pack.id).expect("route");
        service
            .record_decision(session.id, Decision::Approve, &Reviewer::new("ana", false))
            .expect("approve");

        let states: Vec<SessionState> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|event| event.state)
            .collect();
        assert_eq!(
            states,
            vec![
                SessionState::Pending,
                SessionState::UnderReview,
                SessionState::Approved
            ]
        );
    }

    #[test]
    fn reopened_service_resumes_from_jsonl_ledger() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let path = dir.path().join("evidence.jsonl");
        let clock = clock();

        let session_id = {
            let log: Arc<dyn EvidenceLog> =
                Arc::new(JsonlEvidenceLog::open(&path, clock.clone()).expect("open"));
            let service = service_with(SubscriptionTier::Free, log, clock.clone(), Config::default());
            let pack = service
                .run_skill("inbox_triage", &text("pay the invoice"))
                .expect("run");
            assert_eq!(pack.risk_tier(), ConsequenceTier::Critical);
            let session = service.route_for_approval(pack.id).expect("route");
            service
                .record_decision(session.id, Decision::Approve, &Reviewer::new("ana", true))
                .expect("first signature");
            session.id
        };

        let log: Arc<dyn EvidenceLog> =
            Arc::new(JsonlEvidenceLog::open(&path, clock.clone()).expect("reopen"));
        let service = service_with(SubscriptionTier::Free, log, clock, Config::default());
        let restored = service.session(session_id).expect("restored session");
        assert_eq!(restored.state, SessionState::UnderReview);
        assert_eq!(restored.signatures.len(), 1);

        let err = service
            .record_decision(session_id, Decision::Approve, &Reviewer::new("ana", true))
            .expect_err("duplicate signer after restart");
        assert!(matches!(
            err,
            OperatorError::Approval(ApprovalError::DuplicateSigner(_))
        ));
        service
            .record_decision(session_id, Decision::Approve, &Reviewer::new("bo", true))
            .expect("second signature");

        let next = service
            .run_skill("inbox_triage", &text("draft thanks"))
            .expect("run");
        assert_eq!(next.id, ProposalId(2));

        let rows: Vec<serde_json::Value> =
            serde_json::from_str(&service.export_evidence().expect("export")).expect("json");
        let kinds: Vec<&str> = rows
            .iter()
            .map(|row| row["kind"].as_str().unwrap_or_default())
            .collect();
        assert_eq!(
            kinds,
            vec![
                "proposal_generated",
                "session_routed",
                "session_presented",
                "signature_recorded",
                "decision_recorded",
                "proposal_generated"
            ]
        );
    }

    #[test]
    fn access_report_reflects_ledger_usage() {
        let (service, _log) = service(SubscriptionTier::Free);
        let report = service.access_report().expect("report");
        assert_eq!(report.available_count, 2);
        service
            .run_skill("inbox_triage", &text("draft reply"))
            .expect("run");
        let report = service.access_report().expect("report");
        assert_eq!(report.usage.executions_this_week, 1);
        assert_eq!(report.usage.memory_items, 1);
    }
}
