use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::clock::Clock;
use crate::error::SkillFailure;
use crate::policy_engine::ApprovalPolicy;
use crate::policy_engine::Signals;
use crate::proposal::analyze_steps;
use crate::proposal::ActionVerb;
use crate::proposal::ExecutionStep;
use crate::proposal::ProposalId;
use crate::proposal::ProposalPack;
use crate::skill_registry::InputKind;
use crate::skill_registry::SkillRegistry;
use crate::skill_registry::SkillSpec;
use crate::skill_registry::TargetSystem;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillInput {
    pub kind: InputKind,
    pub text: String,
}

impl SkillInput {
    pub fn free_text(text: impl Into<String>) -> Self {
        Self {
            kind: InputKind::FreeText,
            text: text.into(),
        }
    }
}

/// Structured action as reported by a classifier. `target` falls back to the
/// skill's default target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedAction {
    pub verb: ActionVerb,
    #[serde(default)]
    pub target: Option<TargetSystem>,
    pub description: String,
    #[serde(default)]
    pub external_recipients: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierOutput {
    #[serde(default)]
    pub summary: String,
    pub actions: Vec<ProposedAction>,
}

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ClassifierError(pub String);

/// Turns skill input into structured actions. Implementations must not touch
/// the systems named in their output.
pub trait SkillClassifier: Send + Sync {
    fn name(&self) -> &'static str;

    fn classify(
        &self,
        skill: &SkillSpec,
        input: &SkillInput,
    ) -> Result<ClassifierOutput, ClassifierError>;
}

/// Produces proposal packs. Risk tier and required approvals depend only on
/// the classifier's structured output.
pub struct SkillRunner {
    classifier: Arc<dyn SkillClassifier>,
    policy: ApprovalPolicy,
    clock: Arc<dyn Clock>,
    max_input_chars: usize,
    next_id: AtomicU64,
}

impl SkillRunner {
    pub fn new(
        classifier: Arc<dyn SkillClassifier>,
        policy: ApprovalPolicy,
        clock: Arc<dyn Clock>,
        max_input_chars: usize,
    ) -> Self {
        Self {
            classifier,
            policy,
            clock,
            max_input_chars,
            next_id: AtomicU64::new(1),
        }
    }

    /// Continue id allocation after replayed proposals.
    pub fn resume_after(&self, last: Option<ProposalId>) {
        let next = last.map_or(1, |id| id.0.saturating_add(1));
        self.next_id.fetch_max(next, Ordering::SeqCst);
    }

    pub fn classifier_name(&self) -> &'static str {
        self.classifier.name()
    }

    fn allocate_id(&self) -> ProposalId {
        ProposalId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Input checks that need no classifier: known skill, non-blank text,
    /// accepted kind and length. Returns the skill and the trimmed input.
    pub fn validate(
        &self,
        skill_id: &str,
        input: &SkillInput,
    ) -> Result<(&'static SkillSpec, SkillInput), SkillFailure> {
        let spec = SkillRegistry::lookup(skill_id)
            .ok_or_else(|| SkillFailure::UnknownSkill(skill_id.trim().to_string()))?;
        let text = input.text.trim();
        if text.is_empty() {
            return Err(SkillFailure::EmptyInput);
        }
        if !spec.accepts(input.kind) {
            return Err(SkillFailure::UnsupportedInput {
                skill: spec.id.as_str(),
                kind: input.kind.label(),
            });
        }
        let len = text.chars().count();
        if len > self.max_input_chars {
            return Err(SkillFailure::InputTooLong {
                len,
                max: self.max_input_chars,
            });
        }

        Ok((
            spec,
            SkillInput {
                kind: input.kind,
                text: text.to_string(),
            },
        ))
    }

    pub fn run(&self, skill_id: &str, input: &SkillInput) -> Result<ProposalPack, SkillFailure> {
        let (spec, normalized) = self.validate(skill_id, input)?;
        let output = self
            .classifier
            .classify(spec, &normalized)
            .map_err(|err| {
                tracing::warn!(
                    skill_id = spec.id.as_str(),
                    classifier = self.classifier.name(),
                    error = %err,
                    "skill classification failed"
                );
                let message = err.0.trim();
                SkillFailure::Classification(if message.is_empty() {
                    "the skill could not produce a proposal".to_string()
                } else {
                    message.to_string()
                })
            })?;
        if output.actions.is_empty() {
            return Err(SkillFailure::Classification(
                "classifier proposed no actions".to_string(),
            ));
        }

        let steps: Vec<ExecutionStep> = output
            .actions
            .into_iter()
            .enumerate()
            .map(|(index, action)| {
                ExecutionStep::new(
                    index,
                    action.verb,
                    action.target.unwrap_or(spec.default_target),
                    action.description.trim().to_string(),
                    action.external_recipients,
                )
            })
            .collect();
        let risk = analyze_steps(&steps);
        let decision = self
            .policy
            .evaluate(&Signals::from_proposal(spec.id, &steps, &risk));
        let summary = match output.summary.trim() {
            "" => format!("{}: {} proposed action(s)", spec.title, steps.len()),
            summary => summary.to_string(),
        };

        let pack = ProposalPack {
            id: self.allocate_id(),
            skill_id: spec.id,
            input_kind: input.kind,
            created_at_ms: self.clock.now().timestamp_millis(),
            summary,
            steps,
            risk,
            approvals: decision.approvals,
            revision_of: None,
        };
        tracing::debug!(
            proposal_id = %pack.id,
            skill_id = spec.id.as_str(),
            risk_tier = pack.risk.consequence_tier.label(),
            matched_rule = decision.matched_rule_id.as_deref().unwrap_or("defaults"),
            "proposal generated"
        );
        Ok(pack)
    }

    pub fn reissue_for_escalation(&self, pack: &ProposalPack) -> ProposalPack {
        pack.reissued_for_escalation(self.allocate_id(), self.clock.now().timestamp_millis())
    }
}
