use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::RwLock;

use serde::Deserialize;
use serde::Serialize;

use crate::skill_registry::InputKind;
use crate::skill_registry::SkillId;
use crate::skill_registry::TargetSystem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProposalId(pub u64);

impl ProposalId {
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        input
            .strip_prefix("prop-")
            .unwrap_or(input)
            .parse()
            .ok()
            .map(Self)
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "prop-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsequenceTier {
    Low,
    Medium,
    High,
    Critical,
}

impl ConsequenceTier {
    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn bump(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High | Self::Critical => Self::Critical,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReversibilityClass {
    Reversible,
    PartiallyReversible,
    Irreversible,
}

impl ReversibilityClass {
    pub fn label(self) -> &'static str {
        match self {
            Self::Reversible => "reversible",
            Self::PartiallyReversible => "partially_reversible",
            Self::Irreversible => "irreversible",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionVerb {
    Read,
    Draft,
    Create,
    Modify,
    Send,
    Share,
    Delete,
    Payment,
}

impl ActionVerb {
    pub fn label(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Draft => "draft",
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Send => "send",
            Self::Share => "share",
            Self::Delete => "delete",
            Self::Payment => "payment",
        }
    }

    pub fn base_tier(self) -> ConsequenceTier {
        match self {
            Self::Read | Self::Draft => ConsequenceTier::Low,
            Self::Create | Self::Modify => ConsequenceTier::Medium,
            Self::Send | Self::Share | Self::Delete => ConsequenceTier::High,
            Self::Payment => ConsequenceTier::Critical,
        }
    }

    pub fn reversibility(self) -> ReversibilityClass {
        match self {
            Self::Read | Self::Draft | Self::Create => ReversibilityClass::Reversible,
            Self::Modify => ReversibilityClass::PartiallyReversible,
            Self::Send | Self::Share | Self::Delete | Self::Payment => {
                ReversibilityClass::Irreversible
            }
        }
    }
}

/// Recipients beyond this count raise a step's consequence tier by one.
pub const WIDE_AUDIENCE_RECIPIENTS: u32 = 5;

/// One advisory step. Nothing in this crate carries a step out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub index: usize,
    pub verb: ActionVerb,
    pub target: TargetSystem,
    pub description: String,
    pub external_recipients: u32,
    pub consequence: ConsequenceTier,
    pub reversibility: ReversibilityClass,
}

impl ExecutionStep {
    pub fn new(
        index: usize,
        verb: ActionVerb,
        target: TargetSystem,
        description: String,
        external_recipients: u32,
    ) -> Self {
        let mut consequence = verb.base_tier();
        if external_recipients > WIDE_AUDIENCE_RECIPIENTS {
            consequence = consequence.bump();
        }
        Self {
            index,
            verb,
            target,
            description,
            external_recipients,
            consequence,
            reversibility: verb.reversibility(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAnalysis {
    pub consequence_tier: ConsequenceTier,
    pub reversibility: ReversibilityClass,
    pub rationale: Vec<String>,
}

pub fn analyze_steps(steps: &[ExecutionStep]) -> RiskAnalysis {
    let consequence_tier = steps
        .iter()
        .map(|step| step.consequence)
        .max()
        .unwrap_or(ConsequenceTier::Low);
    let reversibility = steps
        .iter()
        .map(|step| step.reversibility)
        .max()
        .unwrap_or(ReversibilityClass::Reversible);
    let rationale = steps
        .iter()
        .filter(|step| step.consequence == consequence_tier)
        .map(|step| {
            format!(
                "step {}: {} on {} is {} risk ({})",
                step.index,
                step.verb.label(),
                step.target.label(),
                step.consequence.label(),
                step.reversibility.label()
            )
        })
        .collect();
    RiskAnalysis {
        consequence_tier,
        reversibility,
        rationale,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredApprovals {
    #[serde(alias = "signers", default = "default_signer_count")]
    pub signer_count: u8,
    #[serde(default)]
    pub biometric: bool,
}

fn default_signer_count() -> u8 {
    1
}

impl Default for RequiredApprovals {
    fn default() -> Self {
        Self {
            signer_count: 1,
            biometric: false,
        }
    }
}

impl RequiredApprovals {
    /// At least one human always signs.
    pub fn normalized(self) -> Self {
        Self {
            signer_count: self.signer_count.max(1),
            biometric: self.biometric,
        }
    }
}

/// Immutable, advisory description of a candidate set of actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalPack {
    pub id: ProposalId,
    pub skill_id: SkillId,
    pub input_kind: InputKind,
    pub created_at_ms: i64,
    pub summary: String,
    pub steps: Vec<ExecutionStep>,
    pub risk: RiskAnalysis,
    pub approvals: RequiredApprovals,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_of: Option<ProposalId>,
}

impl ProposalPack {
    pub fn risk_tier(&self) -> ConsequenceTier {
        self.risk.consequence_tier
    }

    /// Same steps under stricter sign-off, for a higher authority.
    pub fn reissued_for_escalation(&self, id: ProposalId, created_at_ms: i64) -> Self {
        Self {
            id,
            skill_id: self.skill_id,
            input_kind: self.input_kind,
            created_at_ms,
            summary: self.summary.clone(),
            steps: self.steps.clone(),
            risk: self.risk.clone(),
            approvals: RequiredApprovals {
                signer_count: self.approvals.signer_count.saturating_add(1),
                biometric: true,
            },
            revision_of: Some(self.id),
        }
    }
}

/// Insert-only store. Stored packs are shared behind `Arc` and never replaced.
#[derive(Debug, Default)]
pub struct ProposalStore {
    packs: RwLock<BTreeMap<ProposalId, Arc<ProposalPack>>>,
}

impl ProposalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored pack. An existing id keeps its original content.
    pub fn insert(&self, pack: ProposalPack) -> Arc<ProposalPack> {
        let mut packs = self.packs.write().unwrap_or_else(|err| err.into_inner());
        packs
            .entry(pack.id)
            .or_insert_with(|| Arc::new(pack))
            .clone()
    }

    pub fn get(&self, id: ProposalId) -> Option<Arc<ProposalPack>> {
        self.packs
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .get(&id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.packs.read().unwrap_or_else(|err| err.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_id(&self) -> Option<ProposalId> {
        self.packs
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .keys()
            .next_back()
            .copied()
    }
}
