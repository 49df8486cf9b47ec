use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;

use crate::entitlement::tier_satisfies;
use crate::entitlement::LimitDecision;
use crate::entitlement::LimitKind;
use crate::entitlement::QuotaGate;
use crate::entitlement::SubscriptionTier;
use crate::entitlement::UsageSnapshot;
use crate::skill_registry::SkillId;
use crate::skill_registry::SkillRegistry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SkillAccess {
    Available,
    Locked { required: SubscriptionTier },
    QuotaLimited { decision: LimitDecision },
}

impl SkillAccess {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Locked { .. } => "locked",
            Self::QuotaLimited { .. } => "quota_limited",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkillAccessOutcome {
    pub skill_id: SkillId,
    pub title: &'static str,
    #[serde(flatten)]
    pub access: SkillAccess,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessReport {
    pub tier: SubscriptionTier,
    pub usage: UsageSnapshot,
    pub outcomes: Vec<SkillAccessOutcome>,
    pub available_count: usize,
    pub locked_count: usize,
    pub quota_limited_count: usize,
}

/// Tier gating is checked before quota, so a locked skill never reports a
/// quota decision.
pub fn skill_access(
    gate: &QuotaGate,
    tier: SubscriptionTier,
    usage: &UsageSnapshot,
    now: DateTime<Utc>,
    skill_id: SkillId,
) -> SkillAccess {
    let spec = SkillRegistry::get(skill_id);
    if !tier_satisfies(tier, spec.min_tier) {
        return SkillAccess::Locked {
            required: spec.min_tier,
        };
    }
    for kind in [LimitKind::ExecutionsWeekly, LimitKind::MemoryItems] {
        let decision = gate.check_limit(kind, tier, usage, now);
        if !decision.allowed {
            return SkillAccess::QuotaLimited { decision };
        }
    }
    SkillAccess::Available
}

pub fn access_report(
    gate: &QuotaGate,
    tier: SubscriptionTier,
    usage: &UsageSnapshot,
    now: DateTime<Utc>,
) -> AccessReport {
    let outcomes: Vec<SkillAccessOutcome> = SkillRegistry::list()
        .iter()
        .map(|spec| SkillAccessOutcome {
            skill_id: spec.id,
            title: spec.title,
            access: skill_access(gate, tier, usage, now, spec.id),
        })
        .collect();

    let available_count = outcomes
        .iter()
        .filter(|outcome| matches!(outcome.access, SkillAccess::Available))
        .count();
    let locked_count = outcomes
        .iter()
        .filter(|outcome| matches!(outcome.access, SkillAccess::Locked { .. }))
        .count();
    let quota_limited_count = outcomes
        .iter()
        .filter(|outcome| matches!(outcome.access, SkillAccess::QuotaLimited { .. }))
        .count();

    AccessReport {
        tier,
        usage: *usage,
        outcomes,
        available_count,
        locked_count,
        quota_limited_count,
    }
}
