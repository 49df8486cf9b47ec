use chrono::DateTime;
use chrono::Datelike;
use chrono::Duration;
use chrono::TimeZone;
use chrono::Utc;
use chrono::Weekday;
use serde::Deserialize;
use serde::Serialize;

use crate::config::QuotaConfig;
use crate::config::UnknownActionPolicy;
use crate::error::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Pro,
    Team,
}

impl SubscriptionTier {
    pub fn label(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Team => "team",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "free" => Some(Self::Free),
            "pro" => Some(Self::Pro),
            "team" => Some(Self::Team),
            _ => None,
        }
    }
}

pub fn tier_rank(tier: SubscriptionTier) -> u8 {
    match tier {
        SubscriptionTier::Free => 0,
        SubscriptionTier::Pro => 1,
        SubscriptionTier::Team => 2,
    }
}

pub fn tier_satisfies(current: SubscriptionTier, min_tier: SubscriptionTier) -> bool {
    tier_rank(current) >= tier_rank(min_tier)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    ExecutionsWeekly,
    MemoryItems,
}

impl LimitKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::ExecutionsWeekly => "executions_weekly",
            Self::MemoryItems => "memory_items",
        }
    }

    /// Accepts both the snake_case label and the camelCase name used by
    /// presentation layers.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "executions_weekly" | "executionsWeekly" => Some(Self::ExecutionsWeekly),
            "memory_items" | "memoryItems" => Some(Self::MemoryItems),
            _ => None,
        }
    }

    fn limit_reached_reason(self) -> &'static str {
        match self {
            Self::ExecutionsWeekly => "Weekly limit reached",
            Self::MemoryItems => "Memory item limit reached",
        }
    }
}

/// Per-tier limits. `None` means the tier has no limit for that kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageQuota {
    pub executions_weekly: Option<u32>,
    pub memory_items: Option<u32>,
}

impl UsageQuota {
    pub fn unlimited() -> Self {
        Self {
            executions_weekly: None,
            memory_items: None,
        }
    }

    pub fn for_tier(tier: SubscriptionTier, config: &QuotaConfig) -> Self {
        match tier {
            SubscriptionTier::Free => Self {
                executions_weekly: Some(config.free_executions_weekly),
                memory_items: Some(config.free_memory_items),
            },
            SubscriptionTier::Pro | SubscriptionTier::Team => Self::unlimited(),
        }
    }

    pub fn limit(&self, kind: LimitKind) -> Option<u32> {
        match kind {
            LimitKind::ExecutionsWeekly => self.executions_weekly,
            LimitKind::MemoryItems => self.memory_items,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub executions_this_week: u32,
    pub memory_items: u32,
}

impl UsageSnapshot {
    pub fn value(&self, kind: LimitKind) -> u32 {
        match kind {
            LimitKind::ExecutionsWeekly => self.executions_this_week,
            LimitKind::MemoryItems => self.memory_items,
        }
    }
}

/// Outcome of a quota check. A denied decision always carries a non-empty
/// reason; construct through [`LimitDecision::allow`] and [`LimitDecision::deny`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitDecision {
    pub limit: Option<LimitKind>,
    pub allowed: bool,
    pub reason: Option<String>,
    pub reset_at: Option<DateTime<Utc>>,
}

impl LimitDecision {
    pub fn allow(limit: Option<LimitKind>) -> Self {
        Self {
            limit,
            allowed: true,
            reason: None,
            reset_at: None,
        }
    }

    pub fn deny(
        limit: Option<LimitKind>,
        reason: impl Into<String>,
        reset_at: Option<DateTime<Utc>>,
    ) -> Self {
        let reason = reason.into();
        let reason = if reason.trim().is_empty() {
            limit
                .map(LimitKind::limit_reached_reason)
                .unwrap_or("Action not permitted")
                .to_string()
        } else {
            reason
        };
        Self {
            limit,
            allowed: false,
            reason: Some(reason),
            reset_at,
        }
    }
}

/// Start of the quota week containing `now`, at 00:00 UTC on `week_start`.
pub fn current_week_start(now: DateTime<Utc>, week_start: Weekday) -> DateTime<Utc> {
    let today = now.date_naive();
    let offset = (7 + i64::from(today.weekday().num_days_from_monday())
        - i64::from(week_start.num_days_from_monday()))
        % 7;
    let start = today - Duration::days(offset);
    Utc.from_utc_datetime(&start.and_time(chrono::NaiveTime::MIN))
}

/// The next weekly reset strictly after `now`.
pub fn next_weekly_reset(now: DateTime<Utc>, week_start: Weekday) -> DateTime<Utc> {
    current_week_start(now, week_start) + Duration::days(7)
}

/// Side-effect free plan gate.
#[derive(Debug, Clone)]
pub struct QuotaGate {
    config: QuotaConfig,
}

impl QuotaGate {
    pub fn new(config: QuotaConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QuotaConfig {
        &self.config
    }

    /// Checks a named action. Names that do not map to a metered limit follow
    /// the configured unknown-action policy.
    pub fn check(
        &self,
        action: &str,
        tier: SubscriptionTier,
        usage: &UsageSnapshot,
        now: DateTime<Utc>,
    ) -> LimitDecision {
        match LimitKind::parse(action) {
            Some(kind) => self.check_limit(kind, tier, usage, now),
            None => match self.config.unknown_action {
                UnknownActionPolicy::Allow => LimitDecision::allow(None),
                UnknownActionPolicy::Deny => LimitDecision::deny(
                    None,
                    format!("Unrecognized action '{}'", action.trim()),
                    None,
                ),
            },
        }
    }

    pub fn check_limit(
        &self,
        kind: LimitKind,
        tier: SubscriptionTier,
        usage: &UsageSnapshot,
        now: DateTime<Utc>,
    ) -> LimitDecision {
        let quota = UsageQuota::for_tier(tier, &self.config);
        let Some(limit) = quota.limit(kind) else {
            return LimitDecision::allow(Some(kind));
        };
        if usage.value(kind) < limit {
            return LimitDecision::allow(Some(kind));
        }
        let reset_at = match kind {
            LimitKind::ExecutionsWeekly => Some(next_weekly_reset(now, self.config.week_start)),
            LimitKind::MemoryItems => None,
        };
        LimitDecision::deny(Some(kind), kind.limit_reached_reason(), reset_at)
    }
}

/// Read-only view of the caller's plan and usage counters.
pub trait EntitlementSource: Send + Sync {
    fn tier(&self) -> SubscriptionTier;

    fn usage(&self, now: DateTime<Utc>) -> Result<UsageSnapshot, StorageError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StaticEntitlements {
    pub tier: SubscriptionTier,
    pub usage: UsageSnapshot,
}

impl EntitlementSource for StaticEntitlements {
    fn tier(&self) -> SubscriptionTier {
        self.tier
    }

    fn usage(&self, _now: DateTime<Utc>) -> Result<UsageSnapshot, StorageError> {
        Ok(self.usage)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .expect("timestamp")
            .with_timezone(&Utc)
    }

    fn gate(limit: u32) -> QuotaGate {
        QuotaGate::new(QuotaConfig {
            free_executions_weekly: limit,
            ..QuotaConfig::default()
        })
    }

    fn usage(executions: u32) -> UsageSnapshot {
        UsageSnapshot {
            executions_this_week: executions,
            memory_items: 0,
        }
    }

    #[test]
    fn free_tier_denies_exactly_at_and_above_limit() {
        let now = at("2026-10-21T15:30:00Z");
        for limit in 0..6u32 {
            let gate = gate(limit);
            for used in 0..8u32 {
                let decision = gate.check_limit(
                    LimitKind::ExecutionsWeekly,
                    SubscriptionTier::Free,
                    &usage(used),
                    now,
                );
                assert_eq!(decision.allowed, used < limit, "used={used} limit={limit}");
                if !decision.allowed {
                    assert!(decision.reason.as_deref().is_some_and(|r| !r.is_empty()));
                }
            }
        }
    }

    #[test]
    fn unlimited_tiers_always_allow() {
        let gate = gate(1);
        let now = at("2026-10-21T15:30:00Z");
        for tier in [SubscriptionTier::Pro, SubscriptionTier::Team] {
            for used in [0, 1, 10, u32::MAX] {
                let decision = gate.check_limit(LimitKind::ExecutionsWeekly, tier, &usage(used), now);
                assert!(decision.allowed);
                assert_eq!(decision.reason, None);
                assert_eq!(decision.reset_at, None);
            }
        }
    }

    #[test]
    fn weekly_limit_reached_reports_next_monday_boundary() {
        let gate = gate(10);
        let decision = gate.check(
            "executionsWeekly",
            SubscriptionTier::Free,
            &usage(10),
            at("2026-10-21T15:30:00Z"),
        );
        assert_eq!(
            decision,
            LimitDecision {
                limit: Some(LimitKind::ExecutionsWeekly),
                allowed: false,
                reason: Some("Weekly limit reached".to_string()),
                reset_at: Some(at("2026-10-26T00:00:00Z")),
            }
        );
    }

    #[test]
    fn memory_limit_has_no_reset() {
        let gate = QuotaGate::new(QuotaConfig {
            free_memory_items: 2,
            ..QuotaConfig::default()
        });
        let decision = gate.check_limit(
            LimitKind::MemoryItems,
            SubscriptionTier::Free,
            &UsageSnapshot {
                executions_this_week: 0,
                memory_items: 2,
            },
            at("2026-10-21T15:30:00Z"),
        );
        assert!(!decision.allowed);
        assert_eq!(decision.reason.as_deref(), Some("Memory item limit reached"));
        assert_eq!(decision.reset_at, None);
    }

    #[test]
    fn unknown_action_fails_open_by_default() {
        let decision = gate(0).check(
            "export_pdf",
            SubscriptionTier::Free,
            &usage(100),
            at("2026-10-21T15:30:00Z"),
        );
        assert_eq!(decision, LimitDecision::allow(None));
    }

    #[test]
    fn unknown_action_can_fail_closed() {
        let gate = QuotaGate::new(QuotaConfig {
            unknown_action: UnknownActionPolicy::Deny,
            ..QuotaConfig::default()
        });
        let decision = gate.check(
            "export_pdf",
            SubscriptionTier::Team,
            &usage(0),
            at("2026-10-21T15:30:00Z"),
        );
        assert!(!decision.allowed);
        assert_eq!(
            decision.reason.as_deref(),
            Some("Unrecognized action 'export_pdf'")
        );
    }

    #[test]
    fn week_boundaries_are_anchored_to_configured_weekday() {
        let monday_midnight = at("2026-10-19T00:00:00Z");
        assert_eq!(current_week_start(monday_midnight, Weekday::Mon), monday_midnight);
        assert_eq!(
            next_weekly_reset(monday_midnight, Weekday::Mon),
            at("2026-10-26T00:00:00Z")
        );
        assert_eq!(
            next_weekly_reset(at("2026-10-25T23:59:59Z"), Weekday::Mon),
            at("2026-10-26T00:00:00Z")
        );
        assert_eq!(
            current_week_start(at("2026-10-21T08:00:00Z"), Weekday::Sun),
            at("2026-10-18T00:00:00Z")
        );
    }

    #[test]
    fn deny_never_produces_an_empty_reason() {
        let decision = LimitDecision::deny(Some(LimitKind::MemoryItems), "   ", None);
        assert_eq!(decision.reason.as_deref(), Some("Memory item limit reached"));
    }

    #[test]
    fn tier_ranking_gates_features() {
        assert!(tier_satisfies(SubscriptionTier::Team, SubscriptionTier::Pro));
        assert!(!tier_satisfies(SubscriptionTier::Free, SubscriptionTier::Pro));
        assert_eq!(SubscriptionTier::parse(" PRO "), Some(SubscriptionTier::Pro));
    }
}
