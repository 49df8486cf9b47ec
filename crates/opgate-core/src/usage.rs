use std::collections::HashSet;
use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use chrono::Weekday;

use crate::entitlement::current_week_start;
use crate::entitlement::EntitlementSource;
use crate::entitlement::SubscriptionTier;
use crate::entitlement::UsageSnapshot;
use crate::error::StorageError;
use crate::persistence::EvidenceEvent;
use crate::persistence::EvidenceLog;

/// Usage derived from the evidence log. Every generated proposal counts as
/// one execution. Each proposal is one stored memory item, except follow-up
/// rounds that never got a session.
pub struct LedgerEntitlements {
    tier: SubscriptionTier,
    week_start: Weekday,
    log: Arc<dyn EvidenceLog>,
}

impl LedgerEntitlements {
    pub fn new(tier: SubscriptionTier, week_start: Weekday, log: Arc<dyn EvidenceLog>) -> Self {
        Self {
            tier,
            week_start,
            log,
        }
    }
}

impl EntitlementSource for LedgerEntitlements {
    fn tier(&self) -> SubscriptionTier {
        self.tier
    }

    fn usage(&self, now: DateTime<Utc>) -> Result<UsageSnapshot, StorageError> {
        let since_ms = current_week_start(now, self.week_start).timestamp_millis();
        let records = self.log.load()?;
        let routed: HashSet<_> = records
            .iter()
            .filter_map(|record| match &record.event {
                EvidenceEvent::SessionRouted { proposal_id, .. } => Some(*proposal_id),
                _ => None,
            })
            .collect();
        let mut usage = UsageSnapshot::default();
        for record in &records {
            if let EvidenceEvent::ProposalGenerated { proposal } = &record.event {
                if proposal.revision_of.is_none() || routed.contains(&proposal.id) {
                    usage.memory_items = usage.memory_items.saturating_add(1);
                }
                if proposal.created_at_ms >= since_ms {
                    usage.executions_this_week = usage.executions_this_week.saturating_add(1);
                }
            }
        }
        Ok(usage)
    }
}
