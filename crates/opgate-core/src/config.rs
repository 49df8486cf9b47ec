use std::path::PathBuf;

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::entitlement::SubscriptionTier;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub plan: PlanConfig,
    pub quota: QuotaConfig,
    pub skills: SkillsConfig,
    pub ledger: LedgerConfig,
    pub policy: PolicyConfig,
    pub classifier: ClassifierConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct PlanConfig {
    pub tier: SubscriptionTier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnknownActionPolicy {
    #[default]
    Allow,
    Deny,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct QuotaConfig {
    pub free_executions_weekly: u32,
    pub free_memory_items: u32,
    /// Weekly quotas reset at 00:00 UTC on this day.
    pub week_start: Weekday,
    pub unknown_action: UnknownActionPolicy,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            free_executions_weekly: 10,
            free_memory_items: 50,
            week_start: Weekday::Mon,
            unknown_action: UnknownActionPolicy::Allow,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SkillsConfig {
    pub max_input_chars: usize,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            max_input_chars: 4_000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct LedgerConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct PolicyConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ClassifierConfig {
    /// argv of an external classifier; the keyword classifier is used when unset.
    pub command: Option<Vec<String>>,
    /// How long an external classifier may run before it is killed.
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            command: None,
            timeout_secs: 30,
        }
    }
}
