use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::proposal::ExecutionStep;
use crate::proposal::RequiredApprovals;
use crate::proposal::RiskAnalysis;
use crate::skill_registry::SkillId;

/// Maps a proposal's structured risk signals to the sign-off it needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalPolicy {
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub defaults: RequiredApprovals,
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: String,
    pub when: String, // Expression string (e.g., "risk_tier == \"critical\"")
    pub then: RequiredApprovals,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub policy_id: String,
    pub matched_rule_id: Option<String>,
    pub approvals: RequiredApprovals,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Signals {
    pub skill_id: String,
    pub risk_tier: String,
    pub reversibility: String,
    pub action_count: usize,
    pub external_recipients: u32,
    pub targets: String,
}

impl Signals {
    pub fn from_proposal(skill_id: SkillId, steps: &[ExecutionStep], risk: &RiskAnalysis) -> Self {
        let mut targets: Vec<&'static str> = steps.iter().map(|step| step.target.label()).collect();
        targets.sort_unstable();
        targets.dedup();
        Self {
            skill_id: skill_id.as_str().to_string(),
            risk_tier: risk.consequence_tier.label().to_string(),
            reversibility: risk.reversibility.label().to_string(),
            action_count: steps.len(),
            external_recipients: steps
                .iter()
                .fold(0u32, |total, step| total.saturating_add(step.external_recipients)),
            targets: targets.join(","),
        }
    }
}

fn rule(id: &str, when: &str, signer_count: u8, biometric: bool) -> PolicyRule {
    PolicyRule {
        id: id.to_string(),
        when: when.to_string(),
        then: RequiredApprovals {
            signer_count,
            biometric,
        },
    }
}

impl ApprovalPolicy {
    pub fn builtin() -> Self {
        Self {
            id: "operator-approvals".to_string(),
            version: "1".to_string(),
            defaults: RequiredApprovals::default(),
            rules: vec![
                rule("critical-dual-control", r#"risk_tier == "critical""#, 2, true),
                rule("high-biometric", r#"risk_tier == "high""#, 1, true),
                rule("irreversible-biometric", r#"reversibility == "irreversible""#, 1, true),
            ],
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, PolicyError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// First matching rule wins; otherwise the defaults apply.
    pub fn evaluate(&self, signals: &Signals) -> PolicyDecision {
        for rule in &self.rules {
            if self.evaluate_condition(&rule.id, &rule.when, signals) {
                return PolicyDecision {
                    policy_id: self.id.clone(),
                    matched_rule_id: Some(rule.id.clone()),
                    approvals: rule.then.normalized(),
                };
            }
        }

        PolicyDecision {
            policy_id: self.id.clone(),
            matched_rule_id: None,
            approvals: self.defaults.normalized(),
        }
    }

    fn evaluate_condition(&self, rule_id: &str, condition: &str, signals: &Signals) -> bool {
        use evalexpr::*;
        let mut context = HashMapContext::new();
        context
            .set_value("skill_id".into(), Value::String(signals.skill_id.clone()))
            .ok();
        context
            .set_value("risk_tier".into(), Value::String(signals.risk_tier.clone()))
            .ok();
        context
            .set_value(
                "reversibility".into(),
                Value::String(signals.reversibility.clone()),
            )
            .ok();
        context
            .set_value(
                "action_count".into(),
                Value::Int(signals.action_count as i64),
            )
            .ok();
        context
            .set_value(
                "external_recipients".into(),
                Value::Int(i64::from(signals.external_recipients)),
            )
            .ok();
        context
            .set_value("targets".into(), Value::String(signals.targets.clone()))
            .ok();

        context
            .set_function(
                "contains".into(),
                Function::new(|argument| {
                    let arguments = argument.as_tuple()?;
                    if arguments.len() != 2 {
                        return Err(EvalexprError::CustomMessage(
                            "contains() expects exactly 2 arguments".to_string(),
                        ));
                    }
                    if let (Value::String(haystack), Value::String(needle)) =
                        (&arguments[0], &arguments[1])
                    {
                        Ok(Value::Boolean(haystack.contains(needle.as_str())))
                    } else {
                        Err(EvalexprError::CustomMessage(
                            "contains() expects string arguments".to_string(),
                        ))
                    }
                }),
            )
            .ok();

        context
            .set_function(
                "regex_match".into(),
                Function::new(|argument| {
                    let arguments = argument.as_tuple()?;
                    if arguments.len() != 2 {
                        return Err(EvalexprError::CustomMessage(
                            "regex_match() expects exactly 2 arguments".to_string(),
                        ));
                    }
                    if let (Value::String(haystack), Value::String(pattern)) =
                        (&arguments[0], &arguments[1])
                    {
                        let re = regex::Regex::new(pattern).map_err(|e| {
                            EvalexprError::CustomMessage(format!("Invalid regex: {}", e))
                        })?;
                        Ok(Value::Boolean(re.is_match(haystack)))
                    } else {
                        Err(EvalexprError::CustomMessage(
                            "regex_match() expects string arguments".to_string(),
                        ))
                    }
                }),
            )
            .ok();

        match eval_boolean_with_context(condition, &context) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(
                    policy_id = %self.id,
                    rule_id,
                    condition,
                    error = %e,
                    "approval policy condition failed to evaluate"
                );
                false
            }
        }
    }
}
