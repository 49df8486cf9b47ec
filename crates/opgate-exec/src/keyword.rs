use regex::Regex;

use opgate_core::proposal::ActionVerb;
use opgate_core::runner::ClassifierError;
use opgate_core::runner::ClassifierOutput;
use opgate_core::runner::ProposedAction;
use opgate_core::runner::SkillClassifier;
use opgate_core::runner::SkillInput;
use opgate_core::skill_registry::SkillSpec;
use opgate_core::skill_registry::TargetSystem;

struct KeywordRule {
    pattern: &'static str,
    verb: ActionVerb,
    target: Option<TargetSystem>,
    description: &'static str,
    counts_recipients: bool,
}

static KEYWORD_RULES: [KeywordRule; 7] = [
    KeywordRule {
        pattern: r"(?i)\b(pay|payment|invoice|transfer|wire)\b",
        verb: ActionVerb::Payment,
        target: Some(TargetSystem::Finance),
        description: "Prepare a payment",
        counts_recipients: false,
    },
    KeywordRule {
        pattern: r"(?i)\b(delete|remove|purge|unsubscribe)\b",
        verb: ActionVerb::Delete,
        target: None,
        description: "Delete the referenced items",
        counts_recipients: false,
    },
    KeywordRule {
        pattern: r"(?i)\b(share|forward)\b",
        verb: ActionVerb::Share,
        target: Some(TargetSystem::Files),
        description: "Share the referenced material",
        counts_recipients: true,
    },
    KeywordRule {
        pattern: r"(?i)\b(send|email)\b",
        verb: ActionVerb::Send,
        target: Some(TargetSystem::Mail),
        description: "Send a message",
        counts_recipients: true,
    },
    KeywordRule {
        pattern: r"(?i)\b(reply|respond|answer|draft)\b",
        verb: ActionVerb::Draft,
        target: Some(TargetSystem::Mail),
        description: "Draft a reply",
        counts_recipients: false,
    },
    KeywordRule {
        pattern: r"(?i)\b(declin\w*|reschedul\w*|cancel\w*|move)\b",
        verb: ActionVerb::Modify,
        target: Some(TargetSystem::Calendar),
        description: "Update the calendar event",
        counts_recipients: false,
    },
    KeywordRule {
        pattern: r"(?i)\b(schedule|book|create|add|remind\w*)\b",
        verb: ActionVerb::Create,
        target: None,
        description: "Create a new item",
        counts_recipients: false,
    },
];

const EMAIL_ADDRESS: &str = r"[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)+";

const SUMMARY_CHARS: usize = 60;

/// Deterministic classifier driven by a fixed keyword table. Each rule
/// contributes at most one action, ordered by where it first matches.
pub struct KeywordClassifier {
    rules: Vec<(Regex, &'static KeywordRule)>,
    email: Regex,
}

impl KeywordClassifier {
    pub fn new() -> Result<Self, regex::Error> {
        let rules = KEYWORD_RULES
            .iter()
            .map(|rule| Regex::new(rule.pattern).map(|re| (re, rule)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            rules,
            email: Regex::new(EMAIL_ADDRESS)?,
        })
    }

    fn recipients(&self, text: &str) -> u32 {
        let mut addresses: Vec<&str> = self.email.find_iter(text).map(|m| m.as_str()).collect();
        addresses.sort_unstable();
        addresses.dedup();
        u32::try_from(addresses.len()).unwrap_or(u32::MAX)
    }
}

fn summarize(skill: &SkillSpec, text: &str) -> String {
    let first_line = text.lines().next().unwrap_or_default().trim();
    let mut excerpt: String = first_line.chars().take(SUMMARY_CHARS).collect();
    if first_line.chars().count() > SUMMARY_CHARS {
        excerpt.push_str("...");
    }
    format!("{}: {}", skill.title, excerpt)
}

impl SkillClassifier for KeywordClassifier {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn classify(
        &self,
        skill: &SkillSpec,
        input: &SkillInput,
    ) -> Result<ClassifierOutput, ClassifierError> {
        let text = input.text.as_str();
        let recipients = self.recipients(text);
        let mut matched: Vec<(usize, ProposedAction)> = self
            .rules
            .iter()
            .filter_map(|(re, rule)| {
                let found = re.find(text)?;
                Some((
                    found.start(),
                    ProposedAction {
                        verb: rule.verb,
                        target: rule.target,
                        description: format!("{} ({})", rule.description, found.as_str()),
                        external_recipients: if rule.counts_recipients {
                            recipients
                        } else {
                            0
                        },
                    },
                ))
            })
            .collect();
        matched.sort_by_key(|(position, _)| *position);

        let mut actions: Vec<ProposedAction> =
            matched.into_iter().map(|(_, action)| action).collect();
        if actions.is_empty() {
            actions.push(ProposedAction {
                verb: ActionVerb::Read,
                target: None,
                description: "Review the input and summarize it".to_string(),
                external_recipients: 0,
            });
        }
        tracing::debug!(
            skill_id = skill.id.as_str(),
            actions = actions.len(),
            recipients,
            "keyword classification"
        );
        Ok(ClassifierOutput {
            summary: summarize(skill, text),
            actions,
        })
    }
}
