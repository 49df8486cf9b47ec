use serde::Deserialize;
use serde::Serialize;

use opgate_core::runner::SkillInput;
use opgate_core::skill_registry::InputKind;
use opgate_core::skill_registry::SkillId;
use opgate_core::skill_registry::SkillSpec;
use opgate_core::skill_registry::TargetSystem;

/// JSON document written to an external classifier's stdin. The classifier
/// answers with a `ClassifierOutput` document on stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierRequest {
    pub skill_id: SkillId,
    pub skill_title: String,
    pub default_target: TargetSystem,
    pub input_kind: InputKind,
    pub text: String,
}

impl ClassifierRequest {
    pub fn new(skill: &SkillSpec, input: &SkillInput) -> Self {
        Self {
            skill_id: skill.id,
            skill_title: skill.title.to_string(),
            default_target: skill.default_target,
            input_kind: input.kind,
            text: input.text.clone(),
        }
    }
}
