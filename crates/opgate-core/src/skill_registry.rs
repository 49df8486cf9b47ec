use serde::Deserialize;
use serde::Serialize;

use crate::entitlement::SubscriptionTier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillId {
    InboxTriage,
    MeetingPrep,
    FollowUpDrafter,
    CalendarDefrag,
    DelegationRouter,
}

impl SkillId {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InboxTriage => "inbox_triage",
            Self::MeetingPrep => "meeting_prep",
            Self::FollowUpDrafter => "follow_up_drafter",
            Self::CalendarDefrag => "calendar_defrag",
            Self::DelegationRouter => "delegation_router",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        SkillRegistry::list()
            .iter()
            .map(|spec| spec.id)
            .find(|id| id.as_str() == input.trim())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    FreeText,
    EmailThread,
    CalendarEvent,
    TaskList,
}

impl InputKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::FreeText => "free_text",
            Self::EmailThread => "email_thread",
            Self::CalendarEvent => "calendar_event",
            Self::TaskList => "task_list",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "free_text" | "text" => Some(Self::FreeText),
            "email_thread" | "email" => Some(Self::EmailThread),
            "calendar_event" | "event" => Some(Self::CalendarEvent),
            "task_list" | "tasks" => Some(Self::TaskList),
            _ => None,
        }
    }
}

/// External system a proposed action would touch if a human carried it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetSystem {
    Mail,
    Calendar,
    Reminders,
    Contacts,
    Files,
    Finance,
}

impl TargetSystem {
    pub fn label(self) -> &'static str {
        match self {
            Self::Mail => "mail",
            Self::Calendar => "calendar",
            Self::Reminders => "reminders",
            Self::Contacts => "contacts",
            Self::Files => "files",
            Self::Finance => "finance",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkillSpec {
    pub id: SkillId,
    pub title: &'static str,
    pub description: &'static str,
    pub accepts: &'static [InputKind],
    pub default_target: TargetSystem,
    pub min_tier: SubscriptionTier,
}

impl SkillSpec {
    pub fn accepts(&self, kind: InputKind) -> bool {
        self.accepts.contains(&kind)
    }
}

pub struct SkillRegistry;

const SKILL_SPECS: [SkillSpec; 5] = [
    SkillSpec {
        id: SkillId::InboxTriage,
        title: "Inbox Triage",
        description: "Sort a message thread and draft the replies it needs.",
        accepts: &[InputKind::FreeText, InputKind::EmailThread],
        default_target: TargetSystem::Mail,
        min_tier: SubscriptionTier::Free,
    },
    SkillSpec {
        id: SkillId::MeetingPrep,
        title: "Meeting Prep",
        description: "Collect context and talking points for an upcoming meeting.",
        accepts: &[InputKind::FreeText, InputKind::CalendarEvent],
        default_target: TargetSystem::Calendar,
        min_tier: SubscriptionTier::Free,
    },
    SkillSpec {
        id: SkillId::FollowUpDrafter,
        title: "Follow-up Drafter",
        description: "Turn meeting notes into follow-up messages and reminders.",
        accepts: &[InputKind::FreeText, InputKind::EmailThread, InputKind::TaskList],
        default_target: TargetSystem::Reminders,
        min_tier: SubscriptionTier::Pro,
    },
    SkillSpec {
        id: SkillId::CalendarDefrag,
        title: "Calendar Defrag",
        description: "Propose moves that consolidate fragmented calendar time.",
        accepts: &[InputKind::FreeText, InputKind::CalendarEvent],
        default_target: TargetSystem::Calendar,
        min_tier: SubscriptionTier::Pro,
    },
    SkillSpec {
        id: SkillId::DelegationRouter,
        title: "Delegation Router",
        description: "Suggest owners for open tasks across a team.",
        accepts: &[InputKind::FreeText, InputKind::TaskList],
        default_target: TargetSystem::Contacts,
        min_tier: SubscriptionTier::Team,
    },
];

impl SkillRegistry {
    pub fn list() -> &'static [SkillSpec] {
        &SKILL_SPECS
    }

    pub fn get(id: SkillId) -> &'static SkillSpec {
        match id {
            SkillId::InboxTriage => &SKILL_SPECS[0],
            SkillId::MeetingPrep => &SKILL_SPECS[1],
            SkillId::FollowUpDrafter => &SKILL_SPECS[2],
            SkillId::CalendarDefrag => &SKILL_SPECS[3],
            SkillId::DelegationRouter => &SKILL_SPECS[4],
        }
    }

    pub fn lookup(id: &str) -> Option<&'static SkillSpec> {
        SkillId::parse(id).map(Self::get)
    }
}
