//! Advisory operator skills: skill runs produce immutable proposal packs,
//! humans decide on them through approval sessions, and every routing and
//! decision lands in an append-only evidence log. Nothing in this crate
//! performs the actions it proposes.

pub mod access_report;
pub mod approval;
pub mod clock;
pub mod config;
pub mod entitlement;
pub mod error;
pub mod events;
pub mod persistence;
pub mod policy_engine;
pub mod proposal;
pub mod runner;
pub mod service;
pub mod skill_registry;
pub mod usage;

pub use approval::ApprovalSession;
pub use approval::DecideOutcome;
pub use approval::Decision;
pub use approval::Reviewer;
pub use approval::SessionId;
pub use approval::SessionState;
pub use config::Config;
pub use entitlement::LimitDecision;
pub use entitlement::SubscriptionTier;
pub use error::ApprovalError;
pub use error::OperatorError;
pub use error::SkillFailure;
pub use error::StorageError;
pub use proposal::ProposalId;
pub use proposal::ProposalPack;
pub use runner::SkillClassifier;
pub use runner::SkillInput;
pub use service::OperatorDeps;
pub use service::OperatorService;
