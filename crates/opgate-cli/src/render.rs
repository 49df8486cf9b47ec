use std::fmt::Write;

use chrono::DateTime;

use opgate_core::access_report::AccessReport;
use opgate_core::access_report::SkillAccess;
use opgate_core::config::Config;
use opgate_core::entitlement::LimitKind;
use opgate_core::entitlement::UsageQuota;
use opgate_core::ApprovalSession;
use opgate_core::DecideOutcome;
use opgate_core::LimitDecision;
use opgate_core::ProposalPack;

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn timestamp(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ms.to_string())
}

pub fn skills(report: &AccessReport) -> String {
    let mut out = String::new();
    for outcome in &report.outcomes {
        let detail = match &outcome.access {
            SkillAccess::Available => String::new(),
            SkillAccess::Locked { required } => format!("  (requires {})", required.label()),
            SkillAccess::QuotaLimited { decision } => format!(
                "  ({})",
                decision.reason.as_deref().unwrap_or("quota exceeded")
            ),
        };
        let _ = writeln!(
            out,
            "{:<18} {:<14} {}{}",
            outcome.skill_id.as_str(),
            outcome.access.label(),
            outcome.title,
            detail
        );
    }
    out
}

pub fn limit_decision(action: &str, decision: &LimitDecision) -> String {
    let mut line = format!(
        "{action}: {}",
        if decision.allowed { "allowed" } else { "denied" }
    );
    if let Some(reason) = &decision.reason {
        let _ = write!(line, " ({reason})");
    }
    if let Some(reset_at) = decision.reset_at {
        let _ = write!(line, ", resets {}", reset_at.format("%Y-%m-%d %H:%M UTC"));
    }
    line
}

fn limit_text(limit: Option<u32>) -> String {
    limit.map_or_else(|| "unlimited".to_string(), |limit| limit.to_string())
}

pub fn quota(report: &AccessReport, config: &Config) -> String {
    let limits = UsageQuota::for_tier(report.tier, &config.quota);
    let mut out = String::new();
    let _ = writeln!(out, "plan: {}", report.tier.label());
    let _ = writeln!(
        out,
        "executions this week: {} / {}",
        report.usage.executions_this_week,
        limit_text(limits.limit(LimitKind::ExecutionsWeekly))
    );
    let _ = writeln!(
        out,
        "memory items: {} / {}",
        report.usage.memory_items,
        limit_text(limits.limit(LimitKind::MemoryItems))
    );
    let _ = writeln!(
        out,
        "skills: {} available, {} locked, {} quota limited",
        report.available_count, report.locked_count, report.quota_limited_count
    );
    out
}

pub fn proposal(pack: &ProposalPack) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}  {}  risk {} ({})  signers {}  biometric {}",
        pack.id,
        pack.skill_id.as_str(),
        pack.risk_tier().label(),
        pack.risk.reversibility.label(),
        pack.approvals.signer_count,
        yes_no(pack.approvals.biometric)
    );
    if let Some(previous) = pack.revision_of {
        let _ = writeln!(out, "  follows {previous}");
    }
    let _ = writeln!(out, "  {}", pack.summary);
    for step in &pack.steps {
        let _ = writeln!(
            out,
            "  [{}] {} {}: {} ({}, {})",
            step.index,
            step.verb.label(),
            step.target.label(),
            step.description,
            step.consequence.label(),
            step.reversibility.label()
        );
    }
    out
}

pub fn session_line(session: &ApprovalSession) -> String {
    format!(
        "{}  {}  {}  signatures {}/{}",
        session.id,
        session.proposal_id,
        session.state.label(),
        session.signatures.len(),
        session.required.signer_count
    )
}

pub fn session_detail(session: &ApprovalSession) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", session_line(session));
    let _ = writeln!(out, "  routed {}", timestamp(session.routed_at_ms));
    if let Some(previous) = session.supersedes {
        let _ = writeln!(out, "  supersedes {previous}");
    }
    for signature in &session.signatures {
        let _ = writeln!(
            out,
            "  signed by {} ({}, biometric {}) at {}",
            signature.signer,
            signature.decision.label(),
            yes_no(signature.biometric_verified),
            timestamp(signature.at_ms)
        );
    }
    if let Some(record) = &session.decision {
        let _ = writeln!(
            out,
            "  decided {} by {} at {} (seq {})",
            record.decision.label(),
            record.decided_by,
            timestamp(record.at_ms),
            record.seq
        );
    }
    out
}

pub fn outcome(outcome: &DecideOutcome) -> String {
    match outcome {
        DecideOutcome::SignatureRecorded {
            session, remaining, ..
        } => format!(
            "{}: signature recorded, {remaining} more signer(s) needed",
            session.id
        ),
        DecideOutcome::Decided { session, seq } => {
            format!("{}: {} (seq {seq})", session.id, session.state.label())
        }
    }
}
