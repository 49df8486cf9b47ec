use std::collections::BTreeMap;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use serde::Deserialize;
use serde::Serialize;

use crate::approval::ApprovalSession;
use crate::approval::Decision;
use crate::approval::DecisionRecord;
use crate::approval::SessionId;
use crate::approval::SessionState;
use crate::approval::Signature;
use crate::clock::Clock;
use crate::error::StorageError;
use crate::proposal::ConsequenceTier;
use crate::proposal::ProposalId;
use crate::proposal::ProposalPack;
use crate::proposal::RequiredApprovals;
use crate::skill_registry::SkillId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvidenceEvent {
    ProposalGenerated {
        proposal: ProposalPack,
    },
    SessionRouted {
        session_id: SessionId,
        proposal_id: ProposalId,
        skill_id: SkillId,
        risk_tier: ConsequenceTier,
        required: RequiredApprovals,
        step_count: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        supersedes: Option<SessionId>,
    },
    SessionPresented {
        session_id: SessionId,
        proposal_id: ProposalId,
        risk_tier: ConsequenceTier,
    },
    SignatureRecorded {
        session_id: SessionId,
        proposal_id: ProposalId,
        risk_tier: ConsequenceTier,
        decision: Decision,
        signer: String,
        biometric_verified: bool,
    },
    DecisionRecorded {
        session_id: SessionId,
        proposal_id: ProposalId,
        risk_tier: ConsequenceTier,
        decision: Decision,
        decided_by: String,
        #[serde(default)]
        biometric_verified: bool,
        #[serde(default)]
        signers: Vec<String>,
    },
}

impl EvidenceEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProposalGenerated { .. } => "proposal_generated",
            Self::SessionRouted { .. } => "session_routed",
            Self::SessionPresented { .. } => "session_presented",
            Self::SignatureRecorded { .. } => "signature_recorded",
            Self::DecisionRecorded { .. } => "decision_recorded",
        }
    }

    pub fn proposal_id(&self) -> ProposalId {
        match self {
            Self::ProposalGenerated { proposal } => proposal.id,
            Self::SessionRouted { proposal_id, .. }
            | Self::SessionPresented { proposal_id, .. }
            | Self::SignatureRecorded { proposal_id, .. }
            | Self::DecisionRecorded { proposal_id, .. } => *proposal_id,
        }
    }

    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            Self::ProposalGenerated { .. } => None,
            Self::SessionRouted { session_id, .. }
            | Self::SessionPresented { session_id, .. }
            | Self::SignatureRecorded { session_id, .. }
            | Self::DecisionRecorded { session_id, .. } => Some(*session_id),
        }
    }

    pub fn risk_tier(&self) -> ConsequenceTier {
        match self {
            Self::ProposalGenerated { proposal } => proposal.risk_tier(),
            Self::SessionRouted { risk_tier, .. }
            | Self::SessionPresented { risk_tier, .. }
            | Self::SignatureRecorded { risk_tier, .. }
            | Self::DecisionRecorded { risk_tier, .. } => *risk_tier,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub seq: u64,
    pub ts_ms: i64,
    #[serde(flatten)]
    pub event: EvidenceEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub seq: u64,
    pub ts_ms: i64,
}

/// Append-only evidence of everything the gate produced or recorded.
/// `append` returns only after the record is durable.
pub trait EvidenceLog: Send + Sync {
    fn append(&self, event: EvidenceEvent) -> Result<Receipt, StorageError>;

    fn load(&self) -> Result<Vec<EvidenceRecord>, StorageError>;

    fn load_since(&self, seq_exclusive: u64) -> Result<Vec<EvidenceRecord>, StorageError> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|record| record.seq > seq_exclusive)
            .collect())
    }
}

pub struct JsonlEvidenceLog {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    next_seq: Mutex<u64>,
}

impl JsonlEvidenceLog {
    pub fn open(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let existing = load_records(path.as_path())?;
        let next_seq = existing
            .iter()
            .map(|record| record.seq)
            .max()
            .map_or(1, |seq| seq.saturating_add(1));
        Ok(Self {
            path,
            clock,
            next_seq: Mutex::new(next_seq),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EvidenceLog for JsonlEvidenceLog {
    fn append(&self, event: EvidenceEvent) -> Result<Receipt, StorageError> {
        let mut next_seq = self.next_seq.lock().unwrap_or_else(|err| err.into_inner());
        let record = EvidenceRecord {
            seq: *next_seq,
            ts_ms: self.clock.now().timestamp_millis(),
            event,
        };
        let line = serde_json::to_string(&record)?;
        if let Err(err) = append_line(self.path.as_path(), line.as_str()) {
            // Part of the line may have reached the file; never hand its seq out again.
            *next_seq = next_seq.saturating_add(1);
            tracing::warn!(
                path = %self.path.display(),
                seq = record.seq,
                error = %err,
                "evidence append failed"
            );
            return Err(err.into());
        }
        *next_seq = next_seq.saturating_add(1);
        Ok(Receipt {
            seq: record.seq,
            ts_ms: record.ts_ms,
        })
    }

    fn load(&self) -> Result<Vec<EvidenceRecord>, StorageError> {
        load_records(self.path.as_path())
    }
}

#[derive(Debug, Default)]
struct MemoryLogState {
    records: Vec<EvidenceRecord>,
    unavailable: bool,
}

/// In-process log. Can be switched off to exercise storage failures.
pub struct MemoryEvidenceLog {
    clock: Arc<dyn Clock>,
    state: Mutex<MemoryLogState>,
}

impl MemoryEvidenceLog {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(MemoryLogState::default()),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.state
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .unavailable = !available;
    }
}

impl EvidenceLog for MemoryEvidenceLog {
    fn append(&self, event: EvidenceEvent) -> Result<Receipt, StorageError> {
        let mut state = self.state.lock().unwrap_or_else(|err| err.into_inner());
        if state.unavailable {
            return Err(StorageError::Unavailable(
                "memory evidence log is offline".to_string(),
            ));
        }
        let seq = state
            .records
            .last()
            .map_or(1, |record| record.seq.saturating_add(1));
        let ts_ms = self.clock.now().timestamp_millis();
        state.records.push(EvidenceRecord { seq, ts_ms, event });
        Ok(Receipt { seq, ts_ms })
    }

    fn load(&self) -> Result<Vec<EvidenceRecord>, StorageError> {
        let state = self.state.lock().unwrap_or_else(|err| err.into_inner());
        if state.unavailable {
            return Err(StorageError::Unavailable(
                "memory evidence log is offline".to_string(),
            ));
        }
        Ok(state.records.clone())
    }
}

/// Flat row used by the evidence export. Every row carries the same keys;
/// values an event does not have are `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRow {
    pub seq: u64,
    pub ts_ms: i64,
    pub kind: String,
    pub proposal_id: ProposalId,
    pub session_id: Option<SessionId>,
    pub skill_id: Option<SkillId>,
    pub risk_tier: ConsequenceTier,
    pub decision: Option<String>,
    pub signer: Option<String>,
}

impl From<&EvidenceRecord> for EvidenceRow {
    fn from(record: &EvidenceRecord) -> Self {
        let event = &record.event;
        let (skill_id, decision, signer) = match event {
            EvidenceEvent::ProposalGenerated { proposal } => (Some(proposal.skill_id), None, None),
            EvidenceEvent::SessionRouted { skill_id, .. } => (Some(*skill_id), None, None),
            EvidenceEvent::SessionPresented { .. } => (None, None, None),
            EvidenceEvent::SignatureRecorded {
                decision, signer, ..
            } => (None, Some(decision.label()), Some(signer.clone())),
            EvidenceEvent::DecisionRecorded {
                decision,
                decided_by,
                ..
            } => (None, Some(decision.label()), Some(decided_by.clone())),
        };
        Self {
            seq: record.seq,
            ts_ms: record.ts_ms,
            kind: event.kind().to_string(),
            proposal_id: event.proposal_id(),
            session_id: event.session_id(),
            skill_id,
            risk_tier: event.risk_tier(),
            decision: decision.map(str::to_string),
            signer,
        }
    }
}

/// Renders the log as a JSON array ordered by `seq`.
pub fn export_json(records: &[EvidenceRecord]) -> Result<String, StorageError> {
    let mut rows: Vec<EvidenceRow> = records.iter().map(EvidenceRow::from).collect();
    rows.sort_by_key(|row| row.seq);
    Ok(serde_json::to_string_pretty(&rows)?)
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReplayedLedger {
    pub proposals: Vec<ProposalPack>,
    pub sessions: Vec<ApprovalSession>,
    pub last_proposal_id: Option<ProposalId>,
    pub last_session_id: Option<SessionId>,
    pub last_seq: u64,
}

/// Rebuilds proposals and session state from evidence records.
pub fn replay(records: &[EvidenceRecord]) -> ReplayedLedger {
    let mut sorted = records.to_vec();
    sorted.sort_by_key(|record| record.seq);

    let mut proposals: BTreeMap<ProposalId, ProposalPack> = BTreeMap::new();
    let mut sessions: BTreeMap<SessionId, ApprovalSession> = BTreeMap::new();
    let mut last_seq = 0;
    for record in sorted {
        last_seq = last_seq.max(record.seq);
        match record.event {
            EvidenceEvent::ProposalGenerated { proposal } => {
                proposals.entry(proposal.id).or_insert(proposal);
            }
            EvidenceEvent::SessionRouted {
                session_id,
                proposal_id,
                skill_id,
                risk_tier,
                required,
                step_count,
                supersedes,
            } => {
                sessions.entry(session_id).or_insert_with(|| {
                    ApprovalSession::routed(
                        session_id,
                        proposal_id,
                        skill_id,
                        risk_tier,
                        required,
                        step_count,
                        supersedes,
                        record.ts_ms,
                    )
                });
            }
            EvidenceEvent::SessionPresented { session_id, .. } => {
                if let Some(session) = sessions.get_mut(&session_id) {
                    if session.state == SessionState::Pending {
                        session.state = SessionState::UnderReview;
                    }
                }
            }
            EvidenceEvent::SignatureRecorded {
                session_id,
                decision,
                signer,
                biometric_verified,
                ..
            } => {
                if let Some(session) = sessions.get_mut(&session_id) {
                    session.record_signature(Signature {
                        signer,
                        biometric_verified,
                        decision,
                        seq: record.seq,
                        at_ms: record.ts_ms,
                    });
                }
            }
            EvidenceEvent::DecisionRecorded {
                session_id,
                decision,
                decided_by,
                biometric_verified,
                ..
            } => {
                if let Some(session) = sessions.get_mut(&session_id) {
                    if decision.needs_signers() {
                        session.record_signature(Signature {
                            signer: decided_by.clone(),
                            biometric_verified,
                            decision: decision.clone(),
                            seq: record.seq,
                            at_ms: record.ts_ms,
                        });
                    }
                    session.record_decision(DecisionRecord {
                        decision,
                        decided_by,
                        seq: record.seq,
                        at_ms: record.ts_ms,
                    });
                }
            }
        }
    }

    ReplayedLedger {
        last_proposal_id: proposals.keys().next_back().copied(),
        last_session_id: sessions.keys().next_back().copied(),
        proposals: proposals.into_values().collect(),
        sessions: sessions.into_values().collect(),
        last_seq,
    }
}

fn load_records(path: &Path) -> Result<Vec<EvidenceRecord>, StorageError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<EvidenceRecord>(&line) {
            Ok(record) => records.push(record),
            Err(err) => tracing::warn!(
                path = %path.display(),
                line = index + 1,
                error = %err,
                "skipping unreadable evidence record"
            ),
        }
    }
    Ok(records)
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut opts = OpenOptions::new();
    opts.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    let mut file = opts.open(path)?;
    let start = file.metadata()?.len();
    let mut buf = Vec::with_capacity(line.len() + 1);
    buf.extend_from_slice(line.as_bytes());
    buf.push(b'\n');
    let written = file
        .write_all(&buf)
        .and_then(|()| file.flush())
        .and_then(|()| file.sync_data());
    if let Err(err) = written {
        // Drop a torn tail so the next record starts on a fresh line.
        if let Err(truncate) = file.set_len(start) {
            tracing::warn!(
                path = %path.display(),
                error = %truncate,
                "could not truncate partial evidence record"
            );
        }
        return Err(err);
    }
    Ok(())
}
