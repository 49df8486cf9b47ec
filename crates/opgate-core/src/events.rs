use serde::Serialize;
use tokio::sync::broadcast;

use crate::approval::ApprovalSession;
use crate::approval::SessionId;
use crate::approval::SessionState;
use crate::proposal::ProposalId;

const DEFAULT_CAPACITY: usize = 256;

/// Published after a session transition is durable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionEvent {
    pub session_id: SessionId,
    pub proposal_id: ProposalId,
    pub state: SessionState,
    pub signatures: usize,
}

impl From<&ApprovalSession> for SessionEvent {
    fn from(session: &ApprovalSession) -> Self {
        Self {
            session_id: session.id,
            proposal_id: session.proposal_id,
            state: session.state,
            signatures: session.signatures.len(),
        }
    }
}

/// Best-effort fan-out of session transitions to presentation layers.
/// Slow subscribers lag and drop events; publishing never fails.
pub struct SessionEvents {
    sender: broadcast::Sender<SessionEvent>,
}

impl SessionEvents {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: SessionEvent) {
        tracing::trace!(
            session_id = %event.session_id,
            state = event.state.label(),
            "publishing session event"
        );
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}
