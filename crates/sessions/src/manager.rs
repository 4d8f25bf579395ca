use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use gf_domain::error::{Error, Result};
use gf_domain::event::{Event, EventKind};
use gf_domain::session::{Session, SessionKind, SessionStatus};
use gf_domain::trace::TraceEvent;
use gf_store::EventLogWriter;

use crate::cancel::{CancelMap, CancelToken};

struct SessionEntry {
    session: Session,
    /// Bounded ring of recently emitted events. Evicting the oldest
    /// never affects live subscribers (spec.md 5: "back-pressure");
    /// only late subscribers lose access to evicted history and must
    /// fall back to the Event Log Mirror.
    buffer: VecDeque<Event>,
    next_seq: u64,
    bus: broadcast::Sender<Event>,
    log_writer: Option<EventLogWriter>,
}

/// In-memory registry of sessions, per-session event bus, status, and
/// cancellation (spec.md 4.1). Grounded on the teacher's `SessionStore`
/// (registry shape) and `RunStore` (bounded ring + sequence numbers).
pub struct SessionManager {
    entries: RwLock<HashMap<Uuid, Arc<RwLock<SessionEntry>>>>,
    pub cancel_map: Arc<CancelMap>,
    event_buffer_size: usize,
}

impl SessionManager {
    pub fn new(event_buffer_size: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            cancel_map: Arc::new(CancelMap::new()),
            event_buffer_size,
        }
    }

    /// Registers a Session in state Created; fails if id already
    /// exists (spec.md 4.1).
    pub fn create(&self, id: Uuid, kind: SessionKind, log_writer: Option<EventLogWriter>) -> Result<CancelToken> {
        let mut entries = self.entries.write();
        if entries.contains_key(&id) {
            return Err(Error::Other(format!("session {id} already exists")));
        }
        let (tx, _rx) = broadcast::channel(self.event_buffer_size.max(16));
        entries.insert(
            id,
            Arc::new(RwLock::new(SessionEntry {
                session: Session::new(id, kind),
                buffer: VecDeque::with_capacity(self.event_buffer_size),
                next_seq: 0,
                bus: tx,
                log_writer,
            })),
        );
        let token = self.cancel_map.register(&id.to_string());
        TraceEvent::SessionCreated {
            session_id: id.to_string(),
            kind: format!("{kind:?}"),
        }
        .emit();
        Ok(token)
    }

    fn entry(&self, id: Uuid) -> Result<Arc<RwLock<SessionEntry>>> {
        self.entries
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("session {id}")))
    }

    /// Created → Started; sets startedAt (spec.md 4.1).
    pub fn start(&self, id: Uuid) -> Result<()> {
        let entry = self.entry(id)?;
        entry.write().session.start();
        Ok(())
    }

    pub fn status(&self, id: Uuid) -> Result<Session> {
        Ok(self.entry(id)?.read().session.clone())
    }

    /// Appends `kind` as an event with the next sequence number,
    /// publishes to the bus, and mirrors it to the event log. No-op if
    /// the session is already terminal (spec.md 4.1).
    pub fn emit(&self, id: Uuid, kind: EventKind) -> Result<()> {
        let entry = self.entry(id)?;
        let mut guard = entry.write();
        if guard.session.status.is_terminal() {
            return Ok(());
        }

        let seq = guard.next_seq;
        guard.next_seq += 1;
        let event = Event::new(id, seq, kind);

        if guard.buffer.len() == self.event_buffer_size {
            guard.buffer.pop_front();
        }
        guard.buffer.push_back(event.clone());

        // Broadcast send failing (no live subscribers) is expected and
        // not an error.
        let _ = guard.bus.send(event.clone());

        if let Some(writer) = &guard.log_writer {
            if let Err(e) = writer.append(&event) {
                tracing::warn!(session_id = %id, error = %e, "event log append failed; in-memory bus remains authoritative");
            }
        }
        Ok(())
    }

    /// Returns a lazy, restartable sequence of events starting at
    /// sequence 0: buffered events first, then live ones (spec.md
    /// 4.1). A forwarding task isolates this subscriber from the
    /// others — if the receiver is dropped, the task simply exits.
    pub fn subscribe(&self, id: Uuid) -> Result<mpsc::Receiver<Event>> {
        let entry = self.entry(id)?;
        let (buffered, mut live_rx) = {
            let guard = entry.read();
            (guard.buffer.clone(), guard.bus.subscribe())
        };

        let (tx, rx) = mpsc::channel(buffered.len().max(16));
        tokio::spawn(async move {
            for event in buffered {
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            loop {
                match live_rx.recv().await {
                    Ok(event) => {
                        let terminal = event.is_terminal();
                        if tx.send(event).await.is_err() {
                            return;
                        }
                        if terminal {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });
        Ok(rx)
    }

    /// Marks the cancellation token; the orchestrator polls this and
    /// performs the terminal transition itself (spec.md 4.1).
    pub fn cancel(&self, id: Uuid) {
        self.cancel_map.cancel(&id.to_string());
    }

    pub fn is_cancelled(&self, id: Uuid) -> bool {
        !self.cancel_map.is_running(&id.to_string())
    }

    /// Terminal transition from any non-terminal state; emits exactly
    /// one terminal event; invokes the cleanup hook once (spec.md
    /// 4.1). Returns `Ok(true)` if this call performed the
    /// transition, `Ok(false)` if the session was already terminal.
    pub fn complete(&self, id: Uuid, status: SessionStatus, error: Option<String>) -> Result<bool> {
        let entry = self.entry(id)?;
        let already_terminal = entry.read().session.status.is_terminal();
        if already_terminal {
            return Ok(false);
        }

        let terminal_kind = match status {
            SessionStatus::Completed => EventKind::SessionCompleted,
            SessionStatus::Failed => EventKind::SessionFailed {
                error: error.clone().unwrap_or_default(),
            },
            SessionStatus::Cancelled => EventKind::SessionCancelled,
            _ => return Err(Error::Other("complete() requires a terminal status".into())),
        };

        // Emit while the session is still non-terminal, so `emit`'s own
        // is_terminal guard doesn't swallow this event; only then flip
        // the session's status to terminal.
        self.emit(id, terminal_kind)?;
        entry.write().session.complete(status, error);

        TraceEvent::SessionTerminal {
            session_id: id.to_string(),
            status: format!("{status:?}"),
        }
        .emit();

        self.cleanup(id);
        Ok(true)
    }

    /// The cleanup hook, invoked exactly once on terminal transition
    /// (spec.md 3, 4.1). Removes the cancellation token; the session
    /// snapshot and buffered events remain queryable.
    fn cleanup(&self, id: Uuid) {
        self.cancel_map.remove(&id.to_string());
    }
}
