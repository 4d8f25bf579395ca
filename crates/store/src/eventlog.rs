use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use gf_domain::error::{Error, Result};
use gf_domain::event::Event;

/// Append-only NDJSON writer for a session's event log (spec.md 4.2).
/// Flushes per event; never rewrites or deletes.
pub struct EventLogWriter {
    path: PathBuf,
}

impl EventLogWriter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn append(&self, event: &Event) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

/// Streams events from an NDJSON log to a channel, for late or
/// cross-process subscribers (spec.md 4.2, 4.9).
///
/// Behavior: (a) blocks up to a configurable timeout for the file to
/// appear, (b) reads the file in full once, decoding each complete
/// line, (c) then polls the file size at a small interval and streams
/// newly appended lines until a terminal event line is observed.
/// Partial trailing lines are never emitted; byte offsets are
/// retained to avoid re-reading.
pub struct Tailer {
    path: PathBuf,
    offset: u64,
    poll_interval: Duration,
    appear_timeout: Duration,
}

impl Tailer {
    pub fn new(path: PathBuf, poll_interval: Duration, appear_timeout: Duration) -> Self {
        Self {
            path,
            offset: 0,
            poll_interval,
            appear_timeout,
        }
    }

    /// Wait for the log file to exist, bounded by `appear_timeout`
    /// (spec.md 4.9: "must wait up to a bounded timeout for the log
    /// file to appear, handling the race cleanly").
    async fn wait_for_file(&self) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        let deadline = tokio::time::Instant::now() + self.appear_timeout;
        loop {
            if self.path.exists() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::Timeout(format!(
                    "event log {} did not appear in time",
                    self.path.display()
                )));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Read whatever complete lines are available past `self.offset`,
    /// decode them, and advance the offset. Returns the decoded
    /// events and whether a terminal event was observed.
    fn read_new_complete_lines(&mut self) -> Result<(Vec<Event>, bool)> {
        let mut file = std::fs::File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.offset))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;

        let last_newline = buf.iter().rposition(|&b| b == b'\n');
        let complete_len = match last_newline {
            Some(pos) => pos + 1,
            None => return Ok((Vec::new(), false)),
        };

        let complete = &buf[..complete_len];
        let text = String::from_utf8_lossy(complete);
        let mut events = Vec::new();
        let mut terminal = false;
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Event>(line) {
                Ok(event) => {
                    terminal = terminal || event.is_terminal();
                    events.push(event);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed event log line");
                }
            }
        }

        self.offset += complete_len as u64;
        Ok((events, terminal))
    }

    /// Stream every event in the log to `tx`, in order, stopping after
    /// a terminal event. Closes the channel on return (by drop),
    /// matching the "proper channel closure" design note (spec.md 9)
    /// rather than polling the caller for completion.
    pub async fn run(mut self, tx: tokio::sync::mpsc::Sender<Event>) -> Result<()> {
        self.wait_for_file().await?;

        loop {
            let (events, terminal) = self.read_new_complete_lines()?;
            for event in events {
                if tx.send(event).await.is_err() {
                    // Receiver dropped; nothing more to do.
                    return Ok(());
                }
            }
            if terminal {
                return Ok(());
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

pub fn log_path_for_session(workspace: &super::workspace::WorkspaceLayout, session_id: uuid::Uuid) -> PathBuf {
    workspace.events_path(session_id)
}
