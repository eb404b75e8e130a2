use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use opslock_domain::Target;

use super::{EventService, lock_unpoisoned};

/// Per-event state shared between the handle and the heartbeat worker.
pub(crate) struct EventState {
    pub(crate) target: Target,
    pub(crate) kind: String,
    pub(crate) owner: String,
    pub(crate) cancelable: bool,
    pub(crate) start_time: DateTime<Utc>,
    pub(crate) running: AtomicBool,
    pub(crate) log: Mutex<EventLog>,
}

#[derive(Default)]
pub(crate) struct EventLog {
    pub(crate) buffer: String,
    pub(crate) writer: Option<Box<dyn Write + Send>>,
}

impl EventState {
    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Takes the buffered log lines, leaving the buffer empty.
    pub(crate) fn take_buffered_log(&self) -> Option<String> {
        let mut log = lock_unpoisoned(&self.log);
        if log.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut log.buffer))
        }
    }

    /// Puts unflushed lines back in front of anything appended since.
    pub(crate) fn restore_buffered_log(&self, lines: Option<String>) {
        if let Some(mut lines) = lines {
            let mut log = lock_unpoisoned(&self.log);
            lines.push_str(&log.buffer);
            log.buffer = lines;
        }
    }
}

/// Handle to a live event held by this process.
pub struct ActiveEvent {
    pub(super) service: EventService,
    pub(super) state: Arc<EventState>,
}

impl fmt::Debug for ActiveEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveEvent").finish_non_exhaustive()
    }
}

impl ActiveEvent {
    pub(super) fn new(service: EventService, state: Arc<EventState>) -> Self {
        Self { service, state }
    }

    /// Target this event holds the lock on.
    #[must_use]
    pub fn target(&self) -> &Target {
        &self.state.target
    }

    /// Operation kind.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.state.kind
    }

    /// Operator that started the event.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.state.owner
    }

    /// Creation time of the event.
    #[must_use]
    pub fn start_time(&self) -> DateTime<Utc> {
        self.state.start_time
    }

    /// Whether the ask/ack cancellation handshake is available.
    #[must_use]
    pub fn cancelable(&self) -> bool {
        self.state.cancelable
    }

    /// True until the event terminates or is observed pre-empted.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Appends one formatted line, newline-terminated, to the buffered
    /// event log. The buffer is flushed to the store on the next lease
    /// refresh and at termination, so lines whose holder crashes before a
    /// flush are lost; the log is advisory.
    ///
    /// When a log writer is attached the same bytes are mirrored to it
    /// synchronously.
    pub fn append_log(&self, line: fmt::Arguments<'_>) {
        let mut text = line.to_string();
        text.push('\n');

        let mut log = lock_unpoisoned(&self.state.log);
        if let Some(writer) = log.writer.as_mut() {
            let _ = writer.write_all(text.as_bytes());
        }
        log.buffer.push_str(&text);
    }

    /// Attaches a writer mirroring subsequent log appends. Writer failures
    /// are discarded; the buffered store copy is unaffected.
    pub fn set_log_writer(&self, writer: Box<dyn Write + Send>) {
        lock_unpoisoned(&self.state.log).writer = Some(writer);
    }
}
