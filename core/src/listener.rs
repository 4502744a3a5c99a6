use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use tokio::sync::mpsc;

use fileshell_protocol::ExecCanceledEvent;
use fileshell_protocol::ExecEvent;
use fileshell_protocol::ExecExitedEvent;
use fileshell_protocol::ExecFailedEvent;
use fileshell_protocol::ExecStartedEvent;
use fileshell_protocol::FileCommand;
use fileshell_protocol::OutputStream;
use fileshell_protocol::PartialResultEvent;

use crate::error::ConsoleError;

/// Sending half of the listener contract.
///
/// Enforces the event-stream invariants structurally: partials are delivered
/// in production order, at most one terminal event is ever sent, and nothing
/// follows a terminal. Clones share the terminal guard, so a sender handed
/// to a background task cannot double-terminate either.
#[derive(Debug, Clone)]
pub struct ExecEventSender {
    tx: Option<mpsc::UnboundedSender<ExecEvent>>,
    terminal_sent: Arc<AtomicBool>,
}

impl ExecEventSender {
    /// A connected sender/receiver pair for one submission.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ExecEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Some(tx),
                terminal_sent: Arc::new(AtomicBool::new(false)),
            },
            rx,
        )
    }

    /// A sender that drops every event, for callers that do not listen.
    pub fn discard() -> Self {
        Self {
            tx: None,
            terminal_sent: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn started(&self, command: &FileCommand) {
        self.send(ExecEvent::Started(ExecStartedEvent {
            command: command.describe(),
        }));
    }

    pub fn partial(&self, stream: OutputStream, chunk: &str) {
        self.send(ExecEvent::PartialResult(PartialResultEvent {
            stream,
            chunk: chunk.to_string(),
        }));
    }

    pub fn exited(&self, exit_code: i32) {
        self.send_terminal(ExecEvent::Exited(ExecExitedEvent { exit_code }));
    }

    pub fn canceled(&self) {
        self.send_terminal(ExecEvent::Canceled(ExecCanceledEvent::default()));
    }

    pub fn failed(&self, error: &ConsoleError) {
        self.send_terminal(ExecEvent::Failed(ExecFailedEvent {
            error: error.to_info(),
        }));
    }

    /// True once a terminal event has been sent for this submission.
    pub fn terminal_sent(&self) -> bool {
        self.terminal_sent.load(Ordering::Acquire)
    }

    fn send(&self, event: ExecEvent) {
        if self.terminal_sent() {
            return;
        }
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    fn send_terminal(&self, event: ExecEvent) {
        if self
            .terminal_sent
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
