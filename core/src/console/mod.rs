//! The console abstraction: how a file-manager command actually runs.
//!
//! A [`Console`] hides whether execution happens through an elevated shell
//! process ([`ShellConsole`]) or an in-process fallback
//! ([`EmbeddedConsole`]). Backends implement [`Console::exec`] (streaming
//! partials and returning a terminal result) while [`execute`] owns the
//! Started/terminal event emission and the sync-vs-async dispatch, so the
//! listener-ordering guarantees live in exactly one place.

mod embedded;
mod shell;

pub use embedded::EmbeddedConsole;
pub use shell::ShellConsole;

use std::sync::Arc;

use async_trait::async_trait;

use fileshell_protocol::ExecSignal;
use fileshell_protocol::Identity;

use crate::error::ConsoleError;
use crate::executable::ExecMode;
use crate::executable::Executable;
use crate::listener::ExecEventSender;
use crate::output::ExecOutput;
use crate::output::ExecStatus;

/// An execution context: owns the resources commands run on.
///
/// A console must be `alloc()`-ed before anything is executed on it and
/// `dealloc()`-ed before it is discarded; `dealloc` is idempotent.
#[async_trait]
pub trait Console: Send + Sync {
    /// Acquire the underlying resources (spawn the shell, or mark the
    /// in-process executor ready). Allocating an already-active console is
    /// a no-op.
    async fn alloc(&self) -> Result<(), ConsoleError>;

    /// Release resources. Safe to call repeatedly; the second call is a
    /// no-op.
    async fn dealloc(&self);

    /// `dealloc` then `alloc`; recovers a wedged console without changing
    /// identity.
    async fn realloc(&self) -> Result<(), ConsoleError> {
        self.dealloc().await;
        self.alloc().await
    }

    fn is_active(&self) -> bool;

    fn is_privileged(&self) -> bool;

    /// Effective user/group this console runs as. [`Identity::unknown`]
    /// until a successful `alloc`.
    fn identity(&self) -> Identity;

    /// Whether command traffic is logged at debug level.
    fn trace(&self) -> bool;

    /// Run the executable's command body. Implementations stream partial
    /// results through `events` but must not emit Started or terminal
    /// events; the drivers own those.
    async fn exec(
        &self,
        executable: &Executable,
        events: &ExecEventSender,
    ) -> Result<ExecOutput, ConsoleError>;

    /// Best-effort: stop the in-flight execution. Returns false when the
    /// backend cannot (the in-process fallback has no process to stop).
    fn cancel(&self) -> bool;

    /// Best-effort: deliver `signal` to the in-flight execution.
    fn send_signal(&self, signal: ExecSignal) -> bool;

    /// Best-effort: tear down the in-flight execution together with the
    /// session underneath it.
    fn end(&self) -> bool;
}

/// Result of submitting an executable.
#[derive(Debug)]
pub enum ExecOutcome {
    /// Synchronous submission: the terminal outcome, already delivered to
    /// the listener.
    Completed(ExecOutput),
    /// Asynchronous submission: scheduled on a background task; the outcome
    /// arrives via the listener channel.
    Scheduled,
}

/// Submit `executable` to `console`, honoring its [`ExecMode`].
///
/// Calling this on a console that was never `alloc()`-ed is a programming
/// error and panics.
pub async fn execute(
    console: Arc<dyn Console>,
    executable: Executable,
    events: ExecEventSender,
) -> Result<ExecOutcome, ConsoleError> {
    assert!(
        console.is_active(),
        "execute() called on a console that was never alloc()-ed"
    );
    match executable.mode() {
        ExecMode::Sync => run_to_completion(console.as_ref(), &executable, &events)
            .await
            .map(ExecOutcome::Completed),
        ExecMode::Async => {
            tokio::spawn(async move {
                let _ = run_to_completion(console.as_ref(), &executable, &events).await;
            });
            Ok(ExecOutcome::Scheduled)
        }
    }
}

pub(crate) async fn run_to_completion(
    console: &dyn Console,
    executable: &Executable,
    events: &ExecEventSender,
) -> Result<ExecOutput, ConsoleError> {
    events.started(executable.command());
    let result = console.exec(executable, events).await;
    deliver_terminal(executable, events, result)
}

/// Emit the single terminal event for `result` and map it to the caller's
/// return value. A cancellation observed on the executable wins over
/// whatever the backend reported.
pub(crate) fn deliver_terminal(
    executable: &Executable,
    events: &ExecEventSender,
    result: Result<ExecOutput, ConsoleError>,
) -> Result<ExecOutput, ConsoleError> {
    if executable.is_canceled() {
        events.canceled();
        let output = match result {
            Ok(output) => ExecOutput {
                status: ExecStatus::Canceled,
                ..output
            },
            Err(_) => ExecOutput::canceled(),
        };
        return Ok(output);
    }
    match result {
        Ok(output) => {
            match &output.status {
                ExecStatus::Exited { exit_code } => events.exited(*exit_code),
                ExecStatus::Canceled => events.canceled(),
            }
            Ok(output)
        }
        Err(err) => {
            events.failed(&err);
            Err(err)
        }
    }
}
