//! The relaunch/recovery protocol.
//!
//! When an execution fails because the current console's identity lacks
//! permission, the caller is offered one chance to escalate privileges and
//! have the same executable resubmitted (a linear, one-shot retry). A second
//! failure of the resubmitted executable is always final; there is never a
//! second prompt for the same submission.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use fileshell_protocol::EscalationDecision;

use crate::console;
use crate::console::ExecOutcome;
use crate::error::ConsoleError;
use crate::executable::ExecMode;
use crate::executable::Executable;
use crate::listener::ExecEventSender;
use crate::output::ExecOutput;
use crate::registry::ConsoleRegistry;

/// Asks whoever drives the UI whether a permission failure should be retried
/// through a privileged console.
pub trait EscalationPrompt: Send + Sync {
    fn request_escalation<'a>(
        &'a self,
        error: &'a ConsoleError,
    ) -> BoxFuture<'a, EscalationDecision>;
}

/// A prompt that always answers the same thing; useful for non-interactive
/// callers and tests.
pub struct FixedDecision(pub EscalationDecision);

impl EscalationPrompt for FixedDecision {
    fn request_escalation<'a>(
        &'a self,
        _error: &'a ConsoleError,
    ) -> BoxFuture<'a, EscalationDecision> {
        Box::pin(async move { self.0 })
    }
}

/// Submit `executable` through the registry's current console with the
/// relaunch protocol wrapped around it.
///
/// Synchronous submissions return after the terminal event has been
/// delivered; asynchronous ones return [`ExecOutcome::Scheduled`] and run
/// the whole flow, including any escalation prompt, on a background task.
pub async fn submit(
    registry: Arc<ConsoleRegistry>,
    executable: Executable,
    events: ExecEventSender,
    prompt: Arc<dyn EscalationPrompt>,
) -> Result<ExecOutcome, ConsoleError> {
    match executable.mode() {
        ExecMode::Sync => drive(registry, executable, events, prompt)
            .await
            .map(ExecOutcome::Completed),
        ExecMode::Async => {
            tokio::spawn(async move {
                let _ = drive(registry, executable, events, prompt).await;
            });
            Ok(ExecOutcome::Scheduled)
        }
    }
}

async fn drive(
    registry: Arc<ConsoleRegistry>,
    executable: Executable,
    events: ExecEventSender,
    prompt: Arc<dyn EscalationPrompt>,
) -> Result<ExecOutput, ConsoleError> {
    // Allocation failures are never retried automatically; the caller picks
    // a different privilege level or gives up.
    let console = match registry.console().await {
        Ok(console) => console,
        Err(err) => {
            events.failed(&err);
            return Err(err);
        }
    };

    events.started(executable.command());
    let first = console.exec(&executable, &events).await;

    let original = match first {
        Err(err) if err.is_relaunchable() && !executable.is_canceled() => err,
        other => return console::deliver_terminal(&executable, &events, other),
    };

    // Already privileged: escalation cannot help, surface as final.
    if registry.is_privileged().await {
        events.failed(&original);
        return Err(original);
    }

    match prompt.request_escalation(&original).await {
        EscalationDecision::Decline => {
            // Declined (or dismissed) prompt: the caller's terminal signal is
            // a cancellation so it can roll back optimistic state; the
            // original error is handed back to the submitting code.
            events.canceled();
            return Err(original);
        }
        EscalationDecision::Escalate => {}
    }

    if executable.is_canceled() {
        events.canceled();
        return Err(original);
    }

    if !registry.change_to_privileged().await {
        // No way to elevate; the original failure stands.
        events.failed(&original);
        return Err(original);
    }

    debug!("escalated; resubmitting {}", executable.command().describe());
    let console = match registry.console().await {
        Ok(console) => console,
        Err(err) => {
            events.failed(&err);
            return Err(err);
        }
    };
    // Second and last attempt: whatever happens now is final.
    let second = console.exec(&executable, &events).await;
    console::deliver_terminal(&executable, &events, second)
}
