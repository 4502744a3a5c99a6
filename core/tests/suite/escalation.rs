use std::sync::Arc;

use pretty_assertions::assert_eq;

use fileshell_core::ConsoleError;
use fileshell_core::ConsoleRegistry;
use fileshell_core::ExecEventSender;
use fileshell_core::ExecOutcome;
use fileshell_core::ExecOutput;
use fileshell_core::ExecStatus;
use fileshell_core::Executable;
use fileshell_core::ExecMode;
use fileshell_core::relaunch;
use fileshell_protocol::ConsoleMode;
use fileshell_protocol::EscalationDecision;
use fileshell_protocol::ExecErrorKind;
use fileshell_protocol::ExecEvent;

use super::support::MockConsole;
use super::support::MockFactory;
use super::support::ScriptedPrompt;
use super::support::drain_now;
use super::support::drain_until_closed;
use super::support::insufficient;
use super::support::stat_command;

// Scenario A: restricted console fails with a permission error, the user
// accepts escalation, escalation succeeds, and the resubmission's outcome is
// delivered exactly once.
#[tokio::test]
async fn accepted_escalation_resubmits_and_delivers_new_outcome() {
    let restricted = MockConsole::new(false, vec![Err(insufficient())]);
    let privileged = MockConsole::new(true, vec![Ok(ExecOutput::success())]);
    let factory = MockFactory::new(Arc::clone(&restricted), Some(Arc::clone(&privileged)));
    let registry = Arc::new(ConsoleRegistry::new(factory, ConsoleMode::Restricted));
    let prompt = ScriptedPrompt::new(EscalationDecision::Escalate);
    let (events, mut rx) = ExecEventSender::channel();

    let outcome = relaunch::submit(
        Arc::clone(&registry),
        Executable::new(stat_command()),
        events,
        prompt.clone(),
    )
    .await
    .unwrap();

    let ExecOutcome::Completed(output) = outcome else {
        panic!("expected a completed synchronous submission");
    };
    assert_eq!(output.status, ExecStatus::Exited { exit_code: 0 });
    assert_eq!(prompt.call_count(), 1);
    assert_eq!(restricted.exec_count(), 1);
    assert_eq!(privileged.exec_count(), 1);
    // The previous console was deallocated exactly once during the swap.
    assert_eq!(restricted.dealloc_count(), 1);
    assert!(registry.is_privileged().await);

    let seen = drain_now(&mut rx);
    assert!(matches!(seen[0], ExecEvent::Started(_)));
    let terminals: Vec<_> = seen.iter().filter(|event| event.is_terminal()).collect();
    assert_eq!(terminals.len(), 1);
    assert!(matches!(terminals[0], ExecEvent::Exited(_)));
}

// Scenario B: escalation is unavailable; the original error surfaces as
// final and the restricted console stays in place.
#[tokio::test]
async fn failed_escalation_surfaces_original_error() {
    let restricted = MockConsole::new(false, vec![Err(insufficient())]);
    let factory = MockFactory::new(Arc::clone(&restricted), None);
    let registry = Arc::new(ConsoleRegistry::new(factory, ConsoleMode::Restricted));
    let prompt = ScriptedPrompt::new(EscalationDecision::Escalate);
    let (events, mut rx) = ExecEventSender::channel();

    let err = relaunch::submit(
        Arc::clone(&registry),
        Executable::new(stat_command()),
        events,
        prompt.clone(),
    )
    .await
    .unwrap_err();

    assert_eq!(err, insufficient());
    assert_eq!(prompt.call_count(), 1);
    assert!(registry.is_alloc().await);
    assert!(!registry.is_privileged().await);
    assert_eq!(restricted.dealloc_count(), 0);

    let seen = drain_now(&mut rx);
    let Some(ExecEvent::Failed(failed)) = seen.last() else {
        panic!("expected a Failed terminal event");
    };
    assert_eq!(failed.error.kind, ExecErrorKind::InsufficientPermissions);
}

// Scenario C: already privileged; no prompt, the error is immediately final.
#[tokio::test]
async fn already_privileged_failure_is_final_without_prompt() {
    let restricted = MockConsole::new(false, vec![]);
    let privileged = MockConsole::new(true, vec![Err(insufficient())]);
    let factory = MockFactory::new(restricted, Some(Arc::clone(&privileged)));
    let registry = Arc::new(ConsoleRegistry::new(factory, ConsoleMode::Privileged));
    let prompt = ScriptedPrompt::new(EscalationDecision::Escalate);
    let (events, mut rx) = ExecEventSender::channel();

    let err = relaunch::submit(
        Arc::clone(&registry),
        Executable::new(stat_command()),
        events,
        prompt.clone(),
    )
    .await
    .unwrap_err();

    assert!(err.is_relaunchable());
    assert_eq!(prompt.call_count(), 0);
    assert_eq!(privileged.exec_count(), 1);

    let seen = drain_now(&mut rx);
    assert!(matches!(seen.last(), Some(ExecEvent::Failed(_))));
}

// A second failure of the resubmitted executable never triggers a second
// prompt.
#[tokio::test]
async fn retry_is_bounded_to_one_attempt() {
    let restricted = MockConsole::new(false, vec![Err(insufficient())]);
    let privileged = MockConsole::new(true, vec![Err(insufficient())]);
    let factory = MockFactory::new(Arc::clone(&restricted), Some(Arc::clone(&privileged)));
    let registry = Arc::new(ConsoleRegistry::new(factory, ConsoleMode::Restricted));
    let prompt = ScriptedPrompt::new(EscalationDecision::Escalate);
    let (events, mut rx) = ExecEventSender::channel();

    let err = relaunch::submit(
        Arc::clone(&registry),
        Executable::new(stat_command()),
        events,
        prompt.clone(),
    )
    .await
    .unwrap_err();

    assert!(err.is_relaunchable());
    assert_eq!(prompt.call_count(), 1);
    assert_eq!(restricted.exec_count(), 1);
    assert_eq!(privileged.exec_count(), 1);

    let seen = drain_now(&mut rx);
    let terminals: Vec<_> = seen.iter().filter(|event| event.is_terminal()).collect();
    assert_eq!(terminals.len(), 1);
    assert!(matches!(terminals[0], ExecEvent::Failed(_)));
}

// Declining maps to a Canceled terminal so the caller can roll back
// optimistic state, while the submitting code gets the original error back.
#[tokio::test]
async fn declined_escalation_cancels() {
    let restricted = MockConsole::new(false, vec![Err(insufficient())]);
    let factory = MockFactory::new(Arc::clone(&restricted), None);
    let registry = Arc::new(ConsoleRegistry::new(factory, ConsoleMode::Restricted));
    let prompt = ScriptedPrompt::new(EscalationDecision::Decline);
    let (events, mut rx) = ExecEventSender::channel();

    let err = relaunch::submit(
        Arc::clone(&registry),
        Executable::new(stat_command()),
        events,
        prompt.clone(),
    )
    .await
    .unwrap_err();

    assert_eq!(err, insufficient());
    assert_eq!(prompt.call_count(), 1);

    let seen = drain_now(&mut rx);
    assert!(matches!(seen.last(), Some(ExecEvent::Canceled(_))));
}

// Non-relaunchable failures bypass the protocol entirely.
#[tokio::test]
async fn non_relaunchable_errors_propagate_directly() {
    let failure = ConsoleError::Execution {
        exit_code: 2,
        detail: "boom".to_string(),
    };
    let restricted = MockConsole::new(false, vec![Err(failure.clone())]);
    let factory = MockFactory::new(Arc::clone(&restricted), None);
    let registry = Arc::new(ConsoleRegistry::new(factory, ConsoleMode::Restricted));
    let prompt = ScriptedPrompt::new(EscalationDecision::Escalate);
    let (events, mut rx) = ExecEventSender::channel();

    let err = relaunch::submit(
        Arc::clone(&registry),
        Executable::new(stat_command()),
        events,
        prompt.clone(),
    )
    .await
    .unwrap_err();

    assert_eq!(err, failure);
    assert_eq!(prompt.call_count(), 0);
    let seen = drain_now(&mut rx);
    assert!(matches!(seen.last(), Some(ExecEvent::Failed(_))));
}

// Asynchronous submissions run the whole protocol on a background task and
// deliver the outcome through the listener channel.
#[tokio::test]
async fn asynchronous_submission_streams_the_outcome() {
    let restricted = MockConsole::new(false, vec![Ok(ExecOutput::success())]);
    let factory = MockFactory::new(Arc::clone(&restricted), None);
    let registry = Arc::new(ConsoleRegistry::new(factory, ConsoleMode::Restricted));
    let prompt = ScriptedPrompt::new(EscalationDecision::Decline);
    let (events, mut rx) = ExecEventSender::channel();

    let outcome = relaunch::submit(
        Arc::clone(&registry),
        Executable::new(stat_command()).with_mode(ExecMode::Async),
        events,
        prompt,
    )
    .await
    .unwrap();
    assert!(matches!(outcome, ExecOutcome::Scheduled));

    let seen = drain_until_closed(&mut rx).await;
    assert!(matches!(seen.first(), Some(ExecEvent::Started(_))));
    assert!(matches!(seen.last(), Some(ExecEvent::Exited(_))));
}
