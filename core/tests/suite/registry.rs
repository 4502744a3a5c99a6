use std::sync::Arc;

use pretty_assertions::assert_eq;

use fileshell_core::ConsoleRegistry;
use fileshell_protocol::ConsoleMode;

use super::support::MockConsole;
use super::support::MockFactory;

#[tokio::test]
async fn console_is_created_once_and_cached() {
    let restricted = MockConsole::new(false, vec![]);
    let factory = MockFactory::new(Arc::clone(&restricted), None);
    let registry = ConsoleRegistry::new(factory.clone(), ConsoleMode::Restricted);

    assert!(!registry.is_alloc().await);
    let first = registry.console().await.unwrap();
    let second = registry.console().await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(
        factory
            .create_calls
            .load(std::sync::atomic::Ordering::SeqCst),
        1
    );
    assert!(registry.is_alloc().await);
    assert!(!registry.is_privileged().await);
}

#[tokio::test]
async fn destroy_deallocates_and_clears() {
    let restricted = MockConsole::new(false, vec![]);
    let factory = MockFactory::new(Arc::clone(&restricted), None);
    let registry = ConsoleRegistry::new(factory, ConsoleMode::Restricted);

    registry.console().await.unwrap();
    registry.destroy().await;
    assert!(!registry.is_alloc().await);
    assert_eq!(restricted.dealloc_count(), 1);

    // Destroying an empty registry is a no-op.
    registry.destroy().await;
    assert_eq!(restricted.dealloc_count(), 1);
}

#[tokio::test]
async fn change_to_privileged_is_idempotent_when_already_privileged() {
    let restricted = MockConsole::new(false, vec![]);
    let privileged = MockConsole::new(true, vec![]);
    let factory = MockFactory::new(restricted, Some(privileged));
    let registry = ConsoleRegistry::new(factory.clone(), ConsoleMode::Privileged);

    registry.console().await.unwrap();
    let creates_before = factory
        .create_calls
        .load(std::sync::atomic::Ordering::SeqCst);
    assert!(registry.change_to_privileged().await);
    assert_eq!(
        factory
            .create_calls
            .load(std::sync::atomic::Ordering::SeqCst),
        creates_before
    );
}

#[tokio::test]
async fn downgrade_swaps_back_to_restricted() {
    let restricted = MockConsole::new(false, vec![]);
    let privileged = MockConsole::new(true, vec![]);
    let factory = MockFactory::new(Arc::clone(&restricted), Some(Arc::clone(&privileged)));
    let registry = ConsoleRegistry::new(factory, ConsoleMode::Restricted);

    registry.console().await.unwrap();
    assert!(registry.change_to_privileged().await);
    assert!(registry.is_privileged().await);
    assert_eq!(restricted.dealloc_count(), 1);

    registry.change_to_non_privileged().await.unwrap();
    assert!(!registry.is_privileged().await);
    assert_eq!(privileged.dealloc_count(), 1);
    assert!(registry.is_alloc().await);
}

#[tokio::test]
async fn failed_escalation_leaves_current_console_untouched() {
    let restricted = MockConsole::new(false, vec![]);
    let factory = MockFactory::new(Arc::clone(&restricted), None);
    let registry = ConsoleRegistry::new(factory, ConsoleMode::Restricted);

    let before = registry.console().await.unwrap();
    assert!(!registry.change_to_privileged().await);
    let after = registry.console().await.unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert!(before.is_active());
    assert_eq!(restricted.dealloc_count(), 0);
}
