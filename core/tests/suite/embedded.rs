use std::sync::Arc;

use pretty_assertions::assert_eq;

use fileshell_core::Console;
use fileshell_core::ConsoleError;
use fileshell_core::EmbeddedConsole;
use fileshell_core::ExecEventSender;
use fileshell_core::ExecMode;
use fileshell_core::ExecOutcome;
use fileshell_core::ExecOutput;
use fileshell_core::ExecStatus;
use fileshell_core::Executable;
use fileshell_core::console;
use fileshell_protocol::ExecEvent;
use fileshell_protocol::ExecSignal;
use fileshell_protocol::FileCommand;

use super::support::drain_until_closed;

async fn embedded() -> Arc<EmbeddedConsole> {
    let console = Arc::new(EmbeddedConsole::new(false));
    console.alloc().await.unwrap();
    console
}

async fn run(
    console: &Arc<EmbeddedConsole>,
    command: FileCommand,
) -> Result<ExecOutput, ConsoleError> {
    let (events, _rx) = ExecEventSender::channel();
    match console::execute(
        Arc::clone(console) as Arc<dyn Console>,
        Executable::new(command),
        events,
    )
    .await?
    {
        ExecOutcome::Completed(output) => Ok(output),
        ExecOutcome::Scheduled => unreachable!("synchronous submission"),
    }
}

#[tokio::test]
async fn implements_the_full_command_set() {
    let console = embedded().await;
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();

    run(&console, FileCommand::CreateDirectory {
        path: root.join("sub"),
    })
    .await
    .unwrap();
    run(&console, FileCommand::CreateFile {
        path: root.join("sub/empty"),
    })
    .await
    .unwrap();
    run(&console, FileCommand::WriteFile {
        path: root.join("sub/data.txt"),
        contents: "line one\nline two\n".to_string(),
    })
    .await
    .unwrap();

    let output = run(&console, FileCommand::ReadFile {
        path: root.join("sub/data.txt"),
    })
    .await
    .unwrap();
    assert_eq!(output.stdout, "line one\nline two\n");
    assert!(output.status.success());

    let listing = run(&console, FileCommand::ListDirectory {
        path: root.join("sub"),
    })
    .await
    .unwrap();
    assert!(listing.stdout.contains("data.txt"));
    assert!(listing.stdout.contains("empty"));

    let stat = run(&console, FileCommand::Stat {
        path: root.join("sub/data.txt"),
    })
    .await
    .unwrap();
    assert!(stat.stdout.contains("Size: 18"));

    run(&console, FileCommand::ChangeMode {
        path: root.join("sub/data.txt"),
        mode: 0o600,
    })
    .await
    .unwrap();
    let meta = std::fs::metadata(root.join("sub/data.txt")).unwrap();
    use std::os::unix::fs::PermissionsExt;
    assert_eq!(meta.permissions().mode() & 0o777, 0o600);

    run(&console, FileCommand::Copy {
        source: root.join("sub"),
        dest: root.join("copy"),
    })
    .await
    .unwrap();
    assert!(root.join("copy/data.txt").exists());

    run(&console, FileCommand::Move {
        source: root.join("copy"),
        dest: root.join("moved"),
    })
    .await
    .unwrap();
    assert!(!root.join("copy").exists());
    assert!(root.join("moved/data.txt").exists());

    let usage = run(&console, FileCommand::DiskUsage {
        path: root.join("moved"),
    })
    .await
    .unwrap();
    assert!(usage.stdout.contains('\t'));

    run(&console, FileCommand::Delete {
        path: root.join("moved"),
        recursive: true,
    })
    .await
    .unwrap();
    assert!(!root.join("moved").exists());
}

#[tokio::test]
async fn missing_paths_map_to_no_such_file() {
    let console = embedded().await;
    let err = run(&console, FileCommand::ReadFile {
        path: "/definitely/not/here".into(),
    })
    .await
    .unwrap_err();
    assert!(matches!(err, ConsoleError::NoSuchFileOrDirectory { .. }));
}

#[tokio::test]
async fn raw_exec_is_not_supported() {
    let console = embedded().await;
    let err = run(&console, FileCommand::Exec {
        command: vec!["uname".to_string(), "-a".to_string()],
    })
    .await
    .unwrap_err();
    assert!(matches!(err, ConsoleError::CommandNotFound { .. }));
}

#[tokio::test]
async fn control_operations_are_unsupported() {
    let console = embedded().await;
    assert!(!console.is_privileged());
    assert!(!console.cancel());
    assert!(!console.send_signal(ExecSignal::Interrupt));
    assert!(!console.end());

    console.dealloc().await;
    console.dealloc().await;
    assert!(!console.is_active());
}

// Cancellation cannot stop in-process work; it only suppresses delivery.
// The write still happens, but the terminal signal is a cancellation.
#[tokio::test]
async fn cancellation_suppresses_delivery_but_work_completes() {
    let console = embedded().await;
    let tmp = tempfile::tempdir().unwrap();
    let target = tmp.path().join("written-anyway.txt");

    let executable = Executable::new(FileCommand::WriteFile {
        path: target.clone(),
        contents: "persisted".to_string(),
    });
    executable.cancel();

    let (events, mut rx) = ExecEventSender::channel();
    let outcome = console::execute(
        Arc::clone(&console) as Arc<dyn Console>,
        executable,
        events,
    )
    .await
    .unwrap();

    let ExecOutcome::Completed(output) = outcome else {
        panic!("expected completed submission");
    };
    assert_eq!(output.status, ExecStatus::Canceled);
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "persisted");

    let seen = drain_until_closed(&mut rx).await;
    assert!(matches!(seen.last(), Some(ExecEvent::Canceled(_))));
}

#[tokio::test]
async fn asynchronous_submission_streams_partials_in_order() {
    let console = embedded().await;
    let tmp = tempfile::tempdir().unwrap();
    for name in ["a.txt", "b.txt", "c.txt"] {
        std::fs::write(tmp.path().join(name), name).unwrap();
    }

    let (events, mut rx) = ExecEventSender::channel();
    let outcome = console::execute(
        Arc::clone(&console) as Arc<dyn Console>,
        Executable::new(FileCommand::ListDirectory {
            path: tmp.path().to_path_buf(),
        })
        .with_mode(ExecMode::Async),
        events,
    )
    .await
    .unwrap();
    assert!(matches!(outcome, ExecOutcome::Scheduled));

    let seen = drain_until_closed(&mut rx).await;
    assert!(matches!(seen.first(), Some(ExecEvent::Started(_))));
    let partials: Vec<String> = seen
        .iter()
        .filter_map(|event| match event {
            ExecEvent::PartialResult(partial) => Some(partial.chunk.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(partials.len(), 3);
    assert!(partials[0].contains("a.txt"));
    assert!(partials[2].contains("c.txt"));
    assert!(matches!(seen.last(), Some(ExecEvent::Exited(_))));
}
