use std::io::Write;

use owo_colors::OwoColorize;
use tokio::sync::mpsc::UnboundedReceiver;

use fileshell_protocol::ExecErrorKind;
use fileshell_protocol::ExecEvent;
use fileshell_protocol::OutputStream;

/// What the event stream ended with, for mapping to a process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalStatus {
    Exited(i32),
    Canceled,
    Failed(ExecErrorKind),
}

impl FinalStatus {
    pub fn exit_code(self) -> u8 {
        match self {
            FinalStatus::Exited(code) => u8::try_from(code.clamp(0, 255)).unwrap_or(1),
            // Mirror the shell convention for interrupted commands.
            FinalStatus::Canceled => 130,
            FinalStatus::Failed(_) => 1,
        }
    }
}

/// Drain the event channel to stdout/stderr until the submission ends.
pub async fn render_events(
    mut rx: UnboundedReceiver<ExecEvent>,
    json: bool,
    color: bool,
) -> FinalStatus {
    let mut status = FinalStatus::Exited(0);
    while let Some(event) = rx.recv().await {
        if json {
            if let Ok(line) = serde_json::to_string(&event) {
                println!("{line}");
            }
        } else {
            render_human(&event, color);
        }
        match event {
            ExecEvent::Exited(exited) => status = FinalStatus::Exited(exited.exit_code),
            ExecEvent::Canceled(_) => status = FinalStatus::Canceled,
            ExecEvent::Failed(failed) => status = FinalStatus::Failed(failed.error.kind),
            ExecEvent::Started(_) | ExecEvent::PartialResult(_) => {}
        }
    }
    status
}

fn render_human(event: &ExecEvent, color: bool) {
    match event {
        ExecEvent::Started(started) => {
            if color {
                eprintln!("{}", format!("» {}", started.command).dimmed());
            } else {
                eprintln!("» {}", started.command);
            }
        }
        ExecEvent::PartialResult(partial) => match partial.stream {
            OutputStream::Stdout => {
                print!("{}", partial.chunk);
                let _ = std::io::stdout().flush();
            }
            OutputStream::Stderr => {
                if color {
                    eprint!("{}", partial.chunk.red());
                } else {
                    eprint!("{}", partial.chunk);
                }
            }
        },
        ExecEvent::Exited(exited) => {
            if exited.exit_code != 0 {
                eprintln!("exit code: {}", exited.exit_code);
            }
        }
        ExecEvent::Canceled(_) => {
            eprintln!("canceled");
        }
        ExecEvent::Failed(failed) => {
            let line = format!("{}: {}", failed.error.kind, failed.error.message);
            if color {
                eprintln!("{}", line.red());
            } else {
                eprintln!("{line}");
            }
        }
    }
}
