use futures::future::BoxFuture;
use owo_colors::OwoColorize;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;

use fileshell_core::ConsoleError;
use fileshell_core::relaunch::EscalationPrompt;
use fileshell_protocol::EscalationDecision;

/// Asks y/N on the terminal. EOF or anything but "y"/"yes" declines.
pub struct TerminalPrompt {
    pub color: bool,
}

impl EscalationPrompt for TerminalPrompt {
    fn request_escalation<'a>(
        &'a self,
        error: &'a ConsoleError,
    ) -> BoxFuture<'a, EscalationDecision> {
        Box::pin(async move {
            if self.color {
                eprintln!("{}", error.to_string().yellow());
            } else {
                eprintln!("{error}");
            }
            eprint!("Retry with a privileged console? [y/N] ");

            let mut line = String::new();
            let mut reader = BufReader::new(tokio::io::stdin());
            if reader.read_line(&mut line).await.is_err() {
                return EscalationDecision::Decline;
            }
            match line.trim().to_ascii_lowercase().as_str() {
                "y" | "yes" => EscalationDecision::Escalate,
                _ => EscalationDecision::Decline,
            }
        })
    }
}
