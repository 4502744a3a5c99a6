mod cli;
mod output;
mod prompt;

use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use fileshell_core::ConsoleConfig;
use fileshell_core::ConsoleRegistry;
use fileshell_core::ExecEventSender;
use fileshell_core::ExecMode;
use fileshell_core::Executable;
use fileshell_core::relaunch;
use fileshell_core::relaunch::EscalationPrompt;
use fileshell_core::relaunch::FixedDecision;
use fileshell_protocol::EscalationDecision;

pub use cli::Cli;
pub use cli::CliCommand;
pub use cli::EscalateArg;
pub use cli::ModeArg;

pub async fn run_main(cli: Cli) -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut config = ConsoleConfig::load(cli.config_path.as_deref())?;
    if let Some(mode) = cli.mode {
        config.default_mode = mode.into();
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.timeout_ms = timeout_ms;
    }
    tracing::debug!("starting with {} console", config.default_mode);

    let color = !cli.json && supports_color::on(supports_color::Stream::Stderr).is_some();
    let buffer_size = config.buffer_size;
    let registry = Arc::new(ConsoleRegistry::with_config(config));

    let command = cli.command.into_file_command()?;
    let executable = Executable::new(command)
        .with_buffer_size(buffer_size)
        .with_mode(if cli.stream {
            ExecMode::Async
        } else {
            ExecMode::Sync
        });

    let prompt: Arc<dyn EscalationPrompt> = match cli.escalate {
        EscalateArg::Ask => Arc::new(prompt::TerminalPrompt { color }),
        EscalateArg::Always => Arc::new(FixedDecision(EscalationDecision::Escalate)),
        EscalateArg::Never => Arc::new(FixedDecision(EscalationDecision::Decline)),
    };

    let (events, rx) = ExecEventSender::channel();
    let renderer = tokio::spawn(output::render_events(rx, cli.json, color));

    // The renderer owns final reporting; an error here has already been
    // delivered to it as the terminal event.
    let _ = relaunch::submit(Arc::clone(&registry), executable, events, prompt).await;

    let status = renderer.await?;
    registry.destroy().await;
    Ok(ExitCode::from(status.exit_code()))
}
