use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use fileshell_protocol::ExecSignal;
use fileshell_protocol::FileCommand;
use fileshell_protocol::Identity;
use fileshell_protocol::OutputStream;
use fileshell_utils_process::ProcessHandle;
use fileshell_utils_process::SpawnedChild;
use fileshell_utils_process::spawn_command;

use crate::config::ConsoleConfig;
use crate::config::ShellLauncher;
use crate::console::Console;
use crate::error::ConsoleError;
use crate::error::classify_shell_failure;
use crate::executable::Executable;
use crate::listener::ExecEventSender;
use crate::output::CappedBuffer;
use crate::output::ExecOutput;
use crate::output::ExecStatus;

/// A console backed by a persistent external shell.
///
/// `alloc()` spawns the configured launcher (`su` by default) and keeps its
/// stdin open; each command is written as a line followed by end-of-command
/// sentinels carrying `$?`, and both pipes are streamed until the sentinels
/// arrive. Whether the console is actually privileged is decided by probing
/// `id` through the session, not by the launcher name.
pub struct ShellConsole {
    launcher: ShellLauncher,
    timeout: Duration,
    trace: bool,
    handle: StdMutex<Option<Arc<ProcessHandle>>>,
    identity: StdMutex<Option<Identity>>,
    wedged: AtomicBool,
    seq: AtomicU64,
    exec_lock: Mutex<()>,
}

struct SessionResult {
    exit_code: i32,
    stdout: String,
    stderr: String,
    canceled: bool,
}

impl ShellConsole {
    pub fn new(launcher: ShellLauncher, timeout: Duration, trace: bool) -> Self {
        Self {
            launcher,
            timeout,
            trace,
            handle: StdMutex::new(None),
            identity: StdMutex::new(None),
            wedged: AtomicBool::new(false),
            seq: AtomicU64::new(0),
            exec_lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &ConsoleConfig) -> Self {
        Self::new(config.shell.clone(), config.timeout(), config.trace)
    }

    fn current_handle(&self) -> Option<Arc<ProcessHandle>> {
        self.handle
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(Arc::clone))
    }

    fn usable_handle(&self) -> Result<Arc<ProcessHandle>, ConsoleError> {
        let handle = self
            .current_handle()
            .ok_or_else(|| ConsoleError::alloc("console is not allocated"))?;
        if self.wedged.load(Ordering::Acquire) {
            return Err(ConsoleError::alloc("console is wedged; realloc() it"));
        }
        if handle.has_exited() {
            return Err(ConsoleError::alloc(
                "console process has exited; realloc() it",
            ));
        }
        Ok(handle)
    }

    fn mark_wedged(&self) {
        self.wedged.store(true, Ordering::Release);
    }

    async fn probe_identity(
        &self,
        handle: &Arc<ProcessHandle>,
    ) -> Result<Identity, ConsoleError> {
        let result = self
            .run_session_command(handle, "id", 4096, None, None)
            .await?;
        if result.exit_code != 0 {
            return Err(ConsoleError::alloc(format!(
                "identity probe exited with code {}",
                result.exit_code
            )));
        }
        parse_id_output(&result.stdout)
            .ok_or_else(|| ConsoleError::alloc("could not parse identity probe output"))
    }

    /// Write one command to the session and stream both pipes until its
    /// sentinels arrive. The inactivity timeout applies between chunks, not
    /// to the command as a whole.
    async fn run_session_command(
        &self,
        handle: &Arc<ProcessHandle>,
        command_line: &str,
        buffer_size: usize,
        events: Option<&ExecEventSender>,
        cancel: Option<&CancellationToken>,
    ) -> Result<SessionResult, ConsoleError> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let sentinel = format!("__FSH_EOC_{seq}__");
        // Subscribe before writing so no output can slip past us.
        let mut rx = handle.output_receiver();
        // Redirect stdin away from the session pipe so the command cannot
        // swallow the sentinel script that follows it.
        let script =
            format!("{command_line} < /dev/null\necho \"{sentinel} $?\"\necho \"{sentinel}\" 1>&2\n");
        if self.trace {
            debug!("console> {command_line}");
        }
        handle
            .writer_sender()
            .send(script.into_bytes())
            .await
            .map_err(|_| {
                self.mark_wedged();
                ConsoleError::alloc("console stdin is closed")
            })?;

        let mut stdout = CappedBuffer::new(buffer_size);
        let mut stderr = CappedBuffer::new(buffer_size);
        let mut stdout_lines = LineAssembler::default();
        let mut stderr_lines = LineAssembler::default();
        let mut stdout_done = false;
        let mut stderr_done = false;
        let mut exit_code = -1;
        let mut canceled = false;

        while !(stdout_done && stderr_done) {
            let received = if let Some(cancel) = cancel {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        let _ = handle.signal(libc::SIGINT);
                        self.mark_wedged();
                        canceled = true;
                        break;
                    }
                    received = tokio::time::timeout(self.timeout, rx.recv()) => received,
                }
            } else {
                tokio::time::timeout(self.timeout, rx.recv()).await
            };

            let chunk = match received {
                Err(_) => {
                    self.mark_wedged();
                    return Err(ConsoleError::OperationTimeout {
                        timeout: self.timeout,
                    });
                }
                Ok(Err(RecvError::Lagged(skipped))) => {
                    warn!("console output lagged; {skipped} chunks dropped");
                    continue;
                }
                Ok(Err(RecvError::Closed)) => {
                    self.mark_wedged();
                    return Err(ConsoleError::alloc("console terminated unexpectedly"));
                }
                Ok(Ok(chunk)) => chunk,
            };

            match chunk.stream {
                OutputStream::Stdout => {
                    for line in stdout_lines.push(&chunk.bytes) {
                        if let Some(rest) = sentinel_suffix(&line, &sentinel) {
                            exit_code = rest.trim().parse().unwrap_or(-1);
                            stdout_done = true;
                        } else {
                            if let Some(events) = events {
                                events.partial(OutputStream::Stdout, &line);
                            }
                            stdout.push(line.as_bytes());
                        }
                    }
                }
                OutputStream::Stderr => {
                    for line in stderr_lines.push(&chunk.bytes) {
                        if sentinel_suffix(&line, &sentinel).is_some() {
                            stderr_done = true;
                        } else {
                            if let Some(events) = events {
                                events.partial(OutputStream::Stderr, &line);
                            }
                            stderr.push(line.as_bytes());
                        }
                    }
                }
            }
        }

        Ok(SessionResult {
            exit_code,
            stdout: stdout.into_string(),
            stderr: stderr.into_string(),
            canceled,
        })
    }
}

#[async_trait]
impl Console for ShellConsole {
    async fn alloc(&self) -> Result<(), ConsoleError> {
        if self.is_active() {
            return Ok(());
        }
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        let env: HashMap<String, String> = std::env::vars().collect();
        let spawned = spawn_command(&self.launcher.program, &self.launcher.args, &cwd, &env)
            .await
            .map_err(|err| {
                ConsoleError::alloc(format!(
                    "failed to spawn {}: {err:#}",
                    self.launcher.program
                ))
            })?;
        let SpawnedChild { handle, .. } = spawned;
        let handle = Arc::new(handle);
        if let Ok(mut guard) = self.handle.lock() {
            *guard = Some(Arc::clone(&handle));
        }
        self.wedged.store(false, Ordering::Release);

        match self.probe_identity(&handle).await {
            Ok(identity) => {
                debug!("shell console allocated as {identity}");
                if let Ok(mut guard) = self.identity.lock() {
                    *guard = Some(identity);
                }
                Ok(())
            }
            Err(err) => {
                self.dealloc().await;
                Err(ConsoleError::alloc(format!(
                    "failed to probe console identity: {err}"
                )))
            }
        }
    }

    async fn dealloc(&self) {
        let handle = self
            .handle
            .lock()
            .ok()
            .and_then(|mut guard| guard.take());
        if let Some(handle) = handle {
            handle.terminate();
        }
        if let Ok(mut guard) = self.identity.lock() {
            *guard = None;
        }
        self.wedged.store(false, Ordering::Release);
    }

    fn is_active(&self) -> bool {
        self.handle
            .lock()
            .ok()
            .is_some_and(|guard| guard.is_some())
    }

    fn is_privileged(&self) -> bool {
        self.identity
            .lock()
            .ok()
            .is_some_and(|guard| guard.as_ref().is_some_and(Identity::is_root))
    }

    fn identity(&self) -> Identity {
        self.identity
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
            .unwrap_or_else(Identity::unknown)
    }

    fn trace(&self) -> bool {
        self.trace
    }

    async fn exec(
        &self,
        executable: &Executable,
        events: &ExecEventSender,
    ) -> Result<ExecOutput, ConsoleError> {
        let handle = self.usable_handle()?;
        let _guard = self.exec_lock.lock().await;
        let command_line = render_command_line(executable.command());
        let cancel = executable.cancellation_token();
        let result = self
            .run_session_command(
                &handle,
                &command_line,
                executable.buffer_size(),
                Some(events),
                Some(&cancel),
            )
            .await?;

        if result.canceled {
            return Ok(ExecOutput {
                status: ExecStatus::Canceled,
                stdout: result.stdout,
                stderr: result.stderr,
            });
        }
        if result.exit_code != 0 {
            let target = executable
                .command()
                .target()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| executable.command().describe());
            return Err(classify_shell_failure(
                result.exit_code,
                &result.stderr,
                &target,
            ));
        }
        Ok(ExecOutput {
            status: ExecStatus::Exited { exit_code: 0 },
            stdout: result.stdout,
            stderr: result.stderr,
        })
    }

    fn cancel(&self) -> bool {
        let Some(handle) = self.current_handle() else {
            return false;
        };
        if handle.has_exited() {
            return false;
        }
        self.mark_wedged();
        handle.signal(libc::SIGINT).is_ok()
    }

    fn send_signal(&self, signal: ExecSignal) -> bool {
        let Some(handle) = self.current_handle() else {
            return false;
        };
        if handle.has_exited() {
            return false;
        }
        handle.signal(signal.as_raw()).is_ok()
    }

    fn end(&self) -> bool {
        let handle = self
            .handle
            .lock()
            .ok()
            .and_then(|mut guard| guard.take());
        let Some(handle) = handle else {
            return false;
        };
        handle.terminate();
        if let Ok(mut guard) = self.identity.lock() {
            *guard = None;
        }
        true
    }
}

/// Accumulates raw chunks and hands back complete lines (newline included).
#[derive(Default)]
struct LineAssembler {
    pending: Vec<u8>,
}

impl LineAssembler {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let rest = self.pending.split_off(pos + 1);
            let line = std::mem::replace(&mut self.pending, rest);
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }
}

fn sentinel_suffix<'a>(line: &'a str, sentinel: &str) -> Option<&'a str> {
    line.trim_end().strip_prefix(sentinel)
}

fn quote(text: &str) -> String {
    match shlex::try_quote(text) {
        Ok(quoted) => quoted.into_owned(),
        Err(_) => text.to_string(),
    }
}

fn quote_path(path: &std::path::Path) -> String {
    quote(&path.display().to_string())
}

/// Render a [`FileCommand`] to the POSIX command line the session runs.
fn render_command_line(command: &FileCommand) -> String {
    match command {
        FileCommand::ListDirectory { path } => format!("ls -la {}", quote_path(path)),
        FileCommand::Stat { path } => format!("stat {}", quote_path(path)),
        FileCommand::ReadFile { path } => format!("cat {}", quote_path(path)),
        FileCommand::WriteFile { path, contents } => {
            format!("printf %s {} > {}", quote(contents), quote_path(path))
        }
        FileCommand::CreateFile { path } => format!("touch {}", quote_path(path)),
        FileCommand::CreateDirectory { path } => format!("mkdir {}", quote_path(path)),
        FileCommand::Copy { source, dest } => {
            format!("cp -R {} {}", quote_path(source), quote_path(dest))
        }
        FileCommand::Move { source, dest } => {
            format!("mv {} {}", quote_path(source), quote_path(dest))
        }
        FileCommand::Delete { path, recursive } => {
            if *recursive {
                format!("rm -rf {}", quote_path(path))
            } else {
                format!("rm -f {}", quote_path(path))
            }
        }
        FileCommand::ChangeMode { path, mode } => {
            format!("chmod {mode:o} {}", quote_path(path))
        }
        FileCommand::DiskUsage { path } => format!("du -sk {}", quote_path(path)),
        FileCommand::Exec { command } => command
            .iter()
            .map(|word| quote(word))
            .collect::<Vec<_>>()
            .join(" "),
    }
}

fn parse_id_output(output: &str) -> Option<Identity> {
    let line = output.lines().find(|line| line.contains("uid="))?;
    let mut uid = None;
    let mut user = None;
    let mut gid = None;
    let mut group = None;
    for token in line.split_whitespace() {
        if let Some(rest) = token.strip_prefix("uid=") {
            let (id, name) = split_id_token(rest)?;
            uid = Some(id);
            user = Some(name);
        } else if let Some(rest) = token.strip_prefix("gid=") {
            let (id, name) = split_id_token(rest)?;
            gid = Some(id);
            group = Some(name);
        }
    }
    Some(Identity::new(user?, uid?, group?, gid?))
}

fn split_id_token(token: &str) -> Option<(u32, String)> {
    match token.split_once('(') {
        Some((id, name)) => {
            let id = id.parse().ok()?;
            Some((id, name.trim_end_matches(')').to_string()))
        }
        None => {
            let id: u32 = token.parse().ok()?;
            Some((id, id.to_string()))
        }
    }
}
