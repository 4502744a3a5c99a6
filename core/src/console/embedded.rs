use std::os::unix::fs::MetadataExt;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use fileshell_protocol::ExecSignal;
use fileshell_protocol::FileCommand;
use fileshell_protocol::Identity;
use fileshell_protocol::OutputStream;

use crate::console::Console;
use crate::error::ConsoleError;
use crate::error::classify_io_error;
use crate::executable::Executable;
use crate::listener::ExecEventSender;
use crate::output::CappedBuffer;
use crate::output::ExecOutput;
use crate::output::ExecStatus;

/// The restricted console: a fixed command set implemented in-process.
///
/// Runs with the rights of the current process and always reports
/// `is_privileged() == false`. It has no external process, so the control
/// operations return false, and in-flight work runs to completion on its own
/// task; cancelling the executable's token only suppresses further result
/// delivery.
pub struct EmbeddedConsole {
    active: AtomicBool,
    trace: bool,
    identity: StdMutex<Option<Identity>>,
}

impl EmbeddedConsole {
    pub fn new(trace: bool) -> Self {
        Self {
            active: AtomicBool::new(false),
            trace,
            identity: StdMutex::new(None),
        }
    }
}

#[async_trait]
impl Console for EmbeddedConsole {
    async fn alloc(&self) -> Result<(), ConsoleError> {
        if let Ok(mut guard) = self.identity.lock() {
            if guard.is_none() {
                *guard = Some(current_identity());
            }
        }
        self.active.store(true, Ordering::Release);
        Ok(())
    }

    async fn dealloc(&self) {
        self.active.store(false, Ordering::Release);
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn is_privileged(&self) -> bool {
        false
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
        if self.trace {
            debug!("embedded> {}", executable.command().describe());
        }
        let mut sink = OutputSink {
            events,
            cancel: executable.cancellation_token(),
            buffer: CappedBuffer::new(executable.buffer_size()),
        };
        run_command(executable.command(), executable.buffer_size(), &mut sink).await?;
        Ok(ExecOutput {
            status: ExecStatus::Exited { exit_code: 0 },
            stdout: sink.buffer.into_string(),
            stderr: String::new(),
        })
    }

    fn cancel(&self) -> bool {
        // No external process: in-flight work cannot be stopped.
        false
    }

    fn send_signal(&self, _signal: ExecSignal) -> bool {
        false
    }

    fn end(&self) -> bool {
        false
    }
}

/// Collects output lines, forwarding them as partial results unless the
/// submission has been canceled (the work itself continues either way).
struct OutputSink<'a> {
    events: &'a ExecEventSender,
    cancel: CancellationToken,
    buffer: CappedBuffer,
}

impl OutputSink<'_> {
    fn line(&mut self, line: &str) {
        let chunk = format!("{line}\n");
        if !self.cancel.is_cancelled() {
            self.events.partial(OutputStream::Stdout, &chunk);
        }
        self.buffer.push(chunk.as_bytes());
    }

    fn raw(&mut self, bytes: &[u8]) {
        if !self.cancel.is_cancelled() {
            self.events
                .partial(OutputStream::Stdout, &String::from_utf8_lossy(bytes));
        }
        self.buffer.push(bytes);
    }
}

async fn run_command(
    command: &FileCommand,
    buffer_size: usize,
    sink: &mut OutputSink<'_>,
) -> Result<(), ConsoleError> {
    match command {
        FileCommand::ListDirectory { path } => list_directory(path, sink).await,
        FileCommand::Stat { path } => stat(path, sink).await,
        FileCommand::ReadFile { path } => read_file(path, buffer_size, sink).await,
        FileCommand::WriteFile { path, contents } => {
            tokio::fs::write(path, contents)
                .await
                .map_err(|err| classify_io_error(&err, path))
        }
        FileCommand::CreateFile { path } => {
            tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
                .map(|_| ())
                .map_err(|err| classify_io_error(&err, path))
        }
        FileCommand::CreateDirectory { path } => tokio::fs::create_dir(path)
            .await
            .map_err(|err| classify_io_error(&err, path)),
        FileCommand::Copy { source, dest } => copy(source, dest).await,
        FileCommand::Move { source, dest } => tokio::fs::rename(source, dest)
            .await
            .map_err(|err| classify_io_error(&err, dest)),
        FileCommand::Delete { path, recursive } => delete(path, *recursive).await,
        FileCommand::ChangeMode { path, mode } => {
            tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(*mode))
                .await
                .map_err(|err| classify_io_error(&err, path))
        }
        FileCommand::DiskUsage { path } => disk_usage(path, sink).await,
        FileCommand::Exec { command } => Err(ConsoleError::CommandNotFound {
            command: command.join(" "),
        }),
    }
}

async fn list_directory(path: &Path, sink: &mut OutputSink<'_>) -> Result<(), ConsoleError> {
    let mut reader = tokio::fs::read_dir(path)
        .await
        .map_err(|err| classify_io_error(&err, path))?;
    let mut entries = Vec::new();
    while let Some(entry) = reader
        .next_entry()
        .await
        .map_err(|err| classify_io_error(&err, path))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        let metadata = entry
            .metadata()
            .await
            .map_err(|err| classify_io_error(&err, &entry.path()))?;
        entries.push((name, metadata));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    for (name, metadata) in entries {
        sink.line(&format_entry(&name, &metadata));
    }
    Ok(())
}

async fn stat(path: &Path, sink: &mut OutputSink<'_>) -> Result<(), ConsoleError> {
    let metadata = tokio::fs::symlink_metadata(path)
        .await
        .map_err(|err| classify_io_error(&err, path))?;
    sink.line(&format!("  File: {}", path.display()));
    sink.line(&format!(
        "  Size: {}\tBlocks: {}",
        metadata.len(),
        metadata.blocks()
    ));
    sink.line(&format!(
        "  Mode: {} ({:o})",
        format_mode(metadata.mode()),
        metadata.mode() & 0o7777
    ));
    sink.line(&format!("   Uid: {}\tGid: {}", metadata.uid(), metadata.gid()));
    Ok(())
}

async fn read_file(
    path: &Path,
    buffer_size: usize,
    sink: &mut OutputSink<'_>,
) -> Result<(), ConsoleError> {
    use tokio::io::AsyncReadExt;

    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|err| classify_io_error(&err, path))?;
    let mut buf = vec![0u8; buffer_size.max(1)];
    loop {
        let n = file
            .read(&mut buf)
            .await
            .map_err(|err| classify_io_error(&err, path))?;
        if n == 0 {
            break;
        }
        sink.raw(&buf[..n]);
    }
    Ok(())
}

async fn copy(source: &Path, dest: &Path) -> Result<(), ConsoleError> {
    let metadata = tokio::fs::symlink_metadata(source)
        .await
        .map_err(|err| classify_io_error(&err, source))?;
    if !metadata.is_dir() {
        tokio::fs::copy(source, dest)
            .await
            .map_err(|err| classify_io_error(&err, dest))?;
        return Ok(());
    }

    // Iterative directory walk; recursion and async fns do not mix well.
    let mut worklist: Vec<(PathBuf, PathBuf)> = vec![(source.to_path_buf(), dest.to_path_buf())];
    while let Some((from, to)) = worklist.pop() {
        tokio::fs::create_dir_all(&to)
            .await
            .map_err(|err| classify_io_error(&err, &to))?;
        let mut reader = tokio::fs::read_dir(&from)
            .await
            .map_err(|err| classify_io_error(&err, &from))?;
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|err| classify_io_error(&err, &from))?
        {
            let child_from = entry.path();
            let child_to = to.join(entry.file_name());
            let child_meta = entry
                .metadata()
                .await
                .map_err(|err| classify_io_error(&err, &child_from))?;
            if child_meta.is_dir() {
                worklist.push((child_from, child_to));
            } else {
                tokio::fs::copy(&child_from, &child_to)
                    .await
                    .map_err(|err| classify_io_error(&err, &child_to))?;
            }
        }
    }
    Ok(())
}

async fn delete(path: &Path, recursive: bool) -> Result<(), ConsoleError> {
    let metadata = tokio::fs::symlink_metadata(path)
        .await
        .map_err(|err| classify_io_error(&err, path))?;
    if metadata.is_dir() {
        if recursive {
            tokio::fs::remove_dir_all(path)
                .await
                .map_err(|err| classify_io_error(&err, path))
        } else {
            tokio::fs::remove_dir(path)
                .await
                .map_err(|err| classify_io_error(&err, path))
        }
    } else {
        tokio::fs::remove_file(path)
            .await
            .map_err(|err| classify_io_error(&err, path))
    }
}

async fn disk_usage(path: &Path, sink: &mut OutputSink<'_>) -> Result<(), ConsoleError> {
    let metadata = tokio::fs::symlink_metadata(path)
        .await
        .map_err(|err| classify_io_error(&err, path))?;
    let mut total = 0u64;
    if metadata.is_dir() {
        let mut worklist = vec![path.to_path_buf()];
        while let Some(dir) = worklist.pop() {
            let mut reader = tokio::fs::read_dir(&dir)
                .await
                .map_err(|err| classify_io_error(&err, &dir))?;
            while let Some(entry) = reader
                .next_entry()
                .await
                .map_err(|err| classify_io_error(&err, &dir))?
            {
                let child_meta = entry
                    .metadata()
                    .await
                    .map_err(|err| classify_io_error(&err, &entry.path()))?;
                if child_meta.is_dir() {
                    worklist.push(entry.path());
                } else {
                    total += child_meta.len();
                }
            }
        }
    } else {
        total = metadata.len();
    }
    sink.line(&format!("{}\t{}", total.div_ceil(1024), path.display()));
    Ok(())
}

fn current_identity() -> Identity {
    let uid = unsafe { libc::geteuid() };
    let gid = unsafe { libc::getegid() };
    let user = std::env::var("USER").unwrap_or_else(|_| uid.to_string());
    Identity::new(user, uid, gid.to_string(), gid)
}

/// `ls -l`-style type and permission string for a raw `st_mode`.
fn format_mode(mode: u32) -> String {
    let file_type = match mode & (libc::S_IFMT as u32) {
        m if m == libc::S_IFDIR as u32 => 'd',
        m if m == libc::S_IFLNK as u32 => 'l',
        m if m == libc::S_IFCHR as u32 => 'c',
        m if m == libc::S_IFBLK as u32 => 'b',
        m if m == libc::S_IFIFO as u32 => 'p',
        m if m == libc::S_IFSOCK as u32 => 's',
        _ => '-',
    };
    let mut out = String::with_capacity(10);
    out.push(file_type);
    for shift in [6u32, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}

fn format_entry(name: &str, metadata: &std::fs::Metadata) -> String {
    format!(
        "{} {:>8} {name}",
        format_mode(metadata.mode()),
        metadata.len()
    )
}
