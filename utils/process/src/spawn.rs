use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use anyhow::Result;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::process::Command;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::trace;

use fileshell_protocol::OutputStream;

use crate::process_group;

const READ_BUFFER_SIZE: usize = 8_192;
const WRITER_CHANNEL_CAPACITY: usize = 128;
const OUTPUT_CHANNEL_CAPACITY: usize = 256;

/// One chunk of child output, tagged with the pipe it came from.
#[derive(Debug, Clone)]
pub struct OutputChunk {
    pub stream: OutputStream,
    pub bytes: Vec<u8>,
}

/// Handle for driving a spawned child: stdin writes, output subscription,
/// exit observation, and group-wide signal delivery.
pub struct ProcessHandle {
    pid: u32,
    writer_tx: mpsc::Sender<Vec<u8>>,
    output_tx: broadcast::Sender<OutputChunk>,
    exited: Arc<AtomicBool>,
    exit_code: Arc<StdMutex<Option<i32>>>,
    reader_handle: StdMutex<Option<JoinHandle<()>>>,
    writer_handle: StdMutex<Option<JoinHandle<()>>>,
    wait_handle: StdMutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle").field("pid", &self.pid).finish()
    }
}

impl ProcessHandle {
    /// Process (and process-group) id of the child.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Channel sender for writing raw bytes to the child's stdin.
    pub fn writer_sender(&self) -> mpsc::Sender<Vec<u8>> {
        self.writer_tx.clone()
    }

    /// A broadcast receiver yielding stdout/stderr chunks as they arrive.
    pub fn output_receiver(&self) -> broadcast::Receiver<OutputChunk> {
        self.output_tx.subscribe()
    }

    /// True once the child has exited.
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    /// Exit code, if the child has exited and it is known.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code.lock().ok().and_then(|guard| *guard)
    }

    /// Deliver `signal` to the child's process group.
    pub fn signal(&self, signal: i32) -> std::io::Result<()> {
        process_group::signal_process_group(self.pid, signal)
    }

    /// Kill the child's process group and abort helper tasks.
    pub fn terminate(&self) {
        let _ = process_group::kill_process_group(self.pid);

        if let Ok(mut h) = self.reader_handle.lock() {
            if let Some(handle) = h.take() {
                handle.abort();
            }
        }
        if let Ok(mut h) = self.writer_handle.lock() {
            if let Some(handle) = h.take() {
                handle.abort();
            }
        }
        if let Ok(mut h) = self.wait_handle.lock() {
            if let Some(handle) = h.take() {
                handle.abort();
            }
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Return value of [`spawn_command`].
#[derive(Debug)]
pub struct SpawnedChild {
    pub handle: ProcessHandle,
    pub output_rx: broadcast::Receiver<OutputChunk>,
    pub exit_rx: oneshot::Receiver<i32>,
}

async fn read_output_stream<R>(
    mut reader: R,
    stream: OutputStream,
    output_tx: broadcast::Sender<OutputChunk>,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let _ = output_tx.send(OutputChunk {
                    stream,
                    bytes: buf[..n].to_vec(),
                });
            }
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
}

/// Spawn `program` with piped stdio in its own process group.
///
/// Stdin stays open and is fed from the returned handle's writer channel;
/// stdout and stderr are streamed as tagged [`OutputChunk`]s.
pub async fn spawn_command(
    program: &str,
    args: &[String],
    cwd: &Path,
    env: &HashMap<String, String>,
) -> Result<SpawnedChild> {
    if program.is_empty() {
        anyhow::bail!("missing program for spawn");
    }

    trace!("spawn_command: {program} {args:?} in {cwd:?}");

    let mut command = Command::new(program);
    command.args(args);
    command.current_dir(cwd);
    command.env_clear();
    for (key, value) in env {
        command.env(key, value);
    }
    command.stdin(Stdio::piped());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    #[cfg(target_os = "linux")]
    let parent_pid = unsafe { libc::getpid() };
    #[cfg(unix)]
    unsafe {
        command.pre_exec(move || {
            process_group::set_process_group()?;
            #[cfg(target_os = "linux")]
            process_group::set_parent_death_signal(parent_pid)?;
            Ok(())
        });
    }

    let mut child = command.spawn()?;
    let pid = child
        .id()
        .ok_or_else(|| std::io::Error::other("missing child pid"))?;

    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let (writer_tx, mut writer_rx) = mpsc::channel::<Vec<u8>>(WRITER_CHANNEL_CAPACITY);
    let (output_tx, output_rx) = broadcast::channel::<OutputChunk>(OUTPUT_CHANNEL_CAPACITY);

    let writer_handle = if let Some(mut stdin) = stdin {
        tokio::spawn(async move {
            while let Some(bytes) = writer_rx.recv().await {
                if stdin.write_all(&bytes).await.is_err() {
                    break;
                }
                let _ = stdin.flush().await;
            }
        })
    } else {
        drop(writer_rx);
        tokio::spawn(async {})
    };

    let stdout_handle = stdout.map(|stdout| {
        let output_tx = output_tx.clone();
        tokio::spawn(async move {
            read_output_stream(BufReader::new(stdout), OutputStream::Stdout, output_tx).await;
        })
    });
    let stderr_handle = stderr.map(|stderr| {
        let output_tx = output_tx.clone();
        tokio::spawn(async move {
            read_output_stream(BufReader::new(stderr), OutputStream::Stderr, output_tx).await;
        })
    });
    let reader_handle = tokio::spawn(async move {
        if let Some(handle) = stdout_handle {
            let _ = handle.await;
        }
        if let Some(handle) = stderr_handle {
            let _ = handle.await;
        }
    });

    let (exit_tx, exit_rx) = oneshot::channel::<i32>();
    let exited = Arc::new(AtomicBool::new(false));
    let exit_code = Arc::new(StdMutex::new(None));
    let wait_exited = Arc::clone(&exited);
    let wait_exit_code = Arc::clone(&exit_code);
    let wait_handle: JoinHandle<()> = tokio::spawn(async move {
        let code = match child.wait().await {
            Ok(status) => status.code().unwrap_or(-1),
            Err(_) => -1,
        };
        wait_exited.store(true, Ordering::SeqCst);
        if let Ok(mut guard) = wait_exit_code.lock() {
            *guard = Some(code);
        }
        let _ = exit_tx.send(code);
    });

    let handle = ProcessHandle {
        pid,
        writer_tx,
        output_tx,
        exited,
        exit_code,
        reader_handle: StdMutex::new(Some(reader_handle)),
        writer_handle: StdMutex::new(Some(writer_handle)),
        wait_handle: StdMutex::new(Some(wait_handle)),
    };

    Ok(SpawnedChild {
        handle,
        output_rx,
        exit_rx,
    })
}
