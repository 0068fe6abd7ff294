// mic session supervisor - owns the single speech subprocess slot

use crate::speech::{
    classify_stderr_line, classify_stdout_line, LineBuffer, MicEvent, MicStatus, OVERLAY_MODE_ENV,
};
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

pub const DEFAULT_STOP_GRACE: Duration = Duration::from_millis(1500);

// how long the exit path waits for stdout/stderr to drain before reporting
const READER_FLUSH: Duration = Duration::from_millis(200);
// stop() gives up waiting this long after the grace period
const STOP_SLACK: Duration = Duration::from_secs(1);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MicError {
    #[error("Mic session already running")]
    AlreadyRunning,
    #[error("Mic session not running")]
    NotRunning,
    #[error("Failed to start speech process: {0}")]
    Spawn(String),
}

/// receives every event a mic session produces, in order per stream
pub trait MicEventSink: Send + Sync {
    fn publish(&self, event: MicEvent);

    /// the last status of a session (exit, kill or failed spawn)
    fn session_ended(&self, status: MicStatus) {
        self.publish(MicEvent::Status(status));
    }
}

impl<F> MicEventSink for F
where
    F: Fn(MicEvent) + Send + Sync,
{
    fn publish(&self, event: MicEvent) {
        self(event);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl SpeechCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    fn build(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env(OVERLAY_MODE_ENV.0, OVERLAY_MODE_ENV.1)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // own process group, so stop() reaches whatever the script forks
        #[cfg(unix)]
        cmd.process_group(0);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        cmd
    }
}

/// returned by a successful start; can be awaited for the session's end
#[derive(Debug)]
pub struct MicHandle {
    pub session_id: u64,
    pub pid: Option<u32>,
    done: watch::Receiver<bool>,
}

impl MicHandle {
    /// resolves once the process exited and the slot was released
    pub async fn wait(mut self) {
        let _ = self.done.wait_for(|finished| *finished).await;
    }
}

struct ActiveSession {
    id: u64,
    stop_tx: Option<oneshot::Sender<()>>,
    done: watch::Receiver<bool>,
}

struct Shared {
    slot: Mutex<Option<ActiveSession>>,
    next_id: AtomicU64,
    command: SpeechCommand,
    grace: Duration,
    sink: Arc<dyn MicEventSink>,
}

/// At most one speech process runs at a time. The slot is cleared on every
/// exit path (clean exit, crash, forced kill) before `stop()` resolves.
#[derive(Clone)]
pub struct MicSupervisor {
    shared: Arc<Shared>,
}

impl MicSupervisor {
    pub fn new(command: SpeechCommand, grace: Duration, sink: Arc<dyn MicEventSink>) -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(None),
                next_id: AtomicU64::new(1),
                command,
                grace,
                sink,
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.shared.slot).is_some()
    }

    /// Spawn the speech process. Must be called inside a tokio runtime.
    pub fn start(&self) -> Result<MicHandle, MicError> {
        let mut slot = lock(&self.shared.slot);
        if slot.is_some() {
            return Err(MicError::AlreadyRunning);
        }

        let command = &self.shared.command;
        let mut child = match command.build().spawn() {
            Ok(child) => child,
            Err(e) => {
                drop(slot);
                let message = format!(
                    "Failed to start speech process {}: {e}",
                    command.program.display()
                );
                warn!(error = %e, program = %command.program.display(), "speech process spawn failed");
                self.shared.sink.session_ended(MicStatus::stopped(message.clone()));
                return Err(MicError::Spawn(message));
            }
        };

        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let pid = child.id();
        let (stop_tx, stop_rx) = oneshot::channel();
        let (done_tx, done_rx) = watch::channel(false);

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        *slot = Some(ActiveSession {
            id,
            stop_tx: Some(stop_tx),
            done: done_rx.clone(),
        });
        drop(slot);

        info!(session = id, ?pid, "speech process started");

        let shared = self.shared.clone();
        tokio::spawn(async move {
            let sink = shared.sink.clone();
            let readers = [
                stdout.map(|out| tokio::spawn(pump(out, sink.clone(), classify_stdout_line))),
                stderr.map(|err| tokio::spawn(pump(err, sink.clone(), classify_stderr_line))),
            ];

            let exit_message = tokio::select! {
                status = child.wait() => describe_exit(status),
                _ = stop_rx => terminate(&mut child, shared.grace).await,
            };

            drain(readers).await;

            info!(session = id, exit = %exit_message, "speech process ended");
            sink.session_ended(MicStatus::stopped(exit_message));

            {
                let mut slot = lock(&shared.slot);
                if slot.as_ref().is_some_and(|s| s.id == id) {
                    *slot = None;
                }
            }
            let _ = done_tx.send(true);
        });

        Ok(MicHandle {
            session_id: id,
            pid,
            done: done_rx,
        })
    }

    /// Ask the running process to terminate; force-kill it once the grace
    /// period elapses. Resolves after the session slot was released.
    pub async fn stop(&self) -> Result<(), MicError> {
        let (stop_tx, mut done) = {
            let mut slot = lock(&self.shared.slot);
            let session = slot.as_mut().ok_or(MicError::NotRunning)?;
            (session.stop_tx.take(), session.done.clone())
        };

        // a concurrent stop already took the sender; just wait with it
        if let Some(tx) = stop_tx {
            debug!("stop requested");
            let _ = tx.send(());
        }

        let deadline = self.shared.grace + STOP_SLACK;
        if tokio::time::timeout(deadline, done.wait_for(|finished| *finished))
            .await
            .is_err()
        {
            warn!(?deadline, "speech process did not report exit in time");
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn pump<R>(mut reader: R, sink: Arc<dyn MicEventSink>, classify: fn(&str) -> Option<MicEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut buffer = LineBuffer::new();
    let mut chunk = vec![0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                for line in buffer.push(&chunk[..n]) {
                    if let Some(event) = classify(&line) {
                        sink.publish(event);
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "speech output read failed");
                break;
            }
        }
    }
    if let Some(rest) = buffer.finish() {
        if let Some(event) = classify(&rest) {
            sink.publish(event);
        }
    }
}

// an orphaned grandchild can keep the pipes open; don't wait on it forever
async fn drain(readers: [Option<tokio::task::JoinHandle<()>>; 2]) {
    let handles: Vec<_> = readers.into_iter().flatten().collect();
    let aborts: Vec<_> = handles.iter().map(tokio::task::JoinHandle::abort_handle).collect();
    let joined = tokio::time::timeout(READER_FLUSH, async {
        for handle in handles {
            let _ = handle.await;
        }
    })
    .await;
    if joined.is_err() {
        debug!("speech output still open after exit, dropping readers");
        for abort in aborts {
            abort.abort();
        }
    }
}

async fn terminate(child: &mut Child, grace: Duration) -> String {
    if let Err(e) = signal_group(child, Forced::No) {
        warn!(error = %e, "terminate signal failed");
    }

    if let Ok(status) = tokio::time::timeout(grace, child.wait()).await {
        return describe_exit(status);
    }

    warn!(?grace, "speech process ignored terminate, killing");
    if let Err(e) = signal_group(child, Forced::Yes) {
        debug!(error = %e, "group kill failed");
    }
    match child.kill().await {
        Ok(()) => "Speech process killed after timeout".to_string(),
        Err(e) => format!("Failed to kill speech process: {e}"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Forced {
    No,
    Yes,
}

// the child leads its own group, so its pid is the group id
#[cfg(unix)]
fn signal_group(child: &mut Child, forced: Forced) -> io::Result<()> {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    // no pid means it was already reaped
    let Some(pid) = child.id() else {
        return Ok(());
    };
    let pgid = i32::try_from(pid).map_err(|_| io::Error::other("pid out of range"))?;
    let signal = match forced {
        Forced::No => Signal::SIGTERM,
        Forced::Yes => Signal::SIGKILL,
    };
    killpg(Pid::from_raw(pgid), signal).map_err(io::Error::from)
}

// no polite signal for console-less children on windows
#[cfg(not(unix))]
fn signal_group(child: &mut Child, _forced: Forced) -> io::Result<()> {
    child.start_kill()
}

fn describe_exit(status: io::Result<ExitStatus>) -> String {
    match status {
        Ok(status) if status.success() => "Speech process finished".to_string(),
        Ok(status) => {
            if let Some(code) = status.code() {
                return format!("Speech process exited with code {code}");
            }
            #[cfg(unix)]
            {
                use std::os::unix::process::ExitStatusExt;
                if let Some(signal) = status.signal() {
                    return format!("Speech process stopped by signal {signal}");
                }
            }
            "Speech process stopped".to_string()
        }
        Err(e) => format!("Failed to wait for speech process: {e}"),
    }
}
