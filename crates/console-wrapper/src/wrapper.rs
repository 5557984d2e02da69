//! The supervised child-process wrapper
//!
//! [`ConsoleWrapper`] owns one external process and enforces the
//! created → executing → terminated → disposed lifecycle. Output and error
//! lines are delivered on dedicated threads, which append to the
//! [`StreamBuffer`], latch the matching [`CompletionSignal`], and then
//! notify observers, in that order.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use async_process::{Command, Stdio};
use chrono::{DateTime, Utc};
use futures_lite::future;
use futures_lite::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, warn};

use crate::buffer::{StreamBuffer, StreamSource};
use crate::error::{Error, Result};
use crate::observer::Observers;
use crate::registry::{self, RegistrationId};
use crate::settings::{Encoding, EncodingSettings, WrapperSettings};
use crate::signal::{CompletionSignal, WrapperSignals};
use crate::stdin::StdinForwarder;

/// Lifecycle states of a [`ConsoleWrapper`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperState {
    /// Constructed but not yet started
    Created,
    /// The external process is running
    Executing,
    /// The external process exited or was killed
    Terminated,
    /// All resources released; no further operations are possible
    Disposed,
}

impl fmt::Display for WrapperState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WrapperState::Created => "created",
            WrapperState::Executing => "executing",
            WrapperState::Terminated => "terminated",
            WrapperState::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

/// Live-child bookkeeping while the state is `Executing`
struct Running {
    pid: u32,
    registration: RegistrationId,
    /// Feeds the stdin forwarder; `None` when input is not redirected.
    /// Dropping it closes the child's stdin.
    stdin_tx: Option<async_channel::Sender<String>>,
}

enum Lifecycle {
    Created,
    Executing(Running),
    Terminated,
    Disposed,
}

impl Lifecycle {
    fn state(&self) -> WrapperState {
        match self {
            Lifecycle::Created => WrapperState::Created,
            Lifecycle::Executing(_) => WrapperState::Executing,
            Lifecycle::Terminated => WrapperState::Terminated,
            Lifecycle::Disposed => WrapperState::Disposed,
        }
    }
}

/// State shared with the delivery threads
struct Shared {
    lifecycle: Mutex<Lifecycle>,
    buffer: StreamBuffer,
    signals: WrapperSignals,
    observers: Observers,
    /// Set by `kill` before the signal goes out; together with a
    /// signal-terminated exit status it makes the exit waiter fire the
    /// killed event instead of the exited event
    kill_requested: AtomicBool,
    /// Stops line delivery once a kill or dispose is underway
    cancelled: AtomicBool,
}

impl Shared {
    fn new() -> Self {
        Self {
            lifecycle: Mutex::new(Lifecycle::Created),
            buffer: StreamBuffer::new(),
            signals: WrapperSignals::default(),
            observers: Observers::default(),
            kill_requested: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
        }
    }
}

/// A supervised wrapper around one external console process
pub struct ConsoleWrapper {
    executable: PathBuf,
    settings: WrapperSettings,
    shared: Arc<Shared>,
}

impl ConsoleWrapper {
    /// Wrap the executable at `executable` with the given settings
    ///
    /// Fails with [`Error::InvalidArgument`] if no file exists at the path.
    /// The process is not started until [`execute`](Self::execute).
    pub fn new(executable: impl AsRef<Path>, settings: WrapperSettings) -> Result<Self> {
        let executable = executable.as_ref().to_path_buf();
        if executable.as_os_str().is_empty() {
            return Err(Error::invalid_argument("executable path is empty"));
        }
        if !executable.exists() {
            return Err(Error::invalid_argument(format!(
                "no executable exists at {}",
                executable.display()
            )));
        }

        Ok(Self {
            executable,
            settings,
            shared: Arc::new(Shared::new()),
        })
    }

    /// Wrap the executable with default settings (all streams redirected)
    pub fn with_defaults(executable: impl AsRef<Path>) -> Result<Self> {
        Self::new(executable, WrapperSettings::default())
    }

    /// The location of the executable
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// The settings this wrapper was constructed with
    pub fn settings(&self) -> &WrapperSettings {
        &self.settings
    }

    /// The current lifecycle state
    pub fn state(&self) -> WrapperState {
        self.lock().state()
    }

    /// Whether the external process is running
    pub fn is_executing(&self) -> bool {
        self.state() == WrapperState::Executing
    }

    /// Whether this wrapper has been disposed
    pub fn is_disposed(&self) -> bool {
        self.state() == WrapperState::Disposed
    }

    /// Pid of the external process while it is executing
    pub fn pid(&self) -> Option<u32> {
        match &*self.lock() {
            Lifecycle::Executing(running) => Some(running.pid),
            _ => None,
        }
    }

    /// Replayable view of everything the child has written so far
    pub fn buffer(&self) -> &StreamBuffer {
        &self.shared.buffer
    }

    /// Latch set when the first captured output line arrives
    pub fn output_received(&self) -> &CompletionSignal {
        &self.shared.signals.output_received
    }

    /// Latch set when the first captured error line arrives
    pub fn error_received(&self) -> &CompletionSignal {
        &self.shared.signals.error_received
    }

    /// Latch set when the child exits on its own
    pub fn exited(&self) -> &CompletionSignal {
        &self.shared.signals.exited
    }

    /// Latch set when a kill is confirmed by the OS
    pub fn killed(&self) -> &CompletionSignal {
        &self.shared.signals.killed
    }

    /// Register an observer for captured output lines
    pub fn on_output(&self, observer: impl Fn(&str) + Send + Sync + 'static) {
        self.shared.observers.push_output(Arc::new(observer));
    }

    /// Register an observer for captured error lines
    pub fn on_error(&self, observer: impl Fn(&str) + Send + Sync + 'static) {
        self.shared.observers.push_error(Arc::new(observer));
    }

    /// Register an observer for natural exit; receives the exit timestamp
    pub fn on_exited(&self, observer: impl Fn(DateTime<Utc>) + Send + Sync + 'static) {
        self.shared.observers.push_exited(Arc::new(observer));
    }

    /// Register an observer for parent-initiated kill
    pub fn on_killed(&self, observer: impl Fn() + Send + Sync + 'static) {
        self.shared.observers.push_killed(Arc::new(observer));
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.shared.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start the external process
    ///
    /// `start_args` is split on whitespace into individual arguments.
    /// Streams the settings marked for redirection begin asynchronous line
    /// delivery on dedicated threads, and the child is recorded in the
    /// process-wide [`registry`] until it terminates.
    ///
    /// Fails with [`Error::InvalidState`] unless the wrapper is still in the
    /// created state; a wrapper supervises exactly one process lifetime.
    pub fn execute(&self, start_args: Option<&str>) -> Result<()> {
        // the lock is held across the spawn so a concurrent execute cannot
        // double-start
        let mut lifecycle = self.lock();
        if !matches!(*lifecycle, Lifecycle::Created) {
            return Err(Error::invalid_state("execute", lifecycle.state()));
        }

        let mut cmd = Command::new(&self.executable);
        if let Some(args) = start_args {
            cmd.args(args.split_whitespace());
        }
        if let Some(dir) = self.settings.working_directory() {
            cmd.current_dir(dir);
        }
        cmd.stdin(stdio_for(self.settings.redirect_standard_input()));
        cmd.stdout(stdio_for(self.settings.redirect_standard_output()));
        cmd.stderr(stdio_for(self.settings.redirect_standard_error()));

        #[cfg(windows)]
        if !self.settings.show_window() {
            use async_process::windows::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        let child = cmd.spawn().map_err(|e| {
            Error::spawn_failed(format!(
                "failed to spawn {}: {}",
                self.executable.display(),
                e
            ))
        })?;
        let pid = child.id();
        let encoding = *self.settings.encoding();

        let registration = registry::global().register(pid);
        let running = match self.start_delivery(child, pid, registration, encoding) {
            Ok(running) => running,
            Err(e) => {
                // a spawn failure here would otherwise orphan a live child
                // in a Created wrapper, beyond the reach of kill and drop
                warn!(pid, error = %e, "failed to start delivery; reaping child");
                abort_launch(pid, registration);
                return Err(e);
            }
        };

        debug!(pid, executable = %self.executable.display(), "child started");
        *lifecycle = Lifecycle::Executing(running);
        Ok(())
    }

    /// Spawn the delivery threads for a freshly spawned child
    ///
    /// The exit waiter takes ownership of the child; on error the child is
    /// dropped here and the caller must reap it by pid.
    fn start_delivery(
        &self,
        mut child: async_process::Child,
        pid: u32,
        registration: RegistrationId,
        encoding: EncodingSettings,
    ) -> Result<Running> {
        if let Some(stdout) = child.stdout.take() {
            self.spawn_pump(
                "wrapper-stdout",
                stdout,
                StreamSource::Output,
                encoding.standard_output,
            )?;
        }
        if let Some(stderr) = child.stderr.take() {
            self.spawn_pump(
                "wrapper-stderr",
                stderr,
                StreamSource::Error,
                encoding.standard_error,
            )?;
        }

        let stdin_tx = match child.stdin.take() {
            Some(stdin) => {
                let (tx, rx) = async_channel::unbounded();
                let forwarder = StdinForwarder::new(stdin, rx, encoding.standard_input);
                spawn_named("wrapper-stdin", move || {
                    future::block_on(forwarder.run());
                })?;
                Some(tx)
            }
            None => None,
        };

        let shared = Arc::clone(&self.shared);
        spawn_named("wrapper-wait", move || {
            future::block_on(wait_for_exit(shared, child, registration));
        })?;

        Ok(Running {
            pid,
            registration,
            stdin_tx,
        })
    }

    fn spawn_pump(
        &self,
        name: &str,
        stream: impl AsyncRead + Send + Unpin + 'static,
        source: StreamSource,
        encoding: Encoding,
    ) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        spawn_named(name, move || {
            future::block_on(pump_lines(shared, stream, source, encoding));
        })
    }

    /// Forcibly terminate the running process
    ///
    /// Cancels further line delivery, sends an unconditional kill, and
    /// blocks until the OS confirms termination; the killed signal and
    /// observers fire exactly once, after that confirmation.
    ///
    /// Fails with [`Error::InvalidState`] unless the process is executing;
    /// killing an already-terminated process is an error. A failure to
    /// signal is retried once, to tell a child that just exited apart from
    /// one that is genuinely stuck, then surfaced as
    /// [`Error::SignalFailed`]. If the child manages a natural exit before
    /// the signal lands, the exited event fires instead of killed and this
    /// call still returns `Ok`.
    pub async fn kill(&self) -> Result<()> {
        let pid = {
            let lifecycle = self.lock();
            let Lifecycle::Executing(running) = &*lifecycle else {
                return Err(Error::invalid_state("kill", lifecycle.state()));
            };
            // decided under the lock so exactly one of kill/natural-exit
            // picks the event that fires
            self.shared.kill_requested.store(true, Ordering::SeqCst);
            self.shared.cancelled.store(true, Ordering::SeqCst);
            running.pid
        };

        if let Err(first) = registry::force_kill(pid) {
            debug!(pid, error = %first, "first kill attempt failed, retrying");
            if let Err(second) = registry::force_kill(pid) {
                // the kill never landed; a later natural exit must still be
                // reported as an exit, and delivery must keep flowing if the
                // child is in fact stuck alive
                self.shared.kill_requested.store(false, Ordering::SeqCst);
                self.shared.cancelled.store(false, Ordering::SeqCst);
                if self.state() == WrapperState::Terminated {
                    return Err(Error::invalid_state("kill", WrapperState::Terminated));
                }
                return Err(second);
            }
        }

        // the exit waiter confirms the reap; it fires killed for a
        // signal-terminated child, or exited if a natural exit won the race
        future::or(
            self.shared.signals.killed.wait(),
            self.shared.signals.exited.wait(),
        )
        .await;
        Ok(())
    }

    /// Best-effort variant of [`kill`](Self::kill)
    ///
    /// Swallows every failure and reports success as a boolean; intended
    /// for shutdown paths where a failure must not cascade.
    pub async fn try_kill(&self) -> bool {
        match self.kill().await {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "try_kill failed");
                false
            }
        }
    }

    /// Write a line (plus terminator) to the child's standard input
    ///
    /// Fails with [`Error::InvalidState`] unless the process is executing
    /// and the settings enabled input redirection.
    pub async fn write_to_console(&self, line: &str) -> Result<()> {
        let tx = {
            let lifecycle = self.lock();
            let Lifecycle::Executing(running) = &*lifecycle else {
                return Err(Error::invalid_state("write to console", lifecycle.state()));
            };
            match &running.stdin_tx {
                Some(tx) => tx.clone(),
                None => {
                    return Err(Error::invalid_state_reason(
                        "write to console",
                        "standard input is not redirected",
                    ));
                }
            }
        };

        tx.send(line.to_string())
            .await
            .map_err(|_| Error::invalid_state("write to console", self.state()))
    }

    /// Release everything this wrapper owns
    ///
    /// Idempotent; the second call is a no-op that returns `false` without
    /// attempting another kill. When `kill_process` is true and the child is
    /// still executing, a best-effort kill runs first and the return value
    /// reports whether it succeeded. Disposal closes the child's stdin,
    /// releases the buffered lines, unblocks everyone waiting on a
    /// completion signal, and makes every later operation fail with
    /// [`Error::InvalidState`].
    ///
    /// Disposing without `kill_process` leaves a still-running child alive;
    /// the registry's `terminate_all` and the drop guard remain as orphan
    /// backstops.
    pub async fn dispose(&self, kill_process: bool) -> bool {
        let executing = {
            let lifecycle = self.lock();
            match &*lifecycle {
                Lifecycle::Disposed => return false,
                Lifecycle::Executing(_) => true,
                _ => false,
            }
        };

        let kill_succeeded = if kill_process && executing {
            self.try_kill().await
        } else {
            false
        };

        {
            let mut lifecycle = self.lock();
            if matches!(*lifecycle, Lifecycle::Disposed) {
                // lost the race to a concurrent dispose
                return kill_succeeded;
            }
            // dropping the Running closes the stdin channel, which closes
            // the child's stdin pipe
            *lifecycle = Lifecycle::Disposed;
        }

        self.shared.cancelled.store(true, Ordering::SeqCst);
        self.shared.buffer.clear();
        self.shared.signals.release_all();
        kill_succeeded
    }
}

impl Drop for ConsoleWrapper {
    fn drop(&mut self) {
        // never leave a supervised child running past its wrapper; the exit
        // waiter still reaps it and deregisters the pid
        if let Lifecycle::Executing(running) = &*self.lock() {
            let _ = registry::force_kill(running.pid);
        }
    }
}

fn stdio_for(redirect: bool) -> Stdio {
    if redirect {
        Stdio::piped()
    } else {
        Stdio::inherit()
    }
}

fn spawn_named(name: &str, work: impl FnOnce() + Send + 'static) -> Result<()> {
    thread::Builder::new().name(name.to_string()).spawn(work)?;
    Ok(())
}

/// Undo a partially started launch: the child dies and the registry forgets it
fn abort_launch(pid: u32, registration: RegistrationId) {
    registry::global().deregister(registration);
    let _ = registry::force_kill(pid);
}

#[cfg(unix)]
fn terminated_by_signal(status: &std::process::ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    status.signal().is_some()
}

#[cfg(not(unix))]
fn terminated_by_signal(_status: &std::process::ExitStatus) -> bool {
    false
}

/// Read lines from one redirected stream until it closes
///
/// Per delivered line: append to the buffer, latch the signal, notify
/// observers. Within one stream, delivery order matches the order the child
/// wrote; no order is defined between output and error.
async fn pump_lines(
    shared: Arc<Shared>,
    stream: impl AsyncRead + Unpin,
    source: StreamSource,
    encoding: Encoding,
) {
    let mut reader = BufReader::new(stream);
    let mut bytes = Vec::new();

    loop {
        bytes.clear();
        match reader.read_until(b'\n', &mut bytes).await {
            Ok(0) => break,
            Ok(_) => {
                if bytes.last() == Some(&b'\n') {
                    bytes.pop();
                }
                if bytes.last() == Some(&b'\r') {
                    bytes.pop();
                }
                if shared.cancelled.load(Ordering::SeqCst) {
                    break;
                }

                let line = encoding.decode(&bytes);
                shared.buffer.append(source, line.clone());
                match source {
                    StreamSource::Output => {
                        shared.signals.output_received.set();
                        shared.observers.notify_output(&line);
                    }
                    StreamSource::Error => {
                        shared.signals.error_received.set();
                        shared.observers.notify_error(&line);
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, ?source, "error reading child stream; stopping delivery");
                break;
            }
        }
    }
}

/// Reap the child and fire the terminal event
///
/// The waiter is the single place that confirms termination, so the killed
/// and exited signals always follow the OS's own notification, on the
/// thread that received it.
async fn wait_for_exit(shared: Arc<Shared>, mut child: async_process::Child, registration: RegistrationId) {
    let status = child.status().await;
    let exited_at = Utc::now();
    registry::global().deregister(registration);

    {
        let mut lifecycle = shared.lifecycle.lock().unwrap_or_else(|e| e.into_inner());
        if !matches!(*lifecycle, Lifecycle::Disposed) {
            *lifecycle = Lifecycle::Terminated;
        }
    }

    // a kill counts only if the child actually died from a signal; a child
    // that slipped out via natural exit before the signal landed is reported
    // as an exit even when a kill was requested
    let killed = shared.kill_requested.load(Ordering::SeqCst)
        && matches!(&status, Ok(status) if terminated_by_signal(status));

    match status {
        Ok(status) => debug!(code = ?status.code(), killed, "child terminated"),
        Err(e) => warn!(error = %e, "failed to reap child"),
    }

    // the signal latches before the observers run, so a blocking waiter
    // unblocks no later than the observer's invocation
    if killed {
        shared.signals.killed.set();
        shared.observers.notify_killed();
    } else {
        shared.signals.exited.set();
        shared.observers.notify_exited(exited_at);
    }
}
