//! The supervising loop that drives each child's continuation tick.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use termhost_core::{Error, Result};

use crate::child::{ChildProcess, Chunk};
use crate::decoder::Utf8Decoder;
use crate::ops::{Launch, ProcessCallbacks, ProcessOperations, ProcessOptions, ProcessSupervisor};
use crate::pipe::PipeChild;
use crate::probe;
use crate::pty::PtyChild;

/// Interval between continuation ticks when the child is quiet.
pub const POLL_INTERVAL: Duration = Duration::from_millis(30);

/// Interval between subprocess and working directory probes.
pub const PROBE_INTERVAL: Duration = Duration::from_millis(500);

/// How long to keep collecting output after the child has exited.
const EXIT_DRAIN_TIMEOUT: Duration = Duration::from_millis(200);

/// Supervisor that runs children on a pseudo-terminal when one is requested,
/// and over pipes otherwise. Each child gets its own supervising thread.
#[derive(Debug, Clone, Default)]
pub struct PtySupervisor;

impl PtySupervisor {
    /// Create a supervisor.
    pub fn new() -> Self {
        Self
    }
}

impl ProcessSupervisor for PtySupervisor {
    fn spawn(
        &self,
        launch: Launch,
        options: ProcessOptions,
        callbacks: Arc<dyn ProcessCallbacks>,
    ) -> Result<()> {
        let (tx, rx) = mpsc::channel();
        match options.pseudoterminal {
            Some(dimensions) => {
                let child = Arc::new(PtyChild::spawn(&launch, &options, dimensions, tx)?);
                start(child, rx, callbacks, options)
            }
            None => {
                let child = Arc::new(PipeChild::spawn(&launch, &options, tx)?);
                start(child, rx, callbacks, options)
            }
        }
    }
}

fn start<C: ChildProcess + 'static>(
    child: Arc<C>,
    rx: Receiver<Chunk>,
    callbacks: Arc<dyn ProcessCallbacks>,
    options: ProcessOptions,
) -> Result<()> {
    let pid = child.pid().unwrap_or_default();
    let supervised = Arc::clone(&child);

    let spawned = thread::Builder::new()
        .name(format!("termhost-supervise-{pid}"))
        .spawn(move || supervise(supervised, rx, callbacks, options));

    match spawned {
        Ok(_) => Ok(()),
        Err(e) => {
            error!("Failed to start supervising thread: pid={}, error={}", pid, e);
            if let Err(e) = child.terminate() {
                warn!("Failed to terminate unsupervised child: pid={}, error={}", pid, e);
            }
            Err(Error::Io(e))
        }
    }
}

/// Decodes raw chunks and forwards them to the callbacks.
struct OutputPump {
    stdout: Utf8Decoder,
    stderr: Utf8Decoder,
}

impl OutputPump {
    fn new() -> Self {
        Self {
            stdout: Utf8Decoder::new(),
            stderr: Utf8Decoder::new(),
        }
    }

    fn dispatch(&mut self, chunk: Chunk, ops: &dyn ProcessOperations, callbacks: &dyn ProcessCallbacks) {
        match chunk {
            Chunk::Stdout(bytes) => {
                let text = self.stdout.decode(&bytes);
                if !text.is_empty() {
                    callbacks.on_stdout(ops, &text);
                }
            }
            Chunk::Stderr(bytes) => {
                let text = self.stderr.decode(&bytes);
                if !text.is_empty() {
                    callbacks.on_stderr(ops, &text);
                }
            }
        }
    }

    fn finish(&mut self, ops: &dyn ProcessOperations, callbacks: &dyn ProcessCallbacks) {
        let rest = self.stdout.finish();
        if !rest.is_empty() {
            callbacks.on_stdout(ops, &rest);
        }
        let rest = self.stderr.finish();
        if !rest.is_empty() {
            callbacks.on_stderr(ops, &rest);
        }
    }
}

fn supervise<C: ChildProcess + 'static>(
    child: Arc<C>,
    rx: Receiver<Chunk>,
    callbacks: Arc<dyn ProcessCallbacks>,
    options: ProcessOptions,
) {
    let ops: Arc<dyn ProcessOperations> = child.clone();
    let pid = child.pid();
    let probing = options.report_has_subprocs || options.track_cwd;

    let mut pump = OutputPump::new();
    let mut last_probe: Option<Instant> = None;
    let mut terminating = false;

    debug!("Supervising child: pid={:?}", pid);

    let exit_code = loop {
        if !terminating && !callbacks.on_continue(&ops) {
            debug!("Continuation declined, terminating: pid={:?}", pid);
            if let Err(e) = child.terminate() {
                warn!("Failed to terminate child: pid={:?}, error={}", pid, e);
            }
            terminating = true;
        }

        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(chunk) => {
                pump.dispatch(chunk, ops.as_ref(), callbacks.as_ref());
                while let Ok(chunk) = rx.try_recv() {
                    pump.dispatch(chunk, ops.as_ref(), callbacks.as_ref());
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => thread::sleep(POLL_INTERVAL),
        }

        if probing && last_probe.map_or(true, |at| at.elapsed() >= PROBE_INTERVAL) {
            last_probe = Some(Instant::now());
            if let Some(pid) = pid {
                probe_child(pid, &options, callbacks.as_ref());
            }
        }

        match child.try_wait() {
            Ok(Some(code)) => break code,
            Ok(None) => {}
            Err(e) => {
                error!("Failed to poll child status: pid={:?}, error={}", pid, e);
                break -1;
            }
        }
    };

    let deadline = Instant::now() + EXIT_DRAIN_TIMEOUT;
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        match rx.recv_timeout(remaining) {
            Ok(chunk) => pump.dispatch(chunk, ops.as_ref(), callbacks.as_ref()),
            Err(_) => break,
        }
    }
    pump.finish(ops.as_ref(), callbacks.as_ref());

    // Weak references held by callers must stop upgrading before exit is reported
    drop(ops);
    drop(child);

    info!("Child exited: pid={:?}, exit_code={}", pid, exit_code);
    callbacks.on_exit(exit_code);
}

fn probe_child(pid: u32, options: &ProcessOptions, callbacks: &dyn ProcessCallbacks) {
    if options.report_has_subprocs {
        if let Some(has_subprocs) = probe::has_subprocs(pid) {
            callbacks.on_has_subprocs(has_subprocs);
        }
    }
    if options.track_cwd {
        if let Some(cwd) = probe::working_dir(pid) {
            callbacks.report_cwd(&cwd);
        }
    }
}
