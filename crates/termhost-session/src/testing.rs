//! Recording fakes for the session's collaborators.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use termhost_core::{ConsoleHandle, Error, Result};
use termhost_pty::{Launch, ProcessCallbacks, ProcessOperations, ProcessOptions, ProcessSupervisor};

use crate::channel::{ChannelRegistry, SocketCallbacks};
use crate::events::{ConsoleEvent, EventSink};
use crate::store::StateSaver;

#[derive(Default)]
pub struct RecordingOps {
    writes: Mutex<Vec<String>>,
    sizes: Mutex<Vec<(u16, u16)>>,
    interrupts: AtomicUsize,
    terminated: AtomicBool,
    fail_writes: AtomicBool,
}

impl RecordingOps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().clone()
    }

    pub fn sizes(&self) -> Vec<(u16, u16)> {
        self.sizes.lock().clone()
    }

    pub fn interrupts(&self) -> usize {
        self.interrupts.load(Ordering::SeqCst)
    }

    pub fn terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}

impl ProcessOperations for RecordingOps {
    fn write_to_stdin(&self, text: &str, _is_binary: bool) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::PtyError("broken pipe".to_string()));
        }
        self.writes.lock().push(text.to_string());
        Ok(())
    }

    fn pty_interrupt(&self) -> Result<()> {
        self.interrupts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn pty_set_size(&self, cols: u16, rows: u16) -> Result<()> {
        self.sizes.lock().push((cols, rows));
        Ok(())
    }

    fn terminate(&self) -> Result<()> {
        self.terminated.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn pid(&self) -> Option<u32> {
        Some(4242)
    }
}

#[derive(Default)]
pub struct RecordingChannels {
    fail_start: AtomicBool,
    listening: Mutex<Vec<(ConsoleHandle, Arc<dyn SocketCallbacks>)>>,
    listen_calls: AtomicUsize,
    stopped: Mutex<Vec<ConsoleHandle>>,
    sent: Mutex<Vec<(ConsoleHandle, String)>>,
}

impl RecordingChannels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let channels = Self::default();
        channels.fail_start.store(true, Ordering::SeqCst);
        channels
    }

    pub fn listen_calls(&self) -> usize {
        self.listen_calls.load(Ordering::SeqCst)
    }

    pub fn callbacks(&self, handle: &ConsoleHandle) -> Option<Arc<dyn SocketCallbacks>> {
        self.listening
            .lock()
            .iter()
            .find(|(h, _)| h == handle)
            .map(|(_, callbacks)| Arc::clone(callbacks))
    }

    pub fn stopped(&self) -> Vec<ConsoleHandle> {
        self.stopped.lock().clone()
    }

    pub fn sent(&self) -> Vec<(ConsoleHandle, String)> {
        self.sent.lock().clone()
    }
}

impl ChannelRegistry for RecordingChannels {
    fn ensure_server_running(&self) -> Result<()> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(Error::ChannelError("address in use".to_string()));
        }
        Ok(())
    }

    fn listen(&self, handle: &ConsoleHandle, callbacks: Arc<dyn SocketCallbacks>) -> Result<()> {
        self.listen_calls.fetch_add(1, Ordering::SeqCst);
        let mut listening = self.listening.lock();
        listening.retain(|(h, _)| h != handle);
        listening.push((handle.clone(), callbacks));
        Ok(())
    }

    fn stop_listening(&self, handle: &ConsoleHandle) {
        self.listening.lock().retain(|(h, _)| h != handle);
        self.stopped.lock().push(handle.clone());
    }

    fn send_text(&self, handle: &ConsoleHandle, text: &str) {
        self.sent.lock().push((handle.clone(), text.to_string()));
    }

    fn port(&self) -> u16 {
        8765
    }
}

#[derive(Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<ConsoleEvent>>,
}

impl RecordingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ConsoleEvent> {
        self.events.lock().clone()
    }

    pub fn outputs(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ConsoleEvent::Output { output, .. } => Some(output.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ConsoleEvent::Prompt { prompt, .. } => Some(prompt.clone()),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingEvents {
    fn notify(&self, event: ConsoleEvent) {
        self.events.lock().push(event);
    }
}

#[derive(Default)]
pub struct CountingSaver {
    saves: AtomicUsize,
}

impl CountingSaver {
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl StateSaver for CountingSaver {
    fn save_state(&self) {
        self.saves.fetch_add(1, Ordering::SeqCst);
    }
}

/// Supervisor that records spawn requests without running anything.
#[derive(Default)]
pub struct FakeSupervisor {
    spawned: Mutex<Vec<(Launch, ProcessOptions)>>,
    fail: AtomicBool,
}

impl FakeSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let supervisor = Self::default();
        supervisor.fail.store(true, Ordering::SeqCst);
        supervisor
    }

    pub fn spawned(&self) -> Vec<(Launch, ProcessOptions)> {
        self.spawned.lock().clone()
    }
}

impl ProcessSupervisor for FakeSupervisor {
    fn spawn(
        &self,
        launch: Launch,
        options: ProcessOptions,
        _callbacks: Arc<dyn ProcessCallbacks>,
    ) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::LaunchFailed("spawn refused".to_string()));
        }
        self.spawned.lock().push((launch, options));
        Ok(())
    }
}
