//! Registry of console processes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use termhost_core::{
    AvailableShells, ChannelMode, ConsoleHandle, ConsoleProcessInfo, Error, Result, ServerConfig,
    TerminalShell,
};
use termhost_pty::{ProcessOptions, ProcessSupervisor};

use crate::channel::{select_channel, ChannelRegistry, SocketConnection};
use crate::events::EventSink;
use crate::process::{ConsoleContext, ConsoleProcess};
use crate::store::{SessionStore, StateSaver};

/// Shell hook that keeps the terminal title on the working directory.
#[cfg(not(windows))]
const PROMPT_COMMAND: &str = r#"echo -ne "\033]0;${PWD/#${HOME}/~}\007""#;

/// Environment variable carrying the terminal sequence id.
pub const TERMINAL_SEQUENCE_ENV: &str = "TERMHOST_TERM";

type ProcessMap = RwLock<HashMap<ConsoleHandle, Arc<ConsoleProcess>>>;

/// Saves every record and transcript in the table.
///
/// Saves run one at a time, so a later snapshot is never overwritten by an
/// earlier one.
struct TableSaver {
    processes: Weak<ProcessMap>,
    store: Option<Arc<dyn SessionStore>>,
    saving: Mutex<()>,
}

impl StateSaver for TableSaver {
    fn save_state(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let Some(processes) = self.processes.upgrade() else {
            return;
        };
        let _saving = self.saving.lock();

        let mut snapshot: Vec<Arc<ConsoleProcess>> = processes.read().values().cloned().collect();
        snapshot.sort_by_key(|process| process.handle());

        let records: Vec<ConsoleProcessInfo> =
            snapshot.iter().map(|process| process.to_record()).collect();
        if let Err(e) = store.save_records(&records) {
            error!("Failed to save console records: error={}", e);
        }

        for process in &snapshot {
            let handle = process.handle();
            if let Err(e) = store.save_buffer(&handle, &process.get_buffer()) {
                error!("Failed to save transcript: handle={}, error={}", handle, e);
            }
        }
    }
}

/// All console processes, keyed by handle.
pub struct ConsoleProcessTable {
    processes: Arc<ProcessMap>,
    context: ConsoleContext,
    store: Option<Arc<dyn SessionStore>>,
    max_processes: usize,
    direct_socket: bool,
}

impl ConsoleProcessTable {
    /// Create an empty table.
    pub fn new(
        config: &ServerConfig,
        supervisor: Arc<dyn ProcessSupervisor>,
        channels: Arc<dyn ChannelRegistry>,
        events: Arc<dyn EventSink>,
        store: Option<Arc<dyn SessionStore>>,
    ) -> Self {
        let processes: Arc<ProcessMap> = Arc::new(RwLock::new(HashMap::new()));
        let saver = Arc::new(TableSaver {
            processes: Arc::downgrade(&processes),
            store: store.clone(),
            saving: Mutex::new(()),
        });

        Self {
            processes,
            context: ConsoleContext {
                supervisor,
                channels,
                events,
                saver,
                settings: config.terminal.clone(),
            },
            store,
            max_processes: config.server.max_processes,
            direct_socket: config.channel.direct_socket,
        }
    }

    /// Load persisted records. Restored processes are not started.
    pub fn restore(&self) -> Result<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };

        let mut restored = 0;
        for record in store.load_records()? {
            if !record.handle.is_well_formed() {
                warn!("Skipping persisted record with a bad handle: {:?}", record.handle.as_str());
                continue;
            }
            let buffer = match store.load_buffer(&record.handle) {
                Ok(buffer) => buffer,
                Err(e) => {
                    warn!(
                        "Unreadable transcript, restoring without it: handle={}, error={}",
                        record.handle, e
                    );
                    None
                }
            };
            let handle = record.handle.clone();
            let process = ConsoleProcess::from_record(record, buffer, self.context.clone());
            self.processes.write().insert(handle, process);
            restored += 1;
        }

        info!("Restored console processes: count={}", restored);
        Ok(restored)
    }

    /// Whether new terminals prefer the direct socket.
    pub fn direct_socket_enabled(&self) -> bool {
        self.direct_socket
    }

    /// Shared collaborators.
    pub fn context(&self) -> &ConsoleContext {
        &self.context
    }

    /// Look up a process.
    pub fn find_by_handle(&self, handle: &ConsoleHandle) -> Option<Arc<ConsoleProcess>> {
        self.processes.read().get(handle).cloned()
    }

    /// Look up a process, failing if it does not exist.
    pub fn get(&self, handle: &ConsoleHandle) -> Result<Arc<ConsoleProcess>> {
        self.find_by_handle(handle)
            .ok_or_else(|| Error::ProcessNotFound(handle.clone()))
    }

    /// Records of every process, ordered by handle.
    pub fn list(&self) -> Vec<ConsoleProcessInfo> {
        let mut records: Vec<ConsoleProcessInfo> = self
            .processes
            .read()
            .values()
            .map(|process| process.to_record())
            .collect();
        records.sort_by(|a, b| a.handle.cmp(&b.handle));
        records
    }

    /// Number of processes.
    pub fn len(&self) -> usize {
        self.processes.read().len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.processes.read().is_empty()
    }

    /// Next free terminal sequence id.
    pub fn next_terminal_sequence(&self) -> u32 {
        self.processes
            .read()
            .values()
            .filter_map(|process| process.to_record().terminal_sequence)
            .max()
            .map_or(1, |max| max + 1)
    }

    /// Save every record and transcript.
    pub fn save(&self) {
        self.context.saver.save_state();
    }

    fn ensure_capacity(&self) -> Result<()> {
        if self.len() >= self.max_processes {
            return Err(Error::ProcessLimitReached(self.max_processes));
        }
        Ok(())
    }

    fn prepare_info(&self, info: &mut ConsoleProcessInfo) {
        info.max_output_lines = self.context.settings.max_output_lines;
    }

    fn insert(&self, process: &Arc<ConsoleProcess>) {
        let handle = process.handle();
        debug!("Registering console process: handle={}", handle);
        self.processes.write().insert(handle, Arc::clone(process));
        self.save();
    }

    /// Create a process that runs a command line.
    pub fn create_command(
        &self,
        command: impl Into<String>,
        options: ProcessOptions,
        mut info: ConsoleProcessInfo,
    ) -> Result<Arc<ConsoleProcess>> {
        self.ensure_capacity()?;
        self.prepare_info(&mut info);

        let process = ConsoleProcess::create_command(command, options, info, self.context.clone());
        self.insert(&process);
        Ok(process)
    }

    /// Create a process that runs a program with arguments.
    pub fn create_program(
        &self,
        program: impl Into<PathBuf>,
        args: Vec<String>,
        options: ProcessOptions,
        mut info: ConsoleProcessInfo,
    ) -> Result<Arc<ConsoleProcess>> {
        self.ensure_capacity()?;
        self.prepare_info(&mut info);

        let process =
            ConsoleProcess::create_program(program, args, options, info, self.context.clone());
        self.insert(&process);
        Ok(process)
    }

    /// Build spawn options for an interactive terminal.
    ///
    /// Resolves the shell and records its type in `info`.
    pub fn create_terminal_proc_options(
        &self,
        info: &mut ConsoleProcessInfo,
    ) -> (ProcessOptions, Option<TerminalShell>) {
        let settings = &self.context.settings;
        // the child inherits the server environment; these are additions
        let mut options = ProcessOptions::default();

        #[cfg(not(windows))]
        options.set_env("PROMPT_COMMAND", PROMPT_COMMAND);

        if let Some(edit_command) = &settings.edit_command {
            options.set_env("GIT_EDITOR", edit_command.clone());
            options.set_env("SVN_EDITOR", edit_command.clone());
        }

        if let Some(sequence) = info.terminal_sequence {
            options.set_env(TERMINAL_SEQUENCE_ENV, sequence.to_string());
        }

        options.working_dir = info.cwd.clone().or_else(dirs::home_dir);
        options.smart_terminal = true;
        options.report_has_subprocs = true;
        options.track_cwd = true;

        info.track_env = settings.track_env;

        let shell = AvailableShells::detect()
            .get_info(info.shell_type)
            .filter(TerminalShell::exists)
            .or_else(AvailableShells::system_shell);
        match &shell {
            Some(shell) => info.shell_type = shell.shell_type,
            None => warn!("No shell found: handle={}, requested={}", info.handle, info.shell_type),
        }

        (options, shell)
    }

    /// Create an interactive terminal, or reattach to a running one.
    ///
    /// With `allow_restart` and a known handle, a live process under that
    /// handle is reused. Otherwise a new process takes over the handle and
    /// the old transcript.
    pub fn create_terminal_process(
        &self,
        options: ProcessOptions,
        mut info: ConsoleProcessInfo,
        shell: Option<TerminalShell>,
        enable_socket: bool,
    ) -> Result<Arc<ConsoleProcess>> {
        info.restarted = true;
        self.prepare_info(&mut info);
        let channel = select_channel(self.context.channels.as_ref(), enable_socket);

        let existing = if info.allow_restart && !info.handle.is_empty() {
            self.find_by_handle(&info.handle)
        } else {
            None
        };

        if let Some(old) = &existing {
            // one binding per handle: drop the old socket before rebinding
            if old.to_record().channel.is_direct_socket() {
                debug!("Dropping previous socket binding: handle={}", info.handle);
                old.stop_listening();
            }
        }

        let process = match existing {
            Some(existing) if existing.is_live() => {
                info!("Reattaching to running terminal: handle={}", info.handle);
                existing.reattach(channel);
                existing
            }
            existing => {
                if existing.is_none() {
                    self.ensure_capacity()?;
                }

                info.alt_buffer_active = false;
                info.channel = channel;
                let shell_type = info.shell_type;
                let process =
                    ConsoleProcess::create_terminal(shell, options, info, self.context.clone());

                if let Some(old) = existing {
                    debug!("Replacing exited terminal: handle={}", old.handle());
                    process.replace_buffer(old.get_buffer());
                    if !shell_type.supports_scrollback_replay() {
                        process.delete_log(false);
                    }
                }

                self.insert(&process);
                process
            }
        };

        if channel.is_direct_socket() {
            let callbacks = Arc::new(SocketConnection::new(&process));
            if let Err(e) = self.context.channels.listen(&process.handle(), callbacks) {
                warn!(
                    "Failed to register socket, using request/response: handle={}, error={}",
                    process.handle(),
                    e
                );
                process.set_channel(ChannelMode::RequestResponse);
            }
        }

        Ok(process)
    }

    /// Relaunch a terminal from its record, reattaching if it still runs.
    pub fn create_terminal_process_from(
        &self,
        handle: &ConsoleHandle,
        enable_socket: bool,
    ) -> Result<Arc<ConsoleProcess>> {
        let process = self.get(handle)?;
        let mut info = process.to_record();
        let (options, shell) = self.create_terminal_proc_options(&mut info);
        self.create_terminal_process(options, info, shell, enable_socket)
    }

    /// Stop a process and forget it.
    pub fn remove(&self, handle: &ConsoleHandle) -> Result<Arc<ConsoleProcess>> {
        let process = self
            .processes
            .write()
            .remove(handle)
            .ok_or_else(|| Error::ProcessNotFound(handle.clone()))?;

        info!("Removing console process: handle={}", handle);
        process.interrupt();
        process.stop_listening();

        if let Some(store) = &self.store {
            if let Err(e) = store.delete_buffer(handle) {
                warn!("Failed to delete transcript: handle={}, error={}", handle, e);
            }
        }
        self.save();
        Ok(process)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FileStore;
    use crate::testing::{FakeSupervisor, RecordingChannels, RecordingEvents, RecordingOps};
    use termhost_core::{Dimensions, InteractionMode, ShellType};
    use termhost_pty::{ProcessCallbacks, ProcessOperations};

    struct Harness {
        table: ConsoleProcessTable,
        channels: Arc<RecordingChannels>,
        supervisor: Arc<FakeSupervisor>,
    }

    fn harness_with(
        config: ServerConfig,
        channels: RecordingChannels,
        store: Option<Arc<dyn SessionStore>>,
    ) -> Harness {
        let channels = Arc::new(channels);
        let supervisor = Arc::new(FakeSupervisor::new());
        let table = ConsoleProcessTable::new(
            &config,
            supervisor.clone(),
            channels.clone(),
            Arc::new(RecordingEvents::new()),
            store,
        );
        Harness {
            table,
            channels,
            supervisor,
        }
    }

    fn harness() -> Harness {
        harness_with(ServerConfig::default(), RecordingChannels::new(), None)
    }

    fn terminal_info(table: &ConsoleProcessTable) -> ConsoleProcessInfo {
        ConsoleProcessInfo::terminal(
            "Terminal",
            ShellType::Default,
            Dimensions::default(),
            table.next_terminal_sequence(),
        )
    }

    fn create_terminal(h: &Harness, info: ConsoleProcessInfo, enable_socket: bool) -> Arc<ConsoleProcess> {
        h.table
            .create_terminal_process(ProcessOptions::default(), info, None, enable_socket)
            .unwrap()
    }

    #[test]
    fn test_create_command_registers() {
        let h = harness();
        let process = h
            .table
            .create_command(
                "make",
                ProcessOptions::default(),
                ConsoleProcessInfo::new("make", InteractionMode::Never),
            )
            .unwrap();

        assert_eq!(h.table.len(), 1);
        assert!(Arc::ptr_eq(&h.table.get(&process.handle()).unwrap(), &process));
        assert_eq!(h.table.list()[0].caption, "make");
    }

    #[test]
    fn test_get_missing() {
        let h = harness();
        let missing = ConsoleHandle::from("nope");
        assert!(matches!(h.table.get(&missing), Err(Error::ProcessNotFound(_))));
        assert!(h.table.find_by_handle(&missing).is_none());
    }

    #[test]
    fn test_process_limit() {
        let mut config = ServerConfig::default();
        config.server.max_processes = 1;
        let h = harness_with(config, RecordingChannels::new(), None);

        h.table
            .create_program("ls", vec![], ProcessOptions::default(), ConsoleProcessInfo::default())
            .unwrap();
        let result =
            h.table
                .create_program("ls", vec![], ProcessOptions::default(), ConsoleProcessInfo::default());
        assert!(matches!(result, Err(Error::ProcessLimitReached(1))));
    }

    #[test]
    fn test_next_terminal_sequence() {
        let h = harness();
        assert_eq!(h.table.next_terminal_sequence(), 1);
        create_terminal(&h, terminal_info(&h.table), false);
        assert_eq!(h.table.next_terminal_sequence(), 2);
    }

    #[test]
    fn test_restart_reuses_live_process() {
        let h = harness();
        let first = create_terminal(&h, terminal_info(&h.table), false);
        first.start().unwrap();
        assert!(first.to_record().restarted);

        let second = create_terminal(&h, first.to_record(), false);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(!second.to_record().restarted);
        assert_eq!(h.supervisor.spawned().len(), 1);
        assert_eq!(h.table.len(), 1);
    }

    #[test]
    fn test_reattach_in_alt_screen_forces_redraw() {
        let h = harness();
        let process = create_terminal(&h, terminal_info(&h.table), false);
        process.start().unwrap();
        process.set_alt_buffer_active(true);

        create_terminal(&h, process.to_record(), false);

        let recording = Arc::new(RecordingOps::new());
        let ops: Arc<dyn ProcessOperations> = recording.clone();
        process.on_continue(&ops);
        let jiggle = Dimensions::jiggle();
        assert_eq!(recording.sizes(), vec![(jiggle.cols, jiggle.rows)]);
    }

    #[test]
    fn test_restart_without_live_process_keeps_handle() {
        let h = harness();
        let first = create_terminal(&h, terminal_info(&h.table), false);
        first.start().unwrap();
        first.on_stdout(&RecordingOps::new(), "$ ls\r\n");
        first.set_alt_buffer_active(true);
        first.on_exit(0);

        let second = create_terminal(&h, first.to_record(), false);
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.handle(), first.handle());
        assert!(second.to_record().restarted);
        assert!(!second.to_record().alt_buffer_active);
        assert_eq!(second.get_buffer(), "$ ls\r\n");
        assert!(Arc::ptr_eq(&h.table.get(&first.handle()).unwrap(), &second));
    }

    #[test]
    fn test_restart_discards_transcript_without_replay() {
        let h = harness();
        let mut info = terminal_info(&h.table);
        info.shell_type = ShellType::Cmd;
        let first = create_terminal(&h, info, false);
        first.on_stdout(&RecordingOps::new(), "C:\\> ");

        let second = create_terminal(&h, first.to_record(), false);
        assert_eq!(second.get_buffer(), "");
    }

    #[test]
    fn test_no_restart_creates_new_handle() {
        let h = harness();
        let mut info = terminal_info(&h.table);
        info.allow_restart = false;
        let first = create_terminal(&h, info, false);

        let mut again = first.to_record();
        again.handle = ConsoleHandle::default();
        let second = create_terminal(&h, again, false);
        assert_ne!(first.handle(), second.handle());
        assert_eq!(h.table.len(), 2);
    }

    #[test]
    fn test_channel_fallback_skips_listen() {
        let h = harness_with(ServerConfig::default(), RecordingChannels::failing(), None);
        let process = create_terminal(&h, terminal_info(&h.table), true);

        assert_eq!(process.to_record().channel, ChannelMode::RequestResponse);
        assert_eq!(h.channels.listen_calls(), 0);
    }

    #[test]
    fn test_direct_socket_registers() {
        let h = harness();
        let process = create_terminal(&h, terminal_info(&h.table), true);

        assert_eq!(process.to_record().channel, ChannelMode::DirectSocket { port: 8765 });
        assert_eq!(h.channels.listen_calls(), 1);
        assert!(h.channels.callbacks(&process.handle()).is_some());
    }

    #[test]
    fn test_socket_disabled() {
        let h = harness();
        let process = create_terminal(&h, terminal_info(&h.table), false);
        assert_eq!(process.channel_mode_name(), "request-response");
        assert_eq!(h.channels.listen_calls(), 0);
    }

    #[test]
    fn test_terminal_proc_options() {
        let mut config = ServerConfig::default();
        config.terminal.edit_command = Some("termhost-edit".to_string());
        config.terminal.track_env = true;
        let h = harness_with(config, RecordingChannels::new(), None);

        let mut info = terminal_info(&h.table);
        let (options, _shell) = h.table.create_terminal_proc_options(&mut info);

        assert_eq!(options.env(TERMINAL_SEQUENCE_ENV), Some("1"));
        assert_eq!(options.env("GIT_EDITOR"), Some("termhost-edit"));
        assert_eq!(options.env("SVN_EDITOR"), Some("termhost-edit"));
        assert!(options.smart_terminal);
        assert!(options.report_has_subprocs);
        assert!(options.track_cwd);
        assert_eq!(options.working_dir, dirs::home_dir());
        assert!(info.track_env);
        #[cfg(unix)]
        assert!(options.env("PROMPT_COMMAND").is_some());

        info.cwd = Some(PathBuf::from("/tmp"));
        let (options, _) = h.table.create_terminal_proc_options(&mut info);
        assert_eq!(options.working_dir, Some(PathBuf::from("/tmp")));
    }

    #[cfg(unix)]
    #[test]
    fn test_terminal_proc_options_records_shell() {
        let h = harness();
        let mut info = terminal_info(&h.table);
        let (_, shell) = h.table.create_terminal_proc_options(&mut info);
        if let Some(shell) = shell {
            assert_eq!(info.shell_type, shell.shell_type);
        }
    }

    #[test]
    fn test_create_terminal_process_from() {
        let h = harness();
        let first = create_terminal(&h, terminal_info(&h.table), false);
        first.on_exit(1);

        let second = h.table.create_terminal_process_from(&first.handle(), false).unwrap();
        assert_eq!(second.handle(), first.handle());
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_reattach_without_socket_drops_binding() {
        let h = harness();
        let process = create_terminal(&h, terminal_info(&h.table), true);
        process.start().unwrap();
        let handle = process.handle();
        assert!(h.channels.callbacks(&handle).is_some());

        let again = h.table.create_terminal_process_from(&handle, false).unwrap();
        assert!(Arc::ptr_eq(&process, &again));
        assert_eq!(again.to_record().channel, ChannelMode::RequestResponse);
        assert_eq!(h.channels.stopped(), vec![handle.clone()]);
        assert!(h.channels.callbacks(&handle).is_none());
    }

    #[test]
    fn test_replacement_drops_old_socket_binding() {
        let h = harness();
        let first = create_terminal(&h, terminal_info(&h.table), true);
        first.start().unwrap();
        first.on_exit(0);
        let handle = first.handle();

        let second = h.table.create_terminal_process_from(&handle, false).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.to_record().channel, ChannelMode::RequestResponse);
        assert_eq!(h.channels.stopped(), vec![handle.clone()]);
        assert!(h.channels.callbacks(&handle).is_none());
    }

    #[test]
    fn test_reattach_over_socket_rebinds_live_process() {
        let h = harness();
        let process = create_terminal(&h, terminal_info(&h.table), true);
        process.start().unwrap();
        let handle = process.handle();

        h.table.create_terminal_process_from(&handle, true).unwrap();
        assert_eq!(h.channels.listen_calls(), 2);
        assert_eq!(h.channels.stopped(), vec![handle.clone()]);

        // input on the new binding reaches the same process
        let callbacks = h.channels.callbacks(&handle).unwrap();
        let recording = Arc::new(RecordingOps::new());
        let ops: Arc<dyn ProcessOperations> = recording.clone();
        process.on_continue(&ops);
        callbacks.on_received_input("ls\r");
        assert_eq!(recording.writes(), vec!["ls\r".to_string()]);
    }

    #[test]
    fn test_remove() {
        let h = harness();
        let process = create_terminal(&h, terminal_info(&h.table), false);
        let handle = process.handle();

        h.table.remove(&handle).unwrap();
        assert!(h.table.is_empty());
        assert_eq!(h.channels.stopped(), vec![handle.clone()]);
        assert!(!process.on_continue(&(Arc::new(RecordingOps::new()) as Arc<dyn ProcessOperations>)));
        assert!(matches!(h.table.remove(&handle), Err(Error::ProcessNotFound(_))));
    }

    #[test]
    fn test_save_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn SessionStore> = Arc::new(FileStore::new(dir.path()).unwrap());

        let handle = {
            let h = harness_with(ServerConfig::default(), RecordingChannels::new(), Some(store.clone()));
            let process = create_terminal(&h, terminal_info(&h.table), false);
            process.on_stdout(&RecordingOps::new(), "hello\n");
            process.resize(100, 40).unwrap();
            let ops: Arc<dyn ProcessOperations> = Arc::new(RecordingOps::new());
            process.on_continue(&ops);
            process.handle()
        };

        let h = harness_with(ServerConfig::default(), RecordingChannels::new(), Some(store));
        assert_eq!(h.table.restore().unwrap(), 1);

        let restored = h.table.get(&handle).unwrap();
        assert_eq!(restored.get_buffer(), "hello\n");
        assert_eq!(restored.to_record().dimensions, Dimensions::new(40, 100));
        assert!(!restored.is_started());
    }

    #[test]
    fn test_restore_survives_unreadable_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        let mut broken = ConsoleProcessInfo::new("broken", InteractionMode::Always);
        broken.handle = ConsoleHandle::from("broken");
        let mut fine = ConsoleProcessInfo::new("fine", InteractionMode::Always);
        fine.handle = ConsoleHandle::from("fine");
        let mut hostile = ConsoleProcessInfo::new("hostile", InteractionMode::Always);
        hostile.handle = ConsoleHandle::from("../hostile");
        store.save_records(&[broken, fine, hostile]).unwrap();
        store.save_buffer(&ConsoleHandle::from("fine"), "kept\n").unwrap();
        std::fs::write(dir.path().join("buffers").join("broken.log"), [0xff, 0xfe, 0x00]).unwrap();

        let h = harness_with(ServerConfig::default(), RecordingChannels::new(), Some(Arc::new(store)));
        assert_eq!(h.table.restore().unwrap(), 2);
        assert_eq!(h.table.get(&ConsoleHandle::from("broken")).unwrap().get_buffer(), "");
        assert_eq!(h.table.get(&ConsoleHandle::from("fine")).unwrap().get_buffer(), "kept\n");
        assert!(h.table.find_by_handle(&ConsoleHandle::from("../hostile")).is_none());
    }

    #[test]
    fn test_restore_without_store() {
        let h = harness();
        assert_eq!(h.table.restore().unwrap(), 0);
    }

    #[test]
    fn test_saver_outlives_table() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn SessionStore> = Arc::new(FileStore::new(dir.path()).unwrap());
        let h = harness_with(ServerConfig::default(), RecordingChannels::new(), Some(store));
        let process = create_terminal(&h, terminal_info(&h.table), false);
        drop(h);

        // the table is gone; saving is a no-op
        process.report_cwd(std::path::Path::new("/tmp"));
    }
}
