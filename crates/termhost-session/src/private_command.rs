//! Hidden environment capture while the shell sits idle.
//!
//! Once the user has run a command and the shell has been quiet for a while,
//! a diagnostic command is written to the shell. Its output is framed by two
//! random markers and kept out of the visible stream.

use std::time::{Duration, Instant};

use tracing::{debug, warn};
use uuid::Uuid;

use termhost_pty::ProcessOperations;

/// Quiet period after the last Enter before a private command may run.
pub const WAIT_FOR_COMMAND_DELAY: Duration = Duration::from_millis(1500);

/// Minimum spacing between private commands.
pub const PRIVATE_COMMAND_DELAY: Duration = Duration::from_secs(3);

/// How long to wait for the end marker before releasing captured output.
pub const PRIVATE_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LastIssued {
    Never,
    At(Instant),
    /// A write failed; no more private commands for this process.
    Disabled,
}

#[derive(Debug)]
struct InFlight {
    started: Instant,
    captured: String,
}

/// Result of a continuation tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrivateCommandTick {
    /// Nothing running; input may be drained.
    Idle,
    /// A private command is running; hold input back.
    Busy,
    /// The end marker never came. The captured output should be shown.
    TimedOut(String),
}

/// Scheduler and output filter for private commands.
#[derive(Debug)]
pub struct PrivateCommandLoop {
    begin_marker: String,
    end_marker: String,
    last_issued: LastIssued,
    in_flight: Option<InFlight>,
    last_environment: Option<String>,
}

impl PrivateCommandLoop {
    /// Create a loop with fresh markers.
    pub fn new() -> Self {
        let id = Uuid::new_v4();
        Self {
            begin_marker: id.simple().to_string(),
            end_marker: Uuid::new_v4().hyphenated().to_string(),
            last_issued: LastIssued::Never,
            in_flight: None,
            last_environment: None,
        }
    }

    /// The command written to the shell.
    pub fn command(&self) -> String {
        format!(
            "echo {}\n/usr/bin/env && echo {}\n",
            self.begin_marker, self.end_marker
        )
    }

    /// Whether a private command is outstanding.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Whether a failed write turned private commands off.
    pub fn is_disabled(&self) -> bool {
        self.last_issued == LastIssued::Disabled
    }

    /// Raw `env` output captured by the last completed private command.
    pub fn last_environment(&self) -> Option<&str> {
        self.last_environment.as_deref()
    }

    /// Whether a new private command may start now.
    pub fn should_start(&self, now: Instant, pending_command: bool, last_enter: Option<Instant>) -> bool {
        if pending_command || self.in_flight.is_some() {
            return false;
        }
        let Some(last_enter) = last_enter else {
            return false;
        };
        if now.saturating_duration_since(last_enter) <= WAIT_FOR_COMMAND_DELAY {
            return false;
        }

        match self.last_issued {
            LastIssued::Never => true,
            LastIssued::Disabled => false,
            LastIssued::At(issued) => {
                now.saturating_duration_since(issued) > PRIVATE_COMMAND_DELAY && issued <= last_enter
            }
        }
    }

    /// Continuation tick: check the safeguard timeout, or start a command.
    pub fn tick(
        &mut self,
        now: Instant,
        pending_command: bool,
        last_enter: Option<Instant>,
        ops: &dyn ProcessOperations,
    ) -> PrivateCommandTick {
        if let Some(in_flight) = &self.in_flight {
            if now.saturating_duration_since(in_flight.started) < PRIVATE_COMMAND_TIMEOUT {
                return PrivateCommandTick::Busy;
            }
            warn!("Private command timed out, releasing captured output");
            let captured = self
                .in_flight
                .take()
                .map(|in_flight| in_flight.captured)
                .unwrap_or_default();
            return PrivateCommandTick::TimedOut(captured);
        }

        if !self.should_start(now, pending_command, last_enter) {
            return PrivateCommandTick::Idle;
        }

        debug!("Starting private command");
        self.last_issued = LastIssued::At(now);
        self.in_flight = Some(InFlight {
            started: now,
            captured: String::new(),
        });

        if let Err(e) = ops.write_to_stdin(&self.command(), false) {
            warn!("Disabling private commands after write failure: {}", e);
            self.in_flight = None;
            self.last_issued = LastIssued::Disabled;
            return PrivateCommandTick::Idle;
        }

        PrivateCommandTick::Busy
    }

    /// Filter process output.
    ///
    /// Returns the output to process normally, or `None` while it is being
    /// captured. The remainder after the end marker line is returned once it
    /// arrives.
    pub fn filter_output(&mut self, output: &str) -> Option<String> {
        let Some(in_flight) = self.in_flight.as_mut() else {
            return Some(output.to_string());
        };
        in_flight.captured.push_str(output);

        let (marker_start, rest_start) = find_marker_line(&in_flight.captured, &self.end_marker)?;
        let captured = std::mem::take(&mut in_flight.captured);
        self.in_flight = None;

        self.last_environment = Some(extract_between(
            &captured[..marker_start],
            &self.begin_marker,
        ));
        debug!("Private command completed");

        let rest = &captured[rest_start..];
        if rest.is_empty() {
            None
        } else {
            Some(rest.to_string())
        }
    }
}

impl Default for PrivateCommandLoop {
    fn default() -> Self {
        Self::new()
    }
}

/// Find a complete line consisting solely of `marker`.
///
/// Returns the byte offset where the marker starts and the offset just past
/// its line terminator.
fn find_marker_line(text: &str, marker: &str) -> Option<(usize, usize)> {
    for (start, _) in text.match_indices(marker) {
        let at_line_start = start == 0 || text[..start].ends_with('\n');
        if !at_line_start {
            continue;
        }
        let after = &text[start + marker.len()..];
        if after.starts_with("\r\n") {
            return Some((start, start + marker.len() + 2));
        }
        if after.starts_with('\n') {
            return Some((start, start + marker.len() + 1));
        }
    }
    None
}

/// Text after the line consisting of `begin`, with CRLF folded to LF.
fn extract_between(text: &str, begin: &str) -> String {
    let body = match find_marker_line(text, begin) {
        Some((_, body_start)) => &text[body_start..],
        None => text,
    };
    body.replace("\r\n", "\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingOps;

    fn issued(lp: &mut PrivateCommandLoop, now: Instant, last_enter: Instant) -> bool {
        let ops = RecordingOps::new();
        lp.tick(now, false, Some(last_enter), &ops) == PrivateCommandTick::Busy
    }

    #[test]
    fn test_command_markers() {
        let lp = PrivateCommandLoop::new();
        let command = lp.command();
        assert!(command.starts_with("echo "));
        assert!(command.contains("/usr/bin/env && echo "));
        assert_eq!(lp.begin_marker.len(), 32);
        assert_eq!(lp.end_marker.len(), 36);
    }

    #[test]
    fn test_no_command_before_first_enter() {
        let lp = PrivateCommandLoop::new();
        assert!(!lp.should_start(Instant::now(), false, None));
    }

    #[test]
    fn test_not_while_typing() {
        let lp = PrivateCommandLoop::new();
        let enter = Instant::now();
        let later = enter + Duration::from_secs(10);
        assert!(!lp.should_start(later, true, Some(enter)));
    }

    #[test]
    fn test_quiet_period() {
        let lp = PrivateCommandLoop::new();
        let enter = Instant::now();
        assert!(!lp.should_start(enter + Duration::from_millis(1000), false, Some(enter)));
        assert!(!lp.should_start(enter + WAIT_FOR_COMMAND_DELAY, false, Some(enter)));
        assert!(lp.should_start(enter + Duration::from_millis(1600), false, Some(enter)));
    }

    #[test]
    fn test_cooldown_and_new_command_required() {
        let mut lp = PrivateCommandLoop::new();
        let enter = Instant::now();
        let first = enter + Duration::from_secs(2);
        assert!(issued(&mut lp, first, enter));

        // finish it
        let end = lp.end_marker.clone();
        assert_eq!(lp.filter_output(&format!("{end}\n")), None);
        assert!(!lp.is_in_flight());

        // no new command since: never again
        assert!(!lp.should_start(first + Duration::from_secs(10), false, Some(enter)));

        // a new command, but within the cooldown
        let enter2 = first + Duration::from_millis(100);
        assert!(!lp.should_start(enter2 + Duration::from_millis(1600), false, Some(enter2)));

        // a new command, after the cooldown
        assert!(lp.should_start(first + Duration::from_millis(3200), false, Some(enter2)));
    }

    #[test]
    fn test_write_failure_disables() {
        let mut lp = PrivateCommandLoop::new();
        let ops = RecordingOps::new();
        ops.fail_writes(true);

        let enter = Instant::now();
        let tick = lp.tick(enter + Duration::from_secs(2), false, Some(enter), &ops);
        assert_eq!(tick, PrivateCommandTick::Idle);
        assert!(lp.is_disabled());
        assert!(!lp.is_in_flight());

        let enter2 = enter + Duration::from_secs(60);
        assert!(!lp.should_start(enter2 + Duration::from_secs(5), false, Some(enter2)));
    }

    #[test]
    fn test_output_suppressed_until_end_marker() {
        let mut lp = PrivateCommandLoop::new();
        let enter = Instant::now();
        assert!(issued(&mut lp, enter + Duration::from_secs(2), enter));

        let begin = lp.begin_marker.clone();
        let end = lp.end_marker.clone();

        // the shell echoes the command lines, which mention both markers
        assert_eq!(lp.filter_output(&format!("echo {begin}\r\n{begin}\r\n")), None);
        assert_eq!(lp.filter_output(&format!("/usr/bin/env && echo {end}\r\n")), None);
        assert_eq!(lp.filter_output("HOME=/home/user\r\nPATH=/bin\r\n"), None);

        let rest = lp.filter_output(&format!("{end}\r\nuser@host:~$ "));
        assert_eq!(rest.as_deref(), Some("user@host:~$ "));
        assert!(!lp.is_in_flight());
        assert_eq!(
            lp.last_environment(),
            Some(format!("/usr/bin/env && echo {end}\nHOME=/home/user\nPATH=/bin\n").as_str())
        );

        // back to normal
        assert_eq!(lp.filter_output("ls\n").as_deref(), Some("ls\n"));
    }

    #[test]
    fn test_timeout_releases_output() {
        let mut lp = PrivateCommandLoop::new();
        let ops = RecordingOps::new();
        let enter = Instant::now();
        let started = enter + Duration::from_secs(2);
        assert_eq!(lp.tick(started, false, Some(enter), &ops), PrivateCommandTick::Busy);

        assert_eq!(lp.filter_output("partial"), None);
        assert_eq!(
            lp.tick(started + Duration::from_secs(1), false, Some(enter), &ops),
            PrivateCommandTick::Busy
        );
        assert_eq!(
            lp.tick(started + PRIVATE_COMMAND_TIMEOUT, false, Some(enter), &ops),
            PrivateCommandTick::TimedOut("partial".to_string())
        );
        assert!(!lp.is_in_flight());
        assert_eq!(ops.writes().len(), 1);
    }
}
