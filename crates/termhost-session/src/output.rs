//! Session transcript buffering and output trimming.

use vte::{Params, Perform};

/// Size of the chunks served by [`OutputBuffer::chunk`].
pub const BUFFER_CHUNK_SIZE: usize = 8 * 1024;

/// Default transcript size cap in bytes.
pub const DEFAULT_BUFFER_LIMIT: usize = 256 * 1024;

/// Private modes that switch to the alternate screen.
const ALT_SCREEN_MODES: [u16; 3] = [47, 1047, 1049];

/// Tracks entry to and exit from the alternate screen.
#[derive(Debug, Default)]
struct AltScreenState {
    active: bool,
}

impl Perform for AltScreenState {
    fn csi_dispatch(&mut self, params: &Params, intermediates: &[u8], _ignore: bool, c: char) {
        if intermediates != b"?" || !matches!(c, 'h' | 'l') {
            return;
        }
        for param in params.iter() {
            if param.first().is_some_and(|mode| ALT_SCREEN_MODES.contains(mode)) {
                self.active = c == 'h';
            }
        }
    }
}

/// Transcript of a console process, capped in size, oldest output evicted.
pub struct OutputBuffer {
    text: String,
    limit: usize,
    parser: vte::Parser,
    alt_screen: AltScreenState,
}

impl std::fmt::Debug for OutputBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputBuffer")
            .field("len", &self.text.len())
            .field("limit", &self.limit)
            .field("alt_buffer_active", &self.alt_screen.active)
            .finish()
    }
}

impl OutputBuffer {
    /// Create an empty buffer holding at most `limit` bytes.
    pub fn new(limit: usize) -> Self {
        Self {
            text: String::new(),
            limit: limit.max(1),
            parser: vte::Parser::new(),
            alt_screen: AltScreenState::default(),
        }
    }

    /// Restore a buffer from saved text.
    pub fn with_contents(limit: usize, text: impl Into<String>) -> Self {
        let mut buffer = Self::new(limit);
        buffer.text = text.into();
        buffer.evict();
        buffer
    }

    /// Append output. Returns `true` if the alternate screen flag changed.
    pub fn append(&mut self, output: &str) -> bool {
        let was_active = self.alt_screen.active;
        for byte in output.bytes() {
            self.parser.advance(&mut self.alt_screen, byte);
        }

        self.text.push_str(output);
        self.evict();

        was_active != self.alt_screen.active
    }

    fn evict(&mut self) {
        if self.text.len() <= self.limit {
            return;
        }
        let mut start = self.text.len() - self.limit;
        while !self.text.is_char_boundary(start) {
            start += 1;
        }
        self.text.drain(..start);
    }

    /// Whether a full-screen program holds the alternate screen.
    pub fn alt_buffer_active(&self) -> bool {
        self.alt_screen.active
    }

    /// Override the alternate screen flag (restored or stale state).
    pub fn set_alt_buffer_active(&mut self, active: bool) {
        self.alt_screen.active = active;
    }

    /// The whole transcript.
    pub fn contents(&self) -> &str {
        &self.text
    }

    /// Transcript size in bytes.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Whether the transcript is empty.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// The `index`th chunk of the transcript and whether more chunks follow.
    ///
    /// Chunks are at most [`BUFFER_CHUNK_SIZE`] bytes and end on char boundaries.
    pub fn chunk(&self, index: usize) -> (String, bool) {
        let len = self.text.len();
        let mut start = 0;
        let mut current = 0;

        while start < len {
            let mut end = (start + BUFFER_CHUNK_SIZE).min(len);
            while !self.text.is_char_boundary(end) {
                end -= 1;
            }
            if current == index {
                return (self.text[start..end].to_string(), end < len);
            }
            start = end;
            current += 1;
        }

        (String::new(), false)
    }

    /// Clear the transcript.
    pub fn clear(&mut self) {
        self.text.clear();
    }

    /// Drop everything but the last line.
    pub fn keep_last_line(&mut self) {
        let trimmed = self.text.trim_end_matches('\n');
        let start = trimmed.rfind('\n').map_or(0, |index| index + 1);
        self.text = trimmed[start..].to_string();
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_LIMIT)
    }
}

/// Keep only the last `max_lines` lines of `output`.
pub fn trim_leading_lines(output: &str, max_lines: usize) -> &str {
    if max_lines == 0 {
        return "";
    }

    let body = output.strip_suffix('\n').unwrap_or(output);
    match body.rmatch_indices('\n').nth(max_lines - 1) {
        Some((index, _)) => &output[index + 1..],
        None => output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_contents() {
        let mut buffer = OutputBuffer::default();
        assert!(!buffer.append("hello\n"));
        assert!(!buffer.append("world\n"));
        assert_eq!(buffer.contents(), "hello\nworld\n");
    }

    #[test]
    fn test_alt_screen_tracking() {
        let mut buffer = OutputBuffer::default();
        assert!(buffer.append("\x1b[?1049h"));
        assert!(buffer.alt_buffer_active());

        assert!(!buffer.append("drawing"));
        assert!(buffer.append("\x1b[?1049l"));
        assert!(!buffer.alt_buffer_active());
    }

    #[test]
    fn test_alt_screen_split_sequence() {
        let mut buffer = OutputBuffer::default();
        assert!(!buffer.append("\x1b[?10"));
        assert!(buffer.append("47h"));
        assert!(buffer.alt_buffer_active());
    }

    #[test]
    fn test_other_private_modes_ignored() {
        let mut buffer = OutputBuffer::default();
        assert!(!buffer.append("\x1b[?25l\x1b[?2004h"));
        assert!(!buffer.alt_buffer_active());
    }

    #[test]
    fn test_eviction() {
        let mut buffer = OutputBuffer::new(8);
        buffer.append("0123456789");
        assert_eq!(buffer.contents(), "23456789");
    }

    #[test]
    fn test_eviction_char_boundary() {
        let mut buffer = OutputBuffer::new(4);
        buffer.append("aéééé");
        assert!(buffer.len() <= 4);
        assert_eq!(buffer.contents(), "éé");
    }

    #[test]
    fn test_chunks() {
        let text = "x".repeat(BUFFER_CHUNK_SIZE + 10);
        let buffer = OutputBuffer::with_contents(DEFAULT_BUFFER_LIMIT, text);

        let (first, more) = buffer.chunk(0);
        assert_eq!(first.len(), BUFFER_CHUNK_SIZE);
        assert!(more);

        let (second, more) = buffer.chunk(1);
        assert_eq!(second.len(), 10);
        assert!(!more);

        assert_eq!(buffer.chunk(2), (String::new(), false));
    }

    #[test]
    fn test_keep_last_line() {
        let mut buffer = OutputBuffer::with_contents(DEFAULT_BUFFER_LIMIT, "one\ntwo\n$ ");
        buffer.keep_last_line();
        assert_eq!(buffer.contents(), "$ ");

        let mut buffer = OutputBuffer::with_contents(DEFAULT_BUFFER_LIMIT, "one\ntwo\n");
        buffer.keep_last_line();
        assert_eq!(buffer.contents(), "two");
    }

    #[test]
    fn test_trim_leading_lines() {
        assert_eq!(trim_leading_lines("a\nb\nc\n", 2), "b\nc\n");
        assert_eq!(trim_leading_lines("a\nb\nc", 2), "b\nc");
        assert_eq!(trim_leading_lines("a\nb\n", 5), "a\nb\n");
        assert_eq!(trim_leading_lines("a\nb\n", 0), "");
    }
}
