//! The output buffer.

/// Ordered output chunks plus the bookkeeping for `#line` emission.
///
/// Chunks append in strict depth-first source order; the concatenation of
/// all chunks is the final output.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    chunks: Vec<String>,
    last_output_file: Option<String>,
}

impl OutputBuffer {
    /// An empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Empty chunks are dropped.
    pub fn push(&mut self, chunk: impl Into<String>) {
        let chunk = chunk.into();
        if !chunk.is_empty() {
            self.chunks.push(chunk);
        }
    }

    /// Append a `#line <line> "<file>"` control chunk and record `file` as
    /// the buffer's current output file. Double quotes in the file name are
    /// escaped as `\"`.
    pub fn push_line_control(&mut self, line: usize, file: &str) {
        let escaped = file.replace('"', "\\\"");
        self.chunks.push(format!("#line {line} \"{escaped}\"\n"));
        self.last_output_file = Some(file.to_string());
    }

    /// The file named by the most recent `#line` chunk.
    pub fn last_output_file(&self) -> Option<&str> {
        self.last_output_file.as_deref()
    }

    /// Remove exactly one trailing `\r\n` or `\n` from the last chunk.
    pub fn strip_trailing_newline(&mut self) {
        if let Some(last) = self.chunks.last_mut() {
            if last.ends_with("\r\n") {
                last.truncate(last.len() - 2);
            } else if last.ends_with('\n') {
                last.truncate(last.len() - 1);
            }
            if last.is_empty() {
                self.chunks.pop();
            }
        }
    }

    /// Move another buffer's chunks onto the end of this one.
    pub fn append(&mut self, other: OutputBuffer) {
        self.chunks.extend(other.chunks);
    }

    /// Number of chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the buffer holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Concatenate into the final output.
    pub fn into_string(self) -> String {
        self.chunks.concat()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_preserves_order() {
        let mut buffer = OutputBuffer::new();
        buffer.push("a");
        buffer.push("");
        buffer.push("b");
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.into_string(), "ab");
    }

    #[test]
    fn test_strip_trailing_lf() {
        let mut buffer = OutputBuffer::new();
        buffer.push("hello\n\n");
        buffer.strip_trailing_newline();
        assert_eq!(buffer.into_string(), "hello\n");
    }

    #[test]
    fn test_strip_trailing_crlf() {
        let mut buffer = OutputBuffer::new();
        buffer.push("hello\r\n");
        buffer.strip_trailing_newline();
        assert_eq!(buffer.into_string(), "hello");
    }

    #[test]
    fn test_strip_drops_empty_chunk() {
        let mut buffer = OutputBuffer::new();
        buffer.push("keep");
        buffer.push("\n");
        buffer.strip_trailing_newline();
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.into_string(), "keep");
    }

    #[test]
    fn test_strip_on_empty_buffer() {
        let mut buffer = OutputBuffer::new();
        buffer.strip_trailing_newline();
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_line_control_escapes_quotes() {
        let mut buffer = OutputBuffer::new();
        buffer.push_line_control(3, "a\"b.src");
        assert_eq!(buffer.last_output_file(), Some("a\"b.src"));
        assert_eq!(buffer.into_string(), "#line 3 \"a\\\"b.src\"\n");
    }

    #[test]
    fn test_append_keeps_order() {
        let mut first = OutputBuffer::new();
        first.push("1");
        let mut second = OutputBuffer::new();
        second.push("2");
        second.push("3");
        first.append(second);
        assert_eq!(first.into_string(), "123");
    }
}
