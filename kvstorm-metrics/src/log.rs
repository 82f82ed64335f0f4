use std::fs::File;
use std::io::{self, LineWriter, Write as _};
use std::path::Path;

use parking_lot::Mutex;

use crate::context::OpContext;

/// Destination for the harness's human-readable debug lines.
///
/// Two line shapes exist: an operation line carrying request context and a
/// plain header line. Implementations must be safe for unsynchronized
/// concurrent use. Sink-side failures are swallowed, never surfaced to
/// callers.
pub trait LogSink: Send + Sync {
    fn op_line(&self, ctx: &OpContext, msg: &str);
    fn header_line(&self, header: &str, msg: &str);
}

/// Writes every line to stdout and to a log file, prefixed with wall-clock
/// time.
pub struct TeeLog {
    file: Mutex<LineWriter<File>>,
}

impl TeeLog {
    /// Create (truncating) the log file. Failure here is startup-fatal for
    /// the caller; write failures afterwards are ignored.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            file: Mutex::new(LineWriter::new(file)),
        })
    }

    fn emit(&self, line: &str) {
        let stamped = format!("{} {line}", chrono::Local::now().format("%H:%M:%S"));
        println!("{stamped}");
        let mut file = self.file.lock();
        let _ = writeln!(file, "{stamped}");
    }
}

impl LogSink for TeeLog {
    fn op_line(&self, ctx: &OpContext, msg: &str) {
        self.emit(&format!("{} | {} | {msg}", ctx.id(), ctx.elapsed()));
    }

    fn header_line(&self, header: &str, msg: &str) {
        self.emit(&format!("{header} | {msg}"));
    }
}

/// Discards everything.
pub struct NullLog;

impl LogSink for NullLog {
    fn op_line(&self, _ctx: &OpContext, _msg: &str) {}
    fn header_line(&self, _header: &str, _msg: &str) {}
}

/// Captures rendered lines in memory. Test support.
#[derive(Debug, Default)]
pub struct BufferLog {
    lines: Mutex<Vec<String>>,
}

impl BufferLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

impl LogSink for BufferLog {
    fn op_line(&self, ctx: &OpContext, msg: &str) {
        self.lines
            .lock()
            .push(format!("{} | {} | {msg}", ctx.id(), ctx.elapsed()));
    }

    fn header_line(&self, header: &str, msg: &str) {
        self.lines.lock().push(format!("{header} | {msg}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_log_renders_both_line_shapes() {
        let log = BufferLog::new();
        log.op_line(&OpContext::background().child("Get-1"), "hello");
        log.header_line("kvstorm", "Addr: 127.0.0.1:6379");

        let lines = log.lines();
        assert_eq!(lines.len(), 2);
        let expected_prefix = format!("{:<15} | ", "Get-1");
        assert!(lines[0].starts_with(&expected_prefix), "got: {}", lines[0]);
        assert!(lines[0].ends_with("| hello"));
        assert_eq!(lines[1], "kvstorm | Addr: 127.0.0.1:6379");
    }

    #[test]
    fn tee_log_writes_through_to_the_file() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("kvstorm-log-test-{}.log", std::process::id()));

        {
            let log = TeeLog::create(&path).unwrap_or_else(|err| panic!("create failed: {err}"));
            log.header_line("kvstorm", "started");
            log.op_line(&OpContext::background(), "tick");
        }

        let contents =
            std::fs::read_to_string(&path).unwrap_or_else(|err| panic!("read failed: {err}"));
        let _ = std::fs::remove_file(&path);

        assert!(contents.contains("kvstorm | started"));
        let expected = format!("{:<15} | No Time | tick", "Background");
        assert!(contents.contains(&expected), "got: {contents}");
    }
}
