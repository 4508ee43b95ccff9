//! Bounded capture of a server's stderr.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::debug;

/// Ring buffer holding the most recent stderr lines of one transport.
///
/// Cloning yields another handle to the same buffer.
#[derive(Debug, Clone)]
pub struct StderrLog {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl StderrLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Add a line, removing the oldest if at capacity.
    pub fn push(&self, line: impl Into<String>) {
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        if lines.len() >= self.capacity {
            lines.pop_front();
        }
        lines.push_back(line.into());
    }

    /// Snapshot of the buffered lines, oldest first.
    pub fn tail(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Read `stream` line by line into `log` until EOF.
///
/// Bytes are decoded lossily: servers written in C or Python sometimes emit
/// invalid UTF-8, and `lines()` would end the task on the first bad byte.
pub fn spawn_stderr_reader(
    stream: impl AsyncRead + Unpin + Send + 'static,
    server_name: String,
    log: StderrLog,
) {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf: Vec<u8> = Vec::with_capacity(1024);

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = decode_line(&mut buf);
                    debug!(server_name = %server_name, "stderr: {}", line);
                    log.push(line);
                }
                Err(e) => {
                    debug!(server_name = %server_name, error = %e, "stderr reader exiting due to read error");
                    break;
                }
            }
        }
    });
}

/// Trim the trailing newline and decode lossily.
pub(crate) fn decode_line(buf: &mut Vec<u8>) -> String {
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    String::from_utf8_lossy(buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_drops_oldest() {
        let log = StderrLog::new(2);
        log.push("one");
        log.push("two");
        log.push("three");
        assert_eq!(log.tail(), vec!["two", "three"]);
    }

    #[test]
    fn test_decode_line_is_lossy() {
        let mut buf = vec![b'o', b'k', 0xff, b'\r', b'\n'];
        assert_eq!(decode_line(&mut buf), "ok\u{fffd}");
    }

    #[tokio::test]
    async fn test_reader_captures_lines() {
        let log = StderrLog::new(10);
        let input: &[u8] = b"warming up\nlistening\n";
        spawn_stderr_reader(input, "calc".to_string(), log.clone());

        for _ in 0..50 {
            if log.tail().len() == 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(log.tail(), vec!["warming up", "listening"]);
    }
}
