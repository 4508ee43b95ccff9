//! Child-process transport: JSON-RPC over stdin/stdout, stderr captured.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use flowmcp_core::{ServerConfig, TransportConfig};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::path::{build_effective_path, validate_working_dir};
use super::stderr::{StderrLog, decode_line, spawn_stderr_reader};
use super::{Transport, TransportError};

/// Grace period between closing stdin and killing the child.
const EXIT_GRACE: Duration = Duration::from_secs(2);

/// Longest stdout line accepted from a server before the transport is closed.
const MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

/// A spawned MCP server process.
pub struct StdioTransport {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    lines: mpsc::Receiver<String>,
    stderr: StderrLog,
}

impl StdioTransport {
    /// Spawn the server described by `config`.
    ///
    /// `config.env` is layered over the inherited environment; a `PATH`
    /// entry in it is merged with the current PATH rather than replacing it.
    pub fn spawn(config: &ServerConfig, stderr_tail_lines: usize) -> Result<Self, TransportError> {
        let TransportConfig::Stdio {
            command,
            args,
            root_path,
        } = &config.transport
        else {
            return Err(TransportError::InvalidConfig(format!(
                "Server '{}' is not a stdio server",
                config.name
            )));
        };

        let cwd = root_path.as_deref().filter(|p| !p.is_empty());
        if let Some(dir) = cwd {
            validate_working_dir(dir).map_err(TransportError::Spawn)?;
        }

        let effective_path =
            build_effective_path(command, config.env.get("PATH").map(String::as_str));

        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in &config.env {
            if key != "PATH" {
                cmd.env(key, value);
            }
        }
        cmd.env("PATH", &effective_path);

        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            TransportError::Spawn(format!(
                "Failed to spawn '{command}': {e}\nArgs: {args:?}\nCwd: {cwd:?}\nEffective PATH: {}",
                effective_path.to_string_lossy()
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Spawn("Failed to get stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Spawn("Failed to get stdout".to_string()))?;

        let stderr = StderrLog::new(stderr_tail_lines);
        if let Some(stream) = child.stderr.take() {
            spawn_stderr_reader(stream, config.name.clone(), stderr.clone());
        }

        let (tx, lines) = mpsc::channel(64);
        spawn_stdout_reader(stdout, config.name.clone(), tx, MAX_LINE_BYTES);

        debug!(
            server_name = %config.name,
            pid = ?child.id(),
            command = %command,
            "Spawned stdio MCP server"
        );

        Ok(Self {
            child: Some(child),
            stdin: Some(stdin),
            lines,
            stderr,
        })
    }
}

enum LineRead {
    Eof,
    Line,
    TooLong,
}

/// `read_until(b'\n')` that gives up once `buf` would exceed `max_len`.
async fn read_bounded_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max_len: usize,
) -> std::io::Result<LineRead> {
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(if buf.is_empty() { LineRead::Eof } else { LineRead::Line });
        }

        let (chunk, done) = match available.iter().position(|&b| b == b'\n') {
            Some(i) => (&available[..=i], true),
            None => (available, false),
        };
        if buf.len() + chunk.len() > max_len {
            return Ok(LineRead::TooLong);
        }
        buf.extend_from_slice(chunk);
        let used = chunk.len();
        reader.consume(used);

        if done {
            return Ok(LineRead::Line);
        }
    }
}

/// Forward non-empty stdout lines to the transport's inbox until EOF.
///
/// A line longer than `max_line` ends the reader, which the client sees as
/// the server closing the connection.
fn spawn_stdout_reader<R>(stdout: R, server_name: String, tx: mpsc::Sender<String>, max_line: usize)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stdout);
        let mut buf: Vec<u8> = Vec::with_capacity(4096);

        loop {
            buf.clear();
            match read_bounded_line(&mut reader, &mut buf, max_line).await {
                Ok(LineRead::Eof) => break,
                Ok(LineRead::TooLong) => {
                    warn!(server_name = %server_name, limit = max_line, "stdout line exceeds limit, closing transport");
                    break;
                }
                Ok(LineRead::Line) => {
                    let line = decode_line(&mut buf);
                    if line.trim().is_empty() {
                        continue;
                    }
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(server_name = %server_name, error = %e, "stdout reader exiting due to read error");
                    break;
                }
            }
        }

        debug!(server_name = %server_name, "stdout reader task exiting");
    });
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&mut self, message: String) -> Result<(), TransportError> {
        let stdin = self.stdin.as_mut().ok_or(TransportError::Closed)?;
        stdin.write_all(message.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    async fn close(&mut self) {
        // EOF on stdin is the polite shutdown request for stdio servers.
        self.stdin = None;

        let Some(mut child) = self.child.take() else {
            return;
        };

        if let Ok(Ok(status)) = tokio::time::timeout(EXIT_GRACE, child.wait()).await {
            debug!(?status, "MCP server exited after stdin closed");
            return;
        }

        if let Err(e) = child.kill().await {
            debug!(error = %e, "Failed to kill MCP server process");
        }
    }

    fn stderr(&self) -> Option<StderrLog> {
        Some(self.stderr.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stdout_reader_splits_lines_and_skips_blanks() {
        let (tx, mut rx) = mpsc::channel(8);
        spawn_stdout_reader(&b"{\"a\":1}\r\n\n{\"b\":2}"[..], "calc".to_string(), tx, 64);

        assert_eq!(rx.recv().await.as_deref(), Some(r#"{"a":1}"#));
        assert_eq!(rx.recv().await.as_deref(), Some(r#"{"b":2}"#));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_oversized_stdout_line_ends_reader() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut output = b"{\"ok\":true}\n".to_vec();
        output.extend(std::iter::repeat_n(b'x', 200));
        output.extend_from_slice(b"\n{\"late\":true}\n");
        let output: &'static [u8] = Box::leak(output.into_boxed_slice());

        spawn_stdout_reader(output, "calc".to_string(), tx, 64);
        assert_eq!(rx.recv().await.as_deref(), Some(r#"{"ok":true}"#));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_spawn_failure_names_command() {
        let config = ServerConfig::stdio("ghost", "definitely-not-a-real-binary-xyz", vec![]);
        let err = StdioTransport::spawn(&config, 10).err().unwrap();
        let message = err.to_string();
        assert!(message.contains("definitely-not-a-real-binary-xyz"));
    }

    #[tokio::test]
    async fn test_missing_root_path_is_rejected_before_spawn() {
        let mut config = ServerConfig::stdio("calc", "node", vec![]);
        config.transport = TransportConfig::Stdio {
            command: "node".to_string(),
            args: vec![],
            root_path: Some("/nonexistent/flowmcp/root".to_string()),
        };
        let err = StdioTransport::spawn(&config, 10).err().unwrap();
        assert!(err.to_string().contains("does not exist"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_round_trip_through_cat() {
        let config = ServerConfig::stdio("echo", "cat", vec![]);
        let mut transport = StdioTransport::spawn(&config, 10).unwrap();
        transport.send(r#"{"jsonrpc":"2.0"}"#.to_string()).await.unwrap();
        let line = transport.recv().await.unwrap();
        assert_eq!(line, r#"{"jsonrpc":"2.0"}"#);
        transport.close().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_env_reaches_child() {
        let config = ServerConfig::stdio(
            "env",
            "sh",
            vec!["-c".to_string(), "echo \"$FLOWMCP_TEST_VALUE\"".to_string()],
        )
        .with_env("FLOWMCP_TEST_VALUE", "from-config");
        let mut transport = StdioTransport::spawn(&config, 10).unwrap();
        assert_eq!(transport.recv().await.as_deref(), Some("from-config"));
        assert_eq!(transport.recv().await, None);
        transport.close().await;
    }
}
