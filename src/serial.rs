//! Serial link to the sensor network
//!
//! The radio root node is attached through the platform serialdump helper:
//! its stdout is the line source, its stdin the control sink.

use crate::config::SerialConfig;
use crate::error::GatewayError;
use crate::protocol::ControlToken;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Write side of the serial link
///
/// Clones share one writer. A token is written and flushed while the lock is
/// held, so tokens from different loops never interleave.
#[derive(Clone)]
pub struct SerialSink {
    writer: Arc<Mutex<BoxedWriter>>,
}

impl SerialSink {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub async fn send(&self, token: &ControlToken) -> Result<(), GatewayError> {
        let frame = token.encode();
        let mut writer = self.writer.lock().await;
        writer
            .write_all(frame.as_bytes())
            .await
            .map_err(GatewayError::SerialWrite)?;
        writer.flush().await.map_err(GatewayError::SerialWrite)?;
        debug!("Sent '{}' to root node", token);
        Ok(())
    }

    /// Closes the write side, errors are only logged
    pub async fn close(&self) {
        if let Err(e) = self.writer.lock().await.shutdown().await {
            debug!("Closing serial sink failed: {}", e);
        }
    }
}

impl fmt::Debug for SerialSink {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SerialSink").finish_non_exhaustive()
    }
}

/// Program and arguments used to attach to a serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl SerialCommand {
    pub fn for_current_platform(port: &str, config: &SerialConfig) -> Self {
        Self::for_platform(std::env::consts::OS, port, config)
    }

    pub fn for_platform(os: &str, port: &str, config: &SerialConfig) -> Self {
        let baud = format!("-b{}", config.baud_rate);
        if os.starts_with("win") {
            Self {
                program: config.serialdump_windows.clone(),
                args: vec![baud, map_windows_port(port)],
            }
        } else {
            Self {
                program: config.serialdump_linux.clone(),
                args: vec![baud, port.to_string()],
            }
        }
    }
}

impl fmt::Display for SerialCommand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// serialdump-windows expects cygwin style device names
fn map_windows_port(port: &str) -> String {
    match port.strip_prefix("COM") {
        Some(number) => format!("/dev/com{}", number),
        None => port.to_string(),
    }
}

/// Running serialdump child process
pub struct SerialProcess {
    child: Child,
    stderr_task: Option<JoinHandle<()>>,
}

/// Everything [`spawn`] hands out
pub struct SerialLink {
    pub process: SerialProcess,
    pub source: BufReader<ChildStdout>,
    pub sink: SerialSink,
}

/// Starts serialdump for `port`
pub fn spawn(port: &str, config: &SerialConfig) -> Result<SerialLink, GatewayError> {
    let command = SerialCommand::for_current_platform(port, config);
    info!("Starting serial process: {}", command);

    let mut child = Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| GatewayError::SerialSpawn {
            command: command.to_string(),
            source,
        })?;

    let missing = |stream: &str| GatewayError::SerialSpawn {
        command: command.to_string(),
        source: std::io::Error::other(format!("{} not captured", stream)),
    };
    let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
    let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
    let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

    let stderr_task = tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => warn!("serialdump: {}", line),
                Ok(None) => break,
                Err(e) => {
                    debug!("serialdump stderr closed: {}", e);
                    break;
                }
            }
        }
    });

    debug!("Serial process started with pid {:?}", child.id());
    Ok(SerialLink {
        process: SerialProcess {
            child,
            stderr_task: Some(stderr_task),
        },
        source: BufReader::new(stdout),
        sink: SerialSink::new(stdin),
    })
}

impl SerialProcess {
    /// Kills the child if it is still running and reaps it
    pub async fn terminate(&mut self) {
        match self.child.try_wait() {
            Ok(Some(status)) => info!("Serial process already exited with {}", status),
            Ok(None) => {
                info!("Stopping serial process");
                if let Err(e) = self.child.kill().await {
                    error!("Failed to stop serial process: {}", e);
                }
            }
            Err(e) => error!("Failed to query serial process: {}", e),
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{InterestKey, Metric, SendMode};
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_linux_command() {
        let command =
            SerialCommand::for_platform("linux", "/dev/ttyUSB0", &SerialConfig::default());
        assert_eq!(command.program, PathBuf::from(crate::config::SERIALDUMP_LINUX));
        assert_eq!(command.args, vec!["-b115200", "/dev/ttyUSB0"]);
    }

    #[test]
    fn test_windows_command_maps_com_port() {
        let command = SerialCommand::for_platform("windows", "COM3", &SerialConfig::default());
        assert_eq!(command.program, PathBuf::from(crate::config::SERIALDUMP_WINDOWS));
        assert_eq!(command.args, vec!["-b115200", "/dev/com3"]);
    }

    #[tokio::test]
    async fn test_sink_writes_whole_tokens() {
        let (writer, mut reader) = tokio::io::duplex(64);
        let sink = SerialSink::new(writer);

        sink.send(&ControlToken::Start(InterestKey::new("7", Metric::Temperature)))
            .await
            .unwrap();
        sink.send(&ControlToken::Mode(SendMode::OnChange)).await.unwrap();
        sink.close().await;

        let mut written = String::new();
        reader.read_to_string(&mut written).await.unwrap();
        assert_eq!(written, "7/T/1\nO");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_senders_do_not_interleave() {
        let (writer, mut reader) = tokio::io::duplex(16 * 1024);
        let sink = SerialSink::new(writer);

        let mut tasks = Vec::new();
        for node in 0..8 {
            let sink = sink.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..20 {
                    let key = InterestKey::new(format!("node-{}", node), Metric::Battery);
                    sink.send(&ControlToken::Stop(key)).await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        sink.close().await;

        let mut written = String::new();
        reader.read_to_string(&mut written).await.unwrap();
        let frames: Vec<&str> = written.lines().collect();
        assert_eq!(frames.len(), 160);
        for frame in frames {
            let (node, rest) = frame.split_once('/').unwrap();
            assert!(node.starts_with("node-"));
            assert_eq!(rest, "B/0");
        }
    }

    #[tokio::test]
    async fn test_write_failure_is_fatal_error() {
        let (writer, reader) = tokio::io::duplex(8);
        drop(reader);
        let sink = SerialSink::new(writer);

        let err = sink
            .send(&ControlToken::Mode(SendMode::Periodic))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::SerialWrite(_)));
    }
}
