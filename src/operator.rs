use crate::error::GatewayError;
use crate::protocol::{ControlToken, SendMode};
use crate::serial::SerialSink;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub const PROMPT: &str =
    "Select configuration [O/P]: Send data on change of value / Send data periodically";

/// Forwards send-mode selections from the operator to the root node
pub struct OperatorConsole {
    sink: SerialSink,
}

impl OperatorConsole {
    pub fn new(sink: SerialSink) -> Self {
        Self { sink }
    }

    /// Handles one input line
    ///
    /// Unknown input is reported and ignored. Only a failing sink is an error.
    pub async fn handle_line(&self, line: &str) -> Result<Option<SendMode>, GatewayError> {
        let input = line.trim_end_matches(['\r', '\n']);
        match SendMode::from_input(input) {
            Some(mode) => {
                self.sink.send(&ControlToken::Mode(mode)).await?;
                println!("{}", mode.describe());
                info!("Send mode set to {:?}", mode);
                Ok(Some(mode))
            }
            None => {
                println!("Wrong configuration: {}", input);
                warn!("Ignoring invalid configuration '{}'", input);
                Ok(None)
            }
        }
    }

    /// Reads operator input until it ends, fails or `shutdown` fires
    ///
    /// End of input only ends this loop, the gateway keeps running without a console.
    pub async fn run<R>(self, input: R, shutdown: CancellationToken) -> Result<(), GatewayError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut input = input;
        let mut buf = Vec::new();

        loop {
            println!("{}", PROMPT);
            buf.clear();
            let read = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(()),
                read = input.read_until(b'\n', &mut buf) => read,
            };

            match read {
                Ok(0) => {
                    info!("Operator input closed, configuration menu disabled");
                    return Ok(());
                }
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    if let Err(e) = self.handle_line(&line).await {
                        error!("Failed to send configuration: {}", e);
                        return Err(e);
                    }
                }
                Err(e) => {
                    error!("Failed to read operator input: {}", e);
                    return Err(GatewayError::OperatorInput(e));
                }
            }
        }
    }
}
