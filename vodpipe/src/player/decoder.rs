//! Decoder process hosting.
//!
//! The decoder is an external program reading the segment bytes from the read
//! end of a [`StreamPipe`](crate::downloader::StreamPipe) on its stdin.

use std::io::PipeReader;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::DecoderConfig;
use crate::{Error, Result};

/// How a decoder process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderExit {
    /// The process exited on its own. `None` when it was killed by a signal.
    Finished(Option<i32>),
    /// The process was terminated through [`DecoderHandle::stop`].
    Stopped,
}

impl DecoderExit {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Finished(Some(0)))
    }
}

/// Starts decoder processes.
pub trait DecoderHost: Send + Sync {
    /// Start a decoder consuming `input`. `label` names the stream in logs.
    fn start(&self, input: PipeReader, label: &str) -> Result<Arc<dyn DecoderHandle>>;
}

/// A running (or finished) decoder.
#[async_trait]
pub trait DecoderHandle: Send + Sync {
    /// Ask the process to terminate. Idempotent.
    fn stop(&self);

    fn is_exited(&self) -> bool;

    /// Resolves once the process is gone.
    async fn wait(&self) -> DecoderExit;
}

/// Runs the configured decoder program with the pipe as its stdin.
pub struct CommandDecoderHost {
    program: String,
    args: Vec<String>,
}

impl CommandDecoderHost {
    pub fn new(config: &DecoderConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
        }
    }

    /// First line of `<program> -version`, when the program can be run at all.
    pub fn version(&self) -> Option<String> {
        process_utils::probe_version(&self.program, "-version")
    }
}

impl DecoderHost for CommandDecoderHost {
    fn start(&self, input: PipeReader, label: &str) -> Result<Arc<dyn DecoderHandle>> {
        let mut command = process_utils::tokio_command(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::from(input))
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| Error::decoder(format!("failed to start {}: {e}", self.program)))?;
        // The command still holds our copy of the read end; release it so EOF propagates.
        drop(command);

        info!(program = %self.program, pid = ?child.id(), stream = %label, "Decoder started");

        if let Some(stderr) = child.stderr.take() {
            let label = label.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => debug!(stream = %label, "decoder: {}", line),
                        Ok(None) => break,
                        Err(e) => {
                            debug!(stream = %label, error = %e, "Decoder stderr closed");
                            break;
                        }
                    }
                }
            });
        }

        let cancel = CancellationToken::new();
        let exit = spawn_process_waiter(child, cancel.clone());
        Ok(Arc::new(ProcessHandle { cancel, exit }))
    }
}

/// Spawn a task that waits for the process and publishes how it ended.
///
/// Cancelling `cancellation_token` kills the process and publishes
/// [`DecoderExit::Stopped`].
fn spawn_process_waiter(
    mut child: Child,
    cancellation_token: CancellationToken,
) -> watch::Receiver<Option<DecoderExit>> {
    let (tx, rx) = watch::channel(None);

    tokio::spawn(async move {
        let exit = tokio::select! {
            _ = cancellation_token.cancelled() => {
                let _ = child.kill().await;
                DecoderExit::Stopped
            }
            status = child.wait() => {
                match status {
                    Ok(exit_status) => {
                        let code = exit_status.code();
                        if let Some(c) = code {
                            if c != 0 {
                                warn!("Decoder exited with code: {}", c);
                            }
                        }
                        DecoderExit::Finished(code)
                    }
                    Err(e) => {
                        error!("Error waiting for decoder: {}", e);
                        DecoderExit::Finished(Some(-1))
                    }
                }
            }
        };
        let _ = tx.send(Some(exit));
    });

    rx
}

struct ProcessHandle {
    cancel: CancellationToken,
    exit: watch::Receiver<Option<DecoderExit>>,
}

#[async_trait]
impl DecoderHandle for ProcessHandle {
    fn stop(&self) {
        self.cancel.cancel();
    }

    fn is_exited(&self) -> bool {
        self.exit.borrow().is_some()
    }

    async fn wait(&self) -> DecoderExit {
        let mut rx = self.exit.clone();
        rx.wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|exit| *exit)
            .unwrap_or(DecoderExit::Stopped)
    }
}
