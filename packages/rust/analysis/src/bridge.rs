//! JSON-lines protocol with the LLM bridge subprocess.
//!
//! The bridge script owns all prompting and model invocation; this side only
//! speaks the line protocol: spawn, wait for `ready`, exchange one request
//! per line, send `shutdown` when done.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, Command, Stdio};

use tracing::{info, warn};

use seoforge_shared::config::BridgeConfig;
use seoforge_shared::{Result, SeoforgeError};

// ---------------------------------------------------------------------------
// Protocol types
// ---------------------------------------------------------------------------

/// Request message sent to the bridge, one JSON object per line.
#[derive(Debug, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum RequestMessage {
    /// Expand a topic seed into candidate queries.
    Expand {
        id: String,
        topic: String,
        count: usize,
    },
    /// Embed a batch of texts.
    Embed { id: String, texts: Vec<String> },
    /// Judge how relevant a query is to the topic, in [0, 1].
    ClassifyRelevance {
        id: String,
        topic: String,
        query: String,
    },
    /// Analyze one query's SERP for competitors and content gaps.
    Analyze {
        id: String,
        query: String,
        snippets: Vec<String>,
        paa: Vec<String>,
        has_ai_overview: bool,
    },
    Shutdown,
}

impl RequestMessage {
    /// Task name used for cache keying and logging.
    pub(crate) fn task_type(&self) -> &'static str {
        match self {
            Self::Expand { .. } => "expand",
            Self::Embed { .. } => "embed",
            Self::ClassifyRelevance { .. } => "classify_relevance",
            Self::Analyze { .. } => "analyze",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Response message received from the bridge.
#[derive(Debug, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ResponseMessage {
    Ready,
    Result {
        id: String,
        result: serde_json::Value,
    },
    Error {
        #[allow(dead_code)]
        id: String,
        error: String,
    },
}

// ---------------------------------------------------------------------------
// Bridge handle
// ---------------------------------------------------------------------------

/// Handle to the spawned bridge subprocess.
pub(crate) struct BridgeHandle {
    child: Child,
    stdin: std::process::ChildStdin,
    reader: BufReader<std::process::ChildStdout>,
    request_counter: u64,
}

impl BridgeHandle {
    /// Spawn the bridge subprocess and wait for its ready handshake.
    pub(crate) fn spawn(config: &BridgeConfig) -> Result<Self> {
        info!(cmd = %config.cmd, script = %config.script, "spawning analysis bridge");

        let mut command = Command::new(&config.cmd);
        command
            .arg(&config.script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit()); // Bridge logs go to parent stderr
        if let Some(dir) = &config.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| {
            SeoforgeError::Analysis(format!(
                "failed to spawn bridge: {e}. Is `{}` installed?",
                config.cmd
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SeoforgeError::Analysis("failed to capture bridge stdin".into()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SeoforgeError::Analysis("failed to capture bridge stdout".into()))?;

        let reader = BufReader::new(stdout);

        let mut handle = Self {
            child,
            stdin,
            reader,
            request_counter: 0,
        };

        handle.wait_for_ready()?;
        Ok(handle)
    }

    /// Wait for the bridge to send its "ready" message.
    fn wait_for_ready(&mut self) -> Result<()> {
        let mut line = String::new();
        self.reader
            .read_line(&mut line)
            .map_err(|e| SeoforgeError::Analysis(format!("bridge read error: {e}")))?;

        let msg: ResponseMessage = serde_json::from_str(line.trim()).map_err(|e| {
            SeoforgeError::Analysis(format!("invalid bridge ready message: {e} (got: {line})"))
        })?;

        match msg {
            ResponseMessage::Ready => {
                info!("bridge is ready");
                Ok(())
            }
            _ => Err(SeoforgeError::Analysis(format!(
                "expected ready message, got: {line}"
            ))),
        }
    }

    /// Allocate the next request ID.
    pub(crate) fn next_id(&mut self) -> String {
        self.request_counter += 1;
        format!("req-{}", self.request_counter)
    }

    /// Send a request and wait for its response payload.
    pub(crate) fn send(&mut self, request: &RequestMessage) -> Result<serde_json::Value> {
        let json = serde_json::to_string(request)
            .map_err(|e| SeoforgeError::Analysis(format!("failed to serialize request: {e}")))?;

        writeln!(self.stdin, "{json}")
            .map_err(|e| SeoforgeError::Analysis(format!("failed to write to bridge stdin: {e}")))?;
        self.stdin
            .flush()
            .map_err(|e| SeoforgeError::Analysis(format!("failed to flush bridge stdin: {e}")))?;

        let mut line = String::new();
        self.reader
            .read_line(&mut line)
            .map_err(|e| SeoforgeError::Analysis(format!("bridge read error: {e}")))?;

        if line.is_empty() {
            return Err(SeoforgeError::Analysis(
                "bridge closed stdout unexpectedly".into(),
            ));
        }

        let msg: ResponseMessage = serde_json::from_str(line.trim()).map_err(|e| {
            SeoforgeError::Analysis(format!(
                "invalid bridge response: {e} (got: {})",
                &line[..line.len().min(200)]
            ))
        })?;

        match msg {
            ResponseMessage::Result { result, .. } => Ok(result),
            ResponseMessage::Error { error, .. } => Err(SeoforgeError::Analysis(error)),
            ResponseMessage::Ready => Err(SeoforgeError::Analysis(
                "unexpected ready message mid-session".into(),
            )),
        }
    }

    /// Send shutdown and wait for the bridge to exit.
    pub(crate) fn shutdown(&mut self) -> Result<()> {
        if let Ok(json) = serde_json::to_string(&RequestMessage::Shutdown) {
            let _ = writeln!(self.stdin, "{json}");
            let _ = self.stdin.flush();
        }

        match self.child.wait() {
            Ok(status) => {
                info!(?status, "bridge exited");
                Ok(())
            }
            Err(e) => {
                warn!("bridge wait error: {e}");
                Ok(())
            }
        }
    }
}
