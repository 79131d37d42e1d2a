use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::browser::driver::{ElementHandle, LiveStyle, PageDriver};
use crate::error::DriverError;
use crate::page::page_model::{RawElement, RawPage};

pub const DEFAULT_SERVER_SCRIPT: &str = "node/browser_server.js";

/// Request sent to browser_server.js over stdin (one JSON line).
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum BrowserRequest {
    Navigate {
        cmd: &'static str,
        url: String,
    },
    FindVisible {
        cmd: &'static str,
        selector: String,
        timeout_ms: u64,
    },
    Handle {
        cmd: &'static str,
        handle: String,
    },
    Fill {
        cmd: &'static str,
        handle: String,
        value: String,
    },
    ScrollTo {
        cmd: &'static str,
        y: f64,
    },
    Bare {
        cmd: &'static str,
    },
}

impl BrowserRequest {
    pub fn navigate(url: &str) -> Self {
        BrowserRequest::Navigate {
            cmd: "navigate",
            url: url.to_string(),
        }
    }

    pub fn extract() -> Self {
        BrowserRequest::Bare { cmd: "extract" }
    }

    pub fn find_visible(selector: &str, timeout: Duration) -> Self {
        BrowserRequest::FindVisible {
            cmd: "find_visible",
            selector: selector.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    pub fn describe(handle: &ElementHandle) -> Self {
        BrowserRequest::Handle {
            cmd: "describe",
            handle: handle.0.clone(),
        }
    }

    pub fn computed_style(handle: &ElementHandle) -> Self {
        BrowserRequest::Handle {
            cmd: "computed_style",
            handle: handle.0.clone(),
        }
    }

    pub fn click(handle: &ElementHandle) -> Self {
        BrowserRequest::Handle {
            cmd: "click",
            handle: handle.0.clone(),
        }
    }

    pub fn fill(handle: &ElementHandle, value: &str) -> Self {
        BrowserRequest::Fill {
            cmd: "fill",
            handle: handle.0.clone(),
            value: value.to_string(),
        }
    }

    pub fn scroll_position() -> Self {
        BrowserRequest::Bare {
            cmd: "scroll_position",
        }
    }

    pub fn scroll_to(y: f64) -> Self {
        BrowserRequest::ScrollTo {
            cmd: "scroll_to",
            y,
        }
    }

    pub fn quit() -> Self {
        BrowserRequest::Bare { cmd: "quit" }
    }
}

/// Response received from browser_server.js over stdout (one JSON line).
#[derive(Debug, Deserialize)]
pub struct BrowserResponse {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    /// Machine-readable failure kind: "stale" or "timeout".
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub ready: Option<bool>,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub y: Option<f64>,
}

/// A persistent browser session backed by browser_server.js.
///
/// Launches a long-lived Node.js process that keeps one Chromium page open.
/// Commands are sent as NDJSON over stdin, responses read from stdout.
pub struct BrowserSession {
    child: Child,
    stdin: std::process::ChildStdin,
    reader: BufReader<std::process::ChildStdout>,
    script: String,
}

impl BrowserSession {
    /// Spawn `node <script>` and wait for its ready signal.
    pub fn launch(script: impl AsRef<Path>) -> Result<Self, DriverError> {
        let script_path: PathBuf = script.as_ref().to_path_buf();
        let script = script_path.display().to_string();

        let mut child = Command::new("node")
            .arg(&script_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| DriverError::SubprocessSpawn {
                script: script.clone(),
                source: e,
            })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            DriverError::SessionIO(format!("Failed to capture stdin of {}", script))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            DriverError::SessionIO(format!("Failed to capture stdout of {}", script))
        })?;

        let mut reader = BufReader::new(stdout);

        // Wait for the ready signal
        let mut line = String::new();
        let read = reader
            .read_line(&mut line)
            .map_err(|e| DriverError::SessionIO(format!("Failed to read ready signal: {}", e)))?;

        if read == 0 {
            return Err(exit_error(&mut child, &script));
        }

        let response: BrowserResponse =
            serde_json::from_str(line.trim()).map_err(|e| DriverError::JsonParse {
                context: format!("{} ready signal", script),
                source: e,
            })?;

        if !response.ok || response.ready != Some(true) {
            return Err(DriverError::SessionProtocol {
                command: "launch".into(),
                error: response
                    .error
                    .unwrap_or_else(|| format!("Did not receive ready signal from {}", script)),
            });
        }

        debug!(script = %script, "browser session ready");
        Ok(BrowserSession {
            child,
            stdin,
            reader,
            script,
        })
    }

    /// Send a request and read the response.
    fn send(&mut self, request: &BrowserRequest) -> Result<BrowserResponse, DriverError> {
        let json = serde_json::to_string(request).map_err(|e| DriverError::JsonSerialize {
            context: "BrowserRequest".into(),
            source: e,
        })?;

        writeln!(self.stdin, "{}", json).map_err(|e| {
            DriverError::SessionIO(format!("Failed to write to {} stdin: {}", self.script, e))
        })?;
        self.stdin.flush().map_err(|e| {
            DriverError::SessionIO(format!("Failed to flush {} stdin: {}", self.script, e))
        })?;

        let mut line = String::new();
        self.reader.read_line(&mut line).map_err(|e| {
            DriverError::SessionIO(format!("Failed to read from {} stdout: {}", self.script, e))
        })?;

        if line.trim().is_empty() {
            return Err(DriverError::SessionIO(format!(
                "Empty response from {} (process may have died)",
                self.script
            )));
        }

        serde_json::from_str(line.trim()).map_err(|e| DriverError::JsonParse {
            context: format!("{} response", self.script),
            source: e,
        })
    }

    /// Send a request and verify it succeeded.
    fn send_ok(
        &mut self,
        request: &BrowserRequest,
        command_name: &str,
    ) -> Result<BrowserResponse, DriverError> {
        let response = self.send(request)?;
        if response.ok {
            return Ok(response);
        }
        let error = response.error.unwrap_or_else(|| "Unknown error".into());
        Err(match response.code.as_deref() {
            Some("stale") => DriverError::StaleElement(error),
            Some("timeout") => DriverError::Timeout(0),
            _ => DriverError::SessionProtocol {
                command: command_name.into(),
                error,
            },
        })
    }

    fn data<T: serde::de::DeserializeOwned>(
        &mut self,
        request: &BrowserRequest,
        command_name: &str,
    ) -> Result<T, DriverError> {
        let response = self.send_ok(request, command_name)?;
        let data = response.data.ok_or_else(|| DriverError::SessionProtocol {
            command: command_name.into(),
            error: format!("No data in {} response", command_name),
        })?;
        serde_json::from_value(data).map_err(|e| DriverError::JsonParse {
            context: format!("{} data", command_name),
            source: e,
        })
    }

    /// Navigate to a URL.
    pub fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        self.send_ok(&BrowserRequest::navigate(url), "navigate")?;
        Ok(())
    }

    /// Quit the browser session.
    pub fn quit(&mut self) -> Result<(), DriverError> {
        // Best-effort: the process may already be gone.
        let _ = self.send(&BrowserRequest::quit());
        let _ = self.child.wait();
        Ok(())
    }
}

impl PageDriver for BrowserSession {
    fn query_snapshot(&mut self) -> Result<RawPage, DriverError> {
        self.data(&BrowserRequest::extract(), "extract")
    }

    fn find_visible(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>, DriverError> {
        let response = self.send_ok(&BrowserRequest::find_visible(selector, timeout), "find_visible");
        match response {
            Ok(r) => Ok(r.handle.map(ElementHandle)),
            Err(DriverError::Timeout(_)) => Err(DriverError::Timeout(timeout.as_millis() as u64)),
            Err(e) => Err(e),
        }
    }

    fn describe(&mut self, handle: &ElementHandle) -> Result<RawElement, DriverError> {
        self.data(&BrowserRequest::describe(handle), "describe")
    }

    fn computed_style(&mut self, handle: &ElementHandle) -> Result<LiveStyle, DriverError> {
        self.data(&BrowserRequest::computed_style(handle), "computed_style")
    }

    fn click(&mut self, handle: &ElementHandle) -> Result<(), DriverError> {
        self.send_ok(&BrowserRequest::click(handle), "click")?;
        Ok(())
    }

    fn fill(&mut self, handle: &ElementHandle, text: &str) -> Result<(), DriverError> {
        self.send_ok(&BrowserRequest::fill(handle, text), "fill")?;
        Ok(())
    }

    fn scroll_position(&mut self) -> Result<f64, DriverError> {
        let response = self.send_ok(&BrowserRequest::scroll_position(), "scroll_position")?;
        Ok(response.y.unwrap_or(0.0))
    }

    fn scroll_to(&mut self, y: f64) -> Result<(), DriverError> {
        self.send_ok(&BrowserRequest::scroll_to(y), "scroll_to")?;
        Ok(())
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        // Best-effort cleanup
        let _ = self.quit();
    }
}

/// The child closed stdout before signalling ready.
fn exit_error(child: &mut Child, script: &str) -> DriverError {
    let mut stderr = String::new();
    if let Some(mut pipe) = child.stderr.take() {
        let _ = pipe.read_to_string(&mut stderr);
    }
    match child.wait() {
        Ok(status) => DriverError::SubprocessFailed {
            script: script.to_string(),
            status,
            stderr: stderr.trim().to_string(),
        },
        Err(e) => DriverError::SessionIO(format!("{} closed before ready: {}", script, e)),
    }
}
