// Debuggee process launcher
//
// Spawns the runtime with an inspector endpoint requested on an
// OS-chosen port, scrapes its output for the advertised ws:// URL with
// bounded retries, and distinguishes "never advertised" from "died
// early" from "runtime too old to debug".

use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// First runtime release with inspector support.
const MIN_DEBUGGER_VERSION: (u64, u64, u64) = (0, 8, 0);

const INSPECTOR_URL_PATTERN: &str = r"wss?://[^\s'\x22]+";

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Failed to spawn process: {0}")]
    Io(#[from] std::io::Error),

    #[error("Process exited before the debugger could attach: {message}")]
    EarlyExit { message: String, output: String },

    #[error("{runtime} v{version} does not support the debugger; upgrade to v0.8 or newer")]
    UpgradeRequired { runtime: String, version: String },

    #[error("The debugger could not attach to the process")]
    CouldNotAttach { output: String },
}

impl LaunchError {
    /// Output captured before the failure, for replay to the client.
    pub fn captured_output(&self) -> Option<&str> {
        match self {
            LaunchError::EarlyExit { output, .. }
            | LaunchError::CouldNotAttach { output } => Some(output),
            _ => None,
        }
    }
}

/// Retry schedule for the URL scan: `attempts` polls with a linearly
/// increasing `base_delay * attempt` sleep between them.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            base_delay: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Default)]
struct OutputBuffer {
    text: String,
    buffering: bool,
}

/// A spawned debuggee with its output capture.
pub struct LaunchedProcess {
    command: String,
    child: Child,
    output: Arc<Mutex<OutputBuffer>>,
}

impl LaunchedProcess {
    /// Spawn `command args..` with piped output and start capturing it.
    pub fn spawn(
        command: &str,
        args: &[String],
        cwd: Option<&str>,
        env: &HashMap<String, String>,
    ) -> Result<LaunchedProcess, LaunchError> {
        info!("Spawning {} {:?}", command, args);

        let mut builder = Command::new(command);
        builder
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .envs(env)
            .kill_on_drop(true);
        if let Some(cwd) = cwd {
            builder.current_dir(cwd);
        }

        let mut child = builder.spawn()?;

        let output = Arc::new(Mutex::new(OutputBuffer {
            text: String::new(),
            buffering: true,
        }));

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(capture_lines(stdout, output.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(capture_lines(stderr, output.clone()));
        }

        Ok(LaunchedProcess {
            command: command.to_string(),
            child,
            output,
        })
    }

    /// Everything captured from stdout/stderr so far.
    pub fn captured_output(&self) -> String {
        self.output.lock().expect("output lock").text.clone()
    }

    fn scan_for_url(&self, pattern: &Regex) -> Option<String> {
        let buffer = self.output.lock().expect("output lock");
        pattern
            .find(&buffer.text)
            .map(|found| found.as_str().to_string())
    }

    /// Stop accumulating output; long-running attached sessions would
    /// otherwise grow the buffer without bound. Readers keep draining the
    /// pipes.
    fn stop_buffering(&self) {
        let mut buffer = self.output.lock().expect("output lock");
        buffer.buffering = false;
        buffer.text.clear();
    }

    /// Poll captured output for the inspector URL.
    ///
    /// Races every poll against the child exiting, so a crash during
    /// startup fails immediately instead of burning the retry budget. On
    /// an exhausted budget the child is torn down and the failure is
    /// classified (too-old runtime vs. generic attach failure).
    pub async fn await_inspector_url(
        &mut self,
        policy: RetryPolicy,
    ) -> Result<String, LaunchError> {
        let pattern = Regex::new(INSPECTOR_URL_PATTERN).expect("static pattern");

        for attempt in 1..=policy.attempts {
            if let Some(url) = self.scan_for_url(&pattern) {
                info!("Inspector endpoint advertised: {}", url);
                self.stop_buffering();
                return Ok(url);
            }

            tokio::select! {
                status = self.child.wait() => {
                    // Give the pipe readers a beat to drain, then check
                    // whether the URL raced in ahead of the exit.
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    if let Some(url) = self.scan_for_url(&pattern) {
                        self.stop_buffering();
                        return Ok(url);
                    }

                    let message = match status {
                        Ok(status) => status.to_string(),
                        Err(e) => e.to_string(),
                    };
                    warn!("Debuggee exited during attach: {}", message);
                    return Err(LaunchError::EarlyExit {
                        message,
                        output: self.captured_output(),
                    });
                }
                _ = tokio::time::sleep(policy.base_delay * attempt) => {}
            }
        }

        debug!(
            "No inspector URL after {} attempts, tearing down",
            policy.attempts
        );
        self.terminate().await;

        let output = self.captured_output();
        match runtime_version(&self.command).await.and_then(parse_version) {
            Some(version) if version < MIN_DEBUGGER_VERSION => {
                Err(LaunchError::UpgradeRequired {
                    runtime: self.command.clone(),
                    version: format_version(version),
                })
            }
            _ => Err(LaunchError::CouldNotAttach { output }),
        }
    }

    /// Graceful then forced termination. Idempotent.
    pub async fn terminate(&mut self) {
        if self.child.start_kill().is_ok() {
            let grace = tokio::time::timeout(Duration::from_secs(1), self.child.wait());
            if grace.await.is_err() {
                self.child.kill().await.ok();
            }
        }
    }
}

impl std::fmt::Debug for LaunchedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchedProcess")
            .field("command", &self.command)
            .finish_non_exhaustive()
    }
}

async fn capture_lines<R>(reader: R, output: Arc<Mutex<OutputBuffer>>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let mut buffer = output.lock().expect("output lock");
        if buffer.buffering {
            buffer.text.push_str(&line);
            buffer.text.push('\n');
        }
    }
}

/// Ask the runtime for its version string (`<command> --version`).
pub async fn runtime_version(command: &str) -> Option<String> {
    let output = Command::new(command)
        .arg("--version")
        .stdin(Stdio::null())
        .output()
        .await
        .ok()?;
    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if version.is_empty() {
        None
    } else {
        Some(version)
    }
}

/// Parse `1.2.3` / `v1.2.3` / `bun 1.2.3` into a comparable triple.
pub fn parse_version(text: String) -> Option<(u64, u64, u64)> {
    let candidate = text
        .split_whitespace()
        .find(|word| word.trim_start_matches('v').starts_with(|c: char| c.is_ascii_digit()))?;

    let mut parts = candidate.trim_start_matches('v').splitn(3, '.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts
        .next()
        .map(|p| {
            p.chars()
                .take_while(|c| c.is_ascii_digit())
                .collect::<String>()
        })
        .and_then(|p| p.parse().ok())
        .unwrap_or(0);

    Some((major, minor, patch))
}

fn format_version((major, minor, patch): (u64, u64, u64)) -> String {
    format!("{}.{}.{}", major, minor, patch)
}

/// Whether the launch target looks like a script this runtime can debug.
pub fn is_supported_script(path: &str) -> bool {
    matches!(
        Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref(),
        Some("js" | "jsx" | "mjs" | "cjs" | "ts" | "tsx" | "mts" | "cts")
    )
}

/// Rewrite loopback hosts to the IPv6 loopback form.
///
/// Dual-stack hosts sometimes bind the inspector only on IPv6; connecting
/// to `[::1]` works in both arrangements.
pub fn prefer_ipv6_loopback(url: &str) -> String {
    for host in ["127.0.0.1", "0.0.0.0", "localhost"] {
        let needle = format!("//{}", host);
        if let Some(index) = url.find(&needle) {
            let mut rewritten = String::with_capacity(url.len());
            rewritten.push_str(&url[..index + 2]);
            rewritten.push_str("[::1]");
            rewritten.push_str(&url[index + needle.len()..]);
            return rewritten;
        }
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_logging() {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    }

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            base_delay: Duration::from_millis(5),
        }
    }

    fn sh(script: &str) -> Result<LaunchedProcess, LaunchError> {
        LaunchedProcess::spawn(
            "sh",
            &["-c".to_string(), script.to_string()],
            None,
            &HashMap::new(),
        )
    }

    #[tokio::test]
    async fn test_url_found_in_stdout() {
        init_logging();
        let mut process =
            sh("echo 'Inspector listening on ws://127.0.0.1:6499/abc123'; sleep 5").unwrap();

        let url = process.await_inspector_url(fast_policy(10)).await.unwrap();
        assert_eq!(url, "ws://127.0.0.1:6499/abc123");

        // Buffering stopped once the URL was found.
        assert_eq!(process.captured_output(), "");
        process.terminate().await;
    }

    #[tokio::test]
    async fn test_early_exit_is_distinct() {
        init_logging();
        let mut process = sh("echo startup noise; exit 3").unwrap();

        let err = process.await_inspector_url(fast_policy(10)).await.unwrap_err();
        match err {
            LaunchError::EarlyExit { output, .. } => {
                assert!(output.contains("startup noise"));
            }
            other => panic!("expected EarlyExit, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_retry_exhaustion_reports_could_not_attach() {
        // Never prints a URL, never exits; `sh --version` yields nothing
        // parseable, so the failure is the generic attach error.
        let mut process = sh("while true; do echo waiting; sleep 1; done").unwrap();

        let err = process.await_inspector_url(fast_policy(3)).await.unwrap_err();
        match err {
            LaunchError::CouldNotAttach { output } => {
                assert!(output.contains("waiting"));
            }
            other => panic!("expected CouldNotAttach, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("1.1.20".to_string()), Some((1, 1, 20)));
        assert_eq!(parse_version("v0.7.3".to_string()), Some((0, 7, 3)));
        assert_eq!(parse_version("bun 1.0.0".to_string()), Some((1, 0, 0)));
        assert_eq!(parse_version("0.8.0-canary.1".to_string()), Some((0, 8, 0)));
        assert_eq!(parse_version("not a version".to_string()), None);

        assert!(parse_version("0.7.3".to_string()).unwrap() < MIN_DEBUGGER_VERSION);
        assert!(parse_version("0.8.0".to_string()).unwrap() >= MIN_DEBUGGER_VERSION);
    }

    #[test]
    fn test_supported_script_extensions() {
        assert!(is_supported_script("/app/main.ts"));
        assert!(is_supported_script("/app/main.cjs"));
        assert!(is_supported_script("C:\\app\\main.JS"));
        assert!(!is_supported_script("/app/README.md"));
        assert!(!is_supported_script("/app/binary"));
    }

    #[test]
    fn test_prefer_ipv6_loopback() {
        assert_eq!(
            prefer_ipv6_loopback("ws://127.0.0.1:6499/abc"),
            "ws://[::1]:6499/abc"
        );
        assert_eq!(
            prefer_ipv6_loopback("ws://localhost:6499/abc"),
            "ws://[::1]:6499/abc"
        );
        assert_eq!(
            prefer_ipv6_loopback("ws://192.168.1.4:6499/abc"),
            "ws://192.168.1.4:6499/abc"
        );
    }
}
