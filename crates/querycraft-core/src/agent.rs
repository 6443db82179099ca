use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;

use crate::config::AgentConfig;
use crate::render::EventObserver;
use crate::stream::{EventStream, StreamEvent};

const STDERR_TAIL_BYTES: usize = 2000;
const STDERR_GRACE: Duration = Duration::from_secs(1);
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Final answer text, or why there is none.
pub type AgentOutcome = Result<String, InvocationError>;

#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("failed to start agent: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("agent stdout was not captured")]
    MissingStdout,
    #[error("failed reading agent output: {0}")]
    Io(#[source] std::io::Error),
    #[error("Timeout after {secs} seconds")]
    Timeout { secs: u64 },
    #[error("agent exited with {}{}", exit_label(.code), stderr_suffix(.stderr))]
    Exited { code: Option<i32>, stderr: String },
    #[error("agent finished without a result event")]
    NoResult,
}

impl InvocationError {
    /// Placeholder answer graded in place of a real one.
    pub fn sentinel(&self) -> String {
        format!("ERROR: {self}")
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, InvocationError::Timeout { .. })
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

/// Tools the agent may use without asking. Fixed for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPolicy {
    allowed: Vec<String>,
}

impl ToolPolicy {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }

    pub fn allow_list(&self) -> String {
        self.allowed.join(",")
    }
}

impl Default for ToolPolicy {
    fn default() -> Self {
        Self::new(["Bash(sqlite3:*)", "Read"])
    }
}

/// Something that answers a prompt while reporting its progress as events.
///
/// Expected failures (timeouts, crashes) come back as `Err` in the outcome;
/// implementations never panic on them.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn run(&self, prompt: &str, observer: &mut (dyn EventObserver + Send)) -> AgentOutcome;
}

/// Runs the agent CLI as a subprocess in streaming JSON mode.
pub struct ProcessAgent {
    config: AgentConfig,
    policy: ToolPolicy,
}

impl ProcessAgent {
    pub fn new(config: AgentConfig) -> Self {
        let policy = ToolPolicy::new(config.allowed_tools.iter().cloned());
        Self { config, policy }
    }

    pub fn policy(&self) -> &ToolPolicy {
        &self.policy
    }

    fn command(&self, prompt: &str) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .arg(&self.config.prompt_flag)
            .arg(prompt)
            .args(&self.config.stream_args)
            .arg(&self.config.allowed_tools_flag)
            .arg(self.policy.allow_list())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Starts the agent and hands back the live process.
    pub fn spawn(&self, prompt: &str) -> Result<AgentProcess, InvocationError> {
        let mut child = self.command(prompt).spawn().map_err(InvocationError::Spawn)?;
        let stdout = child.stdout.take().ok_or(InvocationError::MissingStdout)?;
        let stderr = child.stderr.take().map(|s| tokio::spawn(drain_tail(s, STDERR_TAIL_BYTES)));
        tracing::debug!(program = %self.config.program, pid = ?child.id(), "agent started");

        Ok(AgentProcess {
            child,
            events: EventStream::new(BufReader::new(stdout)),
            stderr,
        })
    }
}

#[async_trait]
impl Agent for ProcessAgent {
    async fn run(&self, prompt: &str, observer: &mut (dyn EventObserver + Send)) -> AgentOutcome {
        let mut process = self.spawn(prompt)?;
        let secs = self.config.timeout_secs;

        match tokio::time::timeout(self.config.timeout(), process.drive(observer)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(timeout_secs = secs, "agent timed out, killing it");
                process.kill().await;
                Err(InvocationError::Timeout { secs })
            }
        }
    }
}

/// A running agent: its decoded stdout plus the child handle.
pub struct AgentProcess {
    child: Child,
    events: EventStream<BufReader<ChildStdout>>,
    stderr: Option<JoinHandle<String>>,
}

impl AgentProcess {
    pub async fn next_event(&mut self) -> Result<Option<StreamEvent>, InvocationError> {
        self.events.next_event().await.map_err(InvocationError::Io)
    }

    /// Feeds every event to `observer` until the agent exits, then waits for exit.
    ///
    /// The last `result` event is the answer. A non-zero exit is a failure even
    /// if an answer was seen. Exiting does not wait for stdout to close, since a
    /// background child of the agent may hold it open; lines already written are
    /// drained for a short grace period.
    pub async fn drive(&mut self, observer: &mut (dyn EventObserver + Send)) -> AgentOutcome {
        let mut answer = None;
        let status = loop {
            tokio::select! {
                event = self.events.next_event() => match event.map_err(InvocationError::Io)? {
                    Some(event) => observe(observer, event, &mut answer),
                    None => break self.child.wait().await.map_err(InvocationError::Io)?,
                },
                status = self.child.wait() => break status.map_err(InvocationError::Io)?,
            }
        };

        let deadline = tokio::time::Instant::now() + DRAIN_GRACE;
        loop {
            match tokio::time::timeout_at(deadline, self.events.next_event()).await {
                Ok(Ok(Some(event))) => observe(observer, event, &mut answer),
                Ok(Ok(None)) => break,
                Ok(Err(err)) => return Err(InvocationError::Io(err)),
                Err(_) => {
                    tracing::debug!("agent exited with stdout still open");
                    break;
                }
            }
        }

        if !status.success() {
            return Err(InvocationError::Exited {
                code: status.code(),
                stderr: self.stderr_tail().await,
            });
        }
        if self.events.skipped() > 0 {
            tracing::debug!(skipped = self.events.skipped(), "ignored undecodable output lines");
        }
        answer.ok_or(InvocationError::NoResult)
    }

    pub async fn wait(&mut self) -> Result<ExitStatus, InvocationError> {
        self.child.wait().await.map_err(InvocationError::Io)
    }

    /// Kills and reaps the child.
    pub async fn kill(&mut self) {
        if let Err(err) = self.child.kill().await {
            tracing::warn!(error = %err, "failed to kill agent process");
        }
        if let Some(task) = self.stderr.take() {
            task.abort();
        }
    }

    async fn stderr_tail(&mut self) -> String {
        match self.stderr.take() {
            Some(task) => match tokio::time::timeout(STDERR_GRACE, task).await {
                Ok(Ok(tail)) => tail,
                _ => String::new(),
            },
            None => String::new(),
        }
    }
}

fn observe(observer: &mut (dyn EventObserver + Send), event: StreamEvent, answer: &mut Option<String>) {
    observer.on_event(&event);
    if let StreamEvent::Result { text, .. } = event {
        *answer = Some(text);
    }
}

async fn drain_tail(mut stderr: ChildStderr, cap: usize) -> String {
    let mut tail = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match stderr.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend_from_slice(&buf[..n]);
                if tail.len() > cap {
                    let excess = tail.len() - cap;
                    tail.drain(..excess);
                }
            }
        }
    }
    String::from_utf8_lossy(&tail).trim().to_string()
}
