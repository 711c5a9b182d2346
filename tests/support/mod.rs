// ABOUTME: Test support utilities.
// ABOUTME: An in-memory container host and connector standing in for a remote target.

// Each test binary only uses some of these items, so allow dead_code.
#![allow(dead_code)]

use async_trait::async_trait;
use berth::config::RemoteTarget;
use berth::credential::Credential;
use berth::deadline::TimeoutError;
use berth::exec::{self, CommandLine, CommandOutput, CommandRunner, ExecError};
use berth::ssh::{ConnectError, Connector};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("berth=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// A scripted response for the next command matching a pattern.
#[derive(Debug, Clone)]
pub enum Reply {
    Exit { code: u32, stderr: String },
    Lost,
    /// The runner gives up on the command after `limit`.
    TimedOut { limit: Duration },
    /// Wait before the command takes effect.
    Delay(Duration),
    /// The command takes effect but the reply arrives only after a wait.
    Linger(Duration),
}

impl Reply {
    pub fn fail(code: u32, stderr: &str) -> Self {
        Reply::Exit {
            code,
            stderr: stderr.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeContainer {
    pub id: String,
    pub image: String,
    pub port: Option<String>,
    pub running: bool,
}

#[derive(Debug, Default)]
struct HostState {
    binaries: Vec<String>,
    containers: Vec<FakeContainer>,
    files: BTreeMap<String, String>,
    scripted: Vec<(String, VecDeque<Reply>)>,
    log: Vec<String>,
    stdin_labels: Vec<String>,
    pulled: Vec<String>,
    pushed: Vec<String>,
    next_id: u32,
    lost: bool,
    connects: u32,
    disconnects: u32,
    fail_connect: bool,
    fail_disconnect: bool,
}

/// In-memory host that understands the container CLI and lock commands.
///
/// Clones share state, so a connector can hand out sessions that the test
/// inspects afterwards.
#[derive(Debug, Clone)]
pub struct FakeHost {
    state: Arc<Mutex<HostState>>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeHost {
    /// A host with docker installed and nothing running.
    pub fn new() -> Self {
        let host = Self {
            state: Arc::new(Mutex::new(HostState::default())),
        };
        host.install("docker");
        host
    }

    pub fn without_runtime() -> Self {
        Self {
            state: Arc::new(Mutex::new(HostState::default())),
        }
    }

    pub fn install(&self, binary: &str) {
        self.state().binaries.push(binary.to_string());
    }

    /// Add a container and return its id.
    pub fn add_container(&self, image: &str, running: bool) -> String {
        let mut state = self.state();
        let id = next_container_id(&mut state);
        state.containers.push(FakeContainer {
            id: id.clone(),
            image: image.to_string(),
            port: None,
            running,
        });
        id
    }

    /// Forget a container without telling the caller, as if removed concurrently.
    pub fn vanish(&self, id: &str) {
        self.state().containers.retain(|c| c.id != id);
    }

    pub fn containers(&self) -> Vec<FakeContainer> {
        self.state().containers.clone()
    }

    pub fn put_file(&self, path: &str, content: &str) {
        self.state()
            .files
            .insert(path.to_string(), content.to_string());
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.state().files.get(path).cloned()
    }

    /// Queue replies for the next commands whose rendered form contains `pattern`.
    pub fn script(&self, pattern: &str, replies: impl IntoIterator<Item = Reply>) {
        self.state()
            .scripted
            .push((pattern.to_string(), replies.into_iter().collect()));
    }

    /// Every command run so far, rendered as shell text.
    pub fn log(&self) -> Vec<String> {
        self.state().log.clone()
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.state()
            .log
            .iter()
            .filter(|c| c.contains(pattern))
            .count()
    }

    pub fn stdin_labels(&self) -> Vec<String> {
        self.state().stdin_labels.clone()
    }

    pub fn pulled(&self) -> Vec<String> {
        self.state().pulled.clone()
    }

    pub fn pushed(&self) -> Vec<String> {
        self.state().pushed.clone()
    }

    pub fn connects(&self) -> u32 {
        self.state().connects
    }

    pub fn disconnects(&self) -> u32 {
        self.state().disconnects
    }

    pub fn fail_connect(&self) {
        self.state().fail_connect = true;
    }

    pub fn fail_disconnect(&self) {
        self.state().fail_disconnect = true;
    }

    fn state(&self) -> std::sync::MutexGuard<'_, HostState> {
        self.state.lock().unwrap()
    }

    /// Pop the next scripted reply for `command`, if any.
    fn next_reply(&self, command: &CommandLine<'_>) -> Option<Reply> {
        let rendered = command.to_shell();
        let mut state = self.state();
        if state.lost {
            return None;
        }
        state
            .scripted
            .iter_mut()
            .find(|(pattern, replies)| rendered.contains(pattern.as_str()) && !replies.is_empty())
            .and_then(|(_, replies)| replies.pop_front())
    }

    fn handle(&self, command: &CommandLine<'_>, scripted: Option<Reply>) -> exec::Result<CommandOutput> {
        let rendered = command.to_shell();
        let mut state = self.state();

        if state.lost {
            return Err(ExecError::SessionLost("connection closed".to_string()));
        }
        state.log.push(rendered);
        if let Some(cred) = command.stdin() {
            state.stdin_labels.push(cred.label().to_string());
        }

        match scripted {
            Some(Reply::Lost) => {
                state.lost = true;
                return Err(ExecError::SessionLost("connection reset by peer".to_string()));
            }
            Some(Reply::Exit { code, stderr }) => {
                return Ok(CommandOutput {
                    exit_code: code,
                    stdout: String::new(),
                    stderr,
                });
            }
            Some(Reply::TimedOut { limit }) => {
                return Err(ExecError::Timeout(TimeoutError {
                    operation: format!("`{}`", command.to_shell()),
                    limit,
                }));
            }
            Some(Reply::Delay(_)) | Some(Reply::Linger(_)) | None => {}
        }

        let args = command.get_args();
        match command.program() {
            "sh" => Ok(shell(&mut state, args.get(1).map(String::as_str).unwrap_or(""))),
            "command" => {
                let binary = args.get(1).cloned().unwrap_or_default();
                if state.binaries.contains(&binary) {
                    Ok(ok(&format!("/usr/bin/{binary}\n")))
                } else {
                    Ok(exit(1, ""))
                }
            }
            "docker" | "podman" => Ok(container_cli(&mut state, args)),
            other => Ok(exit(127, &format!("sh: {other}: command not found"))),
        }
    }
}

fn next_container_id(state: &mut HostState) -> String {
    state.next_id += 1;
    format!("{:064x}", state.next_id)
}

fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        exit_code: 0,
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

fn exit(code: u32, stderr: &str) -> CommandOutput {
    CommandOutput {
        exit_code: code,
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

/// Undo `shell_quote` for a single word.
fn unquote(word: &str) -> String {
    match word.strip_prefix('\'').and_then(|w| w.strip_suffix('\'')) {
        Some(inner) => inner.replace("'\\''", "'"),
        None => word.to_string(),
    }
}

fn quoted_path(script: &str, after: &str) -> Option<String> {
    let start = script.find(after)? + after.len();
    let rest = &script[start..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

fn shell(state: &mut HostState, script: &str) -> CommandOutput {
    if script.starts_with("mkdir -p") {
        return ok("");
    }
    if script.contains("set -C") {
        let Some(path) = quoted_path(script, "> \"") else {
            return exit(2, "bad script");
        };
        if state.files.contains_key(&path) {
            return exit(1, "");
        }
        let start = script.find("echo ").map(|i| i + 5).unwrap_or(0);
        let end = script.find(" > \"").unwrap_or(script.len());
        let content = unquote(&script[start..end]);
        state.files.insert(path, content);
        return ok("");
    }
    if let Some(path) = quoted_path(script, "cat \"") {
        return match state.files.get(&path) {
            Some(content) => ok(&format!("{content}\n")),
            None => exit(1, &format!("cat: {path}: No such file or directory")),
        };
    }
    if let Some(path) = quoted_path(script, "rm -f \"") {
        state.files.remove(&path);
        return ok("");
    }
    // Anything else is a local-style script such as a test command
    ok("")
}

fn container_cli(state: &mut HostState, args: &[String]) -> CommandOutput {
    let arg = |i: usize| args.get(i).map(String::as_str).unwrap_or("");
    let no_such = |id: &str| exit(1, &format!("Error response from daemon: No such container: {id}"));

    match arg(0) {
        "ps" => {
            let ids: Vec<String> = state.containers.iter().map(|c| c.id.clone()).collect();
            let mut out = ids.join("\n");
            if !out.is_empty() {
                out.push('\n');
            }
            ok(&out)
        }
        "stop" => {
            let id = args.last().cloned().unwrap_or_default();
            match state.containers.iter_mut().find(|c| c.id == id) {
                Some(container) => {
                    container.running = false;
                    ok(&format!("{id}\n"))
                }
                None => no_such(&id),
            }
        }
        "rm" => {
            let id = arg(1).to_string();
            let before = state.containers.len();
            state.containers.retain(|c| c.id != id);
            if state.containers.len() < before {
                ok(&format!("{id}\n"))
            } else {
                no_such(&id)
            }
        }
        "pull" => {
            state.pulled.push(arg(1).to_string());
            ok("")
        }
        "push" => {
            state.pushed.push(arg(1).to_string());
            ok("")
        }
        "login" => ok("Login Succeeded\n"),
        "build" => ok(""),
        "run" => {
            let image = args.last().cloned().unwrap_or_default();
            let port = args
                .iter()
                .position(|a| a == "-p")
                .and_then(|i| args.get(i + 1))
                .cloned();
            let id = next_container_id(state);
            state.containers.push(FakeContainer {
                id: id.clone(),
                image,
                port,
                running: true,
            });
            ok(&format!("{id}\n"))
        }
        other => exit(125, &format!("unknown command: {other}")),
    }
}

#[async_trait]
impl CommandRunner for FakeHost {
    async fn run(&self, command: &CommandLine<'_>) -> exec::Result<CommandOutput> {
        match self.next_reply(command) {
            Some(Reply::Delay(wait)) => {
                tokio::time::sleep(wait).await;
                self.handle(command, None)
            }
            Some(Reply::Linger(wait)) => {
                let result = self.handle(command, None);
                tokio::time::sleep(wait).await;
                result
            }
            reply => self.handle(command, reply),
        }
    }
}

/// Hands out sessions onto one shared [`FakeHost`].
#[derive(Debug, Clone)]
pub struct FakeConnector {
    pub host: FakeHost,
}

impl FakeConnector {
    pub fn new(host: FakeHost) -> Self {
        Self { host }
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Session = FakeHost;

    async fn connect(
        &self,
        target: &RemoteTarget,
        _key: Option<&Credential>,
    ) -> Result<FakeHost, ConnectError> {
        let mut state = self.host.state();
        if state.fail_connect {
            return Err(ConnectError::Connection(format!(
                "{}:{} refused connection",
                target.host, target.port
            )));
        }
        state.connects += 1;
        state.lost = false;
        drop(state);
        Ok(self.host.clone())
    }

    async fn disconnect(&self, session: FakeHost) -> Result<(), ConnectError> {
        let mut state = session.state();
        state.disconnects += 1;
        if state.fail_disconnect {
            return Err(ConnectError::Connection("socket already closed".to_string()));
        }
        Ok(())
    }
}
