//! Engine process launching.
//!
//! Spawns the engine, waits for the readiness line on its stdout and hands
//! back an `EngineProcess` that owns the child.

use crate::config::{EngineLocator, GatewayConfig};
use crate::error::{PlanitError, Result};
use crate::platform;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Command line and environment for one engine launch.
#[derive(Debug, Clone)]
pub struct EngineCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub env: BTreeMap<String, String>,
    /// Where engine stderr goes; discarded when unset.
    pub log_file: Option<PathBuf>,
    pub startup_timeout: Duration,
}

impl EngineCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            log_file: None,
            startup_timeout: GatewayConfig::STARTUP_TIMEOUT,
        }
    }

    /// Build `<java> <jvm options> -cp <classpath> <entry class>`.
    ///
    /// Fails with a startup error if a classpath entry is missing.
    pub fn from_locator(locator: &EngineLocator) -> Result<Self> {
        let mut command = Self::new(&locator.java);
        command.args.extend(locator.jvm_options.iter().map(OsString::from));
        if let Some(classpath) = locator.joined_classpath()? {
            command.args.push(OsString::from("-cp"));
            command.args.push(classpath);
        }
        command.args.push(OsString::from(&locator.entry_point_class));
        command.env = locator.env.clone();
        command.log_file = locator.log_file.clone();
        command.startup_timeout = locator.startup_timeout;
        Ok(command)
    }

    pub fn with_arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_log_file(mut self, path: impl AsRef<Path>) -> Self {
        self.log_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    fn stderr_target(&self) -> Result<Stdio> {
        match &self.log_file {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| PlanitError::io_with_path(e, parent))?;
                }
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| PlanitError::io_with_path(e, path))?;
                Ok(Stdio::from(file))
            }
            None => Ok(Stdio::null()),
        }
    }
}

/// Parse a readiness line such as `GATEWAY_PORT=40123`.
pub fn parse_ready_line(line: &str) -> Option<u16> {
    line.trim()
        .strip_prefix(GatewayConfig::READY_LINE_PREFIX)
        .and_then(|port| port.trim().parse().ok())
}

/// A running engine process owned by the client.
#[derive(Debug)]
pub struct EngineProcess {
    child: Child,
    pid: u32,
    addr: SocketAddr,
}

impl EngineProcess {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Address of the engine's gateway server.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Whether the child has not exited yet.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Stop the engine: graceful request, then a forced kill after `grace`.
    pub async fn terminate(mut self, grace: Duration) -> Result<Option<ExitStatus>> {
        platform::unregister_exit_cleanup(self.pid);

        if let Ok(Some(status)) = self.child.try_wait() {
            debug!("Engine process {} already exited: {}", self.pid, status);
            return Ok(Some(status));
        }

        if platform::request_graceful_stop(self.pid) {
            if let Ok(status) = tokio::time::timeout(grace, self.child.wait()).await {
                let status = status?;
                info!("Engine process {} stopped: {}", self.pid, status);
                return Ok(Some(status));
            }
            warn!(
                "Engine process {} did not stop within {:?}, killing",
                self.pid, grace
            );
        }

        self.child.kill().await?;
        let status = self.child.try_wait()?;
        info!("Engine process {} killed", self.pid);
        Ok(status)
    }
}

/// Spawn the engine and wait for its readiness line.
///
/// # Errors
/// - `StartupFailed` if the program cannot be spawned or exits before ready
/// - `StartupTimeout` if no readiness line arrives within the startup timeout;
///   the child is killed
pub async fn launch(command: &EngineCommand) -> Result<EngineProcess> {
    info!(
        "Launching engine on {}: {} {:?}",
        platform::current_platform(),
        command.program.display(),
        command.args
    );

    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .envs(&command.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(command.stderr_target()?)
        .kill_on_drop(true);

    #[cfg(target_os = "linux")]
    set_parent_death_signal(&mut cmd);

    let mut child = cmd.spawn().map_err(|e| {
        PlanitError::startup(format!(
            "failed to launch {}: {}",
            command.program.display(),
            e
        ))
    })?;

    let pid = child
        .id()
        .ok_or_else(|| PlanitError::startup("engine exited immediately after spawn"))?;
    platform::register_exit_cleanup(pid);

    let stdout = match child.stdout.take() {
        Some(stdout) => stdout,
        None => {
            abort_child(&mut child, pid).await;
            return Err(PlanitError::startup("engine stdout was not captured"));
        }
    };
    let mut lines = BufReader::new(stdout).lines();

    // One deadline covers the readiness line and any wait for an early exit.
    let deadline = Instant::now() + command.startup_timeout;
    let port = match tokio::time::timeout_at(deadline, wait_for_ready(&mut lines)).await {
        Ok(Ok(Some(port))) => port,
        Ok(Ok(None)) => {
            let status = match tokio::time::timeout_at(deadline, child.wait()).await {
                Ok(status) => status.ok(),
                Err(_) => {
                    warn!(
                        "Engine process {} closed its output but did not exit; killing",
                        pid
                    );
                    abort_child(&mut child, pid).await;
                    return Err(PlanitError::StartupTimeout(command.startup_timeout));
                }
            };
            platform::unregister_exit_cleanup(pid);
            return Err(PlanitError::startup(match status {
                Some(status) => format!("engine exited before becoming ready ({})", status),
                None => "engine closed its output before becoming ready".to_string(),
            }));
        }
        Ok(Err(e)) => {
            abort_child(&mut child, pid).await;
            return Err(PlanitError::startup(format!(
                "failed to read engine output: {}",
                e
            )));
        }
        Err(_) => {
            abort_child(&mut child, pid).await;
            return Err(PlanitError::StartupTimeout(command.startup_timeout));
        }
    };

    tokio::spawn(drain_output(lines, pid));

    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    info!("Engine process {} ready on {}", pid, addr);
    Ok(EngineProcess { child, pid, addr })
}

async fn wait_for_ready(lines: &mut Lines<BufReader<ChildStdout>>) -> std::io::Result<Option<u16>> {
    while let Some(line) = lines.next_line().await? {
        if let Some(port) = parse_ready_line(&line) {
            return Ok(Some(port));
        }
        debug!("engine: {}", line);
    }
    Ok(None)
}

async fn drain_output(mut lines: Lines<BufReader<ChildStdout>>, pid: u32) {
    while let Ok(Some(line)) = lines.next_line().await {
        debug!("engine[{}]: {}", pid, line);
    }
    debug!("Engine process {} closed its output", pid);
}

async fn abort_child(child: &mut Child, pid: u32) {
    if let Err(e) = child.kill().await {
        warn!("Failed to kill engine process {}: {}", pid, e);
    }
    platform::unregister_exit_cleanup(pid);
}

#[cfg(target_os = "linux")]
#[allow(unsafe_code)]
fn set_parent_death_signal(cmd: &mut Command) {
    // SAFETY: prctl(PR_SET_PDEATHSIG) is async-signal-safe and only affects
    // the child being configured. The closure allocates nothing.
    unsafe {
        cmd.pre_exec(|| {
            if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL) == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}
