//! Container lifecycle manager. Owns at most one live container between
//! `create` and `remove`. Built against `bollard`'s typed Docker Engine
//! API client rather than shelling out to the `docker` binary.

use std::time::Duration;

use bollard::container::{
    Config, CreateContainerOptions, RemoveContainerOptions, StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::models::{HostConfig, Mount, MountTypeEnum};
use bollard::Docker;
use futures_util::StreamExt;
use tracing::{info, warn};

use crate::error::ContainerError;
use crate::types::{ContainerConfig, ToolResult};

/// Per-exec timeout unless the caller overrides it. Named per DESIGN.md's
/// Open Question decision #3 (was hard-coded in two places upstream).
pub const TOOL_EXEC_TIMEOUT: Duration = Duration::from_millis(30_000);

const NON_ROOT_USER: &str = "agent:agent";
const NON_ROOT_UID: i64 = 1001;
const PIDS_LIMIT: i64 = 100;
const TMPFS_SIZE_BYTES: i64 = 100 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Uninit,
    Created,
    Running,
    Stopped,
    Removed,
}

impl ContainerState {
    fn label(&self) -> &'static str {
        match self {
            ContainerState::Uninit => "uninit",
            ContainerState::Created => "created",
            ContainerState::Running => "running",
            ContainerState::Stopped => "stopped",
            ContainerState::Removed => "removed",
        }
    }
}

pub type ContainerResult<T> = Result<T, ContainerError>;

/// Owns one container's lifecycle. Never references `bollard` types beyond
/// its own boundary in callers that hold it behind the `ContainerRuntime`
/// trait defined alongside `SessionSupervisor`.
pub struct ContainerManager {
    docker: Docker,
    state: ContainerState,
    container_id: Option<String>,
    /// Bounded tail of recent lifecycle/exec events, for post-mortem
    /// diagnostics only — never consulted by retry control flow.
    event_log: Vec<String>,
}

const EVENT_LOG_CAP: usize = 50;

impl ContainerManager {
    pub fn connect() -> ContainerResult<Self> {
        let docker = Docker::connect_with_local_defaults().map_err(ContainerError::Runtime)?;
        Ok(Self {
            docker,
            state: ContainerState::Uninit,
            container_id: None,
            event_log: Vec::new(),
        })
    }

    fn record_event(&mut self, event: impl Into<String>) {
        self.event_log.push(event.into());
        if self.event_log.len() > EVENT_LOG_CAP {
            self.event_log.remove(0);
        }
    }

    pub fn state(&self) -> ContainerState {
        self.state
    }

    /// Post-mortem diagnostics: the last `lines` lifecycle/exec events.
    /// Diagnostic-only; never consulted by the retry orchestrator.
    pub fn logs_tail(&self, lines: usize) -> ContainerResult<String> {
        let start = self.event_log.len().saturating_sub(lines);
        Ok(self.event_log[start..].join("\n"))
    }

    /// Must succeed against the container runtime before `create` proceeds.
    pub async fn health(&self) -> ContainerResult<()> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|source| ContainerError::HealthCheckFailed {
                socket: "/var/run/docker.sock".to_string(),
                source,
            })
    }

    /// `uninit -> created`. Security options below are bit-exact and not
    /// negotiable by callers.
    pub async fn create(&mut self, config: &ContainerConfig) -> ContainerResult<()> {
        if self.state != ContainerState::Uninit {
            return Err(ContainerError::InvalidTransition {
                from: self.state.label().to_string(),
                to: "created".to_string(),
            });
        }

        self.health().await?;

        if !config.workspace_dir.exists() {
            return Err(ContainerError::WorkspaceMissing(config.workspace_dir.clone()));
        }
        let workspace = config
            .workspace_dir
            .to_str()
            .ok_or_else(|| ContainerError::WorkspaceMissing(config.workspace_dir.clone()))?
            .to_string();

        let host_config = HostConfig {
            memory: Some(config.memory_bytes()),
            nano_cpus: Some(config.nano_cpus()),
            pids_limit: Some(PIDS_LIMIT),
            readonly_rootfs: Some(true),
            network_mode: Some("none".to_string()),
            security_opt: Some(vec!["no-new-privileges:true".to_string()]),
            cap_drop: Some(vec!["ALL".to_string()]),
            mounts: Some(vec![
                Mount {
                    target: Some(workspace.clone()),
                    source: Some(workspace.clone()),
                    typ: Some(MountTypeEnum::BIND),
                    read_only: Some(false),
                    ..Default::default()
                },
                Mount {
                    target: Some("/tmp".to_string()),
                    typ: Some(MountTypeEnum::TMPFS),
                    tmpfs_options: Some(bollard::models::MountTmpfsOptions {
                        size_bytes: Some(TMPFS_SIZE_BYTES),
                        mode: None,
                    }),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        };

        let container_config = Config {
            image: Some(config.image.clone()),
            user: Some(format!("{NON_ROOT_USER}:{NON_ROOT_UID}")),
            working_dir: Some(workspace),
            cmd: Some(vec!["sleep".to_string(), "infinity".to_string()]),
            host_config: Some(host_config),
            ..Default::default()
        };

        let name = format!("orchestrator-{}", uuid::Uuid::new_v4());
        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.clone(),
                    platform: None,
                }),
                container_config,
            )
            .await
            .map_err(ContainerError::Runtime)?;

        self.container_id = Some(created.id.clone());
        self.state = ContainerState::Created;
        self.record_event(format!("create: container_id={}", created.id));
        info!(container_id = %created.id, "container created");
        Ok(())
    }

    /// `created -> running`.
    pub async fn start(&mut self) -> ContainerResult<()> {
        if self.state != ContainerState::Created {
            return Err(ContainerError::InvalidTransition {
                from: self.state.label().to_string(),
                to: "running".to_string(),
            });
        }
        let id = self.require_id()?;
        self.docker
            .start_container::<String>(id, None)
            .await
            .map_err(ContainerError::Runtime)?;
        self.state = ContainerState::Running;
        self.record_event(format!("start: container_id={id}"));
        info!(container_id = %id, "container started");
        Ok(())
    }

    /// Run `cmd` inside the container and collect its output, racing a
    /// timeout. The command is not cancelled mid-stream on timeout — the
    /// runtime reaps it when the container exits.
    pub async fn exec(&mut self, cmd: &[String], timeout: Duration) -> ContainerResult<ToolResult> {
        let id = self.require_id()?.to_string();
        let exec_future = self.exec_inner(&id, cmd);

        match tokio::time::timeout(timeout, exec_future).await {
            Ok(result) => {
                let result = result?;
                self.record_event(format!(
                    "exec: cmd={:?} exit={:?}",
                    cmd, result.exit_code
                ));
                Ok(result)
            }
            Err(_) => {
                self.record_event(format!("exec: cmd={cmd:?} timed out after {timeout:?}"));
                Err(ContainerError::ExecTimeout(timeout.as_millis() as u64))
            }
        }
    }

    async fn exec_inner(&self, container_id: &str, cmd: &[String]) -> ContainerResult<ToolResult> {
        let exec = self
            .docker
            .create_exec(
                container_id,
                CreateExecOptions {
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    attach_stdin: Some(false),
                    cmd: Some(cmd.to_vec()),
                    ..Default::default()
                },
            )
            .await
            .map_err(ContainerError::Runtime)?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        if let StartExecResults::Attached { mut output, .. } = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(ContainerError::Runtime)?
        {
            while let Some(chunk) = output.next().await {
                match chunk.map_err(ContainerError::Runtime)? {
                    bollard::container::LogOutput::StdOut { message } => stdout.extend_from_slice(&message),
                    bollard::container::LogOutput::StdErr { message } => stderr.extend_from_slice(&message),
                    _ => {}
                }
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(ContainerError::Runtime)?;

        Ok(ToolResult {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code: inspect.exit_code,
        })
    }

    /// `running -> stopped`. No-op from `stopped`. Falls back to SIGKILL if
    /// graceful stop fails.
    pub async fn stop(&mut self) -> ContainerResult<()> {
        if self.state == ContainerState::Stopped {
            return Ok(());
        }
        let id = self.require_id()?.to_string();
        let result = self
            .docker
            .stop_container(&id, Some(StopContainerOptions { t: 10 }))
            .await;
        if let Err(e) = result {
            warn!(container_id = %id, error = %e, "graceful stop failed, container will be force-killed on remove");
        }
        self.state = ContainerState::Stopped;
        self.record_event(format!("stop: container_id={id}"));
        info!(container_id = %id, "container stopped");
        Ok(())
    }

    /// `{created, stopped} -> removed`. Failure is logged, not re-raised.
    pub async fn remove(&mut self) -> ContainerResult<()> {
        if self.state == ContainerState::Removed {
            return Ok(());
        }
        let id = self.require_id()?.to_string();
        let result = self
            .docker
            .remove_container(
                &id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await;
        if let Err(e) = result {
            warn!(container_id = %id, error = %e, "remove failed; cleanup is best-effort");
        }
        self.state = ContainerState::Removed;
        self.record_event(format!("remove: container_id={id}"));
        info!(container_id = %id, "container removed");
        Ok(())
    }

    /// `stop; remove`, tolerating idempotent-stop and already-removed
    /// conditions. Safe to call from any state, including mid-error-path.
    pub async fn cleanup(&mut self) -> ContainerResult<()> {
        if self.container_id.is_none() {
            return Ok(());
        }
        self.stop().await.ok();
        self.remove().await.ok();
        Ok(())
    }

    fn require_id(&self) -> ContainerResult<&str> {
        self.container_id
            .as_deref()
            .ok_or_else(|| ContainerError::InvalidTransition {
                from: self.state.label().to_string(),
                to: "exec".to_string(),
            })
    }
}

/// Abstraction over the container runtime so the session supervisor and
/// retry orchestrator never reference `bollard` types directly — the
/// container is a resource owned by a scope. Implemented for
/// `ContainerManager`; tests use a fake.
#[async_trait::async_trait]
pub trait ContainerRuntime: Send {
    async fn create(&mut self, config: &ContainerConfig) -> ContainerResult<()>;
    async fn start(&mut self) -> ContainerResult<()>;
    async fn exec(&mut self, cmd: &[String], timeout: Duration) -> ContainerResult<ToolResult>;
    async fn cleanup(&mut self) -> ContainerResult<()>;
}

#[async_trait::async_trait]
impl ContainerRuntime for ContainerManager {
    async fn create(&mut self, config: &ContainerConfig) -> ContainerResult<()> {
        ContainerManager::create(self, config).await
    }

    async fn start(&mut self) -> ContainerResult<()> {
        ContainerManager::start(self).await
    }

    async fn exec(&mut self, cmd: &[String], timeout: Duration) -> ContainerResult<ToolResult> {
        ContainerManager::exec(self, cmd, timeout).await
    }

    async fn cleanup(&mut self) -> ContainerResult<()> {
        ContainerManager::cleanup(self).await
    }
}
