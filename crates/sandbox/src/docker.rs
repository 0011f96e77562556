//! The Docker-backed sandbox runtime.

use crate::{PlayConfig, Sandbox, CONTAINER_MOUNT, PAYLOAD_FILE, STATE_FILE};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, RemoveContainerOptions, StartContainerOptions,
    WaitContainerOptions,
};
use bollard::models::HostConfig;
use bollard::Docker;
use caravel_types::error::SandboxError;
use futures::StreamExt;
use std::time::Duration;
use tracing::{debug, warn};

/// Runtime limits for container executions.
#[derive(Debug, Clone)]
pub struct DockerSandboxConfig {
    /// Wall-clock bound on one container run, in seconds.
    pub timeout_secs: u64,
    /// Memory ceiling for the container, in bytes.
    pub memory_limit_bytes: i64,
}

impl Default for DockerSandboxConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            memory_limit_bytes: 256 * 1024 * 1024,
        }
    }
}

/// A [`Sandbox`] that runs images under the local Docker daemon.
pub struct DockerSandbox {
    docker: Docker,
    config: DockerSandboxConfig,
}

impl DockerSandbox {
    /// Connects to the local Docker daemon.
    pub fn new(config: DockerSandboxConfig) -> Result<Self, SandboxError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| SandboxError::Runtime(e.to_string()))?;
        Ok(Self { docker, config })
    }

    async fn remove_container(&self, name: &str) {
        let options = Some(RemoveContainerOptions {
            force: true,
            ..Default::default()
        });
        if let Err(e) = self.docker.remove_container(name, options).await {
            warn!(container = name, error = %e, "failed to remove sandbox container");
        }
    }
}

#[async_trait]
impl Sandbox for DockerSandbox {
    async fn play(&self, play: &PlayConfig) -> Result<Vec<u8>, SandboxError> {
        // Stage the input state and payload where the container will see
        // them; the directory is dropped (and deleted) on every exit path.
        let scratch = tempfile::Builder::new().prefix("caravel-sandbox").tempdir()?;
        let state_path = scratch.path().join(STATE_FILE);
        tokio::fs::write(&state_path, &play.initial_state).await?;
        tokio::fs::write(scratch.path().join(PAYLOAD_FILE), &play.payload).await?;

        let name = format!(
            "caravel-sandbox-{}",
            hex::encode(rand::random::<[u8; 8]>())
        );
        let options = Some(CreateContainerOptions {
            name: name.clone(),
            ..Default::default()
        });
        let config = Config {
            image: Some(play.image_id.clone()),
            host_config: Some(HostConfig {
                binds: Some(vec![format!(
                    "{}:{}",
                    scratch.path().display(),
                    CONTAINER_MOUNT
                )]),
                memory: Some(self.config.memory_limit_bytes),
                network_mode: Some("none".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        self.docker
            .create_container(options, config)
            .await
            .map_err(|e| SandboxError::Runtime(e.to_string()))?;

        debug!(container = %name, image = %play.image_id, "starting sandbox container");
        if let Err(e) = self
            .docker
            .start_container(&name, None::<StartContainerOptions<String>>)
            .await
        {
            self.remove_container(&name).await;
            return Err(SandboxError::Runtime(e.to_string()));
        }

        let mut wait = self.docker.wait_container(
            &name,
            Some(WaitContainerOptions {
                condition: "not-running".to_string(),
            }),
        );
        let waited = tokio::time::timeout(
            Duration::from_secs(self.config.timeout_secs),
            wait.next(),
        )
        .await;

        let exit = match waited {
            Err(_) => {
                self.remove_container(&name).await;
                return Err(SandboxError::Timeout(self.config.timeout_secs));
            }
            Ok(None) => {
                self.remove_container(&name).await;
                return Err(SandboxError::Runtime(
                    "container wait stream ended without a status".to_string(),
                ));
            }
            Ok(Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. }))) => {
                self.remove_container(&name).await;
                return Err(SandboxError::NonZeroExit(code));
            }
            Ok(Some(Err(e))) => {
                self.remove_container(&name).await;
                return Err(SandboxError::Runtime(e.to_string()));
            }
            Ok(Some(Ok(response))) => response,
        };
        if exit.status_code != 0 {
            self.remove_container(&name).await;
            return Err(SandboxError::NonZeroExit(exit.status_code));
        }

        let next_state = tokio::fs::read(&state_path)
            .await
            .map_err(|e| SandboxError::MalformedOutput(e.to_string()));
        self.remove_container(&name).await;
        next_state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_bounded() {
        let config = DockerSandboxConfig::default();
        assert!(config.timeout_secs > 0);
        assert!(config.memory_limit_bytes > 0);
    }
}
