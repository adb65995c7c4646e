//! Container reload over the local runtime socket.
//!
//! The reverse proxy serving the certificate only notices a replaced file
//! after a reload. Every call here is best-effort from the renewal loop's
//! perspective; a failure never invalidates an already-persisted certificate.

use bollard::{
    query_parameters::{KillContainerOptions, ListContainersOptions, RestartContainerOptions},
    Docker,
};

use crate::error::{Error, Result};

const RESTART_TIMEOUT_SECS: i32 = 30;

/// Signals a named container to reload or restart.
#[derive(Debug)]
pub struct Reloader {
    docker: Docker,
}

impl Reloader {
    /// Connects to the container runtime over its local defaults
    /// (`DOCKER_HOST` or the platform socket).
    pub fn new() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Reloader { docker })
    }

    /// Sends SIGHUP so the container re-reads its configuration and
    /// certificates without dropping connections.
    pub async fn reload(&self, name: &str) -> Result<()> {
        let container = self.find_running(name).await?;

        self.docker
            .kill_container(
                &container,
                Some(KillContainerOptions {
                    signal: "SIGHUP".to_owned(),
                    ..Default::default()
                }),
            )
            .await?;

        log::info!("reload signal sent to container {name}");
        Ok(())
    }

    /// Full restart, for containers that do not act on SIGHUP.
    pub async fn restart(&self, name: &str) -> Result<()> {
        let container = self.find_running(name).await?;

        self.docker
            .restart_container(
                &container,
                Some(RestartContainerOptions {
                    t: Some(RESTART_TIMEOUT_SECS),
                    ..Default::default()
                }),
            )
            .await?;

        log::info!("container {name} restarted");
        Ok(())
    }

    /// State of the named container, for diagnostics.
    pub async fn container_state(&self, name: &str) -> Result<String> {
        let (_, state) = self.find_container(name).await?;
        Ok(state)
    }

    async fn find_running(&self, name: &str) -> Result<String> {
        let (id, state) = self.find_container(name).await?;

        if state != "running" {
            return Err(Error::ContainerNotRunning {
                name: name.to_owned(),
                state,
            });
        }

        Ok(id)
    }

    async fn find_container(&self, name: &str) -> Result<(String, String)> {
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                ..Default::default()
            }))
            .await?;

        for container in containers {
            let Some(names) = &container.names else {
                continue;
            };

            if names.iter().any(|candidate| matches_name(candidate, name)) {
                let id = container
                    .id
                    .ok_or_else(|| Error::ContainerNotFound(name.to_owned()))?;
                let state = container
                    .state
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "unknown".to_owned());
                return Ok((id, state));
            }
        }

        Err(Error::ContainerNotFound(name.to_owned()))
    }
}

// the runtime prefixes container names with "/"
fn matches_name(candidate: &str, target: &str) -> bool {
    candidate == target || candidate.strip_prefix('/') == Some(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_plain_and_slash_prefixed_names() {
        assert!(matches_name("caddy-1", "caddy-1"));
        assert!(matches_name("/caddy-1", "caddy-1"));
        assert!(!matches_name("/caddy-10", "caddy-1"));
        assert!(!matches_name("//caddy-1", "caddy-1"));
        assert!(!matches_name("other", "caddy-1"));
    }
}
