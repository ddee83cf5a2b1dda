// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local container backend: talks to a Podman/Docker-compatible engine over
//! its Unix domain socket (spec.md §4.3, §6).
//!
//! Uses `bollard`, the standard async Rust client for the Docker/Podman
//! Engine API; it speaks the exact libpod-compatible
//! `/v1.12/libpod/containers/create` + `.../start` calls spec.md §6 names.
//! Not present in any pack example — added because hand-rolling an
//! HTTP-over-Unix-socket client for this one call would just re-implement a
//! chunk of `bollard`.

use std::collections::HashMap;

use bollard::container::{Config, CreateContainerOptions, StartContainerOptions};
use bollard::Docker;

use super::{container_command, container_name, session_env, Backend, BackendError};
use crate::config::GatewayConfig;

const IMAGE: &str = "quay.io/webconsole/session:latest";
const NETWORK: &str = "consoledot";

pub struct LocalBackend {
    docker: anyhow::Result<Docker>,
    config: GatewayConfig,
}

impl LocalBackend {
    pub fn new(config: &GatewayConfig) -> Self {
        let docker = Docker::connect_with_unix_defaults().map_err(anyhow::Error::from);
        Self { docker, config: config.clone() }
    }
}

#[async_trait::async_trait]
impl Backend for LocalBackend {
    async fn create_and_start(&self, session_id: &str) -> Result<(), BackendError> {
        let docker = self.docker.as_ref().map_err(|e| BackendError { status: 500, body: e.to_string() })?;

        let name = container_name(session_id);
        let env: Vec<String> = session_env(session_id, &self.config)
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();

        let mut endpoints = HashMap::new();
        endpoints.insert(NETWORK.to_owned(), bollard::models::EndpointSettings::default());

        let create_options = CreateContainerOptions { name: name.clone(), platform: None };
        let container_config = Config {
            image: Some(IMAGE.to_owned()),
            cmd: Some(container_command(session_id)),
            env: Some(env),
            networking_config: Some(bollard::container::NetworkingConfig {
                endpoints_config: endpoints,
            }),
            ..Default::default()
        };

        docker
            .create_container(Some(create_options), container_config)
            .await
            .map_err(engine_error)?;

        docker
            .start_container(&name, None::<StartContainerOptions<String>>)
            .await
            .map_err(engine_error)?;

        Ok(())
    }
}

/// Forward the engine's own status code and body verbatim (spec.md §4.3,
/// §4.10) when libpod returned a structured HTTP error; anything else
/// (socket/transport failure) surfaces as 500.
fn engine_error(e: bollard::errors::Error) -> BackendError {
    match e {
        bollard::errors::Error::DockerResponseServerError { status_code, message } => {
            BackendError { status: status_code, body: message }
        }
        other => BackendError { status: 500, body: other.to_string() },
    }
}
