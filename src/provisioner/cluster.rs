// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cluster backend: posts a pod manifest to the cluster control plane
//! (spec.md §4.3, §6).
//!
//! `kube` + `k8s-openapi` is the same pairing
//! `examples/other_examples/manifests/alfredjeanlab-oddjobs` pulls in for
//! talking to a Kubernetes API server from async Rust.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Container, EnvVar, Pod, PodSpec};
use kube::api::{Api, ObjectMeta, PostParams};
use kube::Client;

use super::{container_command, container_name, session_env, Backend, BackendError};
use crate::config::GatewayConfig;

const IMAGE: &str = "quay.io/webconsole/session:latest";

pub struct ClusterBackend {
    client: Client,
    namespace: String,
    config: GatewayConfig,
}

impl ClusterBackend {
    pub async fn new(config: &GatewayConfig) -> anyhow::Result<Self> {
        // `Client::try_default` reads the in-cluster service-account config
        // (token + CA + namespace) the same way `kube` always does; the
        // bearer token comes from the mounted secret spec.md §6 describes.
        let client = Client::try_default().await?;
        let namespace = std::fs::read_to_string(
            "/var/run/secrets/kubernetes.io/serviceaccount/namespace",
        )
        .unwrap_or_else(|_| "default".to_owned());
        Ok(Self { client, namespace, config: config.clone() })
    }
}

#[async_trait::async_trait]
impl Backend for ClusterBackend {
    async fn create_and_start(&self, session_id: &str) -> Result<(), BackendError> {
        let name = container_name(session_id);
        let env: Vec<EnvVar> = session_env(session_id, &self.config)
            .into_iter()
            .map(|(key, value)| EnvVar { name: key, value: Some(value), ..Default::default() })
            .collect();

        let mut labels = BTreeMap::new();
        labels.insert("app".to_owned(), "webconsole-session".to_owned());
        labels.insert("session-id".to_owned(), session_id.to_owned());

        let pod = Pod {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(labels),
                ..Default::default()
            },
            spec: Some(PodSpec {
                hostname: Some(name.clone()),
                subdomain: Some("session".to_owned()),
                restart_policy: Some("Never".to_owned()),
                containers: vec![Container {
                    name: "console".to_owned(),
                    image: Some(IMAGE.to_owned()),
                    command: Some(container_command(session_id)),
                    env: Some(env),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            status: None,
        };

        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &self.namespace);
        pods.create(&PostParams::default(), &pod).await.map_err(pod_create_error)?;
        Ok(())
    }
}

/// Forward the control plane's own status code and body verbatim (spec.md
/// §4.3, §4.10) when the failure is a structured API error; anything else
/// (transport/serialization failure) surfaces as 500.
fn pod_create_error(e: kube::Error) -> BackendError {
    match e {
        kube::Error::Api(api_error) => {
            BackendError { status: api_error.code, body: api_error.message }
        }
        other => BackendError { status: 500, body: other.to_string() },
    }
}
