// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared gateway state, handed to every axum handler via `State`.

use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::provisioner::Backend;
use crate::registry::Registry;

/// Shared gateway state.
#[derive(Clone)]
pub struct GatewayState {
    pub registry: Registry,
    pub config: Arc<GatewayConfig>,
    pub backend: Arc<dyn Backend>,
}

impl GatewayState {
    pub fn new(registry: Registry, config: GatewayConfig, backend: Arc<dyn Backend>) -> Self {
        Self { registry, config: Arc::new(config), backend }
    }
}
