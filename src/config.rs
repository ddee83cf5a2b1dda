// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway configuration, sourced from the environment (spec.md §6).

use std::time::Duration;

use url::Url;

/// Route prefixes are baked into the binary rather than environment-driven
/// (spec.md §6: "baked into config").
pub const CONTROL_API_PREFIX: &str = "/api/webconsole/v1";
pub const BROWSER_WS_PREFIX: &str = "/wss/webconsole-http/v1";
pub const HOST_WS_PREFIX: &str = "/wss/webconsole-ws/v1";

/// Port the session container's console-HTTP / console-WS server listens on.
pub const CONSOLE_HTTP_PORT: u16 = 9090;
/// Port the session container's host-bridge WebSocket listens on.
pub const BRIDGE_PORT: u16 = 8080;

#[derive(Debug, Clone, clap::Parser)]
pub struct GatewayConfig {
    /// Host to bind the HTTP listener on.
    #[arg(long, default_value = "0.0.0.0", env = "GATEWAY_HOST")]
    pub host: String,

    /// Port to bind the HTTP listener on.
    #[arg(long, default_value_t = 8081, env = "GATEWAY_PORT")]
    pub port: u16,

    /// Public URL of this gateway, stamped into newly provisioned containers.
    #[arg(long, env = "API_URL")]
    pub api_url: String,

    /// Redis (bus/store) host.
    #[arg(long, env = "REDIS_SERVICE_HOST")]
    pub redis_host: String,

    /// Redis (bus/store) port.
    #[arg(long, default_value_t = 6379, env = "REDIS_SERVICE_PORT")]
    pub redis_port: u16,

    /// DNS suffix appended to `session-<id>` for address resolution.
    #[arg(long, default_value = "", env = "SESSION_INSTANCE_DOMAIN")]
    pub session_instance_domain: String,

    /// When `"yes"` (and `api_url` is loopback-HTTPS), enables the test-only
    /// principal bypass.
    #[arg(long, default_value = "", env = "FAKE_AUTHENTICATION")]
    pub fake_authentication: String,

    /// Toggles the `Connection` header repair shim for a known upstream
    /// gateway bug (spec.md §4.7). Defaults on, since the bug is otherwise
    /// silent and fatal to every upgrade request.
    #[arg(long, default_value_t = true, env = "WEBCONSOLE_HEADER_FIX")]
    pub header_fix_enabled: bool,

    /// Upper bound on one-second-spaced DNS resolution attempts for a newly
    /// started session container's address (spec.md §4.3: "~30 one-second
    /// retries").
    #[arg(long, default_value_t = 30, env = "WEBCONSOLE_DNS_RETRIES")]
    pub dns_retries: u32,
}

impl GatewayConfig {
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/", self.redis_host, self.redis_port)
    }

    pub fn dns_retry_interval(&self) -> Duration {
        Duration::from_secs(1)
    }

    /// Whether the test-only authentication bypass may activate: requires
    /// `FAKE_AUTHENTICATION=yes` *and* a loopback-HTTPS `api_url` (spec.md
    /// §4.1). Never trust this flag alone.
    pub fn fake_auth_enabled(&self) -> bool {
        if self.fake_authentication != "yes" {
            return false;
        }
        let Ok(url) = Url::parse(&self.api_url) else {
            return false;
        };
        url.scheme() == "https" && matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "::1"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> GatewayConfig {
        GatewayConfig {
            host: "0.0.0.0".into(),
            port: 8081,
            api_url: "https://localhost:8443".into(),
            redis_host: "webconsoleapp-redis".into(),
            redis_port: 6379,
            session_instance_domain: ".svc.cluster.local".into(),
            fake_authentication: "yes".into(),
            header_fix_enabled: true,
            dns_retries: 30,
        }
    }

    #[test]
    fn fake_auth_requires_loopback_https() {
        let config = base_config();
        assert!(config.fake_auth_enabled());
    }

    #[test]
    fn fake_auth_refuses_non_loopback() {
        let mut config = base_config();
        config.api_url = "https://example.com".into();
        assert!(!config.fake_auth_enabled());
    }

    #[test]
    fn fake_auth_refuses_plain_http() {
        let mut config = base_config();
        config.api_url = "http://localhost:8443".into();
        assert!(!config.fake_auth_enabled());
    }

    #[test]
    fn fake_auth_off_by_default_flag() {
        let mut config = base_config();
        config.fake_authentication = String::new();
        assert!(!config.fake_auth_enabled());
    }
}
