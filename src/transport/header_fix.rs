// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Repairs a known upstream-gateway bug: `Connection: keep-alive, Upgrade`
//! is sent but the `Upgrade` header itself is stripped, which makes the
//! HTTP layer refuse the upgrade (spec.md §4.7).
//!
//! Installed as a `middleware::from_fn` layer the same way the teacher
//! installs `transport/auth.rs::auth_layer` — a request-preprocessing hook
//! that runs before routing, per the design notes ("install a
//! request-preprocessing hook at the HTTP-server layer").

use axum::body::Body;
use axum::http::header::{CONNECTION, UPGRADE};
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

/// Rewrite `Connection` to drop the `Upgrade` token when no `Upgrade` header
/// is present. Leaves every other header untouched.
pub async fn fix_connection_header(mut req: Request<Body>, next: Next) -> Response {
    if req.headers().get(UPGRADE).is_none() {
        if let Some(connection) = req.headers().get(CONNECTION) {
            if let Ok(value) = connection.to_str() {
                if header_advertises_upgrade(value) {
                    let repaired = remove_upgrade_token(value);
                    tracing::debug!(original = value, repaired = %repaired, "repaired malformed Connection header");
                    if repaired.is_empty() {
                        req.headers_mut().remove(CONNECTION);
                    } else if let Ok(header_value) = repaired.parse() {
                        req.headers_mut().insert(CONNECTION, header_value);
                    }
                }
            }
        }
    }
    next.run(req).await
}

fn header_advertises_upgrade(value: &str) -> bool {
    value.split(',').any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
}

fn remove_upgrade_token(value: &str) -> String {
    value
        .split(',')
        .map(str::trim)
        .filter(|token| !token.eq_ignore_ascii_case("upgrade"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_upgrade_token_case_insensitively() {
        assert!(header_advertises_upgrade("keep-alive, Upgrade"));
        assert!(header_advertises_upgrade("upgrade"));
        assert!(!header_advertises_upgrade("keep-alive"));
    }

    #[test]
    fn removes_only_the_upgrade_token() {
        assert_eq!(remove_upgrade_token("keep-alive, Upgrade"), "keep-alive");
        assert_eq!(remove_upgrade_token("Upgrade"), "");
        assert_eq!(remove_upgrade_token("Upgrade, keep-alive"), "keep-alive");
    }
}
