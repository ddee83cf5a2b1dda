// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for the gateway.

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

/// Top-level error codes for the gateway API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayError {
    Unauthorized,
    BadRequest,
    NotFound,
    UpstreamError,
    Internal,
}

impl GatewayError {
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::UpstreamError => StatusCode::BAD_GATEWAY,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest => "BAD_REQUEST",
            Self::NotFound => "NOT_FOUND",
            Self::UpstreamError => "UPSTREAM_ERROR",
            Self::Internal => "INTERNAL",
        }
    }

    /// Build the JSON error response the control API returns for this error.
    pub fn to_response(self, message: impl Into<String>) -> Response {
        let body =
            ErrorResponse { error: ErrorBody { code: self.as_str().to_owned(), message: message.into() } };
        (self.http_status(), Json(body)).into_response()
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for GatewayError {}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with a machine-readable code and a human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// A plain-text 404, used by the proxy surfaces that don't speak JSON
/// (spec.md §4.5: "Unknown -> 404 with a short text body").
pub fn not_found_text(message: &str) -> Response {
    (StatusCode::NOT_FOUND, message.to_owned()).into_response()
}

/// A backend's own status code and body, forwarded byte-for-byte (spec.md
/// §4.3: "the backend's status code and body are forwarded verbatim").
/// Bypasses the `ErrorResponse` JSON envelope entirely — the body is
/// whatever the container engine or cluster control plane actually sent.
pub fn backend_verbatim(status: u16, body: String) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, body).into_response()
}
