//! Error Types for the Tile Server
//!
//! - [`ProxyError`]: request-path failures, rendered as plain-text responses
//! - [`ServerError`]: startup failures, fatal for the process

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::fmt;
use tessera_core::{ConfigError, TesseraError};

use crate::upstream::UpstreamError;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error categories of the tile endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Path is not `/{level}/{zoom}/{x}/{y}.png`
    InvalidTilePath,

    /// Zoom outside the supported range
    ZoomOutOfBounds,

    /// Tile does not overlap the level
    CoordinatesOutOfBounds,

    /// Level not in the active cache package
    InvalidLevel,

    /// Upstream renderer unreachable
    UpstreamUnavailable,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidTilePath
            | ErrorCode::ZoomOutOfBounds
            | ErrorCode::CoordinatesOutOfBounds
            | ErrorCode::InvalidLevel => StatusCode::NOT_FOUND,
            ErrorCode::UpstreamUnavailable => StatusCode::BAD_GATEWAY,
        }
    }

    /// Response body sent to clients.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidTilePath => "invalid tile path.",
            ErrorCode::ZoomOutOfBounds => "zoom out of bounds.",
            ErrorCode::CoordinatesOutOfBounds => "coordinates out of bounds.",
            ErrorCode::InvalidLevel => "invalid level.",
            ErrorCode::UpstreamUnavailable => "upstream unavailable.",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::InvalidTilePath => "INVALID_TILE_PATH",
            ErrorCode::ZoomOutOfBounds => "ZOOM_OUT_OF_BOUNDS",
            ErrorCode::CoordinatesOutOfBounds => "COORDINATES_OUT_OF_BOUNDS",
            ErrorCode::InvalidLevel => "INVALID_LEVEL",
            ErrorCode::UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
        };
        f.write_str(name)
    }
}

// ============================================================================
// PROXY ERROR
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyError {
    pub code: ErrorCode,
    pub message: String,
}

impl ProxyError {
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.default_message().to_string(),
        }
    }

    pub fn invalid_tile_path() -> Self {
        Self::from_code(ErrorCode::InvalidTilePath)
    }

    pub fn zoom_out_of_bounds() -> Self {
        Self::from_code(ErrorCode::ZoomOutOfBounds)
    }

    pub fn coordinates_out_of_bounds() -> Self {
        Self::from_code(ErrorCode::CoordinatesOutOfBounds)
    }

    pub fn invalid_level() -> Self {
        Self::from_code(ErrorCode::InvalidLevel)
    }

    pub fn upstream_unavailable() -> Self {
        Self::from_code(ErrorCode::UpstreamUnavailable)
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ProxyError {}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            [
                (header::DATE, http_date()),
                (header::CONTENT_TYPE, "text/plain".to_string()),
            ],
            self.message,
        )
            .into_response()
    }
}

/// Current time as an RFC 7231 `Date` header value.
pub fn http_date() -> String {
    chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

// ============================================================================
// STARTUP ERRORS
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] TesseraError),

    #[error("Upstream client error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Failed to initialize tracing: {0}")]
    Telemetry(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
