// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Packet Flow Engine - Errors

use crate::types::{BoxId, PortId, WireId};

/// Errors from wire path construction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PathError {
    #[error("a wire path needs at least {min} control points, got {got}")]
    TooFewPoints { min: usize, got: usize },
    #[error("a wire path allows at most {max} control points, got {got}")]
    TooManyPoints { max: usize, got: usize },
}

/// Errors from network authoring calls.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("unknown port {0}")]
    UnknownPort(PortId),
    #[error("unknown box {0}")]
    UnknownBox(BoxId),
    #[error("unknown wire {0}")]
    UnknownWire(WireId),
    #[error("wire must run from an output port to an input port")]
    PortDirectionMismatch,
    #[error("port {0} is already bound to a wire")]
    PortAlreadyBound(PortId),
    #[error("invalid wire path: {0}")]
    InvalidPath(#[from] PathError),
}

/// Errors from configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors from timeline export and import.
#[derive(Debug, thiserror::Error)]
pub enum TimelineError {
    #[error("timeline i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("timeline encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("imported timeline holds no snapshots")]
    Empty,
}
