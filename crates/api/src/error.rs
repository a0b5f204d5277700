/*
 * SPDX-FileCopyrightText: Copyright (c) 2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: Apache-2.0
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 * http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use attest::AttestError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use db::DatabaseError;

use crate::channel::{ChannelError, CloseErrors};

/// Every failure the service reports, classified before it reaches the HTTP
/// boundary. The message is logged in full; clients only see
/// [`AdmiralError::public_message`].
#[derive(thiserror::Error, Debug)]
pub enum AdmiralError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Authentication failed: {0}")]
    Authentication(String),
    #[error("Ambiguous state: {0}")]
    AmbiguousState(String),
    #[error("Persistence error: {0}")]
    Persistence(#[source] DatabaseError),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// A precondition owned by another component is not met yet; retry later.
    #[error("Pending: {0}")]
    Pending(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Authentication,
    AmbiguousState,
    Persistence,
    Transport,
    NotFound,
    InvalidArgument,
    Pending,
}

pub type AdmiralResult<T> = Result<T, AdmiralError>;

impl AdmiralError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdmiralError::Configuration(_) => ErrorKind::Configuration,
            AdmiralError::Authentication(_) => ErrorKind::Authentication,
            AdmiralError::AmbiguousState(_) => ErrorKind::AmbiguousState,
            AdmiralError::Persistence(_) => ErrorKind::Persistence,
            AdmiralError::Transport(_) => ErrorKind::Transport,
            AdmiralError::NotFound(_) => ErrorKind::NotFound,
            AdmiralError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            AdmiralError::Pending(_) => ErrorKind::Pending,
        }
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        AdmiralError::Authentication(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Authentication | ErrorKind::AmbiguousState | ErrorKind::Transport => {
                StatusCode::UNAUTHORIZED
            }
            ErrorKind::Configuration | ErrorKind::Persistence => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorKind::Pending => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// What the client is told. Authentication outcomes are indistinguishable
    /// from each other so a caller cannot probe which step failed.
    pub fn public_message(&self) -> String {
        match self {
            AdmiralError::Authentication(_)
            | AdmiralError::AmbiguousState(_)
            | AdmiralError::Transport(_) => "authorization required".to_string(),
            AdmiralError::Configuration(_) => "service is not configured".to_string(),
            AdmiralError::Persistence(_) => "failed to persist machine".to_string(),
            AdmiralError::NotFound(_)
            | AdmiralError::InvalidArgument(_)
            | AdmiralError::Pending(_) => self.to_string(),
        }
    }
}

impl IntoResponse for AdmiralError {
    fn into_response(self) -> Response {
        (self.status_code(), self.public_message()).into_response()
    }
}

impl From<DatabaseError> for AdmiralError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFoundError { kind, id } => {
                AdmiralError::NotFound(format!("{kind} {id}"))
            }
            DatabaseError::InvalidArgument(msg) => AdmiralError::InvalidArgument(msg),
            err @ DatabaseError::AlreadyFoundError { .. } => {
                AdmiralError::InvalidArgument(err.to_string())
            }
            err => AdmiralError::Persistence(err),
        }
    }
}

impl From<AttestError> for AdmiralError {
    fn from(err: AttestError) -> Self {
        AdmiralError::Authentication(err.to_string())
    }
}

impl From<ChannelError> for AdmiralError {
    fn from(err: ChannelError) -> Self {
        AdmiralError::Transport(err.to_string())
    }
}

impl From<CloseErrors> for AdmiralError {
    fn from(err: CloseErrors) -> Self {
        AdmiralError::Transport(err.to_string())
    }
}

impl From<model::ModelError> for AdmiralError {
    fn from(err: model::ModelError) -> Self {
        AdmiralError::InvalidArgument(err.to_string())
    }
}
