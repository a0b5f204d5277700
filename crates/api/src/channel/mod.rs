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

//! A bidirectional channel of whole binary frames. The attestation handshake is
//! written against [`FrameChannel`] only, so it runs the same over an upgraded
//! WebSocket and over the in-process loopback used by tests.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

mod memory;
mod websocket;

pub use memory::MemoryChannel;
pub use websocket::WsChannel;

/// WebSocket close code for "internal error".
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;
/// WebSocket close code for "policy violation", used for rejected handshakes.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

#[derive(thiserror::Error, Debug)]
pub enum ChannelError {
    #[error("peer closed the channel")]
    Closed,
    #[error("{0} did not complete within {1:?}")]
    Timeout(&'static str, Duration),
    #[error("unexpected {0} message")]
    UnexpectedMessage(&'static str),
    #[error("transport failure: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        CloseReason {
            code,
            reason: reason.into(),
        }
    }
}

#[async_trait]
pub trait FrameChannel: Send {
    async fn send_frame(&mut self, frame: Vec<u8>) -> Result<(), ChannelError>;

    /// Next binary frame from the peer. Control traffic is handled internally.
    async fn recv_frame(&mut self) -> Result<Vec<u8>, ChannelError>;

    /// Closes the channel. Closing an already closed channel is not an error.
    async fn close(&mut self, reason: Option<CloseReason>) -> Result<(), ChannelError>;
}

/// Runs one channel operation under a deadline.
pub async fn with_deadline<T, F>(
    phase: &'static str,
    deadline: Duration,
    op: F,
) -> Result<T, ChannelError>
where
    F: Future<Output = Result<T, ChannelError>>,
{
    tokio::time::timeout(deadline, op)
        .await
        .map_err(|_| ChannelError::Timeout(phase, deadline))?
}

/// Every error raised while tearing down a channel. Releasing a connection
/// involves more than one step, and a failure in an early step must not hide
/// one in a later step.
#[derive(Debug, Default)]
pub struct CloseErrors(Vec<ChannelError>);

impl CloseErrors {
    pub fn push(&mut self, result: Result<(), ChannelError>) {
        if let Err(e) = result {
            self.0.push(e);
        }
    }

    pub fn errors(&self) -> &[ChannelError] {
        &self.0
    }

    pub fn into_result(self) -> Result<(), CloseErrors> {
        if self.0.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for CloseErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CloseErrors {}
