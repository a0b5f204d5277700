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

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, WebSocket};

use super::{ChannelError, CloseReason, FrameChannel};

/// An upgraded WebSocket carrying one binary message per frame.
pub struct WsChannel {
    socket: WebSocket,
    closed: bool,
}

impl WsChannel {
    pub fn new(socket: WebSocket) -> Self {
        WsChannel {
            socket,
            closed: false,
        }
    }
}

#[async_trait]
impl FrameChannel for WsChannel {
    async fn send_frame(&mut self, frame: Vec<u8>) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        self.socket
            .send(Message::Binary(Bytes::from(frame)))
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))
    }

    async fn recv_frame(&mut self) -> Result<Vec<u8>, ChannelError> {
        loop {
            match self.socket.recv().await {
                Some(Ok(Message::Binary(data))) => return Ok(data.to_vec()),
                // axum answers pings on its own
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Text(_))) => return Err(ChannelError::UnexpectedMessage("text")),
                Some(Ok(Message::Close(_))) | None => return Err(ChannelError::Closed),
                Some(Err(e)) => return Err(ChannelError::Transport(e.to_string())),
            }
        }
    }

    async fn close(&mut self, reason: Option<CloseReason>) -> Result<(), ChannelError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let frame = reason.map(|r| CloseFrame {
            code: r.code,
            reason: r.reason.into(),
        });
        self.socket
            .send(Message::Close(frame))
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))
    }
}
