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
use tokio::sync::mpsc;

use super::{ChannelError, CloseReason, FrameChannel};

#[derive(Debug)]
enum Frame {
    Data(Vec<u8>),
    Close(Option<CloseReason>),
}

/// One end of an in-process channel pair.
#[derive(Debug)]
pub struct MemoryChannel {
    tx: mpsc::UnboundedSender<Frame>,
    rx: mpsc::UnboundedReceiver<Frame>,
    closed: bool,
    peer_close: Option<CloseReason>,
}

impl MemoryChannel {
    pub fn pair() -> (MemoryChannel, MemoryChannel) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            MemoryChannel {
                tx: a_tx,
                rx: b_rx,
                closed: false,
                peer_close: None,
            },
            MemoryChannel {
                tx: b_tx,
                rx: a_rx,
                closed: false,
                peer_close: None,
            },
        )
    }

    /// The close frame the peer sent, once [`FrameChannel::recv_frame`] has
    /// observed it.
    pub fn peer_close(&self) -> Option<&CloseReason> {
        self.peer_close.as_ref()
    }
}

#[async_trait]
impl FrameChannel for MemoryChannel {
    async fn send_frame(&mut self, frame: Vec<u8>) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        self.tx
            .send(Frame::Data(frame))
            .map_err(|_| ChannelError::Closed)
    }

    async fn recv_frame(&mut self) -> Result<Vec<u8>, ChannelError> {
        match self.rx.recv().await {
            Some(Frame::Data(data)) => Ok(data),
            Some(Frame::Close(reason)) => {
                self.peer_close = reason;
                Err(ChannelError::Closed)
            }
            None => Err(ChannelError::Closed),
        }
    }

    async fn close(&mut self, reason: Option<CloseReason>) -> Result<(), ChannelError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        // The peer may already be gone, which is as closed as it gets.
        let _ = self.tx.send(Frame::Close(reason));
        Ok(())
    }
}
