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

//! The attestation handshake. A request carrying `Authorization: Bearer TPM...`
//! has its attestation data checked and its identity resolved before anything
//! is upgraded; the challenge and response then travel over a
//! [`FrameChannel`], each step under a deadline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use attest::{
    AttestationData, ChallengeSecret, TPM_BEARER_PREFIX, generate_challenge, validate_challenge,
};
use db::Store;
use http::HeaderMap;
use http::header::AUTHORIZATION;

use crate::channel::{
    CLOSE_POLICY_VIOLATION, CloseErrors, CloseReason, FrameChannel, with_deadline,
};
use crate::identity::{Enrollment, IdentityResolver, ResolvedMachine};
use crate::metrics;
use crate::{AdmiralError, AdmiralResult, ErrorKind};

/// Result of looking at a request's credentials.
#[derive(Debug)]
pub enum Authentication {
    /// No TPM credential was presented; the caller decides what an
    /// unauthenticated request may see.
    Skip,
    /// A TPM credential checked out so far; the challenge still has to be
    /// answered over an upgraded channel.
    Challenge(PendingHandshake),
}

pub struct Authenticator {
    resolver: IdentityResolver,
    frame_timeout: Duration,
}

impl Authenticator {
    pub fn new(store: Arc<dyn Store>, frame_timeout: Duration) -> Self {
        Authenticator {
            resolver: IdentityResolver::new(store),
            frame_timeout,
        }
    }

    /// Decodes the attestation data, resolves the machine, verifies the AK and
    /// prepares a challenge bound to the EK. Nothing is written to the client.
    /// Store failures on the way are reported as authentication failures.
    pub async fn begin(
        &self,
        headers: &HeaderMap,
        enrollment: Option<Enrollment<'_>>,
    ) -> AdmiralResult<Authentication> {
        let header = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if !header.starts_with(TPM_BEARER_PREFIX) {
            metrics::record_attestation("skipped");
            return Ok(Authentication::Skip);
        }

        match self.prepare(header, enrollment).await {
            Ok(pending) => Ok(Authentication::Challenge(pending)),
            Err(e) => {
                metrics::record_attestation("failed");
                Err(match e.kind() {
                    ErrorKind::Authentication | ErrorKind::AmbiguousState => e,
                    _ => AdmiralError::authentication(e.to_string()),
                })
            }
        }
    }

    async fn prepare(
        &self,
        header: &str,
        enrollment: Option<Enrollment<'_>>,
    ) -> AdmiralResult<PendingHandshake> {
        let data = AttestationData::from_authorization(header)?;
        let ek = data.endorsement_key()?;
        let machine = self.resolver.resolve(&ek, enrollment).await?;
        let ak = data.ak.verify()?;
        let (secret, challenge) = generate_challenge(&ek, &ak)?;

        tracing::debug!(tpm_hash = machine.tpm_hash(), "Issuing TPM challenge");
        Ok(PendingHandshake {
            machine,
            secret,
            challenge,
            frame_timeout: self.frame_timeout,
        })
    }
}

/// A challenge waiting to be sent. Dropping it abandons the handshake.
pub struct PendingHandshake {
    machine: ResolvedMachine,
    secret: ChallengeSecret,
    challenge: Vec<u8>,
    frame_timeout: Duration,
}

impl std::fmt::Debug for PendingHandshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingHandshake")
            .field("machine", &self.machine)
            .field("frame_timeout", &self.frame_timeout)
            .finish_non_exhaustive()
    }
}

impl PendingHandshake {
    pub fn machine(&self) -> &ResolvedMachine {
        &self.machine
    }

    /// Writes the challenge, reads exactly one response and checks it. On
    /// success the channel is handed back wrapped in a [`ResponseWriter`]; on
    /// failure it is closed before the error is returned.
    pub async fn complete<C: FrameChannel>(
        self,
        mut channel: C,
    ) -> AdmiralResult<(ResolvedMachine, ResponseWriter<C>)> {
        let PendingHandshake {
            machine,
            secret,
            challenge,
            frame_timeout,
        } = self;
        let started = Instant::now();

        let result = exchange(&mut channel, &secret, challenge, frame_timeout).await;
        metrics::record_handshake_duration(started.elapsed());

        match result {
            Ok(()) => {
                metrics::record_attestation("authenticated");
                Ok((machine, ResponseWriter::new(channel, frame_timeout)))
            }
            Err(e) => {
                metrics::record_attestation("failed");
                let reason = CloseReason::new(CLOSE_POLICY_VIOLATION, "attestation failed");
                if let Err(close_err) =
                    with_deadline("close", frame_timeout, channel.close(Some(reason))).await
                {
                    tracing::debug!(error = %close_err, "Closing rejected attestation channel failed");
                }
                Err(e)
            }
        }
    }
}

async fn exchange<C: FrameChannel>(
    channel: &mut C,
    secret: &ChallengeSecret,
    challenge: Vec<u8>,
    frame_timeout: Duration,
) -> AdmiralResult<()> {
    with_deadline("challenge write", frame_timeout, channel.send_frame(challenge)).await?;
    let response = with_deadline("response read", frame_timeout, channel.recv_frame()).await?;
    validate_challenge(secret, &response)
        .map_err(|e| AdmiralError::authentication(format!("challenge response rejected: {e}")))
}

/// The authenticated channel, for streaming the response payload back. Bytes
/// written are sent as one frame when the writer is closed. Both close paths
/// consume the writer, so the connection is released exactly once.
#[derive(Debug)]
pub struct ResponseWriter<C: FrameChannel> {
    channel: C,
    frame_timeout: Duration,
    buffer: Vec<u8>,
}

impl<C: FrameChannel> ResponseWriter<C> {
    pub fn new(channel: C, frame_timeout: Duration) -> Self {
        ResponseWriter {
            channel,
            frame_timeout,
            buffer: Vec::new(),
        }
    }

    pub fn write(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Sends what was written, then closes the connection. Failures of both
    /// steps are reported together.
    pub async fn close(mut self) -> Result<(), CloseErrors> {
        let mut errors = CloseErrors::default();
        let payload = std::mem::take(&mut self.buffer);
        errors.push(
            with_deadline(
                "payload write",
                self.frame_timeout,
                self.channel.send_frame(payload),
            )
            .await,
        );
        errors.push(with_deadline("close", self.frame_timeout, self.channel.close(None)).await);
        errors.into_result()
    }

    /// Closes the connection with `reason` instead of a payload.
    pub async fn abort(mut self, reason: CloseReason) -> Result<(), CloseErrors> {
        let mut errors = CloseErrors::default();
        errors.push(
            with_deadline(
                "close",
                self.frame_timeout,
                self.channel.close(Some(reason)),
            )
            .await,
        );
        errors.into_result()
    }
}
