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

use std::time::Instant;

use axum::Router;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use http::HeaderMap;

use crate::AdmiralError;
use crate::admission::Candidate;
use crate::auth_tpm::{Authentication, PendingHandshake};
use crate::channel::WsChannel;
use crate::metrics::{self, RegistrationOutcome};
use crate::state::AppState;

/// `GET|POST <prefix>/{token}`. Without a TPM credential the caller gets the
/// sample cloud-config; with one the request must be a WebSocket upgrade that
/// carries the attestation handshake.
async fn register(
    State(state): State<AppState>,
    Path(token): Path<String>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let started = Instant::now();

    let candidate = match state.admission.build_candidate(&token, &headers).await {
        Ok(candidate) => candidate,
        Err(e) => return reject(e),
    };

    let pending = match state
        .authenticator
        .begin(&headers, Some(candidate.enrollment()))
        .await
    {
        Ok(Authentication::Skip) => {
            return match state.admission.sample_config(&candidate.registration) {
                Ok(config) => config.into_response(),
                Err(e) => reject(e),
            };
        }
        Ok(Authentication::Challenge(pending)) => pending,
        Err(e) => return reject(e),
    };

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            return reject(AdmiralError::Transport(format!(
                "attestation requires a WebSocket upgrade: {rejection}"
            )));
        }
    };

    upgrade
        .on_failed_upgrade(|e| tracing::warn!(error = %e, "WebSocket upgrade failed"))
        .on_upgrade(move |socket| attest(state, candidate, pending, socket, started))
}

async fn attest(
    state: AppState,
    candidate: Candidate,
    pending: PendingHandshake,
    socket: WebSocket,
    started: Instant,
) {
    let upgrade_timeout = state.attestation.upgrade_timeout;
    if started.elapsed() > upgrade_timeout {
        metrics::record_registration(RegistrationOutcome::Rejected);
        tracing::warn!(
            timeout = ?upgrade_timeout,
            "WebSocket upgrade took too long, dropping attestation"
        );
        return;
    }

    let tpm_hash = pending.machine().tpm_hash().to_string();
    match state
        .admission
        .admit(candidate, pending, WsChannel::new(socket))
        .await
    {
        Ok(inventory) => tracing::debug!(
            tpm_hash = %tpm_hash,
            name = %inventory.name,
            "Registration complete"
        ),
        Err(e) => tracing::warn!(tpm_hash = %tpm_hash, error = %e, "Registration failed after upgrade"),
    }
}

fn reject(e: AdmiralError) -> Response {
    metrics::record_registration(RegistrationOutcome::Rejected);
    tracing::info!(error = %e, "Registration rejected");
    e.into_response()
}

pub fn get_router(path_prefix: &str) -> Router<AppState> {
    Router::new().route(
        &format!("{path_prefix}/{{token}}"),
        get(register).post(register),
    )
}
