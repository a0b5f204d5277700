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

//! Admiral admits booting machines to the fleet. A machine presents the token
//! of a registration policy and, when it has one, proves its TPM identity over
//! a WebSocket handshake; it then receives its install configuration and an
//! inventory record is kept for it, exactly one per TPM.

use std::net::SocketAddr;
use std::sync::Arc;

use db::{MemoryStore, PgStore, Store};
use tokio::sync::oneshot;

pub mod admission;
pub mod auth_tpm;
pub mod cacert;
pub mod cfg;
pub mod channel;
mod error;
pub mod handlers;
pub mod identity;
pub mod metrics;
mod middleware;
pub mod registration;
pub mod settings;
pub mod state;

pub use error::{AdmiralError, AdmiralResult, ErrorKind};

use crate::cfg::file::AdmiralConfig;
use crate::state::AppState;

/// Runs the service until `stop_rx` fires (or its sender is dropped). The bound
/// address is reported through `ready_tx` once the listener is up.
pub async fn run(
    config_str: String,
    site_config_str: Option<String>,
    stop_rx: oneshot::Receiver<()>,
    ready_tx: oneshot::Sender<SocketAddr>,
) -> eyre::Result<()> {
    let config = AdmiralConfig::load(&config_str, site_config_str.as_deref())?;

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url, config.max_database_connections).await?;
            db::migrations::migrate(store.pool()).await?;
            Arc::new(store)
        }
        None => {
            tracing::warn!("No database_url configured, keeping state in memory");
            Arc::new(MemoryStore::new())
        }
    };

    let prometheus_handle = match metrics::setup_prometheus() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Prometheus recorder not installed, /metrics disabled");
            None
        }
    };
    if config.admin_token.is_none() {
        tracing::info!("No admin_token configured, admin routes are disabled");
    }

    let app = handlers::router(AppState::new(&config, store, prometheus_handle));

    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(address = %local_addr, "admiral-api listening");
    // Nobody waiting on readiness is fine.
    let _ = ready_tx.send(local_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = stop_rx.await;
        tracing::info!("Shutting down");
    })
    .await?;

    Ok(())
}
