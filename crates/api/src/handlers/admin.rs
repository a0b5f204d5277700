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

//! Operator endpoints standing in for the resource API the admission flow
//! reads from. Mounted only when an admin token is configured.

use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, put};
use axum::{Json, Router};
use http::header::AUTHORIZATION;
use model::{Cluster, MachineInventory, MachineRegistration, Secret};
use serde::Deserialize;
use subtle::ConstantTimeEq;

use crate::state::AppState;
use crate::{AdmiralError, AdmiralResult};

async fn require_admin_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .unwrap_or_default();

    let authorized = state
        .admin_token
        .as_deref()
        .is_some_and(|token| bool::from(token.as_bytes().ct_eq(presented.as_bytes())));
    if !authorized {
        return AdmiralError::authentication("admin token rejected").into_response();
    }
    next.run(request).await
}

async fn create_registration(
    State(state): State<AppState>,
    Json(registration): Json<MachineRegistration>,
) -> AdmiralResult<(StatusCode, Json<MachineRegistration>)> {
    let created = state.store.create_registration(registration).await?;
    let reconciled = state
        .tokens
        .reconcile_registration(&created.namespace, &created.name)
        .await?;
    Ok((StatusCode::CREATED, Json(reconciled)))
}

async fn get_registration(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> AdmiralResult<Json<MachineRegistration>> {
    state
        .store
        .get_registration(&namespace, &name)
        .await?
        .map(Json)
        .ok_or_else(|| AdmiralError::NotFound(format!("MachineRegistration {namespace}/{name}")))
}

async fn list_registrations(
    State(state): State<AppState>,
) -> AdmiralResult<Json<Vec<MachineRegistration>>> {
    Ok(Json(state.store.list_registrations().await?))
}

async fn delete_registration(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> AdmiralResult<StatusCode> {
    if !state.store.delete_registration(&namespace, &name).await? {
        return Err(AdmiralError::NotFound(format!(
            "MachineRegistration {namespace}/{name}"
        )));
    }
    tracing::info!(%namespace, %name, "Deleted registration");
    Ok(StatusCode::NO_CONTENT)
}

async fn list_inventories(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> AdmiralResult<Json<Vec<MachineInventory>>> {
    Ok(Json(state.store.list_inventories(&namespace).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignCluster {
    cluster_name: Option<String>,
}

async fn assign_cluster(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
    Json(body): Json<AssignCluster>,
) -> AdmiralResult<Json<MachineInventory>> {
    state
        .store
        .set_inventory_cluster(&namespace, &name, body.cluster_name.as_deref())
        .await?;
    Ok(Json(state.tokens.reconcile_inventory(&namespace, &name).await?))
}

async fn remove_inventory(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> AdmiralResult<Json<MachineInventory>> {
    Ok(Json(state.tokens.remove_inventory(&namespace, &name).await?))
}

async fn put_cluster(
    State(state): State<AppState>,
    Json(cluster): Json<Cluster>,
) -> AdmiralResult<Json<Cluster>> {
    Ok(Json(state.store.put_cluster(cluster).await?))
}

async fn put_secret(
    State(state): State<AppState>,
    Json(secret): Json<Secret>,
) -> AdmiralResult<StatusCode> {
    let secret = state.store.put_secret(secret).await?;
    tracing::info!(namespace = %secret.namespace, name = %secret.name, "Stored secret");
    Ok(StatusCode::NO_CONTENT)
}

async fn put_setting(
    State(state): State<AppState>,
    Path(name): Path<String>,
    value: String,
) -> AdmiralResult<StatusCode> {
    state.settings.set(&name, value)?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn get_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/registrations",
            get(list_registrations).post(create_registration),
        )
        .route(
            "/registrations/{namespace}/{name}",
            get(get_registration).delete(delete_registration),
        )
        .route("/inventories/{namespace}", get(list_inventories))
        .route("/inventories/{namespace}/{name}", delete(remove_inventory))
        .route(
            "/inventories/{namespace}/{name}/cluster",
            put(assign_cluster),
        )
        .route("/clusters", put(put_cluster))
        .route("/secrets", put(put_secret))
        .route("/settings/{name}", put(put_setting))
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            require_admin_token,
        ))
}
