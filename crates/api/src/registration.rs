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

//! Registration tokens and cluster join tokens, plus the reconcile operations
//! that keep registration and inventory status in line with them.

use std::sync::Arc;

use chrono::Utc;
use db::Store;
use model::names::{random_token, safe_concat_name};
use model::{ClusterRegistrationToken, MachineInventory, MachineRegistration, MachineRegistrationStatus};

use crate::settings::SettingsProvider;
use crate::{AdmiralError, AdmiralResult};

pub const REGISTRATION_PATH: &str = "/v1-admiral/registration/";

/// Gives the registration a token unless it already has one. Returns the
/// token in effect.
pub fn ensure_registration_token(registration: &mut MachineRegistration) -> &str {
    let token = &mut registration.status.registration_token;
    if token.as_deref().is_none_or(str::is_empty) {
        *token = Some(random_token());
    }
    token.as_deref().unwrap_or_default()
}

pub fn build_registration_url(server_url: &str, token: &str) -> AdmiralResult<String> {
    if server_url.is_empty() {
        return Err(AdmiralError::Configuration("server-url is not set".to_string()));
    }
    Ok(format!(
        "{}{REGISTRATION_PATH}{token}",
        server_url.trim_end_matches('/')
    ))
}

pub struct RegistrationTokenManager {
    store: Arc<dyn Store>,
    settings: Arc<dyn SettingsProvider>,
}

impl RegistrationTokenManager {
    pub fn new(store: Arc<dyn Store>, settings: Arc<dyn SettingsProvider>) -> Self {
        RegistrationTokenManager { store, settings }
    }

    #[tracing::instrument(skip(self))]
    pub async fn reconcile_registration(
        &self,
        namespace: &str,
        name: &str,
    ) -> AdmiralResult<MachineRegistration> {
        let server_url = self.settings.server_url()?;
        let mut registration = self
            .store
            .get_registration(namespace, name)
            .await?
            .ok_or_else(|| {
                AdmiralError::NotFound(format!("MachineRegistration {namespace}/{name}"))
            })?;

        let token = ensure_registration_token(&mut registration).to_string();
        registration.status.registration_url = Some(build_registration_url(&server_url, &token)?);
        let stored = self
            .store
            .update_registration_status(namespace, name, &registration.status)
            .await?;

        // Someone else stored a token first; theirs is kept, so point the URL at it.
        match stored.status.registration_token.as_deref() {
            Some(winner) if winner != token => {
                let status = MachineRegistrationStatus {
                    registration_url: Some(build_registration_url(&server_url, winner)?),
                    registration_token: Some(winner.to_string()),
                };
                Ok(self
                    .store
                    .update_registration_status(namespace, name, &status)
                    .await?)
            }
            _ => Ok(stored),
        }
    }

    /// The join token for `machine_name` in cluster namespace
    /// `cluster_internal_name`. Concurrent callers converge on one stored token.
    pub async fn ensure_cluster_join_token(
        &self,
        cluster_internal_name: &str,
        machine_name: &str,
    ) -> AdmiralResult<ClusterRegistrationToken> {
        let name = safe_concat_name(&[cluster_internal_name, machine_name, "token"]);
        let outcome = self
            .store
            .create_cluster_token_if_absent(ClusterRegistrationToken {
                namespace: cluster_internal_name.to_string(),
                name,
                cluster_name: cluster_internal_name.to_string(),
                token: random_token(),
                created: Utc::now(),
            })
            .await?;
        if outcome.is_created() {
            tracing::info!(
                cluster = cluster_internal_name,
                machine = machine_name,
                "Created cluster join token"
            );
        }
        Ok(outcome.into_inner())
    }

    #[tracing::instrument(skip(self))]
    pub async fn reconcile_inventory(
        &self,
        namespace: &str,
        name: &str,
    ) -> AdmiralResult<MachineInventory> {
        let inventory = self
            .store
            .get_inventory(namespace, name)
            .await?
            .ok_or_else(|| AdmiralError::NotFound(format!("MachineInventory {namespace}/{name}")))?;

        let Some(cluster_name) = inventory.spec.cluster_name.as_deref() else {
            return Ok(inventory);
        };
        let cluster = self
            .store
            .get_cluster(namespace, cluster_name)
            .await?
            .ok_or_else(|| AdmiralError::NotFound(format!("Cluster {namespace}/{cluster_name}")))?;
        let Some(internal_name) = cluster.internal_name.as_deref() else {
            return Err(AdmiralError::Pending(format!(
                "waiting for cluster {namespace}/{cluster_name} to be created"
            )));
        };

        let token = self.ensure_cluster_join_token(internal_name, name).await?;
        Ok(self
            .store
            .set_inventory_join_token(namespace, name, &token.namespace, &token.name)
            .await?)
    }

    /// Deletes the inventory along with the join token its status points at.
    #[tracing::instrument(skip(self))]
    pub async fn remove_inventory(
        &self,
        namespace: &str,
        name: &str,
    ) -> AdmiralResult<MachineInventory> {
        let inventory = self
            .store
            .get_inventory(namespace, name)
            .await?
            .ok_or_else(|| AdmiralError::NotFound(format!("MachineInventory {namespace}/{name}")))?;

        if let Some((token_namespace, token_name)) = inventory.status.join_token_ref() {
            if !self
                .store
                .delete_cluster_token(token_namespace, token_name)
                .await?
            {
                tracing::debug!(token_namespace, token_name, "Join token already gone");
            }
        }

        self.store.delete_inventory(namespace, name).await?;
        tracing::info!("Removed machine inventory");
        Ok(inventory)
    }
}
