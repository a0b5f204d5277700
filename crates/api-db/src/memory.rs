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

//! In-process store. A single lock guards all tables, taken once per call, so
//! every operation is atomic and the store is linearizable.

use std::collections::BTreeMap;

use async_trait::async_trait;
use model::{
    Cluster, ClusterRegistrationToken, MachineInventory, MachineRegistration,
    MachineRegistrationStatus, NewMachineInventory, Secret,
};
use tokio::sync::RwLock;

use crate::store::{ClusterStore, ClusterTokenStore, InventoryStore, RegistrationStore, SecretStore};
use crate::{CreateOutcome, DatabaseError, DatabaseResult};

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

#[derive(Default)]
struct Tables {
    registrations: BTreeMap<Key, MachineRegistration>,
    inventories: BTreeMap<Key, MachineInventory>,
    cluster_tokens: BTreeMap<Key, ClusterRegistrationToken>,
    clusters: BTreeMap<Key, Cluster>,
    secrets: BTreeMap<Key, Secret>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegistrationStore for MemoryStore {
    async fn create_registration(
        &self,
        registration: MachineRegistration,
    ) -> DatabaseResult<MachineRegistration> {
        let mut tables = self.tables.write().await;
        let k = key(&registration.namespace, &registration.name);
        if tables.registrations.contains_key(&k) {
            return Err(DatabaseError::AlreadyFoundError {
                kind: "MachineRegistration",
                id: format!("{}/{}", k.0, k.1),
            });
        }
        tables.registrations.insert(k, registration.clone());
        Ok(registration)
    }

    async fn get_registration(
        &self,
        namespace: &str,
        name: &str,
    ) -> DatabaseResult<Option<MachineRegistration>> {
        let tables = self.tables.read().await;
        Ok(tables.registrations.get(&key(namespace, name)).cloned())
    }

    async fn find_registrations_by_token(
        &self,
        token: &str,
    ) -> DatabaseResult<Vec<MachineRegistration>> {
        let tables = self.tables.read().await;
        Ok(tables
            .registrations
            .values()
            .filter(|r| r.status.registration_token.as_deref() == Some(token))
            .cloned()
            .collect())
    }

    async fn list_registrations(&self) -> DatabaseResult<Vec<MachineRegistration>> {
        let tables = self.tables.read().await;
        Ok(tables.registrations.values().cloned().collect())
    }

    async fn update_registration_status(
        &self,
        namespace: &str,
        name: &str,
        status: &MachineRegistrationStatus,
    ) -> DatabaseResult<MachineRegistration> {
        let mut tables = self.tables.write().await;
        let registration = tables
            .registrations
            .get_mut(&key(namespace, name))
            .ok_or_else(|| DatabaseError::not_found("MachineRegistration", namespace, name))?;

        if registration.status.registration_token.is_none() {
            registration.status.registration_token = status.registration_token.clone();
        }
        registration.status.registration_url = status.registration_url.clone();
        Ok(registration.clone())
    }

    async fn delete_registration(&self, namespace: &str, name: &str) -> DatabaseResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables.registrations.remove(&key(namespace, name)).is_some())
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn create_inventory_if_absent(
        &self,
        inventory: NewMachineInventory,
    ) -> DatabaseResult<CreateOutcome<MachineInventory>> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables
            .inventories
            .values()
            .find(|i| i.spec.tpm_hash == inventory.spec.tpm_hash)
        {
            return Ok(CreateOutcome::Existing(existing.clone()));
        }

        let prefix = inventory.generate_name.clone();
        let mut created = inventory.into_inventory();
        while tables
            .inventories
            .contains_key(&key(&created.namespace, &created.name))
        {
            created.name = model::names::generated_name(&prefix);
        }
        tables.inventories.insert(
            key(&created.namespace, &created.name),
            created.clone(),
        );
        Ok(CreateOutcome::Created(created))
    }

    async fn find_inventories_by_hash(
        &self,
        tpm_hash: &str,
    ) -> DatabaseResult<Vec<MachineInventory>> {
        let tables = self.tables.read().await;
        Ok(tables
            .inventories
            .values()
            .filter(|i| i.spec.tpm_hash == tpm_hash)
            .cloned()
            .collect())
    }

    async fn get_inventory(
        &self,
        namespace: &str,
        name: &str,
    ) -> DatabaseResult<Option<MachineInventory>> {
        let tables = self.tables.read().await;
        Ok(tables.inventories.get(&key(namespace, name)).cloned())
    }

    async fn list_inventories(&self, namespace: &str) -> DatabaseResult<Vec<MachineInventory>> {
        let tables = self.tables.read().await;
        Ok(tables
            .inventories
            .values()
            .filter(|i| i.namespace == namespace)
            .cloned()
            .collect())
    }

    async fn set_inventory_cluster(
        &self,
        namespace: &str,
        name: &str,
        cluster_name: Option<&str>,
    ) -> DatabaseResult<MachineInventory> {
        let mut tables = self.tables.write().await;
        let inventory = tables
            .inventories
            .get_mut(&key(namespace, name))
            .ok_or_else(|| DatabaseError::not_found("MachineInventory", namespace, name))?;
        inventory.spec.cluster_name = cluster_name.map(str::to_string);
        Ok(inventory.clone())
    }

    async fn set_inventory_join_token(
        &self,
        namespace: &str,
        name: &str,
        token_namespace: &str,
        token_name: &str,
    ) -> DatabaseResult<MachineInventory> {
        let mut tables = self.tables.write().await;
        let inventory = tables
            .inventories
            .get_mut(&key(namespace, name))
            .ok_or_else(|| DatabaseError::not_found("MachineInventory", namespace, name))?;

        let status = &mut inventory.status;
        if status.join_token_ref().is_none() {
            status.cluster_registration_token_namespace = Some(token_namespace.to_string());
            status.cluster_registration_token_name = Some(token_name.to_string());
        }
        Ok(inventory.clone())
    }

    async fn delete_inventory(
        &self,
        namespace: &str,
        name: &str,
    ) -> DatabaseResult<Option<MachineInventory>> {
        let mut tables = self.tables.write().await;
        Ok(tables.inventories.remove(&key(namespace, name)))
    }
}

#[async_trait]
impl ClusterTokenStore for MemoryStore {
    async fn create_cluster_token_if_absent(
        &self,
        token: ClusterRegistrationToken,
    ) -> DatabaseResult<CreateOutcome<ClusterRegistrationToken>> {
        let mut tables = self.tables.write().await;
        let k = key(&token.namespace, &token.name);
        if let Some(existing) = tables.cluster_tokens.get(&k) {
            return Ok(CreateOutcome::Existing(existing.clone()));
        }
        tables.cluster_tokens.insert(k, token.clone());
        Ok(CreateOutcome::Created(token))
    }

    async fn get_cluster_token(
        &self,
        namespace: &str,
        name: &str,
    ) -> DatabaseResult<Option<ClusterRegistrationToken>> {
        let tables = self.tables.read().await;
        Ok(tables.cluster_tokens.get(&key(namespace, name)).cloned())
    }

    async fn delete_cluster_token(&self, namespace: &str, name: &str) -> DatabaseResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables.cluster_tokens.remove(&key(namespace, name)).is_some())
    }
}

#[async_trait]
impl ClusterStore for MemoryStore {
    async fn get_cluster(&self, namespace: &str, name: &str) -> DatabaseResult<Option<Cluster>> {
        let tables = self.tables.read().await;
        Ok(tables.clusters.get(&key(namespace, name)).cloned())
    }

    async fn put_cluster(&self, cluster: Cluster) -> DatabaseResult<Cluster> {
        let mut tables = self.tables.write().await;
        tables
            .clusters
            .insert(key(&cluster.namespace, &cluster.name), cluster.clone());
        Ok(cluster)
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn get_secret(&self, namespace: &str, name: &str) -> DatabaseResult<Option<Secret>> {
        let tables = self.tables.read().await;
        Ok(tables.secrets.get(&key(namespace, name)).cloned())
    }

    async fn put_secret(&self, secret: Secret) -> DatabaseResult<Secret> {
        let mut tables = self.tables.write().await;
        tables
            .secrets
            .insert(key(&secret.namespace, &secret.name), secret.clone());
        Ok(secret)
    }

    async fn find_secrets_by_token_hash(&self, token_hash: &str) -> DatabaseResult<Vec<Secret>> {
        let tables = self.tables.read().await;
        Ok(tables
            .secrets
            .values()
            .filter(|s| s.token_hash().as_deref() == Some(token_hash))
            .cloned()
            .collect())
    }
}
