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
use model::{
    Cluster, ClusterRegistrationToken, MachineInventory, MachineRegistration,
    MachineRegistrationStatus, NewMachineInventory, Secret,
};
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres};

use crate::store::{ClusterStore, ClusterTokenStore, InventoryStore, RegistrationStore, SecretStore};
use crate::{CreateOutcome, DatabaseError, DatabaseResult, cluster, inventory, registration, secret};

/// PostgreSQL backed store. Each operation runs on its own pooled connection
/// and relies on table constraints for uniqueness.
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> DatabaseResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(DatabaseError::Connection)?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn conn(&self) -> DatabaseResult<PoolConnection<Postgres>> {
        self.pool.acquire().await.map_err(DatabaseError::Connection)
    }
}

#[async_trait]
impl RegistrationStore for PgStore {
    async fn create_registration(
        &self,
        registration: MachineRegistration,
    ) -> DatabaseResult<MachineRegistration> {
        registration::insert(&mut *self.conn().await?, &registration).await
    }

    async fn get_registration(
        &self,
        namespace: &str,
        name: &str,
    ) -> DatabaseResult<Option<MachineRegistration>> {
        registration::find_by_key(&mut *self.conn().await?, namespace, name).await
    }

    async fn find_registrations_by_token(
        &self,
        token: &str,
    ) -> DatabaseResult<Vec<MachineRegistration>> {
        registration::find_by_token(&mut *self.conn().await?, token).await
    }

    async fn list_registrations(&self) -> DatabaseResult<Vec<MachineRegistration>> {
        registration::find_all(&mut *self.conn().await?).await
    }

    async fn update_registration_status(
        &self,
        namespace: &str,
        name: &str,
        status: &MachineRegistrationStatus,
    ) -> DatabaseResult<MachineRegistration> {
        registration::update_status(&mut *self.conn().await?, namespace, name, status).await
    }

    async fn delete_registration(&self, namespace: &str, name: &str) -> DatabaseResult<bool> {
        registration::delete(&mut *self.conn().await?, namespace, name).await
    }
}

#[async_trait]
impl InventoryStore for PgStore {
    async fn create_inventory_if_absent(
        &self,
        new: NewMachineInventory,
    ) -> DatabaseResult<CreateOutcome<MachineInventory>> {
        inventory::insert_if_absent(&mut *self.conn().await?, &new).await
    }

    async fn find_inventories_by_hash(
        &self,
        tpm_hash: &str,
    ) -> DatabaseResult<Vec<MachineInventory>> {
        inventory::find_by_hash(&mut *self.conn().await?, tpm_hash).await
    }

    async fn get_inventory(
        &self,
        namespace: &str,
        name: &str,
    ) -> DatabaseResult<Option<MachineInventory>> {
        inventory::find_by_key(&mut *self.conn().await?, namespace, name).await
    }

    async fn list_inventories(&self, namespace: &str) -> DatabaseResult<Vec<MachineInventory>> {
        inventory::find_by_namespace(&mut *self.conn().await?, namespace).await
    }

    async fn set_inventory_cluster(
        &self,
        namespace: &str,
        name: &str,
        cluster_name: Option<&str>,
    ) -> DatabaseResult<MachineInventory> {
        inventory::update_cluster(&mut *self.conn().await?, namespace, name, cluster_name).await
    }

    async fn set_inventory_join_token(
        &self,
        namespace: &str,
        name: &str,
        token_namespace: &str,
        token_name: &str,
    ) -> DatabaseResult<MachineInventory> {
        inventory::set_join_token(
            &mut *self.conn().await?,
            namespace,
            name,
            token_namespace,
            token_name,
        )
        .await
    }

    async fn delete_inventory(
        &self,
        namespace: &str,
        name: &str,
    ) -> DatabaseResult<Option<MachineInventory>> {
        inventory::delete(&mut *self.conn().await?, namespace, name).await
    }
}

#[async_trait]
impl ClusterTokenStore for PgStore {
    async fn create_cluster_token_if_absent(
        &self,
        token: ClusterRegistrationToken,
    ) -> DatabaseResult<CreateOutcome<ClusterRegistrationToken>> {
        cluster::insert_token_if_absent(&mut *self.conn().await?, &token).await
    }

    async fn get_cluster_token(
        &self,
        namespace: &str,
        name: &str,
    ) -> DatabaseResult<Option<ClusterRegistrationToken>> {
        cluster::find_token_by_key(&mut *self.conn().await?, namespace, name).await
    }

    async fn delete_cluster_token(&self, namespace: &str, name: &str) -> DatabaseResult<bool> {
        cluster::delete_token(&mut *self.conn().await?, namespace, name).await
    }
}

#[async_trait]
impl ClusterStore for PgStore {
    async fn get_cluster(&self, namespace: &str, name: &str) -> DatabaseResult<Option<Cluster>> {
        cluster::find_by_key(&mut *self.conn().await?, namespace, name).await
    }

    async fn put_cluster(&self, cluster: Cluster) -> DatabaseResult<Cluster> {
        cluster::upsert(&mut *self.conn().await?, &cluster).await
    }
}

#[async_trait]
impl SecretStore for PgStore {
    async fn get_secret(&self, namespace: &str, name: &str) -> DatabaseResult<Option<Secret>> {
        secret::find_by_key(&mut *self.conn().await?, namespace, name).await
    }

    async fn put_secret(&self, secret: Secret) -> DatabaseResult<Secret> {
        secret::upsert(&mut *self.conn().await?, &secret).await
    }

    async fn find_secrets_by_token_hash(&self, token_hash: &str) -> DatabaseResult<Vec<Secret>> {
        secret::find_by_token_hash(&mut *self.conn().await?, token_hash).await
    }
}
