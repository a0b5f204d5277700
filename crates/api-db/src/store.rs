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

//! Store capabilities. Handlers depend on these traits only, so the same logic
//! runs against the in-memory store and PostgreSQL.
//!
//! Every operation is a single linearizable step. Uniqueness (one inventory per
//! TPM hash, one join token per deterministic name) is enforced by the store
//! itself, never by a check followed by a write in the caller.

use async_trait::async_trait;
use model::{
    Cluster, ClusterRegistrationToken, MachineInventory, MachineRegistration,
    MachineRegistrationStatus, NewMachineInventory, Secret,
};

use crate::{CreateOutcome, DatabaseResult};

#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Fails with `AlreadyFoundError` if `(namespace, name)` is taken.
    async fn create_registration(
        &self,
        registration: MachineRegistration,
    ) -> DatabaseResult<MachineRegistration>;

    async fn get_registration(
        &self,
        namespace: &str,
        name: &str,
    ) -> DatabaseResult<Option<MachineRegistration>>;

    /// Every registration carrying `token`. More than one result is a data
    /// integrity problem the caller has to reject.
    async fn find_registrations_by_token(
        &self,
        token: &str,
    ) -> DatabaseResult<Vec<MachineRegistration>>;

    async fn list_registrations(&self) -> DatabaseResult<Vec<MachineRegistration>>;

    /// Writes the status. A registration token that is already stored is kept,
    /// whatever `status` carries; the returned record holds the effective values.
    async fn update_registration_status(
        &self,
        namespace: &str,
        name: &str,
        status: &MachineRegistrationStatus,
    ) -> DatabaseResult<MachineRegistration>;

    async fn delete_registration(&self, namespace: &str, name: &str) -> DatabaseResult<bool>;
}

#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Creates the inventory unless one with the same TPM hash exists, in which
    /// case that one is returned untouched.
    async fn create_inventory_if_absent(
        &self,
        inventory: NewMachineInventory,
    ) -> DatabaseResult<CreateOutcome<MachineInventory>>;

    async fn find_inventories_by_hash(
        &self,
        tpm_hash: &str,
    ) -> DatabaseResult<Vec<MachineInventory>>;

    async fn get_inventory(
        &self,
        namespace: &str,
        name: &str,
    ) -> DatabaseResult<Option<MachineInventory>>;

    async fn list_inventories(&self, namespace: &str) -> DatabaseResult<Vec<MachineInventory>>;

    async fn set_inventory_cluster(
        &self,
        namespace: &str,
        name: &str,
        cluster_name: Option<&str>,
    ) -> DatabaseResult<MachineInventory>;

    /// Records the join-token reference. A reference that is already set is
    /// never replaced.
    async fn set_inventory_join_token(
        &self,
        namespace: &str,
        name: &str,
        token_namespace: &str,
        token_name: &str,
    ) -> DatabaseResult<MachineInventory>;

    async fn delete_inventory(
        &self,
        namespace: &str,
        name: &str,
    ) -> DatabaseResult<Option<MachineInventory>>;
}

#[async_trait]
pub trait ClusterTokenStore: Send + Sync {
    async fn create_cluster_token_if_absent(
        &self,
        token: ClusterRegistrationToken,
    ) -> DatabaseResult<CreateOutcome<ClusterRegistrationToken>>;

    async fn get_cluster_token(
        &self,
        namespace: &str,
        name: &str,
    ) -> DatabaseResult<Option<ClusterRegistrationToken>>;

    /// Returns whether a token was removed; a missing token is not an error.
    async fn delete_cluster_token(&self, namespace: &str, name: &str) -> DatabaseResult<bool>;
}

#[async_trait]
pub trait ClusterStore: Send + Sync {
    async fn get_cluster(&self, namespace: &str, name: &str) -> DatabaseResult<Option<Cluster>>;

    async fn put_cluster(&self, cluster: Cluster) -> DatabaseResult<Cluster>;
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(&self, namespace: &str, name: &str) -> DatabaseResult<Option<Secret>>;

    async fn put_secret(&self, secret: Secret) -> DatabaseResult<Secret>;

    /// Secrets whose `token` data hashes to `token_hash` (see
    /// [`model::secret::token_hash`]).
    async fn find_secrets_by_token_hash(&self, token_hash: &str) -> DatabaseResult<Vec<Secret>>;
}

pub trait Store:
    RegistrationStore + InventoryStore + ClusterTokenStore + ClusterStore + SecretStore
{
}

impl<T> Store for T where
    T: RegistrationStore + InventoryStore + ClusterTokenStore + ClusterStore + SecretStore
{
}
