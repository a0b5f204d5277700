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

use model::{MachineInventory, NewMachineInventory};
use sqlx::PgConnection;
use sqlx::types::Json;

use crate::{CreateOutcome, DatabaseError, DatabaseResult};

/// Attempts at finding a free generated name before giving up.
const NAME_ATTEMPTS: usize = 5;

/// Inserts the inventory unless its TPM hash is already present. The unique
/// index on `tpm_hash` decides the winner between concurrent callers; losers
/// get the winner's record back.
pub async fn insert_if_absent(
    txn: &mut PgConnection,
    new: &NewMachineInventory,
) -> DatabaseResult<CreateOutcome<MachineInventory>> {
    let query = "INSERT INTO machine_inventories
        (namespace, name, tpm_hash, smbios, labels, annotations, cluster_name, created)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT DO NOTHING
        RETURNING *";

    for _ in 0..NAME_ATTEMPTS {
        let candidate = new.clone().into_inventory();
        let inserted: Option<MachineInventory> = sqlx::query_as(query)
            .bind(&candidate.namespace)
            .bind(&candidate.name)
            .bind(&candidate.spec.tpm_hash)
            .bind(Json(&candidate.spec.smbios))
            .bind(Json(&candidate.labels))
            .bind(Json(&candidate.annotations))
            .bind(&candidate.spec.cluster_name)
            .bind(candidate.created)
            .fetch_optional(&mut *txn)
            .await
            .map_err(|e| DatabaseError::query(query, e))?;

        if let Some(created) = inserted {
            return Ok(CreateOutcome::Created(created));
        }

        // Either the hash is taken, or the generated name collided.
        if let Some(existing) = find_by_hash(&mut *txn, &new.spec.tpm_hash)
            .await?
            .into_iter()
            .next()
        {
            return Ok(CreateOutcome::Existing(existing));
        }
        tracing::debug!(
            prefix = %new.generate_name,
            "Generated inventory name collided, retrying"
        );
    }

    Err(DatabaseError::AlreadyFoundError {
        kind: "MachineInventory",
        id: format!("{}/{}*", new.namespace, new.generate_name),
    })
}

pub async fn find_by_hash(
    txn: &mut PgConnection,
    tpm_hash: &str,
) -> DatabaseResult<Vec<MachineInventory>> {
    let query = "SELECT * FROM machine_inventories WHERE tpm_hash = $1";

    sqlx::query_as(query)
        .bind(tpm_hash)
        .fetch_all(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn find_by_key(
    txn: &mut PgConnection,
    namespace: &str,
    name: &str,
) -> DatabaseResult<Option<MachineInventory>> {
    let query = "SELECT * FROM machine_inventories WHERE namespace = $1 AND name = $2";

    sqlx::query_as(query)
        .bind(namespace)
        .bind(name)
        .fetch_optional(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn find_by_namespace(
    txn: &mut PgConnection,
    namespace: &str,
) -> DatabaseResult<Vec<MachineInventory>> {
    let query = "SELECT * FROM machine_inventories WHERE namespace = $1 ORDER BY name";

    sqlx::query_as(query)
        .bind(namespace)
        .fetch_all(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn update_cluster(
    txn: &mut PgConnection,
    namespace: &str,
    name: &str,
    cluster_name: Option<&str>,
) -> DatabaseResult<MachineInventory> {
    let query = "UPDATE machine_inventories SET cluster_name = $3
        WHERE namespace = $1 AND name = $2
        RETURNING *";

    let updated: Option<MachineInventory> = sqlx::query_as(query)
        .bind(namespace)
        .bind(name)
        .bind(cluster_name)
        .fetch_optional(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;

    updated.ok_or_else(|| DatabaseError::not_found("MachineInventory", namespace, name))
}

pub async fn set_join_token(
    txn: &mut PgConnection,
    namespace: &str,
    name: &str,
    token_namespace: &str,
    token_name: &str,
) -> DatabaseResult<MachineInventory> {
    let query = "UPDATE machine_inventories SET
            cluster_registration_token_namespace = COALESCE(cluster_registration_token_namespace, $3),
            cluster_registration_token_name = COALESCE(cluster_registration_token_name, $4)
        WHERE namespace = $1 AND name = $2
        RETURNING *";

    let updated: Option<MachineInventory> = sqlx::query_as(query)
        .bind(namespace)
        .bind(name)
        .bind(token_namespace)
        .bind(token_name)
        .fetch_optional(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;

    updated.ok_or_else(|| DatabaseError::not_found("MachineInventory", namespace, name))
}

pub async fn delete(
    txn: &mut PgConnection,
    namespace: &str,
    name: &str,
) -> DatabaseResult<Option<MachineInventory>> {
    let query = "DELETE FROM machine_inventories WHERE namespace = $1 AND name = $2 RETURNING *";

    sqlx::query_as(query)
        .bind(namespace)
        .bind(name)
        .fetch_optional(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}
