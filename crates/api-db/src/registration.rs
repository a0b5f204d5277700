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

use model::{MachineRegistration, MachineRegistrationStatus};
use sqlx::PgConnection;
use sqlx::types::Json;

use crate::{DatabaseError, DatabaseResult};

pub async fn insert(
    txn: &mut PgConnection,
    registration: &MachineRegistration,
) -> DatabaseResult<MachineRegistration> {
    let query = "INSERT INTO machine_registrations
        (namespace, name, machine_name, cluster_name, labels, annotations, cloud_config,
         tpm_ca_secret_name, registration_token, registration_url, created)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (namespace, name) DO NOTHING
        RETURNING *";

    let spec = &registration.spec;
    let inserted: Option<MachineRegistration> = sqlx::query_as(query)
        .bind(&registration.namespace)
        .bind(&registration.name)
        .bind(&spec.machine_name)
        .bind(&spec.cluster_name)
        .bind(Json(&spec.machine_inventory_labels))
        .bind(Json(&spec.machine_inventory_annotations))
        .bind(spec.cloud_config.as_ref().map(Json))
        .bind(&spec.tpm_ca_secret_name)
        .bind(&registration.status.registration_token)
        .bind(&registration.status.registration_url)
        .bind(registration.created)
        .fetch_optional(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;

    inserted.ok_or_else(|| DatabaseError::AlreadyFoundError {
        kind: "MachineRegistration",
        id: format!("{}/{}", registration.namespace, registration.name),
    })
}

pub async fn find_by_key(
    txn: &mut PgConnection,
    namespace: &str,
    name: &str,
) -> DatabaseResult<Option<MachineRegistration>> {
    let query = "SELECT * FROM machine_registrations WHERE namespace = $1 AND name = $2";

    sqlx::query_as(query)
        .bind(namespace)
        .bind(name)
        .fetch_optional(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn find_by_token(
    txn: &mut PgConnection,
    token: &str,
) -> DatabaseResult<Vec<MachineRegistration>> {
    let query = "SELECT * FROM machine_registrations WHERE registration_token = $1";

    sqlx::query_as(query)
        .bind(token)
        .fetch_all(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn find_all(txn: &mut PgConnection) -> DatabaseResult<Vec<MachineRegistration>> {
    let query = "SELECT * FROM machine_registrations ORDER BY namespace, name";

    sqlx::query_as(query)
        .fetch_all(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

/// The stored token wins over the one in `status`.
pub async fn update_status(
    txn: &mut PgConnection,
    namespace: &str,
    name: &str,
    status: &MachineRegistrationStatus,
) -> DatabaseResult<MachineRegistration> {
    let query = "UPDATE machine_registrations
        SET registration_token = COALESCE(registration_token, $3), registration_url = $4
        WHERE namespace = $1 AND name = $2
        RETURNING *";

    let updated: Option<MachineRegistration> = sqlx::query_as(query)
        .bind(namespace)
        .bind(name)
        .bind(&status.registration_token)
        .bind(&status.registration_url)
        .fetch_optional(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;

    updated.ok_or_else(|| DatabaseError::not_found("MachineRegistration", namespace, name))
}

pub async fn delete(txn: &mut PgConnection, namespace: &str, name: &str) -> DatabaseResult<bool> {
    let query = "DELETE FROM machine_registrations WHERE namespace = $1 AND name = $2";

    let result = sqlx::query(query)
        .bind(namespace)
        .bind(name)
        .execute(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;
    Ok(result.rows_affected() > 0)
}
