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

use model::{Cluster, ClusterRegistrationToken};
use sqlx::PgConnection;

use crate::{CreateOutcome, DatabaseError, DatabaseResult};

pub async fn find_by_key(
    txn: &mut PgConnection,
    namespace: &str,
    name: &str,
) -> DatabaseResult<Option<Cluster>> {
    let query = "SELECT * FROM clusters WHERE namespace = $1 AND name = $2";

    sqlx::query_as(query)
        .bind(namespace)
        .bind(name)
        .fetch_optional(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn upsert(txn: &mut PgConnection, cluster: &Cluster) -> DatabaseResult<Cluster> {
    let query = "INSERT INTO clusters (namespace, name, internal_name) VALUES ($1, $2, $3)
        ON CONFLICT (namespace, name) DO UPDATE SET internal_name = EXCLUDED.internal_name
        RETURNING *";

    sqlx::query_as(query)
        .bind(&cluster.namespace)
        .bind(&cluster.name)
        .bind(&cluster.internal_name)
        .fetch_one(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn insert_token_if_absent(
    txn: &mut PgConnection,
    token: &ClusterRegistrationToken,
) -> DatabaseResult<CreateOutcome<ClusterRegistrationToken>> {
    let query = "INSERT INTO cluster_registration_tokens (namespace, name, cluster_name, token, created)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (namespace, name) DO NOTHING
        RETURNING *";

    let inserted: Option<ClusterRegistrationToken> = sqlx::query_as(query)
        .bind(&token.namespace)
        .bind(&token.name)
        .bind(&token.cluster_name)
        .bind(&token.token)
        .bind(token.created)
        .fetch_optional(&mut *txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;

    if let Some(created) = inserted {
        return Ok(CreateOutcome::Created(created));
    }
    find_token_by_key(txn, &token.namespace, &token.name)
        .await?
        .map(CreateOutcome::Existing)
        // Deleted between the conflicting insert and this read.
        .ok_or_else(|| DatabaseError::not_found("ClusterRegistrationToken", &token.namespace, &token.name))
}

pub async fn find_token_by_key(
    txn: &mut PgConnection,
    namespace: &str,
    name: &str,
) -> DatabaseResult<Option<ClusterRegistrationToken>> {
    let query = "SELECT * FROM cluster_registration_tokens WHERE namespace = $1 AND name = $2";

    sqlx::query_as(query)
        .bind(namespace)
        .bind(name)
        .fetch_optional(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn delete_token(
    txn: &mut PgConnection,
    namespace: &str,
    name: &str,
) -> DatabaseResult<bool> {
    let query = "DELETE FROM cluster_registration_tokens WHERE namespace = $1 AND name = $2";

    let result = sqlx::query(query)
        .bind(namespace)
        .bind(name)
        .execute(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;
    Ok(result.rows_affected() > 0)
}
