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

use model::Secret;
use model::secret::EncodedData;
use sqlx::PgConnection;
use sqlx::types::Json;

use crate::{DatabaseError, DatabaseResult};

pub async fn find_by_key(
    txn: &mut PgConnection,
    namespace: &str,
    name: &str,
) -> DatabaseResult<Option<Secret>> {
    let query = "SELECT * FROM secrets WHERE namespace = $1 AND name = $2";

    sqlx::query_as(query)
        .bind(namespace)
        .bind(name)
        .fetch_optional(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn upsert(txn: &mut PgConnection, secret: &Secret) -> DatabaseResult<Secret> {
    let query = "INSERT INTO secrets (namespace, name, data, token_hash) VALUES ($1, $2, $3, $4)
        ON CONFLICT (namespace, name) DO UPDATE SET data = EXCLUDED.data, token_hash = EXCLUDED.token_hash
        RETURNING *";

    sqlx::query_as(query)
        .bind(&secret.namespace)
        .bind(&secret.name)
        .bind(Json(EncodedData(secret.data.clone())))
        .bind(secret.token_hash())
        .fetch_one(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn find_by_token_hash(
    txn: &mut PgConnection,
    token_hash: &str,
) -> DatabaseResult<Vec<Secret>> {
    let query = "SELECT * FROM secrets WHERE token_hash = $1";

    sqlx::query_as(query)
        .bind(token_hash)
        .fetch_all(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}
