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

pub mod cluster;
pub mod inventory;
pub mod memory;
pub mod migrations;
pub mod pg;
pub mod registration;
pub mod secret;
pub mod store;

pub use memory::MemoryStore;
pub use pg::PgStore;
pub use store::{
    ClusterStore, ClusterTokenStore, InventoryStore, RegistrationStore, SecretStore, Store,
};

#[derive(thiserror::Error, Debug)]
pub enum DatabaseError {
    #[error("Database query {query} failed: {source}")]
    Query {
        query: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("Unable to acquire a database connection: {0}")]
    Connection(#[source] sqlx::Error),
    #[error("{kind} not found: {id}")]
    NotFoundError { kind: &'static str, id: String },
    #[error("{kind} already exists: {id}")]
    AlreadyFoundError { kind: &'static str, id: String },
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl DatabaseError {
    pub fn query(query: &str, source: sqlx::Error) -> Self {
        DatabaseError::Query {
            query: query.to_string(),
            source,
        }
    }

    pub fn not_found(kind: &'static str, namespace: &str, name: &str) -> Self {
        DatabaseError::NotFoundError {
            kind,
            id: format!("{namespace}/{name}"),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::NotFoundError { .. })
    }
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Result of a conditional create. Finding the record already present is a
/// success, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome<T> {
    Created(T),
    Existing(T),
}

impl<T> CreateOutcome<T> {
    pub fn is_created(&self) -> bool {
        matches!(self, CreateOutcome::Created(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            CreateOutcome::Created(t) | CreateOutcome::Existing(t) => t,
        }
    }
}
