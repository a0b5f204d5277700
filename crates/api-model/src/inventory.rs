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

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{FromRow, Row};

use crate::names::generated_name;

///
/// A machine admitted to the fleet. At most one inventory exists per TPM hash.
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineInventory {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    pub spec: MachineInventorySpec,
    #[serde(default)]
    pub status: MachineInventoryStatus,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineInventorySpec {
    #[serde(rename = "tpmHash")]
    pub tpm_hash: String,
    #[serde(default)]
    pub smbios: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineInventoryStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_registration_token_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_registration_token_namespace: Option<String>,
}

impl MachineInventoryStatus {
    /// The join-token reference, once both halves have been recorded.
    pub fn join_token_ref(&self) -> Option<(&str, &str)> {
        match (
            self.cluster_registration_token_namespace.as_deref(),
            self.cluster_registration_token_name.as_deref(),
        ) {
            (Some(ns), Some(name)) if !ns.is_empty() && !name.is_empty() => Some((ns, name)),
            _ => None,
        }
    }
}

/// An inventory that has not been persisted yet. The store picks the final
/// name from `generate_name`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMachineInventory {
    pub namespace: String,
    pub generate_name: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub spec: MachineInventorySpec,
}

impl NewMachineInventory {
    pub fn into_inventory(self) -> MachineInventory {
        MachineInventory {
            name: generated_name(&self.generate_name),
            namespace: self.namespace,
            labels: self.labels,
            annotations: self.annotations,
            spec: self.spec,
            status: MachineInventoryStatus::default(),
            created: Utc::now(),
        }
    }
}

impl<'r> FromRow<'r, PgRow> for MachineInventory {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let labels: Json<BTreeMap<String, String>> = row.try_get("labels")?;
        let annotations: Json<BTreeMap<String, String>> = row.try_get("annotations")?;
        let smbios: Json<Map<String, Value>> = row.try_get("smbios")?;

        Ok(MachineInventory {
            namespace: row.try_get("namespace")?,
            name: row.try_get("name")?,
            labels: labels.0,
            annotations: annotations.0,
            spec: MachineInventorySpec {
                tpm_hash: row.try_get("tpm_hash")?,
                smbios: smbios.0,
                cluster_name: row.try_get("cluster_name")?,
            },
            status: MachineInventoryStatus {
                cluster_registration_token_name: row
                    .try_get("cluster_registration_token_name")?,
                cluster_registration_token_namespace: row
                    .try_get("cluster_registration_token_namespace")?,
            },
            created: row.try_get("created")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_token_ref() {
        let mut status = MachineInventoryStatus::default();
        assert_eq!(status.join_token_ref(), None);

        status.cluster_registration_token_name = Some("c-1-m-token".to_string());
        assert_eq!(status.join_token_ref(), None);

        status.cluster_registration_token_namespace = Some("c-1".to_string());
        assert_eq!(status.join_token_ref(), Some(("c-1", "c-1-m-token")));
    }

    #[test]
    fn test_into_inventory_uses_generate_name() {
        let new = NewMachineInventory {
            namespace: "fleet-default".to_string(),
            generate_name: "m-acme-".to_string(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            spec: MachineInventorySpec {
                tpm_hash: "abc".to_string(),
                ..Default::default()
            },
        };
        let inv = new.into_inventory();
        assert!(inv.name.starts_with("m-acme-"));
        assert_eq!(inv.name.len(), "m-acme-".len() + 5);
        assert_eq!(inv.spec.tpm_hash, "abc");
        assert_eq!(inv.status, MachineInventoryStatus::default());
    }
}
