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

use crate::machine_name::DEFAULT_NAME_TEMPLATE;
use crate::secret::TPM_CA_SECRET_NAME;

///
/// An admission policy created by a cluster operator. Machines present the
/// policy's registration token to enroll.
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineRegistration {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub spec: MachineRegistrationSpec,
    #[serde(default)]
    pub status: MachineRegistrationStatus,
    #[serde(default = "Utc::now")]
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineRegistrationSpec {
    /// `${Section/Field}` template for the generated inventory name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_name: Option<String>,
    /// Cluster that inventories admitted through this policy join.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,
    #[serde(default)]
    pub machine_inventory_labels: BTreeMap<String, String>,
    #[serde(default)]
    pub machine_inventory_annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_config: Option<Map<String, Value>>,
    /// Secret in the policy namespace holding the TPM EK trust roots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tpm_ca_secret_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineRegistrationStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_token: Option<String>,
    #[serde(default, rename = "registrationURL", skip_serializing_if = "Option::is_none")]
    pub registration_url: Option<String>,
}

impl MachineRegistration {
    pub fn name_template(&self) -> &str {
        match self.spec.machine_name.as_deref() {
            Some(template) if !template.is_empty() => template,
            _ => DEFAULT_NAME_TEMPLATE,
        }
    }

    pub fn tpm_ca_secret_name(&self) -> &str {
        self.spec
            .tpm_ca_secret_name
            .as_deref()
            .unwrap_or(TPM_CA_SECRET_NAME)
    }
}

impl<'r> FromRow<'r, PgRow> for MachineRegistration {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let labels: Json<BTreeMap<String, String>> = row.try_get("labels")?;
        let annotations: Json<BTreeMap<String, String>> = row.try_get("annotations")?;
        let cloud_config: Option<Json<Map<String, Value>>> = row.try_get("cloud_config")?;

        Ok(MachineRegistration {
            namespace: row.try_get("namespace")?,
            name: row.try_get("name")?,
            spec: MachineRegistrationSpec {
                machine_name: row.try_get("machine_name")?,
                cluster_name: row.try_get("cluster_name")?,
                machine_inventory_labels: labels.0,
                machine_inventory_annotations: annotations.0,
                cloud_config: cloud_config.map(|c| c.0),
                tpm_ca_secret_name: row.try_get("tpm_ca_secret_name")?,
            },
            status: MachineRegistrationStatus {
                registration_token: row.try_get("registration_token")?,
                registration_url: row.try_get("registration_url")?,
            },
            created: row.try_get("created")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_deserialize_minimal() {
        let reg: MachineRegistration =
            serde_json::from_value(json!({"namespace": "fleet-default", "name": "edge"}))
                .unwrap();
        assert_eq!(reg.name_template(), DEFAULT_NAME_TEMPLATE);
        assert_eq!(reg.tpm_ca_secret_name(), TPM_CA_SECRET_NAME);
        assert!(reg.status.registration_token.is_none());
    }

    #[test]
    fn test_status_serializes_registration_url() {
        let status = MachineRegistrationStatus {
            registration_token: Some("tok".to_string()),
            registration_url: Some("https://a/v1-admiral/registration/tok".to_string()),
        };
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            json!({
                "registrationToken": "tok",
                "registrationURL": "https://a/v1-admiral/registration/tok",
            })
        );
    }
}
