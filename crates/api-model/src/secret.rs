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

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{FromRow, Row};

/// Default name of the per-namespace secret holding TPM EK trust roots.
pub const TPM_CA_SECRET_NAME: &str = "tpm-ca";
/// Data key of a PEM certificate bundle.
pub const TLS_CERT_KEY: &str = "tls.crt";
/// Data key of a shared token; secrets carrying one are indexed by its hash.
pub const TOKEN_KEY: &str = "token";

/// Opaque key/value material. Values are base64 in every serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub namespace: String,
    pub name: String,
    #[serde(default, with = "base64_map")]
    pub data: BTreeMap<String, Vec<u8>>,
}

impl Secret {
    pub fn token(&self) -> Option<&[u8]> {
        self.data.get(TOKEN_KEY).map(Vec::as_slice)
    }

    /// Index key for lookups by presented bearer token.
    pub fn token_hash(&self) -> Option<String> {
        self.token().map(token_hash)
    }
}

/// Lowercase hex SHA-256 of a token.
pub fn token_hash(token: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(token.as_ref()))
}

impl<'r> FromRow<'r, PgRow> for Secret {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let data: Json<EncodedData> = row.try_get("data")?;
        Ok(Secret {
            namespace: row.try_get("namespace")?,
            name: row.try_get("name")?,
            data: data.0.0,
        })
    }
}

/// JSON column representation of [`Secret::data`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedData(#[serde(with = "base64_map")] pub BTreeMap<String, Vec<u8>>);

mod base64_map {
    use std::collections::BTreeMap;

    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        data: &BTreeMap<String, Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        data.iter()
            .map(|(k, v)| (k, STANDARD.encode(v)))
            .collect::<BTreeMap<_, _>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, Vec<u8>>, D::Error> {
        BTreeMap::<String, String>::deserialize(deserializer)?
            .into_iter()
            .map(|(k, v)| {
                let decoded = STANDARD
                    .decode(v.as_bytes())
                    .map_err(|e| D::Error::custom(format!("secret key {k}: {e}")))?;
                Ok((k, decoded))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_secret_json_is_base64() {
        let secret: Secret = serde_json::from_value(json!({
            "namespace": "fleet-default",
            "name": "reg-token",
            "data": {"token": "c2VjcmV0"},
        }))
        .unwrap();
        assert_eq!(secret.token(), Some(b"secret".as_slice()));
        assert_eq!(
            secret.token_hash().as_deref(),
            Some("2bb80d537b1da3e38bd30361aa855686bde0eacd7162fef6a25fe97bf527a25b")
        );
        assert_eq!(
            serde_json::to_value(&secret).unwrap()["data"],
            json!({"token": "c2VjcmV0"})
        );
    }

    #[test]
    fn test_invalid_base64_rejected() {
        let result: Result<Secret, _> = serde_json::from_value(json!({
            "namespace": "a",
            "name": "b",
            "data": {"token": "not base64!"},
        }));
        assert!(result.is_err());
    }
}
