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

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use db::Store;
use hmac::{Hmac, Mac};
use http::HeaderMap;
use http::header::AUTHORIZATION;
use sha2::Sha512;

use crate::metrics;
use crate::settings::SettingsProvider;
use crate::{AdmiralError, AdmiralResult};

pub const NONCE_HEADER: &str = "x-cattle-nonce";
pub const HASH_HEADER: &str = "x-cattle-hash";

type HmacSha512 = Hmac<Sha512>;

/// What `GET /cacerts` answers with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaCerts {
    pub body: String,
    /// `X-Cattle-Hash`, present only when the caller proved it shares a key
    /// with us.
    pub hash: Option<String>,
}

/// Blank bundles become an empty body; anything else ends in exactly the
/// newline it needs.
pub fn normalize_bundle(ca: &str) -> String {
    if ca.trim().is_empty() {
        String::new()
    } else if ca.ends_with('\n') {
        ca.to_string()
    } else {
        format!("{ca}\n")
    }
}

/// base64(HMAC-SHA512(key, nonce || 0x00 || body || 0x00))
pub fn cattle_hash(key: &[u8], nonce: &[u8], body: &[u8]) -> AdmiralResult<String> {
    let mut mac = HmacSha512::new_from_slice(key)
        .map_err(|e| AdmiralError::InvalidArgument(format!("hmac key: {e}")))?;
    mac.update(nonce);
    mac.update(&[0]);
    mac.update(body);
    mac.update(&[0]);
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

pub struct CaDisclosure {
    store: Arc<dyn Store>,
    settings: Arc<dyn SettingsProvider>,
}

impl CaDisclosure {
    pub fn new(store: Arc<dyn Store>, settings: Arc<dyn SettingsProvider>) -> Self {
        CaDisclosure { store, settings }
    }

    /// Never fails: a caller that cannot be matched to a key simply gets the
    /// bundle without a hash.
    pub async fn disclose(&self, headers: &HeaderMap) -> CaCerts {
        let body = normalize_bundle(&self.settings.cacert());

        let nonce = header_str(headers, NONCE_HEADER);
        let bearer = header_str(headers, AUTHORIZATION.as_str());
        let bearer = bearer.strip_prefix("Bearer ").unwrap_or(bearer);

        let mut hash = None;
        if !nonce.is_empty() && !bearer.is_empty() {
            match self.signing_key(bearer).await {
                Ok(Some(key)) => match cattle_hash(&key, nonce.as_bytes(), body.as_bytes()) {
                    Ok(h) => hash = Some(h),
                    Err(e) => tracing::warn!(error = %e, "Unable to sign CA bundle"),
                },
                Ok(None) => tracing::debug!("No key matches the presented cacerts credential"),
                Err(e) => tracing::warn!(error = %e, "Looking up cacerts signing key failed"),
            }
        }

        metrics::record_cacerts_request(hash.is_some());
        CaCerts { body, hash }
    }

    /// The shared key behind `bearer`: the token of a secret indexed under
    /// that hash, or else the TPM hash of the one machine carrying it.
    async fn signing_key(&self, bearer: &str) -> AdmiralResult<Option<Vec<u8>>> {
        let secrets = self.store.find_secrets_by_token_hash(bearer).await?;
        if let Some(token) = secrets.iter().find_map(|s| s.token()) {
            return Ok(Some(token.to_vec()));
        }

        let machines = self.store.find_inventories_by_hash(bearer).await?;
        match machines.as_slice() {
            [machine] => Ok(Some(machine.spec.tpm_hash.clone().into_bytes())),
            _ => Ok(None),
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}
