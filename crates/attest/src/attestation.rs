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

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::ak::AttestationParameters;
use crate::ek::EndorsementKey;
use crate::{AttestError, AttestResult};

/// Prefix of an `Authorization` header value carrying attestation data.
pub const TPM_BEARER_PREFIX: &str = "Bearer TPM";

/// Endorsement key material as sent by the client. At least one of the two is
/// required.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EkData {
    #[serde(
        default,
        with = "crate::b64::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub public: Option<Vec<u8>>,
    #[serde(
        default,
        with = "crate::b64::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub certificate: Option<Vec<u8>>,
}

/// Everything a machine presents up front to start attestation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttestationData {
    pub ek: EkData,
    pub ak: AttestationParameters,
}

impl AttestationData {
    /// Decodes the attestation data out of an `Authorization` header value.
    pub fn from_authorization(header: &str) -> AttestResult<Self> {
        let encoded = header.strip_prefix(TPM_BEARER_PREFIX).ok_or_else(|| {
            AttestError::Decode(format!("authorization is not a {TPM_BEARER_PREFIX} token"))
        })?;
        let json = STANDARD.decode(encoded.trim())?;
        Ok(serde_json::from_slice(&json)?)
    }

    pub fn to_authorization(&self) -> AttestResult<String> {
        let json = serde_json::to_vec(self)?;
        Ok(format!("{TPM_BEARER_PREFIX}{}", STANDARD.encode(json)))
    }

    pub fn endorsement_key(&self) -> AttestResult<EndorsementKey> {
        EndorsementKey::new(self.ek.public.as_deref(), self.ek.certificate.as_deref())
    }
}
