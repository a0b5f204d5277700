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

//! Server side of TPM 2.0 remote attestation: decoding the attestation data a
//! machine presents, deriving its endorsement key identity, verifying the EK
//! certificate chain and the attestation key, and issuing and checking the
//! credential activation challenge that proves both keys live in one TPM.

pub mod ak;
pub mod attestation;
pub mod chain;
pub mod credential;
pub mod ek;
#[cfg(any(test, feature = "software-tpm"))]
pub mod software;
pub mod tpm2;

pub use ak::{AttestationParameters, VerifiedAk};
pub use attestation::{AttestationData, EkData, TPM_BEARER_PREFIX};
pub use chain::verify_ek_chain;
pub use credential::{ChallengeSecret, generate_challenge, validate_challenge};
pub use ek::EndorsementKey;

#[derive(thiserror::Error, Debug)]
pub enum AttestError {
    #[error("malformed attestation data: {0}")]
    Decode(String),
    #[error("malformed TPM structure: {0}")]
    Tpm(String),
    #[error("unsupported key: {0}")]
    UnsupportedKey(String),
    #[error("attestation key rejected: {0}")]
    AttestationKey(String),
    #[error("EK certificate rejected: {0}")]
    Certificate(String),
    #[error("EK chain verification failed: {0}")]
    ChainVerification(String),
    #[error("challenge response does not match")]
    ChallengeMismatch,
    #[error("crypto failure: {0}")]
    Crypto(String),
}

pub type AttestResult<T> = Result<T, AttestError>;

impl From<base64::DecodeError> for AttestError {
    fn from(err: base64::DecodeError) -> Self {
        AttestError::Decode(err.to_string())
    }
}

impl From<serde_json::Error> for AttestError {
    fn from(err: serde_json::Error) -> Self {
        AttestError::Decode(err.to_string())
    }
}

impl From<std::io::Error> for AttestError {
    fn from(err: std::io::Error) -> Self {
        AttestError::Tpm(err.to_string())
    }
}

impl From<rsa::Error> for AttestError {
    fn from(err: rsa::Error) -> Self {
        AttestError::Crypto(err.to_string())
    }
}

/// Serde adapters for byte fields carried as standard base64 in JSON.
pub(crate) mod b64 {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            bytes: &Option<Vec<u8>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match bytes {
                Some(b) => super::serialize(b, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Vec<u8>>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .filter(|s| !s.is_empty())
                .map(|s| STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
