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

use rsa::RsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use sha2::{Digest, Sha256};
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::{AttestError, AttestResult};

/// The endorsement key a machine presented, reduced to what the server uses:
/// the RSA public key, its SubjectPublicKeyInfo encoding and the optional
/// manufacturer certificate.
#[derive(Debug, Clone)]
pub struct EndorsementKey {
    spki_der: Vec<u8>,
    key: RsaPublicKey,
    certificate_der: Option<Vec<u8>>,
}

impl EndorsementKey {
    /// Builds the EK from its SubjectPublicKeyInfo and/or DER certificate. When
    /// both are given they must carry the same key.
    pub fn new(public: Option<&[u8]>, certificate: Option<&[u8]>) -> AttestResult<Self> {
        let cert_spki = match certificate {
            Some(der) => Some(parse_certificate(der)?.public_key().raw.to_vec()),
            None => None,
        };

        let spki_der = match (public, cert_spki) {
            (Some(public), Some(cert_spki)) if public != cert_spki.as_slice() => {
                return Err(AttestError::Certificate(
                    "certificate public key does not match the endorsement key".to_string(),
                ));
            }
            (Some(public), _) => public.to_vec(),
            (None, Some(cert_spki)) => cert_spki,
            (None, None) => {
                return Err(AttestError::Decode(
                    "endorsement key has neither a public key nor a certificate".to_string(),
                ));
            }
        };

        let key = RsaPublicKey::from_public_key_der(&spki_der)
            .map_err(|e| AttestError::UnsupportedKey(format!("endorsement key: {e}")))?;

        Ok(EndorsementKey {
            spki_der,
            key,
            certificate_der: certificate.map(<[u8]>::to_vec),
        })
    }

    /// Identity of the TPM: lowercase hex SHA-256 of the EK SubjectPublicKeyInfo.
    pub fn hash(&self) -> String {
        hex::encode(Sha256::digest(&self.spki_der))
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.key
    }

    pub fn spki_der(&self) -> &[u8] {
        &self.spki_der
    }

    pub fn certificate_der(&self) -> Option<&[u8]> {
        self.certificate_der.as_deref()
    }
}

pub(crate) fn parse_certificate(der: &[u8]) -> AttestResult<X509Certificate<'_>> {
    let (rest, cert) = X509Certificate::from_der(der)
        .map_err(|e| AttestError::Certificate(format!("parsing EK certificate: {e}")))?;
    if !rest.is_empty() {
        return Err(AttestError::Certificate(format!(
            "{} trailing bytes after EK certificate",
            rest.len()
        )));
    }
    Ok(cert)
}
