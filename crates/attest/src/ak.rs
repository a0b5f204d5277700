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

use rsa::{Pkcs1v15Sign, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::tpm2::{
    self, CreationAttestation, DECRYPT, FIXED_PARENT, FIXED_TPM, RESTRICTED, RsaPublicArea,
    RsassaSignature, SENSITIVE_DATA_ORIGIN, SIGN_ENCRYPT, TPM_ALG_SHA256,
};
use crate::{AttestError, AttestResult};

const REQUIRED_AK_ATTRIBUTES: u32 =
    FIXED_TPM | FIXED_PARENT | SENSITIVE_DATA_ORIGIN | RESTRICTED | SIGN_ENCRYPT;

/// The attestation key and the TPM's proof that it created it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttestationParameters {
    /// Marshaled `TPMT_PUBLIC` of the AK.
    #[serde(with = "crate::b64")]
    pub public: Vec<u8>,
    #[serde(with = "crate::b64")]
    pub create_data: Vec<u8>,
    /// Marshaled `TPMS_ATTEST` from TPM2_CertifyCreation.
    #[serde(with = "crate::b64")]
    pub create_attestation: Vec<u8>,
    /// Marshaled `TPMT_SIGNATURE` over `create_attestation`.
    #[serde(with = "crate::b64")]
    pub create_signature: Vec<u8>,
}

/// An attestation key that passed [`AttestationParameters::verify`].
#[derive(Debug, Clone)]
pub struct VerifiedAk {
    pub name: Vec<u8>,
    pub key: RsaPublicKey,
}

impl AttestationParameters {
    /// Checks that the AK is a restricted, TPM-resident signing key and that
    /// the creation attestation is about this key and signed by it.
    pub fn verify(&self) -> AttestResult<VerifiedAk> {
        let area = RsaPublicArea::parse(&self.public)?;
        if area.name_alg != TPM_ALG_SHA256 {
            return Err(AttestError::AttestationKey(format!(
                "name algorithm {:#06x} is not SHA-256",
                area.name_alg
            )));
        }
        if !area.has_attributes(REQUIRED_AK_ATTRIBUTES) {
            return Err(AttestError::AttestationKey(format!(
                "attributes {:#010x} lack {REQUIRED_AK_ATTRIBUTES:#010x}",
                area.attributes
            )));
        }
        if area.has_attributes(DECRYPT) {
            return Err(AttestError::AttestationKey(
                "attestation key must not be a decryption key".to_string(),
            ));
        }
        let name = tpm2::object_name(&self.public);

        let attestation = CreationAttestation::parse(&self.create_attestation)?;
        if attestation.object_name != name {
            return Err(AttestError::AttestationKey(
                "creation attestation names a different key".to_string(),
            ));
        }
        if attestation.creation_hash.as_slice() != Sha256::digest(&self.create_data).as_slice() {
            return Err(AttestError::AttestationKey(
                "creation hash does not match creation data".to_string(),
            ));
        }

        let signature = RsassaSignature::parse(&self.create_signature)?;
        if signature.hash != TPM_ALG_SHA256 {
            return Err(AttestError::AttestationKey(format!(
                "signature hash {:#06x} is not SHA-256",
                signature.hash
            )));
        }
        let key = area.rsa_key()?;
        key.verify(
            Pkcs1v15Sign::new::<Sha256>(),
            &Sha256::digest(&self.create_attestation),
            &signature.signature,
        )
        .map_err(|e| AttestError::AttestationKey(format!("creation signature: {e}")))?;

        Ok(VerifiedAk { name, key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::software::SoftwareTpm;

    fn params() -> AttestationParameters {
        SoftwareTpm::fixture().attestation_data().unwrap().ak
    }

    #[test]
    fn test_verify() {
        let ak = params().verify().unwrap();
        assert_eq!(ak.name.len(), 34);
        assert_eq!(&ak.name[..2], &[0x00, 0x0B]);
    }

    #[test]
    fn test_decrypt_attribute_rejected() {
        let mut p = params();
        let mut area = RsaPublicArea::parse(&p.public).unwrap();
        area.attributes |= DECRYPT;
        p.public = area.marshal().unwrap();
        assert!(matches!(p.verify(), Err(AttestError::AttestationKey(_))));
    }

    #[test]
    fn test_unrestricted_rejected() {
        let mut p = params();
        let mut area = RsaPublicArea::parse(&p.public).unwrap();
        area.attributes &= !RESTRICTED;
        p.public = area.marshal().unwrap();
        assert!(matches!(p.verify(), Err(AttestError::AttestationKey(_))));
    }

    #[test]
    fn test_creation_data_tampered() {
        let mut p = params();
        p.create_data.push(0);
        assert!(matches!(p.verify(), Err(AttestError::AttestationKey(_))));
    }

    #[test]
    fn test_signature_tampered() {
        let mut p = params();
        let last = p.create_signature.len() - 1;
        p.create_signature[last] ^= 0x01;
        assert!(matches!(p.verify(), Err(AttestError::AttestationKey(_))));
    }

    #[test]
    fn test_attestation_for_other_key() {
        let mut p = params();
        let mut att = CreationAttestation::parse(&p.create_attestation).unwrap();
        att.object_name = tpm2::object_name(b"another key");
        p.create_attestation = att.marshal().unwrap();
        assert!(matches!(p.verify(), Err(AttestError::AttestationKey(_))));
    }
}
