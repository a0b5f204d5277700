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

//! A TPM emulated in software, for exercising the server side of attestation
//! without hardware. It holds the private halves of the EK and AK and answers
//! challenges the way TPM2_ActivateCredential would.

use hmac::Mac;
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

use crate::ak::AttestationParameters;
use crate::attestation::{AttestationData, EkData};
use crate::credential::{
    ChallengeFrame, IDENTITY_LABEL, ResponseFrame, cfb_crypt, integrity_key, new_hmac,
    split_id_object, storage_key,
};
use crate::tpm2::{
    self, CreationAttestation, FIXED_PARENT, FIXED_TPM, RESTRICTED, RsaPublicArea,
    RsassaSignature, SENSITIVE_DATA_ORIGIN, SIGN_ENCRYPT, SigScheme, TPM_ALG_RSASSA,
    TPM_ALG_SHA256, USER_WITH_AUTH, read_tpm2b,
};
use crate::{AttestError, AttestResult};

const CREATION_DATA: &[u8] = b"admiral software tpm creation data";

pub struct SoftwareTpm {
    ek: RsaPrivateKey,
    ek_certificate: Option<Vec<u8>>,
    ak: RsaPrivateKey,
}

impl SoftwareTpm {
    pub fn from_pem(
        ek_key_pem: &str,
        ek_certificate_pem: Option<&str>,
        ak_key_pem: &str,
    ) -> AttestResult<Self> {
        let ek = RsaPrivateKey::from_pkcs8_pem(ek_key_pem)
            .map_err(|e| AttestError::UnsupportedKey(e.to_string()))?;
        let ak = RsaPrivateKey::from_pkcs8_pem(ak_key_pem)
            .map_err(|e| AttestError::UnsupportedKey(e.to_string()))?;
        let ek_certificate = ek_certificate_pem.map(pem_to_der).transpose()?;
        Ok(SoftwareTpm {
            ek,
            ek_certificate,
            ak,
        })
    }

    /// The EK from `fixtures/ek.key` with its CA-signed certificate.
    pub fn fixture() -> Self {
        Self::from_pem(fixtures::EK_KEY_PEM, Some(fixtures::EK_PEM), fixtures::AK_KEY_PEM)
            .expect("fixture keys are valid")
    }

    /// A second TPM, also certified by the fixture CA.
    pub fn second_fixture() -> Self {
        Self::from_pem(fixtures::EK2_KEY_PEM, Some(fixtures::EK2_PEM), fixtures::AK_KEY_PEM)
            .expect("fixture keys are valid")
    }

    /// Drops the EK certificate, as TPMs without a provisioned certificate do.
    pub fn without_certificate(mut self) -> Self {
        self.ek_certificate = None;
        self
    }

    pub fn ek_spki_der(&self) -> AttestResult<Vec<u8>> {
        RsaPublicKey::from(&self.ek)
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| AttestError::UnsupportedKey(e.to_string()))
    }

    pub fn ek_hash(&self) -> String {
        let spki = self.ek_spki_der().unwrap_or_default();
        hex::encode(Sha256::digest(spki))
    }

    fn ak_public_area(&self) -> AttestResult<Vec<u8>> {
        let e = self.ak.e().to_bytes_be();
        if e.len() > 4 {
            return Err(AttestError::UnsupportedKey(
                "AK exponent does not fit in 32 bits".to_string(),
            ));
        }
        let exponent = match e.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b)) {
            65537 => 0,
            e => e,
        };
        RsaPublicArea {
            name_alg: TPM_ALG_SHA256,
            attributes: FIXED_TPM
                | FIXED_PARENT
                | SENSITIVE_DATA_ORIGIN
                | USER_WITH_AUTH
                | RESTRICTED
                | SIGN_ENCRYPT,
            auth_policy: vec![],
            symmetric: None,
            scheme: Some(SigScheme {
                scheme: TPM_ALG_RSASSA,
                hash: TPM_ALG_SHA256,
            }),
            key_bits: (self.ak.size() * 8) as u16,
            exponent,
            modulus: self.ak.n().to_bytes_be(),
        }
        .marshal()
    }

    pub fn ak_name(&self) -> AttestResult<Vec<u8>> {
        Ok(tpm2::object_name(&self.ak_public_area()?))
    }

    pub fn attestation_data(&self) -> AttestResult<AttestationData> {
        let public = self.ak_public_area()?;
        let create_attestation = CreationAttestation {
            qualified_signer: tpm2::object_name(b"endorsement hierarchy"),
            clock: 1_000,
            reset_count: 1,
            safe: true,
            firmware_version: 0x0001_0002_0003_0004,
            object_name: tpm2::object_name(&public),
            creation_hash: Sha256::digest(CREATION_DATA).to_vec(),
            ..Default::default()
        }
        .marshal()?;
        let signature = self.ak.sign(
            Pkcs1v15Sign::new::<Sha256>(),
            &Sha256::digest(&create_attestation),
        )?;
        let create_signature = RsassaSignature {
            hash: TPM_ALG_SHA256,
            signature,
        }
        .marshal()?;

        Ok(AttestationData {
            ek: EkData {
                public: Some(self.ek_spki_der()?),
                certificate: self.ek_certificate.clone(),
            },
            ak: AttestationParameters {
                public,
                create_data: CREATION_DATA.to_vec(),
                create_attestation,
                create_signature,
            },
        })
    }

    pub fn authorization_header(&self) -> AttestResult<String> {
        self.attestation_data()?.to_authorization()
    }

    /// TPM2_ActivateCredential against this TPM's EK and AK.
    pub fn activate_credential(&self, credential: &[u8], secret: &[u8]) -> AttestResult<Vec<u8>> {
        let name = self.ak_name()?;
        let mut buf = secret;
        let encrypted_seed = read_tpm2b(&mut buf)?;
        let seed = self.ek.decrypt(
            Oaep::new_with_label::<Sha256, _>(IDENTITY_LABEL),
            encrypted_seed,
        )?;

        let (integrity, mut enc_identity) = split_id_object(credential)?;
        let mut mac = new_hmac(&integrity_key(&seed)?)?;
        mac.update(&enc_identity);
        mac.update(&name);
        mac.verify_slice(&integrity)
            .map_err(|_| AttestError::Crypto("credential integrity check failed".to_string()))?;

        cfb_crypt(&storage_key(&seed, &name)?, &mut enc_identity, false)?;
        let mut plain = enc_identity.as_slice();
        Ok(read_tpm2b(&mut plain)?.to_vec())
    }

    /// Answers a serialized challenge frame with a serialized response frame.
    pub fn respond(&self, challenge: &[u8]) -> AttestResult<Vec<u8>> {
        let frame: ChallengeFrame = serde_json::from_slice(challenge)?;
        let secret = self.activate_credential(&frame.credential, &frame.secret)?;
        Ok(serde_json::to_vec(&ResponseFrame { secret })?)
    }
}

fn pem_to_der(pem: &str) -> AttestResult<Vec<u8>> {
    let (_, pem) = x509_parser::pem::parse_x509_pem(pem.as_bytes())
        .map_err(|e| AttestError::Certificate(e.to_string()))?;
    Ok(pem.contents)
}

/// Keys and certificates under `fixtures/`. Both EK certificates are signed by
/// `CA_PEM`; `OTHER_CA_PEM` signed neither.
pub mod fixtures {
    pub const CA_PEM: &str = include_str!("../fixtures/ca.pem");
    pub const OTHER_CA_PEM: &str = include_str!("../fixtures/other-ca.pem");
    pub const EK_KEY_PEM: &str = include_str!("../fixtures/ek.key");
    pub const EK_PEM: &str = include_str!("../fixtures/ek.pem");
    pub const EK2_KEY_PEM: &str = include_str!("../fixtures/ek2.key");
    pub const EK2_PEM: &str = include_str!("../fixtures/ek2.pem");
    pub const AK_KEY_PEM: &str = include_str!("../fixtures/ak.key");

    pub fn ek_cert_der() -> Vec<u8> {
        super::pem_to_der(EK_PEM).expect("fixture certificate")
    }

    pub fn ek2_cert_der() -> Vec<u8> {
        super::pem_to_der(EK2_PEM).expect("fixture certificate")
    }

    pub fn ek_spki_der() -> Vec<u8> {
        super::SoftwareTpm::fixture()
            .ek_spki_der()
            .expect("fixture key")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activate_own_credential() {
        let tpm = SoftwareTpm::fixture();
        let ak_name = tpm.ak_name().unwrap();
        let ek = RsaPublicKey::from(&tpm.ek);
        let (credential, secret) =
            crate::credential::make_credential(&ek, &ak_name, b"0123456789abcdef").unwrap();
        assert_eq!(
            tpm.activate_credential(&credential, &secret).unwrap(),
            b"0123456789abcdef"
        );
    }

    #[test]
    fn test_without_certificate() {
        let data = SoftwareTpm::fixture()
            .without_certificate()
            .attestation_data()
            .unwrap();
        assert!(data.ek.certificate.is_none());
        assert!(data.ek.public.is_some());
    }

    #[test]
    fn test_fixtures_differ() {
        assert_ne!(
            SoftwareTpm::fixture().ek_hash(),
            SoftwareTpm::second_fixture().ek_hash()
        );
    }
}
