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

//! TPM2_MakeCredential on the server side: the challenge a machine can only
//! answer if its EK and AK live in the same TPM.

use aes::Aes128;
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use hmac::{Hmac, Mac};
use rsa::rand_core::OsRng;
use rsa::{Oaep, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::ak::VerifiedAk;
use crate::ek::EndorsementKey;
use crate::tpm2::{self, read_tpm2b};
use crate::{AttestError, AttestResult};

type HmacSha256 = Hmac<Sha256>;

pub(crate) const IDENTITY_LABEL: &str = "IDENTITY\0";
const STORAGE_LABEL: &[u8] = b"STORAGE";
const INTEGRITY_LABEL: &[u8] = b"INTEGRITY";
const SEED_LEN: usize = 16;
const SYM_KEY_BITS: u32 = 128;
const HMAC_KEY_BITS: u32 = 256;
const CHALLENGE_SECRET_LEN: usize = 32;

/// The secret the machine must recover. Kept server side for the lifetime of
/// one handshake.
#[derive(Clone)]
pub struct ChallengeSecret(Vec<u8>);

impl ChallengeSecret {
    pub fn new(bytes: Vec<u8>) -> Self {
        ChallengeSecret(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for ChallengeSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ChallengeSecret(..)")
    }
}

/// First frame of the handshake, server to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChallengeFrame {
    /// `TPM2B_ID_OBJECT`
    #[serde(with = "crate::b64")]
    pub credential: Vec<u8>,
    /// `TPM2B_ENCRYPTED_SECRET`
    #[serde(with = "crate::b64")]
    pub secret: Vec<u8>,
}

/// Second frame of the handshake, client to server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResponseFrame {
    #[serde(with = "crate::b64")]
    pub secret: Vec<u8>,
}

/// KDFa from TPM 2.0 Part 1 section 11.4.10.2 with SHA-256 (SP 800-108 counter mode).
pub(crate) fn kdfa(
    key: &[u8],
    label: &[u8],
    context_u: &[u8],
    context_v: &[u8],
    bits: u32,
) -> AttestResult<Vec<u8>> {
    let len = (bits / 8) as usize;
    let mut derived = Vec::with_capacity(len + 32);
    let mut counter: u32 = 1;
    while derived.len() < len {
        let mut mac = new_hmac(key)?;
        mac.update(&counter.to_be_bytes());
        mac.update(label);
        mac.update(&[0]);
        mac.update(context_u);
        mac.update(context_v);
        mac.update(&bits.to_be_bytes());
        derived.extend_from_slice(&mac.finalize().into_bytes());
        counter += 1;
    }
    derived.truncate(len);
    Ok(derived)
}

pub(crate) fn new_hmac(key: &[u8]) -> AttestResult<HmacSha256> {
    HmacSha256::new_from_slice(key).map_err(|e| AttestError::Crypto(e.to_string()))
}

pub(crate) fn storage_key(seed: &[u8], name: &[u8]) -> AttestResult<Vec<u8>> {
    kdfa(seed, STORAGE_LABEL, name, &[], SYM_KEY_BITS)
}

pub(crate) fn integrity_key(seed: &[u8]) -> AttestResult<Vec<u8>> {
    kdfa(seed, INTEGRITY_LABEL, &[], &[], HMAC_KEY_BITS)
}

pub(crate) fn cfb_crypt(key: &[u8], buf: &mut [u8], encrypt: bool) -> AttestResult<()> {
    let iv = [0u8; 16];
    if encrypt {
        cfb_mode::Encryptor::<Aes128>::new_from_slices(key, &iv)
            .map_err(|e| AttestError::Crypto(e.to_string()))?
            .encrypt(buf);
    } else {
        cfb_mode::Decryptor::<Aes128>::new_from_slices(key, &iv)
            .map_err(|e| AttestError::Crypto(e.to_string()))?
            .decrypt(buf);
    }
    Ok(())
}

/// Wraps `secret` for the object `name` under the endorsement key. Returns the
/// `TPM2B_ID_OBJECT` and the `TPM2B_ENCRYPTED_SECRET`.
pub fn make_credential(
    ek: &RsaPublicKey,
    name: &[u8],
    secret: &[u8],
) -> AttestResult<(Vec<u8>, Vec<u8>)> {
    let seed: [u8; SEED_LEN] = rand::random();
    let encrypted_seed = ek.encrypt(
        &mut OsRng,
        Oaep::new_with_label::<Sha256, _>(IDENTITY_LABEL),
        &seed,
    )?;

    let mut enc_identity = tpm2::tpm2b(secret)?;
    cfb_crypt(&storage_key(&seed, name)?, &mut enc_identity, true)?;

    let mut mac = new_hmac(&integrity_key(&seed)?)?;
    mac.update(&enc_identity);
    mac.update(name);
    let integrity = mac.finalize().into_bytes();

    let mut id_object = tpm2::tpm2b(&integrity)?;
    id_object.extend_from_slice(&enc_identity);

    Ok((tpm2::tpm2b(&id_object)?, tpm2::tpm2b(&encrypted_seed)?))
}

/// Generates a fresh secret bound to the endorsement key and the verified AK.
/// Returns the secret to keep and the serialized challenge frame to send.
pub fn generate_challenge(
    ek: &EndorsementKey,
    ak: &VerifiedAk,
) -> AttestResult<(ChallengeSecret, Vec<u8>)> {
    let secret: [u8; CHALLENGE_SECRET_LEN] = rand::random();
    let (credential, encrypted_secret) = make_credential(ek.public_key(), &ak.name, &secret)?;
    let frame = serde_json::to_vec(&ChallengeFrame {
        credential,
        secret: encrypted_secret,
    })?;
    Ok((ChallengeSecret(secret.to_vec()), frame))
}

/// Checks the client's response frame against the issued secret.
pub fn validate_challenge(secret: &ChallengeSecret, response: &[u8]) -> AttestResult<()> {
    let frame: ResponseFrame = serde_json::from_slice(response)?;
    if bool::from(frame.secret.as_slice().ct_eq(secret.as_bytes())) {
        Ok(())
    } else {
        Err(AttestError::ChallengeMismatch)
    }
}

/// Splits a `TPM2B_ID_OBJECT` into its integrity HMAC and encrypted identity.
pub(crate) fn split_id_object(credential: &[u8]) -> AttestResult<(Vec<u8>, Vec<u8>)> {
    let mut buf = credential;
    let mut id_object = read_tpm2b(&mut buf)?;
    let integrity = read_tpm2b(&mut id_object)?.to_vec();
    Ok((integrity, id_object.to_vec()))
}
