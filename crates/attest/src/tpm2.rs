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

//! The handful of TPM 2.0 wire structures attestation needs (Part 2 of the TPM
//! library specification). All integers are big endian, `TPM2B_*` buffers are
//! a `u16` length followed by that many bytes.

use byteorder::{BigEndian, ReadBytesExt};
use rsa::{BigUint, RsaPublicKey};
use sha2::{Digest, Sha256};

use crate::{AttestError, AttestResult};

pub const TPM_ALG_RSA: u16 = 0x0001;
pub const TPM_ALG_AES: u16 = 0x0006;
pub const TPM_ALG_SHA256: u16 = 0x000B;
pub const TPM_ALG_NULL: u16 = 0x0010;
pub const TPM_ALG_RSASSA: u16 = 0x0014;
pub const TPM_ALG_CFB: u16 = 0x0043;

pub const TPM_GENERATED_VALUE: u32 = 0xff54_4347;
pub const TPM_ST_ATTEST_CREATION: u16 = 0x801A;

pub const FIXED_TPM: u32 = 1 << 1;
pub const FIXED_PARENT: u32 = 1 << 4;
pub const SENSITIVE_DATA_ORIGIN: u32 = 1 << 5;
pub const USER_WITH_AUTH: u32 = 1 << 6;
pub const RESTRICTED: u32 = 1 << 16;
pub const DECRYPT: u32 = 1 << 17;
pub const SIGN_ENCRYPT: u32 = 1 << 18;

const DEFAULT_RSA_EXPONENT: u32 = 65537;

/// Reads a length-prefixed buffer, advancing `buf` past it.
pub fn read_tpm2b<'a>(buf: &mut &'a [u8]) -> AttestResult<&'a [u8]> {
    let size = buf.read_u16::<BigEndian>()? as usize;
    if buf.len() < size {
        return Err(AttestError::Tpm(format!(
            "TPM2B of {size} bytes but only {} remain",
            buf.len()
        )));
    }
    let (head, tail) = buf.split_at(size);
    *buf = tail;
    Ok(head)
}

pub fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub fn put_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub fn put_tpm2b(out: &mut Vec<u8>, bytes: &[u8]) -> AttestResult<()> {
    let size = u16::try_from(bytes.len())
        .map_err(|_| AttestError::Tpm(format!("{} bytes do not fit a TPM2B", bytes.len())))?;
    put_u16(out, size);
    out.extend_from_slice(bytes);
    Ok(())
}

/// Wraps `bytes` in a TPM2B.
pub fn tpm2b(bytes: &[u8]) -> AttestResult<Vec<u8>> {
    let mut out = Vec::with_capacity(bytes.len() + 2);
    put_tpm2b(&mut out, bytes)?;
    Ok(out)
}

fn expect_consumed(buf: &[u8], what: &str) -> AttestResult<()> {
    if buf.is_empty() {
        Ok(())
    } else {
        Err(AttestError::Tpm(format!(
            "{} trailing bytes after {what}",
            buf.len()
        )))
    }
}

/// TPM name of an object: the name algorithm followed by the digest of its
/// marshaled `TPMT_PUBLIC`. Only SHA-256 names are produced.
pub fn object_name(public_area: &[u8]) -> Vec<u8> {
    let mut name = Vec::with_capacity(34);
    put_u16(&mut name, TPM_ALG_SHA256);
    name.extend_from_slice(&Sha256::digest(public_area));
    name
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymmetricDef {
    pub algorithm: u16,
    pub key_bits: u16,
    pub mode: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigScheme {
    pub scheme: u16,
    pub hash: u16,
}

/// `TPMT_PUBLIC` of an RSA key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaPublicArea {
    pub name_alg: u16,
    pub attributes: u32,
    pub auth_policy: Vec<u8>,
    pub symmetric: Option<SymmetricDef>,
    pub scheme: Option<SigScheme>,
    pub key_bits: u16,
    pub exponent: u32,
    pub modulus: Vec<u8>,
}

impl RsaPublicArea {
    pub fn parse(bytes: &[u8]) -> AttestResult<Self> {
        let mut buf = bytes;
        let alg = buf.read_u16::<BigEndian>()?;
        if alg != TPM_ALG_RSA {
            return Err(AttestError::UnsupportedKey(format!(
                "public area type {alg:#06x} is not RSA"
            )));
        }
        let name_alg = buf.read_u16::<BigEndian>()?;
        let attributes = buf.read_u32::<BigEndian>()?;
        let auth_policy = read_tpm2b(&mut buf)?.to_vec();

        let sym_alg = buf.read_u16::<BigEndian>()?;
        let symmetric = if sym_alg == TPM_ALG_NULL {
            None
        } else {
            Some(SymmetricDef {
                algorithm: sym_alg,
                key_bits: buf.read_u16::<BigEndian>()?,
                mode: buf.read_u16::<BigEndian>()?,
            })
        };

        let scheme_alg = buf.read_u16::<BigEndian>()?;
        let scheme = if scheme_alg == TPM_ALG_NULL {
            None
        } else {
            Some(SigScheme {
                scheme: scheme_alg,
                hash: buf.read_u16::<BigEndian>()?,
            })
        };

        let key_bits = buf.read_u16::<BigEndian>()?;
        let exponent = buf.read_u32::<BigEndian>()?;
        let modulus = read_tpm2b(&mut buf)?.to_vec();
        expect_consumed(buf, "TPMT_PUBLIC")?;

        Ok(RsaPublicArea {
            name_alg,
            attributes,
            auth_policy,
            symmetric,
            scheme,
            key_bits,
            exponent,
            modulus,
        })
    }

    pub fn marshal(&self) -> AttestResult<Vec<u8>> {
        let mut out = Vec::with_capacity(self.modulus.len() + 32);
        put_u16(&mut out, TPM_ALG_RSA);
        put_u16(&mut out, self.name_alg);
        put_u32(&mut out, self.attributes);
        put_tpm2b(&mut out, &self.auth_policy)?;
        match self.symmetric {
            None => put_u16(&mut out, TPM_ALG_NULL),
            Some(sym) => {
                put_u16(&mut out, sym.algorithm);
                put_u16(&mut out, sym.key_bits);
                put_u16(&mut out, sym.mode);
            }
        }
        match self.scheme {
            None => put_u16(&mut out, TPM_ALG_NULL),
            Some(scheme) => {
                put_u16(&mut out, scheme.scheme);
                put_u16(&mut out, scheme.hash);
            }
        }
        put_u16(&mut out, self.key_bits);
        put_u32(&mut out, self.exponent);
        put_tpm2b(&mut out, &self.modulus)?;
        Ok(out)
    }

    pub fn has_attributes(&self, mask: u32) -> bool {
        self.attributes & mask == mask
    }

    pub fn rsa_key(&self) -> AttestResult<RsaPublicKey> {
        let exponent = match self.exponent {
            0 => DEFAULT_RSA_EXPONENT,
            e => e,
        };
        RsaPublicKey::new(
            BigUint::from_bytes_be(&self.modulus),
            BigUint::from(exponent),
        )
        .map_err(|e| AttestError::UnsupportedKey(e.to_string()))
    }
}

/// `TPMS_ATTEST` carrying `TPMS_CREATION_INFO`, as produced by TPM2_CertifyCreation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CreationAttestation {
    pub qualified_signer: Vec<u8>,
    pub extra_data: Vec<u8>,
    pub clock: u64,
    pub reset_count: u32,
    pub restart_count: u32,
    pub safe: bool,
    pub firmware_version: u64,
    pub object_name: Vec<u8>,
    pub creation_hash: Vec<u8>,
}

impl CreationAttestation {
    pub fn parse(bytes: &[u8]) -> AttestResult<Self> {
        let mut buf = bytes;
        let magic = buf.read_u32::<BigEndian>()?;
        if magic != TPM_GENERATED_VALUE {
            return Err(AttestError::AttestationKey(format!(
                "attestation magic {magic:#010x} is not TPM_GENERATED"
            )));
        }
        let tag = buf.read_u16::<BigEndian>()?;
        if tag != TPM_ST_ATTEST_CREATION {
            return Err(AttestError::AttestationKey(format!(
                "attestation type {tag:#06x} is not a creation attestation"
            )));
        }

        let qualified_signer = read_tpm2b(&mut buf)?.to_vec();
        let extra_data = read_tpm2b(&mut buf)?.to_vec();
        let clock = buf.read_u64::<BigEndian>()?;
        let reset_count = buf.read_u32::<BigEndian>()?;
        let restart_count = buf.read_u32::<BigEndian>()?;
        let safe = buf.read_u8()? != 0;
        let firmware_version = buf.read_u64::<BigEndian>()?;
        let object_name = read_tpm2b(&mut buf)?.to_vec();
        let creation_hash = read_tpm2b(&mut buf)?.to_vec();
        expect_consumed(buf, "TPMS_ATTEST")?;

        Ok(CreationAttestation {
            qualified_signer,
            extra_data,
            clock,
            reset_count,
            restart_count,
            safe,
            firmware_version,
            object_name,
            creation_hash,
        })
    }

    pub fn marshal(&self) -> AttestResult<Vec<u8>> {
        let mut out = Vec::with_capacity(128);
        put_u32(&mut out, TPM_GENERATED_VALUE);
        put_u16(&mut out, TPM_ST_ATTEST_CREATION);
        put_tpm2b(&mut out, &self.qualified_signer)?;
        put_tpm2b(&mut out, &self.extra_data)?;
        put_u64(&mut out, self.clock);
        put_u32(&mut out, self.reset_count);
        put_u32(&mut out, self.restart_count);
        out.push(u8::from(self.safe));
        put_u64(&mut out, self.firmware_version);
        put_tpm2b(&mut out, &self.object_name)?;
        put_tpm2b(&mut out, &self.creation_hash)?;
        Ok(out)
    }
}

/// `TPMT_SIGNATURE` with an RSASSA scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsassaSignature {
    pub hash: u16,
    pub signature: Vec<u8>,
}

impl RsassaSignature {
    pub fn parse(bytes: &[u8]) -> AttestResult<Self> {
        let mut buf = bytes;
        let alg = buf.read_u16::<BigEndian>()?;
        if alg != TPM_ALG_RSASSA {
            return Err(AttestError::AttestationKey(format!(
                "signature algorithm {alg:#06x} is not RSASSA"
            )));
        }
        let hash = buf.read_u16::<BigEndian>()?;
        let signature = read_tpm2b(&mut buf)?.to_vec();
        expect_consumed(buf, "TPMT_SIGNATURE")?;
        Ok(RsassaSignature { hash, signature })
    }

    pub fn marshal(&self) -> AttestResult<Vec<u8>> {
        let mut out = Vec::with_capacity(self.signature.len() + 6);
        put_u16(&mut out, TPM_ALG_RSASSA);
        put_u16(&mut out, self.hash);
        put_tpm2b(&mut out, &self.signature)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ak_area() -> RsaPublicArea {
        RsaPublicArea {
            name_alg: TPM_ALG_SHA256,
            attributes: FIXED_TPM | FIXED_PARENT | SENSITIVE_DATA_ORIGIN | RESTRICTED | SIGN_ENCRYPT,
            auth_policy: vec![],
            symmetric: None,
            scheme: Some(SigScheme {
                scheme: TPM_ALG_RSASSA,
                hash: TPM_ALG_SHA256,
            }),
            key_bits: 2048,
            exponent: 0,
            modulus: vec![0xC5; 256],
        }
    }

    #[test]
    fn test_public_area_layout() {
        let bytes = ak_area().marshal().unwrap();
        // type, nameAlg, attributes, empty policy, NULL symmetric, RSASSA/SHA256, bits, exponent
        assert_eq!(
            &bytes[..22],
            &[
                0x00, 0x01, 0x00, 0x0B, 0x00, 0x05, 0x00, 0x32, 0x00, 0x00, 0x00, 0x10, 0x00,
                0x14, 0x00, 0x0B, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00
            ]
        );
        assert_eq!(&bytes[22..24], &[0x01, 0x00]);
        assert_eq!(RsaPublicArea::parse(&bytes).unwrap(), ak_area());
    }

    #[test]
    fn test_public_area_with_symmetric() {
        let mut area = ak_area();
        area.symmetric = Some(SymmetricDef {
            algorithm: TPM_ALG_AES,
            key_bits: 128,
            mode: TPM_ALG_CFB,
        });
        area.scheme = None;
        let parsed = RsaPublicArea::parse(&area.marshal().unwrap()).unwrap();
        assert_eq!(parsed, area);
    }

    #[test]
    fn test_public_area_rejects_trailing_bytes() {
        let mut bytes = ak_area().marshal().unwrap();
        bytes.push(0);
        assert!(matches!(
            RsaPublicArea::parse(&bytes),
            Err(AttestError::Tpm(_))
        ));
    }

    #[test]
    fn test_public_area_rejects_truncation() {
        let bytes = ak_area().marshal().unwrap();
        assert!(RsaPublicArea::parse(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn test_non_rsa_rejected() {
        let mut bytes = ak_area().marshal().unwrap();
        bytes[1] = 0x23; // TPM_ALG_ECC
        assert!(matches!(
            RsaPublicArea::parse(&bytes),
            Err(AttestError::UnsupportedKey(_))
        ));
    }

    #[test]
    fn test_object_name() {
        let name = object_name(b"abc");
        assert_eq!(&name[..2], &[0x00, 0x0B]);
        assert_eq!(
            hex::encode(&name[2..]),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_creation_attestation_magic() {
        let att = CreationAttestation {
            object_name: object_name(b"x"),
            creation_hash: vec![1; 32],
            ..Default::default()
        };
        let mut bytes = att.marshal().unwrap();
        assert_eq!(CreationAttestation::parse(&bytes).unwrap(), att);

        bytes[0] = 0;
        assert!(matches!(
            CreationAttestation::parse(&bytes),
            Err(AttestError::AttestationKey(_))
        ));
    }

    #[test]
    fn test_tpm2b_overrun() {
        let mut buf: &[u8] = &[0x00, 0x05, 1, 2];
        assert!(read_tpm2b(&mut buf).is_err());
    }
}
