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

use x509_parser::pem::Pem;
use x509_parser::prelude::X509Certificate;

use crate::ek::{EndorsementKey, parse_certificate};
use crate::{AttestError, AttestResult};

/// Verifies the EK certificate against a PEM bundle of trusted manufacturer
/// roots. The certificate must be within its validity period and signed by a
/// root whose subject matches its issuer.
pub fn verify_ek_chain(ek: &EndorsementKey, roots_pem: &[u8]) -> AttestResult<()> {
    let ek_der = ek.certificate_der().ok_or_else(|| {
        AttestError::ChainVerification(
            "a trust root is configured but the endorsement key has no certificate".to_string(),
        )
    })?;
    let ek_cert = parse_certificate(ek_der)?;

    if !ek_cert.validity().is_valid() {
        return Err(AttestError::ChainVerification(format!(
            "EK certificate serial {} is outside its validity period",
            ek_cert.raw_serial_as_string()
        )));
    }

    let pems = Pem::iter_from_buffer(roots_pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AttestError::ChainVerification(format!("reading trust roots: {e}")))?;

    let mut candidates = 0;
    for pem in &pems {
        let root: X509Certificate = match pem.parse_x509() {
            Ok(root) => root,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unparsable TPM CA certificate");
                continue;
            }
        };
        if root.subject().as_raw() != ek_cert.issuer().as_raw() {
            continue;
        }
        candidates += 1;
        match ek_cert.verify_signature(Some(root.public_key())) {
            Ok(()) => return Ok(()),
            Err(e) => tracing::debug!(
                issuer = %ek_cert.issuer(),
                error = %e,
                "EK certificate signature does not verify under candidate root"
            ),
        }
    }

    if candidates == 0 {
        Err(AttestError::ChainVerification(format!(
            "no trusted root for EK issuer {}",
            ek_cert.issuer()
        )))
    } else {
        Err(AttestError::ChainVerification(format!(
            "EK certificate is not signed by any of {candidates} roots named {}",
            ek_cert.issuer()
        )))
    }
}
