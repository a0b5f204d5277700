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

//! The attested registration flow end to end, with a software TPM on the
//! machine side of an in-memory channel.

use std::collections::BTreeMap;
use std::sync::Arc;

use admiral::ErrorKind;
use admiral::auth_tpm::Authentication;
use admiral::cfg::file::AdmiralConfig;
use admiral::channel::{FrameChannel, MemoryChannel};
use admiral::state::AppState;
use attest::software::{SoftwareTpm, fixtures};
use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use db::{InventoryStore, MemoryStore, RegistrationStore, SecretStore};
use model::secret::{TLS_CERT_KEY, TPM_CA_SECRET_NAME};
use model::{MachineInventory, MachineRegistration, Secret};
use serde_json::{Value, json};
use tower::ServiceExt;

const CONFIG: &str = r#"
[settings]
server_url = "https://admiral.example"
cacerts = "-----BEGIN CERTIFICATE-----"

[attestation]
frame_timeout = "2s"
"#;

struct Fleet {
    store: Arc<MemoryStore>,
    state: AppState,
    token: String,
}

async fn fleet(trust_root: Option<&str>) -> Fleet {
    let config = AdmiralConfig::load(CONFIG, None).unwrap();
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(&config, store.clone(), None);

    if let Some(pem) = trust_root {
        store
            .put_secret(Secret {
                namespace: "fleet-default".into(),
                name: TPM_CA_SECRET_NAME.into(),
                data: BTreeMap::from([(TLS_CERT_KEY.to_string(), pem.as_bytes().to_vec())]),
            })
            .await
            .unwrap();
    }

    store
        .create_registration(MachineRegistration {
            namespace: "fleet-default".into(),
            name: "edge".into(),
            spec: Default::default(),
            status: Default::default(),
            created: Utc::now(),
        })
        .await
        .unwrap();
    let registration = state
        .tokens
        .reconcile_registration("fleet-default", "edge")
        .await
        .unwrap();

    Fleet {
        store,
        state,
        token: registration.status.registration_token.unwrap(),
    }
}

fn headers(tpm: &SoftwareTpm, serial: &str) -> HeaderMap {
    let facts = json!({ "System Information": {
        "Manufacturer": "Acme", "Product Name": "Edge 1", "Serial Number": serial
    }});
    let mut headers = HeaderMap::new();
    headers.insert(
        "Authorization",
        HeaderValue::from_str(&tpm.authorization_header().unwrap()).unwrap(),
    );
    headers.insert(
        "X-Cattle-Smbios",
        HeaderValue::from_str(&STANDARD.encode(facts.to_string())).unwrap(),
    );
    headers
}

/// Runs one registration. Returns the admitted inventory and the install
/// configuration the machine received.
async fn register(
    fleet: &Fleet,
    tpm: SoftwareTpm,
    serial: &str,
) -> admiral::AdmiralResult<(MachineInventory, Value)> {
    let headers = headers(&tpm, serial);
    let candidate = fleet
        .state
        .admission
        .build_candidate(&fleet.token, &headers)
        .await?;
    let pending = match fleet
        .state
        .authenticator
        .begin(&headers, Some(candidate.enrollment()))
        .await?
    {
        Authentication::Challenge(pending) => pending,
        Authentication::Skip => panic!("TPM credential was not recognised"),
    };

    let (server, mut client) = MemoryChannel::pair();
    let machine = tokio::spawn(async move {
        let challenge = client.recv_frame().await.unwrap();
        client
            .send_frame(tpm.respond(&challenge).unwrap())
            .await
            .unwrap();
        client.recv_frame().await.unwrap()
    });

    let inventory = fleet.state.admission.admit(candidate, pending, server).await?;
    let install_config = serde_json::from_slice(&machine.await.unwrap()).unwrap();
    Ok((inventory, install_config))
}

#[tokio::test]
async fn test_attested_registration() {
    let fleet = fleet(Some(fixtures::CA_PEM)).await;
    let tpm = SoftwareTpm::fixture();
    let tpm_hash = tpm.ek_hash();

    let (inventory, install_config) = register(&fleet, tpm, "SN-1").await.unwrap();
    assert!(inventory.name.starts_with("m-acme-edge-1-sn-1-"));
    assert_eq!(inventory.spec.tpm_hash, tpm_hash);
    assert_eq!(
        install_config,
        json!({
            "rancherd": { "server": "https://admiral.example", "token": "tpm://" },
            "rancheros": { "install": { "automatic": true } }
        })
    );

    // The machine can now authenticate the CA bundle with its TPM hash.
    let response = admiral::handlers::router(fleet.state.clone())
        .oneshot(
            Request::get("/v1-admiral/cacerts")
                .header("Authorization", format!("Bearer {tpm_hash}"))
                .header("X-Cattle-Nonce", "n0nce")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["x-cattle-hash"],
        admiral::cacert::cattle_hash(
            tpm_hash.as_bytes(),
            b"n0nce",
            b"-----BEGIN CERTIFICATE-----\n"
        )
        .unwrap()
        .as_str()
    );
}

#[tokio::test]
async fn test_reregistration_keeps_identity() {
    let fleet = fleet(None).await;

    let (first, _) = register(&fleet, SoftwareTpm::fixture(), "SN-1").await.unwrap();
    // Different SMBIOS facts do not rename or duplicate the machine.
    let (second, _) = register(&fleet, SoftwareTpm::fixture(), "SN-2").await.unwrap();
    assert_eq!(second, first);

    let (other, _) = register(&fleet, SoftwareTpm::second_fixture(), "SN-3")
        .await
        .unwrap();
    assert_ne!(other.spec.tpm_hash, first.spec.tpm_hash);
    assert_eq!(
        fleet.store.list_inventories("fleet-default").await.unwrap().len(),
        2
    );
}

#[tokio::test]
async fn test_untrusted_endorsement_key() {
    let fleet = fleet(Some(fixtures::OTHER_CA_PEM)).await;
    let err = register(&fleet, SoftwareTpm::fixture(), "SN-1")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert!(
        fleet
            .store
            .find_inventories_by_hash(&SoftwareTpm::fixture().ek_hash())
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_missing_certificate_with_trust_root() {
    let fleet = fleet(Some(fixtures::CA_PEM)).await;
    let err = register(&fleet, SoftwareTpm::fixture().without_certificate(), "SN-1")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authentication);
}
