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

//! Admission of a machine through a registration policy: build the candidate
//! inventory from the request, authenticate, persist at most once per TPM, and
//! hand back the install configuration.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use db::Store;
use http::HeaderMap;
use model::machine_name::build_name;
use model::values::{merge_maps_concat_slice, put_value};
use model::{MachineInventory, MachineInventorySpec, MachineRegistration, NewMachineInventory};
use serde_json::{Map, Value, json};

use crate::auth_tpm::PendingHandshake;
use crate::channel::{CLOSE_INTERNAL_ERROR, CloseReason, FrameChannel};
use crate::identity::Enrollment;
use crate::metrics::{self, RegistrationOutcome};
use crate::registration::RegistrationTokenManager;
use crate::settings::SettingsProvider;
use crate::{AdmiralError, AdmiralResult, ErrorKind};

pub const SMBIOS_HEADER: &str = "x-cattle-smbios";

/// Install token marker telling the installer to authenticate with its TPM.
const TPM_INSTALL_TOKEN: &str = "tpm://";

/// Everything known about a registering machine before it authenticates.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub registration: MachineRegistration,
    pub inventory: NewMachineInventory,
    pub install_config: Vec<u8>,
}

impl Candidate {
    pub fn enrollment(&self) -> Enrollment<'_> {
        Enrollment {
            namespace: &self.registration.namespace,
            ca_secret_name: self.registration.tpm_ca_secret_name(),
        }
    }
}

pub struct AdmissionHandler {
    store: Arc<dyn Store>,
    settings: Arc<dyn SettingsProvider>,
    tokens: Arc<RegistrationTokenManager>,
}

impl AdmissionHandler {
    pub fn new(
        store: Arc<dyn Store>,
        settings: Arc<dyn SettingsProvider>,
        tokens: Arc<RegistrationTokenManager>,
    ) -> Self {
        AdmissionHandler {
            store,
            settings,
            tokens,
        }
    }

    /// Resolves the policy behind `token` and prepares the inventory and
    /// install configuration. Every failure is an authentication failure so
    /// callers cannot tell an unknown token from a malformed request.
    pub async fn build_candidate(
        &self,
        token: &str,
        headers: &HeaderMap,
    ) -> AdmiralResult<Candidate> {
        self.candidate(token, headers).await.map_err(|e| match e.kind() {
            ErrorKind::Authentication | ErrorKind::AmbiguousState => e,
            _ => AdmiralError::authentication(e.to_string()),
        })
    }

    async fn candidate(&self, token: &str, headers: &HeaderMap) -> AdmiralResult<Candidate> {
        let smbios = smbios_facts(headers)?;

        let mut registrations = self.store.find_registrations_by_token(token).await?;
        let registration = match registrations.len() {
            0 => {
                return Err(AdmiralError::authentication(
                    "MachineRegistration does not exist",
                ));
            }
            1 => registrations.remove(0),
            n => {
                let names: Vec<String> = registrations
                    .iter()
                    .map(|r| format!("{}/{}", r.namespace, r.name))
                    .collect();
                tracing::error!(
                    count = n,
                    registrations = ?names,
                    "Multiple MachineRegistrations have the same token"
                );
                return Err(AdmiralError::AmbiguousState(format!(
                    "{n} MachineRegistrations share one token"
                )));
            }
        };

        let install_config = self.install_config(&registration)?;
        let inventory = NewMachineInventory {
            namespace: registration.namespace.clone(),
            generate_name: build_name(&smbios, registration.name_template()),
            labels: registration.spec.machine_inventory_labels.clone(),
            annotations: registration.spec.machine_inventory_annotations.clone(),
            spec: MachineInventorySpec {
                tpm_hash: String::new(),
                smbios,
                cluster_name: registration.spec.cluster_name.clone(),
            },
        };

        Ok(Candidate {
            registration,
            inventory,
            install_config: serde_json::to_vec(&install_config)
                .map_err(|e| AdmiralError::InvalidArgument(e.to_string()))?,
        })
    }

    /// The policy's cloud-config with the install directives layered on top.
    fn install_config(&self, registration: &MachineRegistration) -> AdmiralResult<Map<String, Value>> {
        let mut config = match &registration.spec.cloud_config {
            Some(cloud_config) if !cloud_config.is_empty() => {
                merge_maps_concat_slice(&Map::new(), cloud_config)
            }
            _ => Map::new(),
        };

        let server_url = self.settings.server_url()?;
        put_value(&mut config, Value::String(server_url), &["rancherd", "server"])?;
        put_value(
            &mut config,
            Value::String(TPM_INSTALL_TOKEN.to_string()),
            &["rancherd", "token"],
        )?;
        put_value(
            &mut config,
            Value::Bool(true),
            &["rancheros", "install", "automatic"],
        )?;
        Ok(config)
    }

    /// The discovery document handed to callers that present no TPM
    /// credential: where to register, and which CA to trust while doing it.
    pub fn sample_config(&self, registration: &MachineRegistration) -> AdmiralResult<String> {
        let mut install = Map::new();
        install.insert(
            "registrationURL".to_string(),
            Value::String(
                registration
                    .status
                    .registration_url
                    .clone()
                    .unwrap_or_default(),
            ),
        );
        let certs = self.settings.cacert();
        if !certs.is_empty() {
            install.insert("registrationCaCert".to_string(), Value::String(certs));
        }

        let document = json!({ "rancheros": { "install": install } });
        let yaml = serde_yaml::to_string(&document)
            .map_err(|e| AdmiralError::authentication(format!("rendering sample config: {e}")))?;
        metrics::record_registration(RegistrationOutcome::Sample);
        Ok(format!("#cloud-config\n{yaml}"))
    }

    /// Completes the handshake, persists the inventory unless the TPM already
    /// has one, and streams the install configuration back. The channel is
    /// closed on every path.
    pub async fn admit<C: FrameChannel>(
        &self,
        candidate: Candidate,
        handshake: PendingHandshake,
        channel: C,
    ) -> AdmiralResult<MachineInventory> {
        let (machine, mut writer) = match handshake.complete(channel).await {
            Ok(authenticated) => authenticated,
            Err(e) => {
                metrics::record_registration(RegistrationOutcome::Rejected);
                return Err(e);
            }
        };

        let Candidate {
            mut inventory,
            install_config,
            ..
        } = candidate;
        inventory.spec.tpm_hash = machine.tpm_hash().to_string();

        let outcome = match self.store.create_inventory_if_absent(inventory).await {
            Ok(outcome) => outcome,
            Err(e) => {
                metrics::record_registration(RegistrationOutcome::Failed);
                tracing::error!(error = %e, tpm_hash = machine.tpm_hash(), "Failed to persist machine");
                if let Err(close_err) = writer
                    .abort(CloseReason::new(CLOSE_INTERNAL_ERROR, "failed to persist machine"))
                    .await
                {
                    tracing::warn!(error = %close_err, "Closing channel after persistence failure");
                }
                return Err(e.into());
            }
        };

        let created = outcome.is_created();
        let inventory = outcome.into_inner();
        if created {
            metrics::record_registration(RegistrationOutcome::Created);
            tracing::info!(
                namespace = %inventory.namespace,
                name = %inventory.name,
                "Admitted new machine"
            );
        } else {
            metrics::record_registration(RegistrationOutcome::Existing);
            tracing::info!(
                namespace = %inventory.namespace,
                name = %inventory.name,
                "Machine already admitted, keeping existing inventory"
            );
        }

        writer.write(&install_config);
        if let Err(e) = writer.close().await {
            // The inventory is stored; the machine retries and is answered again.
            tracing::warn!(
                error = %e,
                name = %inventory.name,
                "Install configuration not delivered"
            );
        }

        if created && inventory.spec.cluster_name.is_some() {
            if let Err(e) = self
                .tokens
                .reconcile_inventory(&inventory.namespace, &inventory.name)
                .await
            {
                tracing::warn!(error = %e, name = %inventory.name, "Join token not issued yet");
            }
        }
        Ok(inventory)
    }
}

/// SMBIOS facts from the base64 JSON header. No header means no facts.
fn smbios_facts(headers: &HeaderMap) -> AdmiralResult<Map<String, Value>> {
    let Some(value) = headers.get(SMBIOS_HEADER) else {
        return Ok(Map::new());
    };
    let raw = STANDARD
        .decode(value.as_bytes())
        .map_err(|e| AdmiralError::authentication(format!("decoding SMBIOS header: {e}")))?;
    serde_json::from_slice(&raw)
        .map_err(|e| AdmiralError::authentication(format!("parsing SMBIOS header: {e}")))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use attest::software::SoftwareTpm;
    use chrono::Utc;
    use db::{ClusterStore, InventoryStore, MemoryStore, RegistrationStore};
    use http::HeaderValue;
    use http::header::AUTHORIZATION;
    use model::Cluster;

    use super::*;
    use crate::auth_tpm::{Authentication, Authenticator};
    use crate::channel::{ChannelError, MemoryChannel};
    use crate::settings::{DynamicSettings, Settings};

    const TOKEN: &str = "registration-token";

    struct Harness {
        store: Arc<MemoryStore>,
        admission: AdmissionHandler,
        authenticator: Authenticator,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::default());
        let settings: Arc<dyn SettingsProvider> = Arc::new(DynamicSettings::new(Settings {
            server_url: "https://admiral.example".into(),
            cacerts: "CA".into(),
            ..Default::default()
        }));
        let tokens = Arc::new(RegistrationTokenManager::new(
            store.clone(),
            settings.clone(),
        ));
        Harness {
            admission: AdmissionHandler::new(store.clone(), settings, tokens),
            authenticator: Authenticator::new(store.clone(), Duration::from_secs(10)),
            store,
        }
    }

    fn policy(name: &str, token: &str) -> MachineRegistration {
        let mut registration = MachineRegistration {
            namespace: "fleet-default".into(),
            name: name.into(),
            spec: Default::default(),
            status: Default::default(),
            created: Utc::now(),
        };
        registration.spec.machine_name =
            Some("m-${System Information/Manufacturer}-${System Information/Serial Number}".into());
        registration.spec.cloud_config = Some(
            json!({ "users": [{ "name": "root" }], "rancheros": { "install": { "device": "/dev/sda" } } })
                .as_object()
                .cloned()
                .unwrap(),
        );
        registration.status.registration_token = Some(token.into());
        registration.status.registration_url =
            Some(format!("https://admiral.example/v1-admiral/registration/{token}"));
        registration
    }

    fn smbios_headers() -> HeaderMap {
        let facts = json!({
            "System Information": { "Manufacturer": "Acme!!", "Serial Number": "007" }
        });
        let mut headers = HeaderMap::new();
        headers.insert(
            SMBIOS_HEADER,
            HeaderValue::from_str(&STANDARD.encode(facts.to_string())).unwrap(),
        );
        headers
    }

    async fn register(h: &Harness, tpm: SoftwareTpm) -> AdmiralResult<MachineInventory> {
        let mut headers = smbios_headers();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&tpm.authorization_header().unwrap()).unwrap(),
        );
        let candidate = h.admission.build_candidate(TOKEN, &headers).await?;
        let Authentication::Challenge(pending) = h
            .authenticator
            .begin(&headers, Some(candidate.enrollment()))
            .await?
        else {
            panic!("expected a challenge");
        };

        let (server, mut client) = MemoryChannel::pair();
        let machine = tokio::spawn(async move {
            let challenge = client.recv_frame().await.unwrap();
            client
                .send_frame(tpm.respond(&challenge).unwrap())
                .await
                .unwrap();
            client.recv_frame().await
        });
        let result = h.admission.admit(candidate, pending, server).await;
        let payload = machine.await.unwrap();
        if result.is_ok() {
            let config: Value = serde_json::from_slice(&payload.unwrap()).unwrap();
            assert_eq!(config["rancherd"]["token"], "tpm://");
        }
        result
    }

    #[tokio::test]
    async fn test_build_candidate() {
        let h = harness();
        h.store.create_registration(policy("r1", TOKEN)).await.unwrap();

        let candidate = h
            .admission
            .build_candidate(TOKEN, &smbios_headers())
            .await
            .unwrap();
        assert_eq!(candidate.inventory.generate_name, "m-acme-007");
        assert_eq!(candidate.inventory.namespace, "fleet-default");

        let config: Value = serde_json::from_slice(&candidate.install_config).unwrap();
        assert_eq!(
            config,
            json!({
                "users": [{ "name": "root" }],
                "rancherd": { "server": "https://admiral.example", "token": "tpm://" },
                "rancheros": { "install": { "device": "/dev/sda", "automatic": true } }
            })
        );
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let h = harness();
        let err = h
            .admission
            .build_candidate("nope", &HeaderMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }

    #[tokio::test]
    async fn test_malformed_smbios() {
        let h = harness();
        h.store.create_registration(policy("r1", TOKEN)).await.unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(SMBIOS_HEADER, HeaderValue::from_static("%%%"));
        let err = h
            .admission
            .build_candidate(TOKEN, &headers)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_ambiguous_token_rejected() {
        let h = harness();
        h.store.create_registration(policy("r1", TOKEN)).await.unwrap();
        h.store.create_registration(policy("r2", TOKEN)).await.unwrap();

        for _ in 0..3 {
            let err = h
                .admission
                .build_candidate(TOKEN, &HeaderMap::new())
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::AmbiguousState);
            assert_eq!(err.public_message(), "authorization required");
        }
    }

    #[tokio::test]
    async fn test_sample_config() {
        let h = harness();
        let yaml = h.admission.sample_config(&policy("r1", TOKEN)).unwrap();
        assert!(yaml.starts_with("#cloud-config\n"));
        let document: Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(
            document["rancheros"]["install"]["registrationURL"],
            format!("https://admiral.example/v1-admiral/registration/{TOKEN}")
        );
        assert_eq!(document["rancheros"]["install"]["registrationCaCert"], "CA");
    }

    #[tokio::test]
    async fn test_admit_is_idempotent() {
        let h = harness();
        h.store.create_registration(policy("r1", TOKEN)).await.unwrap();

        let first = register(&h, SoftwareTpm::fixture()).await.unwrap();
        assert!(first.name.starts_with("m-acme-007"));
        assert_eq!(first.spec.tpm_hash, SoftwareTpm::fixture().ek_hash());

        let second = register(&h, SoftwareTpm::fixture()).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(
            h.store
                .find_inventories_by_hash(&first.spec.tpm_hash)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_concurrent_registrations_create_one_inventory() {
        let h = Arc::new(harness());
        h.store.create_registration(policy("r1", TOKEN)).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let h = h.clone();
                tokio::spawn(async move { register(&h, SoftwareTpm::fixture()).await.unwrap() })
            })
            .collect();
        let admitted = futures::future::join_all(handles).await;

        let name = &admitted[0].as_ref().unwrap().name;
        assert!(admitted.iter().all(|m| &m.as_ref().unwrap().name == name));
        assert_eq!(h.store.list_inventories("fleet-default").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_admit_issues_join_token() {
        let h = harness();
        let mut registration = policy("r1", TOKEN);
        registration.spec.cluster_name = Some("prod".into());
        h.store.create_registration(registration).await.unwrap();
        h.store
            .put_cluster(Cluster {
                namespace: "fleet-default".into(),
                name: "prod".into(),
                internal_name: Some("c-abc12".into()),
            })
            .await
            .unwrap();

        let admitted = register(&h, SoftwareTpm::fixture()).await.unwrap();
        let stored = h
            .store
            .get_inventory("fleet-default", &admitted.name)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status.join_token_ref().map(|(ns, _)| ns), Some("c-abc12"));
    }

    /// Delivers frames but fails to close.
    struct ResetOnClose(MemoryChannel);

    #[async_trait::async_trait]
    impl FrameChannel for ResetOnClose {
        async fn send_frame(&mut self, frame: Vec<u8>) -> Result<(), ChannelError> {
            self.0.send_frame(frame).await
        }

        async fn recv_frame(&mut self) -> Result<Vec<u8>, ChannelError> {
            self.0.recv_frame().await
        }

        async fn close(&mut self, _reason: Option<CloseReason>) -> Result<(), ChannelError> {
            Err(ChannelError::Transport("connection reset".into()))
        }
    }

    #[tokio::test]
    async fn test_close_failure_keeps_admission() {
        let h = harness();
        let mut registration = policy("r1", TOKEN);
        registration.spec.cluster_name = Some("prod".into());
        h.store.create_registration(registration).await.unwrap();
        h.store
            .put_cluster(Cluster {
                namespace: "fleet-default".into(),
                name: "prod".into(),
                internal_name: Some("c-abc12".into()),
            })
            .await
            .unwrap();

        let tpm = SoftwareTpm::fixture();
        let mut headers = smbios_headers();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&tpm.authorization_header().unwrap()).unwrap(),
        );
        let candidate = h.admission.build_candidate(TOKEN, &headers).await.unwrap();
        let Authentication::Challenge(pending) = h
            .authenticator
            .begin(&headers, Some(candidate.enrollment()))
            .await
            .unwrap()
        else {
            panic!("expected a challenge");
        };

        let (server, mut client) = MemoryChannel::pair();
        let machine = tokio::spawn(async move {
            let challenge = client.recv_frame().await.unwrap();
            client
                .send_frame(tpm.respond(&challenge).unwrap())
                .await
                .unwrap();
            client.recv_frame().await
        });
        let admitted = h
            .admission
            .admit(candidate, pending, ResetOnClose(server))
            .await
            .unwrap();
        assert!(machine.await.unwrap().is_ok());

        let stored = h
            .store
            .get_inventory("fleet-default", &admitted.name)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status.join_token_ref().map(|(ns, _)| ns), Some("c-abc12"));
    }
}
