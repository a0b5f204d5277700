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

//! Maps an attested endorsement key to the machine it identifies.

use std::sync::Arc;

use attest::{EndorsementKey, verify_ek_chain};
use db::Store;
use model::MachineInventory;
use model::secret::{TLS_CERT_KEY, TPM_CA_SECRET_NAME};

use crate::{AdmiralError, AdmiralResult};

/// Where a fresh machine is enrolling: the namespace of the registration policy
/// and the secret in it that holds the EK trust roots.
#[derive(Debug, Clone, Copy)]
pub struct Enrollment<'a> {
    pub namespace: &'a str,
    pub ca_secret_name: &'a str,
}

/// Outcome of identity resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedMachine {
    /// A machine enrolling through a registration policy. Whether it already
    /// has an inventory is decided when the inventory is persisted.
    Enrolling { namespace: String, tpm_hash: String },
    /// The inventory of an already admitted machine.
    Known(MachineInventory),
}

impl ResolvedMachine {
    pub fn tpm_hash(&self) -> &str {
        match self {
            ResolvedMachine::Enrolling { tpm_hash, .. } => tpm_hash,
            ResolvedMachine::Known(inventory) => &inventory.spec.tpm_hash,
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            ResolvedMachine::Enrolling { namespace, .. } => namespace,
            ResolvedMachine::Known(inventory) => &inventory.namespace,
        }
    }
}

pub struct IdentityResolver {
    store: Arc<dyn Store>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        IdentityResolver { store }
    }

    /// With an enrollment the EK only has to chain to the enrollment
    /// namespace's trust roots. Without one the EK must belong to exactly one
    /// admitted machine.
    pub async fn resolve(
        &self,
        ek: &EndorsementKey,
        enrollment: Option<Enrollment<'_>>,
    ) -> AdmiralResult<ResolvedMachine> {
        let tpm_hash = ek.hash();

        if let Some(enrollment) = enrollment {
            self.verify_chain(ek, enrollment.namespace, enrollment.ca_secret_name)
                .await?;
            return Ok(ResolvedMachine::Enrolling {
                namespace: enrollment.namespace.to_string(),
                tpm_hash,
            });
        }

        let mut machines = self.store.find_inventories_by_hash(&tpm_hash).await?;
        match machines.len() {
            0 => Err(AdmiralError::authentication(format!(
                "machine not found for TPM hash {tpm_hash}"
            ))),
            1 => {
                let machine = machines.remove(0);
                self.verify_chain(ek, &machine.namespace, TPM_CA_SECRET_NAME)
                    .await?;
                Ok(ResolvedMachine::Known(machine))
            }
            n => {
                let names: Vec<String> = machines
                    .iter()
                    .map(|m| format!("{}/{}", m.namespace, m.name))
                    .collect();
                tracing::error!(
                    tpm_hash = %tpm_hash,
                    count = n,
                    machines = ?names,
                    "Multiple machines found for the same TPM hash"
                );
                Err(AdmiralError::AmbiguousState(format!(
                    "{n} machines share TPM hash {tpm_hash}"
                )))
            }
        }
    }

    /// Verifies the EK certificate against the trust roots stored in
    /// `(namespace, secret_name)`. Without that secret any EK is accepted.
    pub async fn verify_chain(
        &self,
        ek: &EndorsementKey,
        namespace: &str,
        secret_name: &str,
    ) -> AdmiralResult<()> {
        let Some(secret) = self.store.get_secret(namespace, secret_name).await? else {
            tracing::debug!(
                namespace,
                secret_name,
                "No TPM CA configured, accepting EK without chain verification"
            );
            return Ok(());
        };

        let roots = secret
            .data
            .get(TLS_CERT_KEY)
            .map(Vec::as_slice)
            .unwrap_or_default();
        verify_ek_chain(ek, roots).map_err(|e| {
            AdmiralError::authentication(format!(
                "verifying chain against {namespace}/{secret_name}: {e}"
            ))
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::BTreeMap;

    use attest::software::{SoftwareTpm, fixtures};
    use db::{MemoryStore, SecretStore};
    use model::{MachineInventorySpec, NewMachineInventory, Secret};

    use super::*;
    use crate::ErrorKind;

    fn ek(tpm: &SoftwareTpm) -> EndorsementKey {
        tpm.attestation_data().unwrap().endorsement_key().unwrap()
    }

    async fn put_ca(store: &MemoryStore, namespace: &str, pem: &str) {
        store
            .put_secret(Secret {
                namespace: namespace.to_string(),
                name: TPM_CA_SECRET_NAME.to_string(),
                data: BTreeMap::from([(TLS_CERT_KEY.to_string(), pem.as_bytes().to_vec())]),
            })
            .await
            .unwrap();
    }

    pub(crate) fn new_inventory(namespace: &str, tpm_hash: &str) -> NewMachineInventory {
        NewMachineInventory {
            namespace: namespace.to_string(),
            generate_name: "m-test-".to_string(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            spec: MachineInventorySpec {
                tpm_hash: tpm_hash.to_string(),
                ..Default::default()
            },
        }
    }

    const ENROLLMENT: Enrollment = Enrollment {
        namespace: "fleet-default",
        ca_secret_name: TPM_CA_SECRET_NAME,
    };

    #[tokio::test]
    async fn test_enrollment_without_ca_is_permissive() {
        let store = Arc::new(MemoryStore::default());
        let resolver = IdentityResolver::new(store);
        let tpm = SoftwareTpm::fixture().without_certificate();

        let machine = resolver.resolve(&ek(&tpm), Some(ENROLLMENT)).await.unwrap();
        assert_eq!(
            machine,
            ResolvedMachine::Enrolling {
                namespace: "fleet-default".into(),
                tpm_hash: tpm.ek_hash(),
            }
        );
    }

    #[tokio::test]
    async fn test_enrollment_with_ca() {
        let store = Arc::new(MemoryStore::default());
        put_ca(&store, "fleet-default", fixtures::CA_PEM).await;
        let resolver = IdentityResolver::new(store);

        let machine = resolver
            .resolve(&ek(&SoftwareTpm::fixture()), Some(ENROLLMENT))
            .await
            .unwrap();
        assert_eq!(machine.namespace(), "fleet-default");
    }

    #[tokio::test]
    async fn test_enrollment_with_untrusted_ca() {
        let store = Arc::new(MemoryStore::default());
        put_ca(&store, "fleet-default", fixtures::OTHER_CA_PEM).await;
        let resolver = IdentityResolver::new(store);

        let err = resolver
            .resolve(&ek(&SoftwareTpm::fixture()), Some(ENROLLMENT))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }

    #[tokio::test]
    async fn test_ca_requires_certificate() {
        let store = Arc::new(MemoryStore::default());
        put_ca(&store, "fleet-default", fixtures::CA_PEM).await;
        let resolver = IdentityResolver::new(store);

        let tpm = SoftwareTpm::fixture().without_certificate();
        assert!(resolver.resolve(&ek(&tpm), Some(ENROLLMENT)).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_machine() {
        let resolver = IdentityResolver::new(Arc::new(MemoryStore::default()));
        let err = resolver
            .resolve(&ek(&SoftwareTpm::fixture()), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }

    #[tokio::test]
    async fn test_known_machine() {
        let store = Arc::new(MemoryStore::default());
        let tpm = SoftwareTpm::fixture();
        let created = db::InventoryStore::create_inventory_if_absent(
            store.as_ref(),
            new_inventory("fleet-default", &tpm.ek_hash()),
        )
        .await
        .unwrap()
        .into_inner();

        let resolver = IdentityResolver::new(store);
        match resolver.resolve(&ek(&tpm), None).await.unwrap() {
            ResolvedMachine::Known(machine) => assert_eq!(machine, created),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_known_machine_chain_checked_in_its_namespace() {
        let store = Arc::new(MemoryStore::default());
        let tpm = SoftwareTpm::fixture();
        put_ca(&store, "fleet-default", fixtures::OTHER_CA_PEM).await;
        db::InventoryStore::create_inventory_if_absent(
            store.as_ref(),
            new_inventory("fleet-default", &tpm.ek_hash()),
        )
        .await
        .unwrap();

        let resolver = IdentityResolver::new(store);
        assert!(resolver.resolve(&ek(&tpm), None).await.is_err());
    }
}
