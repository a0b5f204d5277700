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

use std::sync::Arc;

use db::Store;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::admission::AdmissionHandler;
use crate::auth_tpm::Authenticator;
use crate::cacert::CaDisclosure;
use crate::cfg::file::{AdmiralConfig, AttestationConfig};
use crate::registration::RegistrationTokenManager;
use crate::settings::{DynamicSettings, SettingsProvider};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub settings: Arc<DynamicSettings>,
    pub admission: Arc<AdmissionHandler>,
    pub authenticator: Arc<Authenticator>,
    pub tokens: Arc<RegistrationTokenManager>,
    pub ca: Arc<CaDisclosure>,
    pub attestation: AttestationConfig,
    pub admin_token: Option<Arc<str>>,
    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        config: &AdmiralConfig,
        store: Arc<dyn Store>,
        prometheus_handle: Option<PrometheusHandle>,
    ) -> Self {
        let settings = Arc::new(DynamicSettings::new(config.settings.clone()));
        let provider: Arc<dyn SettingsProvider> = settings.clone();
        let tokens = Arc::new(RegistrationTokenManager::new(
            store.clone(),
            provider.clone(),
        ));

        AppState {
            admission: Arc::new(AdmissionHandler::new(
                store.clone(),
                provider.clone(),
                tokens.clone(),
            )),
            authenticator: Arc::new(Authenticator::new(
                store.clone(),
                config.attestation.frame_timeout,
            )),
            ca: Arc::new(CaDisclosure::new(store.clone(), provider)),
            tokens,
            settings,
            store,
            attestation: config.attestation,
            admin_token: config
                .admin_token
                .as_deref()
                .filter(|token| !token.is_empty())
                .map(Arc::from),
            prometheus_handle,
        }
    }
}
