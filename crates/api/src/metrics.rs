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

use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

const TIME_BUCKETS: &[f64; 9] = &[0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 10.0];

const UPKEEP_PERIOD: Duration = Duration::from_secs(5);

pub const REGISTRATIONS: &str = "admiral_registrations_total";
pub const ATTESTATIONS: &str = "admiral_attestation_total";
pub const CACERTS_REQUESTS: &str = "admiral_cacerts_requests_total";
pub const HANDSHAKE_DURATION: &str = "admiral_attestation_handshake_duration_seconds";

/// How a registration request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Created,
    Existing,
    Sample,
    Rejected,
    Failed,
}

impl RegistrationOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            RegistrationOutcome::Created => "created",
            RegistrationOutcome::Existing => "existing",
            RegistrationOutcome::Sample => "sample",
            RegistrationOutcome::Rejected => "rejected",
            RegistrationOutcome::Failed => "failed",
        }
    }
}

pub fn record_registration(outcome: RegistrationOutcome) {
    metrics::counter!(REGISTRATIONS, "outcome" => outcome.as_str()).increment(1);
}

pub fn record_attestation(outcome: &'static str) {
    metrics::counter!(ATTESTATIONS, "outcome" => outcome).increment(1);
}

pub fn record_handshake_duration(elapsed: Duration) {
    metrics::histogram!(HANDSHAKE_DURATION).record(elapsed.as_secs_f64());
}

pub fn record_cacerts_request(signed: bool) {
    metrics::counter!(CACERTS_REQUESTS, "signed" => if signed { "true" } else { "false" })
        .increment(1);
}

pub(crate) fn setup_prometheus() -> Result<PrometheusHandle, BuildError> {
    let prometheus_handle = PrometheusBuilder::new()
        .add_global_label("system", "admiral-api")
        .add_global_label("build_version", env!("CARGO_PKG_VERSION"))
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            TIME_BUCKETS,
        )?
        .install_recorder()?;

    let handle_clone = prometheus_handle.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(UPKEEP_PERIOD).await;
            handle_clone.run_upkeep();
        }
    });

    Ok(prometheus_handle)
}
