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

use std::net::SocketAddr;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::{Deserialize, Serialize};

use crate::settings::Settings;

/// Prefix of environment variables that override file configuration.
pub const ENV_PREFIX: &str = "ADMIRAL_API_";

/// Configuration of the admiral-api service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmiralConfig {
    /// Address the HTTP server binds to
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// PostgreSQL connection string. Without one the service keeps its state
    /// in memory, which is only suitable for development.
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default = "default_max_database_connections")]
    pub max_database_connections: u32,

    /// Bearer token for the admin routes. The admin routes are not mounted when
    /// this is unset.
    #[serde(default)]
    pub admin_token: Option<String>,

    /// Initial values of the runtime settings
    #[serde(default)]
    pub settings: Settings,

    #[serde(default)]
    pub attestation: AttestationConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationConfig {
    /// Upper bound on the WebSocket upgrade
    #[serde(default = "default_upgrade_timeout", with = "humantime_serde")]
    pub upgrade_timeout: Duration,
    /// Upper bound on every frame read or write after the upgrade
    #[serde(default = "default_frame_timeout", with = "humantime_serde")]
    pub frame_timeout: Duration,
}

impl Default for AttestationConfig {
    fn default() -> Self {
        AttestationConfig {
            upgrade_timeout: default_upgrade_timeout(),
            frame_timeout: default_frame_timeout(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_max_database_connections() -> u32 {
    16
}

fn default_upgrade_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_frame_timeout() -> Duration {
    Duration::from_secs(10)
}

impl AdmiralConfig {
    /// Layers the site configuration over the base configuration, then
    /// `ADMIRAL_API_*` environment variables over both.
    pub fn load(config_str: &str, site_config_str: Option<&str>) -> Result<Self, figment::Error> {
        let mut figment = Figment::new().merge(Toml::string(config_str));
        if let Some(site) = site_config_str {
            figment = figment.merge(Toml::string(site));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__")).extract()
    }
}
