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

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::{AdmiralError, AdmiralResult};

pub const SERVER_URL: &str = "server-url";
pub const CACERTS: &str = "cacerts";
pub const INTERNAL_CACERTS: &str = "internal-cacerts";

/// Global settings the handlers read on every request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Externally reachable base URL of this service
    pub server_url: String,
    /// CA bundle handed to machines
    pub cacerts: String,
    /// Fallback bundle when `cacerts` is empty
    pub internal_cacerts: String,
}

pub trait SettingsProvider: Send + Sync {
    /// Value of a named setting. An unknown name yields `None`.
    fn get(&self, name: &str) -> Option<String>;

    fn server_url(&self) -> AdmiralResult<String> {
        match self.get(SERVER_URL) {
            Some(url) if !url.is_empty() => Ok(url),
            _ => Err(AdmiralError::Configuration(format!("{SERVER_URL} is not set"))),
        }
    }

    /// The CA bundle: `cacerts`, falling back to `internal-cacerts`.
    fn cacert(&self) -> String {
        match self.get(CACERTS) {
            Some(ca) if !ca.is_empty() => ca,
            _ => self.get(INTERNAL_CACERTS).unwrap_or_default(),
        }
    }
}

/// Settings held in a lock-free snapshot that the admin surface can replace at
/// runtime.
pub struct DynamicSettings {
    current: ArcSwap<Settings>,
}

impl DynamicSettings {
    pub fn new(settings: Settings) -> Self {
        DynamicSettings {
            current: ArcSwap::from_pointee(settings),
        }
    }

    pub fn snapshot(&self) -> Arc<Settings> {
        self.current.load_full()
    }

    pub fn set(&self, name: &str, value: String) -> AdmiralResult<()> {
        if !matches!(name, SERVER_URL | CACERTS | INTERNAL_CACERTS) {
            return Err(AdmiralError::NotFound(format!("setting {name}")));
        }
        self.current.rcu(|current| {
            let mut next = Settings::clone(current);
            match name {
                SERVER_URL => next.server_url = value.clone(),
                CACERTS => next.cacerts = value.clone(),
                _ => next.internal_cacerts = value.clone(),
            }
            next
        });
        tracing::info!(setting = name, "Updated setting");
        Ok(())
    }
}

impl SettingsProvider for DynamicSettings {
    fn get(&self, name: &str) -> Option<String> {
        let settings = self.current.load();
        match name {
            SERVER_URL => Some(settings.server_url.clone()),
            CACERTS => Some(settings.cacerts.clone()),
            INTERNAL_CACERTS => Some(settings.internal_cacerts.clone()),
            _ => None,
        }
    }
}
