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

//! Domain types shared by the admiral store and service crates.

pub mod cluster;
pub mod inventory;
pub mod machine_name;
pub mod names;
pub mod registration;
pub mod secret;
pub mod values;

pub use cluster::{Cluster, ClusterRegistrationToken};
pub use inventory::{
    MachineInventory, MachineInventorySpec, MachineInventoryStatus, NewMachineInventory,
};
pub use registration::{MachineRegistration, MachineRegistrationSpec, MachineRegistrationStatus};
pub use secret::Secret;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("cannot set {path}: {segment} is not a map")]
    NotAMap { path: String, segment: String },
    #[error("invalid name {0:?}: {1}")]
    InvalidName(String, &'static str),
}

pub type ModelResult<T> = Result<T, ModelError>;
