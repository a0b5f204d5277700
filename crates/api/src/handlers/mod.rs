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

use axum::Router;

use crate::middleware;
use crate::state::AppState;

pub(crate) mod admin;
pub(crate) mod cacerts;
pub(crate) mod metrics;
pub(crate) mod register;

pub const API_PREFIX: &str = "/v1-admiral";

/// All routes of the service. `/metrics` and `/healthz` stay out of the
/// request log.
pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .merge(register::get_router(&format!("{API_PREFIX}/registration")))
        .merge(cacerts::get_router(&format!("{API_PREFIX}/cacerts")));
    if state.admin_token.is_some() {
        router = router.nest(
            &format!("{API_PREFIX}/admin"),
            admin::get_router(state.clone()),
        );
    }

    router
        .route_layer(axum::middleware::from_fn(middleware::logging::logger))
        .merge(metrics::get_router("/metrics", "/healthz"))
        .with_state(state)
}
