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
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue};

use crate::cacert::{CaCerts, HASH_HEADER};
use crate::state::AppState;

async fn cacerts(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let CaCerts { body, hash } = state.ca.disclose(&headers).await;

    let mut response = ([(CONTENT_TYPE, "text/plain")], body).into_response();
    if let Some(hash) = hash.and_then(|h| HeaderValue::from_str(&h).ok()) {
        response.headers_mut().insert(HASH_HEADER, hash);
    }
    response
}

pub fn get_router(path_prefix: &str) -> Router<AppState> {
    Router::new().route(path_prefix, get(cacerts))
}
