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

use axum::extract::{ConnectInfo, Request};
use axum::middleware::Next;
use axum::response::Response;
use http::header::{CONTENT_LENGTH, USER_AGENT};

/// Emits one event per request. Registration tokens are cut from the logged
/// path.
pub(crate) async fn logger(request: Request, next: Next) -> Response {
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_default();
    let method = request.method().to_string();
    let path = redact_path(request.uri().path());
    let user_agent = header(&request, USER_AGENT.as_str());
    let request_length = header(&request, CONTENT_LENGTH.as_str());

    let response = next.run(request).await;

    tracing::info!(
        request_method = %method,
        request_path = %path,
        request_content_length = %request_length,
        request_user_agent = %user_agent,
        response_status = response.status().as_u16(),
        remote_addr = %remote,
        "request"
    );
    response
}

fn header(request: &Request, name: &str) -> String {
    request
        .headers()
        .get(name)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn redact_path(path: &str) -> String {
    match path.strip_prefix(crate::registration::REGISTRATION_PATH) {
        Some(token) if !token.is_empty() => {
            format!("{}<token>", crate::registration::REGISTRATION_PATH)
        }
        _ => path.to_string(),
    }
}
