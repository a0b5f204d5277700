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

use admiral::cfg::file::AdmiralConfig;
use admiral::handlers::router;
use admiral::state::AppState;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use db::MemoryStore;
use model::MachineRegistration;
use model::secret::token_hash;
use serde_json::{Value, json};
use tower::ServiceExt;

const ADMIN: &str = "Bearer admin-secret";

const CONFIG: &str = r#"
admin_token = "admin-secret"

[settings]
server_url = "https://admiral.example"
cacerts = "-----BEGIN CERTIFICATE-----"
"#;

fn app(config: &str) -> Router {
    let config = AdmiralConfig::load(config, None).unwrap();
    router(AppState::new(&config, Arc::new(MemoryStore::new()), None))
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

async fn body_string(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn admin_json(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", ADMIN)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn create_registration(app: &Router) -> MachineRegistration {
    let response = send(
        app,
        admin_json(
            "POST",
            "/v1-admiral/admin/registrations",
            json!({
                "namespace": "fleet-default",
                "name": "edge",
                "spec": { "machineName": "edge-${System Information/Serial Number}" }
            }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    serde_json::from_str(&body_string(response).await).unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = app(CONFIG);
    let response = send(&app, Request::get("/healthz").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);

    // No recorder was installed.
    let response = send(&app, Request::get("/metrics").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_requires_token() {
    let app = app(CONFIG);
    let mut request = admin_json("PUT", "/v1-admiral/admin/settings/server-url", json!("x"));
    request.headers_mut().remove("Authorization");
    assert_eq!(send(&app, request).await.status(), StatusCode::UNAUTHORIZED);

    let mut request = admin_json("PUT", "/v1-admiral/admin/settings/server-url", json!("x"));
    request
        .headers_mut()
        .insert("Authorization", "Bearer admin-secreT".parse().unwrap());
    assert_eq!(send(&app, request).await.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_disabled_without_token() {
    let app = app("[settings]\nserver_url = \"https://admiral.example\"\n");
    let response = send(
        &app,
        admin_json("GET", "/v1-admiral/admin/inventories/fleet-default", json!(null)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_registration_lifecycle() {
    let app = app(CONFIG);
    let registration = create_registration(&app).await;
    let token = registration.status.registration_token.clone().unwrap();
    assert_eq!(
        registration.status.registration_url.as_deref(),
        Some(format!("https://admiral.example/v1-admiral/registration/{token}").as_str())
    );

    let response = send(
        &app,
        Request::get("/v1-admiral/admin/registrations/fleet-default/edge")
            .header("Authorization", ADMIN)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let fetched: MachineRegistration = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(fetched.status, registration.status);

    let response = send(
        &app,
        admin_json(
            "POST",
            "/v1-admiral/admin/registrations",
            json!({ "namespace": "fleet-default", "name": "edge" }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(
        &app,
        Request::get("/v1-admiral/admin/registrations/fleet-default/missing")
            .header("Authorization", ADMIN)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(
        &app,
        Request::get("/v1-admiral/admin/registrations")
            .header("Authorization", ADMIN)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let listed: Vec<MachineRegistration> =
        serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "edge");

    let delete = || {
        Request::delete("/v1-admiral/admin/registrations/fleet-default/edge")
            .header("Authorization", ADMIN)
            .body(Body::empty())
            .unwrap()
    };
    assert_eq!(send(&app, delete()).await.status(), StatusCode::NO_CONTENT);
    assert_eq!(send(&app, delete()).await.status(), StatusCode::NOT_FOUND);

    // The token no longer admits anyone.
    let response = send(
        &app,
        Request::get(format!("/v1-admiral/registration/{token}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_without_credentials_returns_sample_config() {
    let app = app(CONFIG);
    let registration = create_registration(&app).await;
    let token = registration.status.registration_token.unwrap();

    for method in ["GET", "POST"] {
        let response = send(
            &app,
            Request::builder()
                .method(method)
                .uri(format!("/v1-admiral/registration/{token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(body.starts_with("#cloud-config\n"));

        let document: serde_yaml::Value = serde_yaml::from_str(&body).unwrap();
        assert_eq!(
            document["rancheros"]["install"]["registrationURL"].as_str(),
            registration.status.registration_url.as_deref()
        );
        assert_eq!(
            document["rancheros"]["install"]["registrationCaCert"].as_str(),
            Some("-----BEGIN CERTIFICATE-----")
        );
    }
}

#[tokio::test]
async fn test_register_unknown_token() {
    let app = app(CONFIG);
    let response = send(
        &app,
        Request::post("/v1-admiral/registration/not-a-token")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_string(response).await, "authorization required");
}

#[tokio::test]
async fn test_register_with_tpm_requires_upgrade() {
    let app = app(CONFIG);
    let token = create_registration(&app)
        .await
        .status
        .registration_token
        .unwrap();
    let header = attest::software::SoftwareTpm::fixture()
        .authorization_header()
        .unwrap();

    let response = send(
        &app,
        Request::post(format!("/v1-admiral/registration/{token}"))
            .header("Authorization", header)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_with_malformed_smbios() {
    let app = app(CONFIG);
    let token = create_registration(&app)
        .await
        .status
        .registration_token
        .unwrap();

    let response = send(
        &app,
        Request::post(format!("/v1-admiral/registration/{token}"))
            .header("X-Cattle-Smbios", STANDARD.encode("[not a map"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_cacerts() {
    let app = app(CONFIG);
    let response = send(
        &app,
        admin_json(
            "PUT",
            "/v1-admiral/admin/secrets",
            json!({
                "namespace": "fleet-default",
                "name": "node-token",
                "data": { "token": STANDARD.encode("shared") }
            }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(
        &app,
        Request::get("/v1-admiral/cacerts")
            .header("Authorization", format!("Bearer {}", token_hash("shared")))
            .header("X-Cattle-Nonce", "nonce")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/plain");
    let hash = response.headers()["x-cattle-hash"].to_str().unwrap().to_string();
    let body = body_string(response).await;
    assert_eq!(body, "-----BEGIN CERTIFICATE-----\n");
    assert_eq!(
        hash,
        admiral::cacert::cattle_hash(b"shared", b"nonce", body.as_bytes()).unwrap()
    );

    let response = send(
        &app,
        Request::get("/v1-admiral/cacerts")
            .header("X-Cattle-Nonce", "nonce")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert!(response.headers().get("x-cattle-hash").is_none());
}

#[tokio::test]
async fn test_settings_update_is_visible() {
    let app = app(CONFIG);
    let response = send(
        &app,
        Request::put("/v1-admiral/admin/settings/cacerts")
            .header("Authorization", ADMIN)
            .body(Body::from("ROTATED"))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(&app, Request::get("/v1-admiral/cacerts").body(Body::empty()).unwrap()).await;
    assert_eq!(body_string(response).await, "ROTATED\n");

    let response = send(
        &app,
        Request::put("/v1-admiral/admin/settings/log-level")
            .header("Authorization", ADMIN)
            .body(Body::from("debug"))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
