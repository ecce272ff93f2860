// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::Request,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::middleware::{bearer_auth, session_auth};
use crate::state::AppState;

pub mod bearer;
pub mod health;
pub mod login;
pub mod protected;

/// Build the gateway router.
///
/// Session routes (`/protected/*`, the callback, `/logout`) are attached only
/// when the state carries an [`OAuth2Flow`](crate::oauth2::OAuth2Flow).
pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/api/greet", get(bearer::greet))
        .route("/api/user", get(bearer::user))
        .route("/api/admin", get(bearer::admin))
        .route_layer(from_fn_with_state(state.clone(), bearer_auth));

    let mut app = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .merge(api_routes);

    if let Some(flow) = &state.flow {
        let protected_routes = Router::new()
            .route("/protected/", get(protected::index))
            .route("/protected/user", get(protected::user))
            .route("/protected/admin", get(protected::admin))
            .route("/protected/userinfo", get(protected::userinfo))
            .route_layer(from_fn_with_state(state.clone(), session_auth));

        app = app
            .merge(protected_routes)
            .route("/", get(login::home))
            .route(flow.callback_path(), get(login::callback))
            .route("/logout", post(login::logout))
            .route("/login-error", get(login::login_error));
    }

    app.merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or_default();
                tracing::info_span!(
                    "http.request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

#[derive(OpenApi)]
#[openapi(
    paths(health::health, health::liveness, health::readiness),
    components(schemas(health::ReadyResponse, health::HealthChecks, health::HealthResponse)),
    tags(
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;
