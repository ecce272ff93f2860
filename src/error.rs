// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::warn;

use crate::auth::AuthError;
use crate::oauth2::UserinfoError;

/// Non-authentication failures of gateway handlers.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

/// Either side of a handler that authenticates and then calls out.
#[derive(Debug)]
pub enum HandlerError {
    Auth(AuthError),
    Api(ApiError),
}

impl From<AuthError> for HandlerError {
    fn from(e: AuthError) -> Self {
        HandlerError::Auth(e)
    }
}

impl From<ApiError> for HandlerError {
    fn from(e: ApiError) -> Self {
        HandlerError::Api(e)
    }
}

impl From<UserinfoError> for HandlerError {
    fn from(e: UserinfoError) -> Self {
        match e {
            UserinfoError::Session(auth) => HandlerError::Auth(auth),
            UserinfoError::Provider(provider) => {
                warn!(error = %provider, "Userinfo call failed");
                HandlerError::Api(ApiError::bad_gateway("Identity provider request failed"))
            }
        }
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        match self {
            HandlerError::Auth(e) => e.into_response(),
            HandlerError::Api(e) => e.into_response(),
        }
    }
}
