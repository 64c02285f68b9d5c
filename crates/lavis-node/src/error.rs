// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Error categories surfaced over HTTP (spec §7's propagation policy: auth/
//! rate-limit become 4xx, timeout/network/unavailable become 5xx after
//! retry exhaustion).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("model error: {0}")]
    Model(#[from] lavis_model::ModelError),
    #[error("actuator error: {0}")]
    Actuator(#[from] lavis_actuator::ActuatorError),
    #[error("image error: {0}")]
    Image(#[from] lavis_image::ImageError),
    #[error("scheduler error: {0}")]
    Scheduler(#[from] lavis_scheduler::SchedulerError),
    #[error("skill error: {0}")]
    Skill(#[from] lavis_runtime::SkillError),
    #[error("store error: {0}")]
    Store(#[from] lavis_store::StoreError),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            GatewayError::Model(e) => model_status(e),
            GatewayError::Actuator(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Image(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Scheduler(_) => StatusCode::BAD_REQUEST,
            GatewayError::Skill(_) => StatusCode::NOT_FOUND,
            GatewayError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
        };
        (status, axum::Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

fn model_status(e: &lavis_model::ModelError) -> StatusCode {
    match e {
        lavis_model::ModelError::Auth(_) => StatusCode::UNAUTHORIZED,
        lavis_model::ModelError::RateLimit(_) => StatusCode::TOO_MANY_REQUESTS,
        lavis_model::ModelError::Timeout(_)
        | lavis_model::ModelError::Network(_)
        | lavis_model::ModelError::Unavailable(_) => StatusCode::BAD_GATEWAY,
        lavis_model::ModelError::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
