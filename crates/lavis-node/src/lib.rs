// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! HTTP/WS surface for the Lavis desktop-assistant engine: `UnifiedChatService`
//! (C9) and `PushBus` (C11), plus the axum router that exposes them
//! (spec §6). Composition (wiring `ModelGateway`, `SystemActuator`,
//! `SkillRegistry`, `Scheduler`, `PersistentStore` together) lives one
//! layer up in `lavis-bootstrap`; this crate only needs them already built.

mod chat;
mod error;
mod http;
mod push;
mod ws;

pub use chat::{ChatReply, UnifiedChatService};
pub use error::GatewayError;
pub use http::{config_router, router, AppState};
pub use axum::Router;
pub use push::PushBus;
