// Copyright (c) 2026 Twinport Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod dispatcher;
pub mod ping_service;
pub mod translator;

pub use dispatcher::Dispatcher;
pub use translator::{ErrorBody, GatewayError, RestTranslator};
