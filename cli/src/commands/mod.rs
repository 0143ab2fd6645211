// Copyright (c) 2026 Twinport Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the twinport CLI

pub mod call;
pub mod config;
pub mod serve;

pub use self::call::CallArgs;
pub use self::config::ConfigCommand;
pub use self::serve::ServeArgs;
