// Copyright (c) 2026 Twinport Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Library half of the `twinport` binary, so the command handlers can be
//! exercised from tests.

pub mod commands;
