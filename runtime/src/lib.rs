// Copyright 2026 livenav contributors
// SPDX-License-Identifier: Apache-2.0

//! livenav runtime library: Chromium acquisition over CDP, HAR recording,
//! configuration and the command-line front end.
//!
//! This library crate exposes the runtime modules for integration testing.

pub mod browser;
pub mod cli;
pub mod config;
pub mod logging;
