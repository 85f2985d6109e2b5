// Copyright 2026 Dropcart Contributors
// SPDX-License-Identifier: Apache-2.0

//! Dropcart runtime: async checkout driver, task orchestration and the
//! live product feed.
//!
//! The library crate exposes every module for the binary and for
//! integration testing.

pub mod checkout;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod feed;
pub mod notify;
pub mod orchestrator;
pub mod storefront;
