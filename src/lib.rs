// Copyright (c) 2025 Feedsync Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! # feedsync
//!
//! Client-side state synchronization for user preferences and a
//! cursor-paginated notification feed.
//!
//! Preference changes are applied locally first and persisted remotely in
//! the background, with per-key rollback when the server rejects them. The
//! notification feed pages through the server's records, tracks unread
//! state, and marks everything read at most once per feed lifetime.

pub mod auth;
pub mod client;
pub mod database;
pub mod error;
pub mod feed;
pub mod flags;
pub mod gateway;
pub mod settings;
pub mod share;
pub mod types;

pub use client::{Client, ClientConfig};
pub use error::{Error, Result};
pub use types::*;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
