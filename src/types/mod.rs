// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Domain types shared across alertscan.
//!
//! - Chain data and the events wrapping it (`block`)
//! - Wire messages exchanged with bots (`message`)
//! - Findings and alerts (`alert`)
//! - Combiner subscriptions and alert events (`combiner`)
//! - Cache metadata (`cache`)

pub mod alert;
pub mod block;
pub mod cache;
pub mod combiner;
pub mod message;

// Note: Public types are re-exported from lib.rs, not here
