// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Turning bot findings into alerts: ids, address bloom filters and
//! truncation.

pub mod alerthash;
pub mod bloom;
mod truncate;

pub use alerthash::BotIdentity;
pub use bloom::AddressBloomFilter;
pub use truncate::truncate_finding;
