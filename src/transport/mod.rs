// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Transport layer utilities for Alloy providers.
//!
//! [`RetryLayer`] is a Tower middleware layer that retries transient RPC
//! failures with exponential backoff. [`RetryConfig`] is shared with the block
//! feed, which applies the same backoff to its fetch loop.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use alertscan::transport::RetryLayer;
//! use alloy_rpc_client::ClientBuilder;
//! use alloy_provider::ProviderBuilder;
//!
//! let client = ClientBuilder::default()
//!     .layer(RetryLayer::new())
//!     .http(rpc_url);
//!
//! let provider = ProviderBuilder::new()
//!     .disable_recommended_fillers()
//!     .connect_client(client);
//! ```

mod retry;

pub(crate) use retry::calculate_backoff;
pub use retry::{RetryConfig, RetryLayer, RetryLayerBuilder, RetryService};
