// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Chain data source contract consumed by the block feed.
//!
//! [`ChainSource`] is the only way the pipeline reads the chain. The
//! [`rpc::RpcChainSource`] adapter implements it on top of an alloy
//! [`Provider`](alloy_provider::Provider); tests implement it with scripted
//! mocks.

use alloy_primitives::B256;
use alloy_rpc_types::{Filter, Log};
use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::errors::RpcError;
use crate::types::block::{Block, Trace};

pub mod rpc;

/// A new chain head announced by a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Head {
    pub number: u64,
    pub hash: B256,
}

/// Read access to a chain.
///
/// Every method may fail transiently; the block feed retries with backoff.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Fetches a block with full transactions. `Ok(None)` means the block does
    /// not exist yet.
    async fn block_by_number(&self, number: u64) -> Result<Option<Block>, RpcError>;

    /// Fetches logs matching `filter`.
    async fn logs(&self, filter: &Filter) -> Result<Vec<Log>, RpcError>;

    /// Fetches parity-style traces for every transaction in a block.
    async fn trace_block(&self, number: u64) -> Result<Vec<Trace>, RpcError>;

    /// Returns the current chain head number.
    async fn block_number(&self) -> Result<u64, RpcError>;

    /// Streams new chain heads as they are produced.
    async fn subscribe_to_head(&self) -> Result<BoxStream<'static, Head>, RpcError>;
}
