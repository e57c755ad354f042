// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! [`ChainSource`] backed by an alloy provider.
//!
//! HTTP providers built with [`connect_http`] carry a [`RetryLayer`], so
//! individual requests are retried inside the transport before the block feed
//! sees an error. Head subscriptions need a pub/sub provider and the `ws`
//! feature; without it [`ChainSource::subscribe_to_head`] reports
//! [`RpcError::SubscriptionsUnsupported`] and the feed falls back to polling.

use std::borrow::Cow;

use alloy_provider::{Provider, ProviderBuilder, RootProvider};
use alloy_rpc_client::ClientBuilder;
use alloy_rpc_types::{BlockNumberOrTag, Filter, Log};
use async_trait::async_trait;
use futures::stream::BoxStream;
use tracing::debug;

use super::{ChainSource, Head};
use crate::errors::RpcError;
use crate::transport::{RetryConfig, RetryLayer};
use crate::types::block::{Block, Trace, Transaction};

/// HTTP chain source with transport-level retries.
pub type HttpChainSource = RpcChainSource<RootProvider>;

/// Adapts any Ethereum [`Provider`] to [`ChainSource`].
#[derive(Debug, Clone)]
pub struct RpcChainSource<P> {
    provider: P,
}

impl<P> RpcChainSource<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

/// Builds an HTTP chain source whose requests are retried per `retry`.
///
/// # Example
///
/// ```rust,ignore
/// use alertscan::chain::rpc::connect_http;
/// use alertscan::transport::RetryConfig;
///
/// let source = connect_http("https://eth.example.com", RetryConfig::default())?;
/// ```
pub fn connect_http(rpc_url: &str, retry: RetryConfig) -> Result<HttpChainSource, RpcError> {
    let url: url::Url = rpc_url
        .parse()
        .map_err(|e| RpcError::ProviderUrlInvalid(format!("{e}")))?;

    let client = ClientBuilder::default()
        .layer(RetryLayer::from_config(retry))
        .http(url);

    let provider = ProviderBuilder::new()
        .disable_recommended_fillers()
        .connect_client(client);

    Ok(RpcChainSource::new(provider))
}

#[async_trait]
impl<P> ChainSource for RpcChainSource<P>
where
    P: Provider + 'static,
{
    async fn block_by_number(&self, number: u64) -> Result<Option<Block>, RpcError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(number))
            .full()
            .await
            .map_err(|e| RpcError::get_block_failed(number, e))?;
        Ok(block.map(convert_block))
    }

    async fn logs(&self, filter: &Filter) -> Result<Vec<Log>, RpcError> {
        self.provider
            .get_logs(filter)
            .await
            .map_err(|e| RpcError::get_logs_failed(format!("{:?}", filter.block_option), e))
    }

    async fn trace_block(&self, number: u64) -> Result<Vec<Trace>, RpcError> {
        self.provider
            .raw_request::<_, Vec<Trace>>(
                Cow::Borrowed("trace_block"),
                (BlockNumberOrTag::Number(number),),
            )
            .await
            .map_err(|e| RpcError::trace_block_failed(number, e))
    }

    async fn block_number(&self) -> Result<u64, RpcError> {
        self.provider
            .get_block_number()
            .await
            .map_err(RpcError::get_block_number_failed)
    }

    #[cfg(feature = "ws")]
    async fn subscribe_to_head(&self) -> Result<BoxStream<'static, Head>, RpcError> {
        use futures::StreamExt;

        let subscription = self
            .provider
            .subscribe_blocks()
            .await
            .map_err(|e| RpcError::subscription_failed("newHeads", e))?;
        debug!("Head subscription established");

        Ok(subscription
            .into_stream()
            .map(|header| Head {
                number: header.number,
                hash: header.hash,
            })
            .boxed())
    }

    #[cfg(not(feature = "ws"))]
    async fn subscribe_to_head(&self) -> Result<BoxStream<'static, Head>, RpcError> {
        debug!("Head subscriptions need the `ws` feature");
        Err(RpcError::SubscriptionsUnsupported)
    }
}

fn convert_block(block: alloy_rpc_types::Block) -> Block {
    let header = &block.header;
    Block {
        hash: header.hash,
        parent_hash: header.inner.parent_hash,
        number: header.inner.number,
        timestamp: header.inner.timestamp,
        base_fee_per_gas: header.inner.base_fee_per_gas,
        transactions: block.transactions.txns().map(convert_transaction).collect(),
    }
}

fn convert_transaction(tx: &alloy_rpc_types::Transaction) -> Transaction {
    use alloy_consensus::Transaction as ConsensusTx;
    use alloy_network::TransactionResponse;

    // Both traits are implemented on the RPC type; qualify every call.
    Transaction {
        hash: TransactionResponse::tx_hash(tx),
        from: TransactionResponse::from(tx),
        to: ConsensusTx::to(tx),
        nonce: ConsensusTx::nonce(tx),
        value: ConsensusTx::value(tx),
        gas: ConsensusTx::gas_limit(tx),
        gas_price: ConsensusTx::gas_price(tx),
        input: ConsensusTx::input(tx).clone(),
    }
}
