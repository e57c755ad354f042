// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Address bloom filters attached to alerts.
//!
//! Consumers test whether an alert involves an address without the alert
//! carrying every address. Filters are sized for the number of distinct
//! addresses at [`ADDRESS_BLOOM_FILTER_FP_RATE`]:
//!
//! - m = ⌈-n·ln p / ln²2⌉ bits
//! - k = round((m / n)·ln 2) hash functions, clamped to 1..=32
//!
//! Bit positions use double hashing over murmur3 x64-128:
//! `(h1 + i·h2) mod m`, with `h1` and `h2` the low 64 bits of the hash with
//! seeds 0 and 1. Addresses are lowercased before hashing.

use std::collections::BTreeSet;
use std::f64::consts::LN_2;
use std::io::Cursor;

use bitvec::prelude::*;

use crate::config::constants::ADDRESS_BLOOM_FILTER_FP_RATE;
use crate::errors::AnalyzerError;
use crate::types::alert::{BloomFilterMessage, Finding};
use crate::types::message::TransactionEventMessage;

const MAX_HASH_FUNCTIONS: u32 = 32;

/// Optimal (m, k) for `n` items at false positive rate `fp_rate`.
pub fn optimal_parameters(n: usize, fp_rate: f64) -> (u64, u32) {
    if n == 0 {
        return (1, 1);
    }
    let n = n as f64;
    let m = (-n * fp_rate.ln() / (LN_2 * LN_2)).ceil().max(1.0);
    let k = ((m / n) * LN_2).round() as u32;
    (m as u64, k.clamp(1, MAX_HASH_FUNCTIONS))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressBloomFilter {
    bits: BitVec<u8, Lsb0>,
    k: u32,
    m: u64,
    item_count: u32,
}

impl AddressBloomFilter {
    /// Creates an empty filter sized for `expected` addresses.
    pub fn with_capacity(expected: usize, fp_rate: f64) -> Self {
        let (m, k) = optimal_parameters(expected, fp_rate);
        Self {
            bits: bitvec![u8, Lsb0; 0; m as usize],
            k,
            m,
            item_count: 0,
        }
    }

    /// Builds a filter over the distinct (case-insensitive) `addresses`.
    pub fn from_addresses<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let distinct: BTreeSet<String> = addresses
            .into_iter()
            .map(|address| address.as_ref().to_lowercase())
            .collect();
        let mut filter = Self::with_capacity(distinct.len(), ADDRESS_BLOOM_FILTER_FP_RATE);
        for address in &distinct {
            filter.insert(address);
        }
        filter
    }

    /// Filter over the addresses a finding names.
    pub fn for_finding(finding: &Finding) -> Self {
        Self::from_addresses(&finding.addresses)
    }

    /// Filter over the finding's addresses and every address the
    /// transaction touched.
    pub fn for_transaction_finding(finding: &Finding, event: &TransactionEventMessage) -> Self {
        Self::from_addresses(finding.addresses.iter().chain(event.addresses.iter()))
    }

    pub fn insert(&mut self, address: &str) {
        let address = address.to_lowercase();
        for position in self.positions(&address) {
            self.bits.set(position, true);
        }
        self.item_count = self.item_count.saturating_add(1);
    }

    /// Returns `false` if `address` was definitely never inserted.
    pub fn contains(&self, address: &str) -> bool {
        let address = address.to_lowercase();
        self.positions(&address).all(|position| self.bits[position])
    }

    pub fn k(&self) -> u32 {
        self.k
    }

    pub fn m(&self) -> u64 {
        self.m
    }

    pub fn item_count(&self) -> u32 {
        self.item_count
    }

    pub fn to_message(&self) -> BloomFilterMessage {
        BloomFilterMessage {
            k: self.k,
            m: self.m,
            bitset: hex::encode(self.bits.as_raw_slice()),
            item_count: self.item_count,
        }
    }

    /// Restores a filter from its wire form.
    pub fn from_message(message: &BloomFilterMessage) -> Result<Self, AnalyzerError> {
        let bytes = hex::decode(message.bitset.trim_start_matches("0x"))
            .map_err(|e| AnalyzerError::transform("bloom filter", e.to_string()))?;
        let m = usize::try_from(message.m)
            .map_err(|e| AnalyzerError::transform("bloom filter", e.to_string()))?;
        if message.k == 0 || m == 0 || bytes.len() * 8 < m {
            return Err(AnalyzerError::transform(
                "bloom filter",
                format!(
                    "inconsistent parameters: k={}, m={}, {} bitset bytes",
                    message.k,
                    message.m,
                    bytes.len()
                ),
            ));
        }
        let mut bits = BitVec::<u8, Lsb0>::from_vec(bytes);
        bits.truncate(m);
        Ok(Self {
            bits,
            k: message.k,
            m: message.m,
            item_count: message.item_count,
        })
    }

    fn positions(&self, address: &str) -> impl Iterator<Item = usize> {
        let h1 = murmur_hash(address.as_bytes(), 0);
        let h2 = murmur_hash(address.as_bytes(), 1);
        let m = self.m;
        (0..u64::from(self.k)).map(move |i| (h1.wrapping_add(i.wrapping_mul(h2)) % m) as usize)
    }
}

fn murmur_hash(element: &[u8], seed: u32) -> u64 {
    // Reading from an in-memory cursor cannot fail.
    murmur3::murmur3_x64_128(&mut Cursor::new(element), seed).unwrap_or(0) as u64
}
