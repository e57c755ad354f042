// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

use crate::config::constants::MAX_ADDRESSES_PER_ALERT;
use crate::types::alert::Finding;

/// Sorts the finding's addresses and keeps at most
/// [`MAX_ADDRESSES_PER_ALERT`] of them.
///
/// Returns `true` if addresses were dropped.
///
/// ```rust
/// use alertscan::alerts::truncate_finding;
/// use alertscan::types::alert::Finding;
///
/// let mut finding = Finding {
///     addresses: vec!["0xb".into(), "0xa".into()],
///     ..Default::default()
/// };
/// assert!(!truncate_finding(&mut finding));
/// assert_eq!(finding.addresses, vec!["0xa", "0xb"]);
/// ```
pub fn truncate_finding(finding: &mut Finding) -> bool {
    finding.addresses.sort_unstable();
    if finding.addresses.len() > MAX_ADDRESSES_PER_ALERT {
        finding.addresses.truncate(MAX_ADDRESSES_PER_ALERT);
        true
    } else {
        false
    }
}
