// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

/// Errors from the combiner alert cache.
///
/// A corrupt snapshot is not an error: the cache recovers by starting empty.
/// These variants cover the I/O that cannot be recovered locally.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Cache file I/O failed.
    #[error("Cache I/O failed for {path}")]
    Io {
        /// Path of the cache file
        path: String,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Cache entries could not be serialized.
    #[error("Failed to serialize cache for {path}")]
    Serialize {
        /// Path of the cache file
        path: String,
        /// The underlying serde error
        #[source]
        source: serde_json::Error,
    },
}

impl CacheError {
    /// Helper to create an `Io` error.
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }

    /// Helper to create a `Serialize` error.
    pub fn serialize(path: impl Into<String>, source: serde_json::Error) -> Self {
        CacheError::Serialize {
            path: path.into(),
            source,
        }
    }
}
