// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Liveness reporting for feeds, streams and analyzers.
//!
//! Each component keeps a few trackers and turns them into [`Report`]s on
//! demand. An external supervisor decides what to do with them.

use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

/// An activity older than this is reported as lagging.
const ACTIVITY_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Unknown,
    Ok,
    Info,
    Lagging,
    Failing,
}

/// A single named health observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub name: String,
    pub status: Status,
    pub details: String,
}

pub type Reports = Vec<Report>;

/// Implemented by every component that exposes health.
pub trait Reporter {
    fn name(&self) -> &str;
    fn health(&self) -> Reports;
}

/// Records the last time something happened.
#[derive(Debug, Default)]
pub struct TimeTracker {
    ts: RwLock<Option<DateTime<Utc>>>,
}

impl TimeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the current time.
    pub fn set(&self) {
        self.set_at(Utc::now());
    }

    pub fn set_at(&self, ts: DateTime<Utc>) {
        if let Ok(mut guard) = self.ts.write() {
            *guard = Some(ts);
        }
    }

    pub fn get(&self) -> Option<DateTime<Utc>> {
        self.ts.read().ok().and_then(|guard| *guard)
    }

    /// Formats the timestamp and classifies it against `timeout`.
    pub fn check(&self, timeout: Duration) -> (String, Status) {
        let Some(ts) = self.get() else {
            return (String::new(), Status::Unknown);
        };
        let formatted = ts.to_rfc3339_opts(SecondsFormat::Secs, true);
        let late = chrono::Duration::from_std(timeout)
            .map(|timeout| ts + timeout < Utc::now())
            .unwrap_or(false);
        if late {
            (formatted, Status::Lagging)
        } else {
            (formatted, Status::Ok)
        }
    }

    pub fn report(&self, name: &str) -> Report {
        let (details, status) = self.check(ACTIVITY_TIMEOUT);
        Report {
            name: name.to_string(),
            status,
            details,
        }
    }
}

/// Records the latest informational message (e.g. the last block number).
#[derive(Debug, Default)]
pub struct MessageTracker {
    msg: RwLock<String>,
}

impl MessageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, msg: impl Into<String>) {
        if let Ok(mut guard) = self.msg.write() {
            *guard = msg.into();
        }
    }

    pub fn get(&self) -> String {
        self.msg.read().map(|guard| guard.clone()).unwrap_or_default()
    }

    pub fn report(&self, name: &str) -> Report {
        Report {
            name: name.to_string(),
            status: Status::Info,
            details: self.get(),
        }
    }
}

/// Records the latest error of a long-running task.
#[derive(Debug, Default)]
pub struct ErrorTracker {
    err: RwLock<Option<String>>,
}

impl ErrorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, err: &dyn std::error::Error) {
        if let Ok(mut guard) = self.err.write() {
            *guard = Some(err.to_string());
        }
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.err.write() {
            *guard = None;
        }
    }

    pub fn report(&self, name: &str) -> Report {
        let err = self.err.read().ok().and_then(|guard| guard.clone());
        match err {
            Some(details) => Report {
                name: name.to_string(),
                status: Status::Failing,
                details,
            },
            None => Report {
                name: name.to_string(),
                status: Status::Ok,
                details: String::new(),
            },
        }
    }
}
