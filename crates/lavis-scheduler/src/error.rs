// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use lavis_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("invalid cron expression: {0:?}")]
    InvalidCron(String),

    #[error("scheduled task {0:?} not found")]
    NotFound(String),

    #[error("scheduled task {0:?} is already enabled")]
    AlreadyEnabled(String),

    #[error("scheduled task {0:?} is already disabled")]
    AlreadyDisabled(String),

    #[error("backup failed: {0}")]
    Backup(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
