//! Test doubles for the driver seam.
//!
//! `RecordingDriver` is the reference `Driver` implementation for the test
//! suites: it records every native operation it receives and answers from a
//! scripted response queue. The partial-update and cancellation properties
//! are verified against its recording, without a live backend.

use crate::{
    driver::{Driver, DriverError, DriverResponse},
    query::compile::NativeOp,
    value::WireRow,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::sync::Notify;

///
/// ScriptedResponse
///
/// One queued driver answer. An empty queue answers every request with a
/// plain single-row acknowledgement.
///

#[derive(Clone, Debug, Default)]
pub struct ScriptedResponse {
    pub rows: Vec<WireRow>,
    pub affected: u64,
    pub assigned_id: Option<String>,
    pub fail: Option<String>,
}

impl ScriptedResponse {
    #[must_use]
    pub fn ack() -> Self {
        Self {
            affected: 1,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn rows(rows: Vec<WireRow>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn assigned(id: impl Into<String>) -> Self {
        Self {
            affected: 1,
            assigned_id: Some(id.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            fail: Some(message.into()),
            ..Self::default()
        }
    }
}

///
/// RecordingDriver
///

#[derive(Default)]
pub struct RecordingDriver {
    script: Mutex<VecDeque<ScriptedResponse>>,
    recorded: Mutex<Vec<NativeOp>>,
    hang: AtomicBool,
    gate: Notify,
    closed: AtomicBool,
}

impl RecordingDriver {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue the answer for the next unanswered request.
    pub fn push(&self, response: ScriptedResponse) {
        self.script.lock().push_back(response);
    }

    /// Every native operation received so far, in arrival order.
    #[must_use]
    pub fn recorded(&self) -> Vec<NativeOp> {
        self.recorded.lock().clone()
    }

    #[must_use]
    pub fn request_count(&self) -> usize {
        self.recorded.lock().len()
    }

    /// Keep recording operations but never acknowledge them; requests
    /// suspend until the caller cancels.
    pub fn never_acknowledge(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Driver for RecordingDriver {
    async fn request(&self, op: NativeOp) -> Result<DriverResponse, DriverError> {
        self.recorded.lock().push(op);

        if self.hang.load(Ordering::SeqCst) {
            // never notified; suspends until the request future is dropped
            self.gate.notified().await;
        }

        let scripted = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(ScriptedResponse::ack);

        if let Some(message) = scripted.fail {
            return Err(DriverError::new(message));
        }

        Ok(DriverResponse {
            rows: Box::pin(futures_util::stream::iter(
                scripted.rows.into_iter().map(Ok),
            )),
            affected: scripted.affected,
            assigned_id: scripted.assigned_id,
        })
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.closed.store(true, Ordering::SeqCst);

        Ok(())
    }
}
