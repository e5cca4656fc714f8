//! Replay mode: calls are served from a stored recording in FIFO order.

use crate::errors::{ImpersonatorError, MethodInvocationError};
use crate::logging::append_run_log;
use crate::replay::method::{Method, MethodInvocation};
use crate::store::InvocationStore;
use crate::target::Callback;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;

pub struct ReplayMode {
    key: String,
    store: Arc<dyn InvocationStore>,
    method_invocations: VecDeque<MethodInvocation>,
}

impl ReplayMode {
    pub fn new(key: impl Into<String>, store: Arc<dyn InvocationStore>) -> Self {
        Self {
            key: key.into(),
            store,
            method_invocations: VecDeque::new(),
        }
    }

    pub fn start(&mut self) -> Result<(), ImpersonatorError> {
        append_run_log("debug", "recording.mode", json!({ "key": self.key, "mode": "replay" }));
        self.method_invocations = self.store.read(&self.key)?.into();
        Ok(())
    }

    /// Serve the next recorded invocation if `method` matches it, replaying
    /// the recorded callback calls against `block`.
    pub fn invoke(
        &mut self,
        method: Method,
        block: Option<Callback<'_>>,
    ) -> Result<Value, ImpersonatorError> {
        let Some(expected) = self.method_invocations.pop_front() else {
            return Err(MethodInvocationError::Unexpected {
                received: method.to_string(),
            }
            .into());
        };

        if !method.matches(&expected.method_instance) {
            return Err(MethodInvocationError::Mismatch {
                expected: expected.method_instance.to_string(),
                received: method.to_string(),
            }
            .into());
        }

        let mut replayed = 0usize;
        if let (Some(spy), Some(block)) = (expected.method_instance.block_spy.as_ref(), block) {
            for block_invocation in &spy.block_invocations {
                block(&block_invocation.arguments);
                replayed += 1;
            }
        }

        append_run_log(
            "debug",
            "recording.invocation.replayed",
            json!({
                "key": self.key,
                "method": method.to_string(),
                "block_invocations": replayed,
                "remaining": self.method_invocations.len(),
            }),
        );
        Ok(expected.return_value)
    }

    /// Fail when recorded invocations were never replayed.
    pub fn finish(&mut self) -> Result<(), ImpersonatorError> {
        match self.unconsumed() {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }

    /// Failure-path counterpart of `finish`: leftovers are reported to the
    /// run log instead of being returned.
    pub fn abort(&mut self) {
        if let Some(error) = self.unconsumed() {
            append_run_log(
                "warn",
                "recording.replay.unconsumed",
                json!({ "key": self.key, "error": error.to_string() }),
            );
        }
        self.method_invocations.clear();
    }

    pub fn remaining(&self) -> usize {
        self.method_invocations.len()
    }

    fn unconsumed(&self) -> Option<MethodInvocationError> {
        if self.method_invocations.is_empty() {
            return None;
        }
        Some(MethodInvocationError::Unconsumed {
            count: self.method_invocations.len(),
            pending: self
                .method_invocations
                .iter()
                .map(ToString::to_string)
                .collect(),
        })
    }
}
