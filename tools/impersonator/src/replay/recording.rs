//! A recording is one scenario's record/replay session.
//!
//! The mode is chosen once, when the recording is created: record when the
//! recording is disabled or nothing is stored under its key, replay
//! otherwise. Work happens in three moments, each delegated to the mode:
//! `start`, `invoke` (once per intercepted call) and `finish` (or `abort` on
//! the failure path).

use crate::double::Double;
use crate::errors::ImpersonatorError;
use crate::logging::append_run_log;
use crate::proxy::Proxy;
use crate::replay::method::Method;
use crate::replay::recorder::RecordMode;
use crate::replay::replayer::ReplayMode;
use crate::storage_key::key_for_label;
use crate::store::InvocationStore;
use crate::target::{Callback, Impersonate};
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Pending,
    Active,
    Finished,
}

impl RecordingState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Finished => "finished",
        }
    }
}

enum Mode {
    Record(RecordMode),
    Replay(ReplayMode),
}

pub struct Recording {
    label: String,
    key: String,
    disabled: bool,
    state: RecordingState,
    mode: Mode,
}

impl Recording {
    /// `disabled` forces record mode even when a stored recording exists.
    pub fn new(
        label: impl Into<String>,
        disabled: bool,
        store: Arc<dyn InvocationStore>,
    ) -> Result<Self, ImpersonatorError> {
        let label = label.into();
        let key = key_for_label(&label)?;
        let mode = if disabled || !store.try_exists(&key)? {
            Mode::Record(RecordMode::new(key.clone(), store))
        } else {
            Mode::Replay(ReplayMode::new(key.clone(), store))
        };
        Ok(Self {
            label,
            key,
            disabled,
            state: RecordingState::Pending,
            mode,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == RecordingState::Active
    }

    pub fn is_record_mode(&self) -> bool {
        matches!(self.mode, Mode::Record(_))
    }

    pub fn is_replay_mode(&self) -> bool {
        matches!(self.mode, Mode::Replay(_))
    }

    fn mode_name(&self) -> &'static str {
        if self.is_record_mode() {
            "record"
        } else {
            "replay"
        }
    }

    pub fn start(&mut self) -> Result<(), ImpersonatorError> {
        if self.state != RecordingState::Pending {
            return Err(ImpersonatorError::Configuration(format!(
                "recording `{}` cannot start: it is {}",
                self.label,
                self.state.as_str()
            )));
        }
        append_run_log(
            "debug",
            "recording.started",
            json!({ "label": self.label, "key": self.key, "mode": self.mode_name() }),
        );
        match &mut self.mode {
            Mode::Record(mode) => mode.start()?,
            Mode::Replay(mode) => mode.start()?,
        }
        self.state = RecordingState::Active;
        Ok(())
    }

    /// Handle one intercepted call: reach `target` while recording, serve the
    /// stored invocation while replaying.
    pub fn invoke<T: Impersonate + ?Sized>(
        &mut self,
        target: &mut T,
        method: Method,
        block: Option<Callback<'_>>,
    ) -> Result<Value, ImpersonatorError> {
        self.ensure_active()?;
        match &mut self.mode {
            Mode::Record(mode) => mode.invoke(target, method, block),
            Mode::Replay(mode) => mode.invoke(method, block),
        }
    }

    /// Persist (record) or verify that every recorded call happened (replay).
    /// The recording is finished afterwards whatever the outcome.
    pub fn finish(&mut self) -> Result<(), ImpersonatorError> {
        self.ensure_active()?;
        self.state = RecordingState::Finished;
        let result = match &mut self.mode {
            Mode::Record(mode) => mode.finish(),
            Mode::Replay(mode) => mode.finish(),
        };
        append_run_log(
            if result.is_ok() { "debug" } else { "warn" },
            "recording.finished",
            json!({
                "label": self.label,
                "key": self.key,
                "mode": self.mode_name(),
                "ok": result.is_ok(),
            }),
        );
        result
    }

    /// Close the recording after the scenario failed. Nothing is persisted and
    /// replay leftovers are only logged, so the scenario's own error is the
    /// one the caller sees.
    pub fn abort(&mut self) {
        if self.state != RecordingState::Active {
            return;
        }
        self.state = RecordingState::Finished;
        match &mut self.mode {
            Mode::Record(mode) => mode.abort(),
            Mode::Replay(mode) => mode.abort(),
        }
        append_run_log(
            "warn",
            "recording.aborted",
            json!({ "label": self.label, "key": self.key, "mode": self.mode_name() }),
        );
    }

    /// Wrap `target`, intercepting `methods` through this recording.
    pub fn impersonate<'t, T: Impersonate + ?Sized>(
        &self,
        target: &'t mut T,
        methods: &[&str],
    ) -> Result<Proxy<'t, T>, ImpersonatorError> {
        self.ensure_active_for("impersonate objects")?;
        Proxy::new(target, methods)
    }

    /// The object to impersonate: built by `build` while recording, a
    /// [`Double`] answering `methods` while replaying (so `build` never runs).
    pub fn instantiate<T, F>(
        &self,
        methods: &[&str],
        build: F,
    ) -> Result<Box<dyn Impersonate>, ImpersonatorError>
    where
        T: Impersonate + 'static,
        F: FnOnce() -> T,
    {
        self.ensure_active_for("instantiate objects")?;
        if self.is_record_mode() {
            Ok(Box::new(build()))
        } else {
            Ok(Box::new(Double::new(methods.iter().copied())))
        }
    }

    fn ensure_active(&self) -> Result<(), ImpersonatorError> {
        self.ensure_active_for("invoke impersonated methods")
    }

    fn ensure_active_for(&self, action: &str) -> Result<(), ImpersonatorError> {
        if self.is_active() {
            return Ok(());
        }
        Err(ImpersonatorError::Configuration(format!(
            "you must start a recording to {action} (recording `{}` is {})",
            self.label,
            self.state.as_str()
        )))
    }
}
