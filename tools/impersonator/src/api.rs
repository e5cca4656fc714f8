use crate::config::Settings;
use crate::errors::ImpersonatorError;
use crate::replay::recording::Recording;
use crate::store::InvocationStore;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordingOptions {
    /// Always record, even when a stored recording exists.
    pub disabled: bool,
}

/// Entry point tying settings to a store and running scenarios inside
/// recordings.
///
/// ```ignore
/// let impersonator = Impersonator::new(Settings::for_working_dir(&cwd))?;
/// impersonator.recording("calculator add", |recording| {
///     let mut proxy = recording.impersonate(&mut calculator, &["add"])?;
///     proxy.call(recording, "add", &[json!(2), json!(3)], None)
/// })?;
/// ```
pub struct Impersonator {
    settings: Settings,
    store: Arc<dyn InvocationStore>,
}

impl Impersonator {
    pub fn new(settings: Settings) -> Result<Self, ImpersonatorError> {
        let store = settings.open_store()?;
        Ok(Self { settings, store })
    }

    pub fn with_store(settings: Settings, store: Arc<dyn InvocationStore>) -> Self {
        Self { settings, store }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> Arc<dyn InvocationStore> {
        Arc::clone(&self.store)
    }

    pub fn recording<R>(
        &self,
        label: &str,
        scenario: impl FnOnce(&mut Recording) -> Result<R, ImpersonatorError>,
    ) -> Result<R, ImpersonatorError> {
        self.recording_with(label, RecordingOptions::default(), scenario)
    }

    /// Run `scenario` inside a started recording. On success the recording is
    /// finished, which persists (record) or checks for leftovers (replay). On
    /// failure it is aborted and the scenario's error is returned unchanged.
    pub fn recording_with<R>(
        &self,
        label: &str,
        options: RecordingOptions,
        scenario: impl FnOnce(&mut Recording) -> Result<R, ImpersonatorError>,
    ) -> Result<R, ImpersonatorError> {
        let mut recording = Recording::new(label, options.disabled, self.store())?;
        recording.start()?;
        match scenario(&mut recording) {
            Ok(value) => {
                recording.finish()?;
                Ok(value)
            }
            Err(error) => {
                recording.abort();
                Err(error)
            }
        }
    }
}
