//! Record mode: calls reach the real object and are captured in order.

use crate::errors::ImpersonatorError;
use crate::logging::append_run_log;
use crate::replay::method::{Method, MethodInvocation};
use crate::store::InvocationStore;
use crate::target::{Callback, Impersonate};
use serde_json::{json, Value};
use std::sync::Arc;

pub struct RecordMode {
    key: String,
    store: Arc<dyn InvocationStore>,
    method_invocations: Vec<MethodInvocation>,
}

impl RecordMode {
    pub fn new(key: impl Into<String>, store: Arc<dyn InvocationStore>) -> Self {
        Self {
            key: key.into(),
            store,
            method_invocations: Vec::new(),
        }
    }

    pub fn start(&mut self) -> Result<(), ImpersonatorError> {
        append_run_log("debug", "recording.mode", json!({ "key": self.key, "mode": "record" }));
        self.store.prepare(&self.key)?;
        self.method_invocations.clear();
        Ok(())
    }

    /// Call the real `target`, spying on `block` when one was passed, and
    /// capture the result. An error from the target is returned as-is and
    /// leaves nothing recorded.
    pub fn invoke<T: Impersonate + ?Sized>(
        &mut self,
        target: &mut T,
        mut method: Method,
        block: Option<Callback<'_>>,
    ) -> Result<Value, ImpersonatorError> {
        let return_value = match (method.block_spy.as_mut(), block) {
            (Some(spy), Some(actual)) => {
                let mut spied = spy.wrap(actual);
                let spied: Callback<'_> = &mut spied;
                target.dispatch(&method.name, &method.arguments, Some(spied))?
            }
            (_, block) => target.dispatch(&method.name, &method.arguments, block)?,
        };

        append_run_log(
            "debug",
            "recording.invocation.recorded",
            json!({
                "key": self.key,
                "position": self.method_invocations.len(),
                "method": method.to_string(),
                "block_invocations": method
                    .block_spy
                    .as_ref()
                    .map_or(0, |spy| spy.block_invocations.len()),
            }),
        );
        self.method_invocations.push(MethodInvocation {
            method_instance: method,
            return_value: return_value.clone(),
        });
        Ok(return_value)
    }

    /// Persist everything captured so far, replacing any previous recording.
    pub fn finish(&mut self) -> Result<(), ImpersonatorError> {
        self.store.write(&self.key, &self.method_invocations)?;
        append_run_log(
            "info",
            "recording.persisted",
            json!({ "key": self.key, "invocations": self.method_invocations.len() }),
        );
        Ok(())
    }

    /// Drop everything captured; nothing reaches the store.
    pub fn abort(&mut self) {
        append_run_log(
            "warn",
            "recording.discarded",
            json!({ "key": self.key, "invocations": self.method_invocations.len() }),
        );
        self.method_invocations.clear();
    }

    pub fn method_invocations(&self) -> &[MethodInvocation] {
        &self.method_invocations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::target::unknown_method;

    struct Sequencer {
        calls: usize,
    }

    impl Impersonate for Sequencer {
        fn method_names(&self) -> Vec<String> {
            vec!["lineal_sequence".to_string()]
        }

        fn dispatch(
            &mut self,
            method: &str,
            arguments: &[Value],
            block: Option<Callback<'_>>,
        ) -> Result<Value, ImpersonatorError> {
            if method != "lineal_sequence" {
                return Err(unknown_method(method));
            }
            self.calls += 1;
            let count = arguments.first().and_then(Value::as_u64).unwrap_or(0);
            let mut last = Value::Null;
            if let Some(block) = block {
                for n in 1..=count {
                    last = block(&[json!(n)]);
                }
            }
            Ok(last)
        }
    }

    #[test]
    fn spies_on_block_and_returns_real_value() {
        let store = Arc::new(MemoryStore::default());
        let mut mode = RecordMode::new("seq", store.clone());
        mode.start().expect("start");

        let mut target = Sequencer { calls: 0 };
        let mut yielded = Vec::new();
        let mut block = |args: &[Value]| {
            yielded.push(args[0].clone());
            json!(format!("seen {}", args[0]))
        };
        let value = mode
            .invoke(
                &mut target,
                Method::new("lineal_sequence", vec![json!(3)], true),
                Some(&mut block),
            )
            .expect("invoke");

        assert_eq!(value, json!("seen 3"));
        assert_eq!(yielded, vec![json!(1), json!(2), json!(3)]);
        assert_eq!(target.calls, 1);

        let recorded = &mode.method_invocations()[0];
        let spy = recorded.method_instance.block_spy.as_ref().expect("spy");
        assert_eq!(spy.block_invocations.len(), 3);
        assert_eq!(spy.block_invocations[2].arguments, vec![json!(3)]);
        assert_eq!(recorded.return_value, json!("seen 3"));
    }

    #[test]
    fn finish_writes_in_call_order_and_abort_writes_nothing() {
        let store = Arc::new(MemoryStore::default());
        let mut target = Sequencer { calls: 0 };

        let mut mode = RecordMode::new("ordered", store.clone());
        mode.start().expect("start");
        for n in [2, 0, 1] {
            mode.invoke(&mut target, Method::new("lineal_sequence", vec![json!(n)], false), None)
                .expect("invoke");
        }
        mode.finish().expect("finish");
        let stored = store.read("ordered").expect("read");
        let arguments: Vec<_> = stored
            .iter()
            .map(|inv| inv.method_instance.arguments[0].clone())
            .collect();
        assert_eq!(arguments, vec![json!(2), json!(0), json!(1)]);

        let mut aborted = RecordMode::new("aborted", store.clone());
        aborted.start().expect("start");
        aborted
            .invoke(&mut target, Method::new("lineal_sequence", vec![json!(1)], false), None)
            .expect("invoke");
        aborted.abort();
        assert!(!store.exists("aborted"));
    }

    #[test]
    fn target_errors_propagate_without_recording() {
        let store = Arc::new(MemoryStore::default());
        let mut mode = RecordMode::new("errors", store);
        mode.start().expect("start");
        let mut target = Sequencer { calls: 0 };
        let error = mode
            .invoke(&mut target, Method::new("missing", vec![], false), None)
            .expect_err("unknown method");
        assert!(error.is_configuration());
        assert!(mode.method_invocations().is_empty());
    }
}
