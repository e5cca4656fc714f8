//! A proxy stands in for the impersonated object at both record and replay
//! time. Impersonated methods go through a [`Recording`]; every other method
//! the target responds to is delegated to it unchanged.

use crate::errors::ImpersonatorError;
use crate::replay::method::{MatchingConfiguration, Method};
use crate::replay::recording::Recording;
use crate::target::{unknown_method, Callback, Impersonate};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

pub struct Proxy<'t, T: Impersonate + ?Sized> {
    target: &'t mut T,
    impersonated_methods: BTreeSet<String>,
    matching_by_method: HashMap<String, MatchingConfiguration>,
}

impl<'t, T: Impersonate + ?Sized> Proxy<'t, T> {
    /// Fails when any of `methods` is not a method of `target`.
    pub fn new(target: &'t mut T, methods: &[&str]) -> Result<Self, ImpersonatorError> {
        let missing: Vec<&str> = methods
            .iter()
            .copied()
            .filter(|method| !target.responds_to(method))
            .collect();
        if !missing.is_empty() {
            return Err(ImpersonatorError::Configuration(format!(
                "these methods to impersonate do not exist: {missing:?}"
            )));
        }
        Ok(Self {
            target,
            impersonated_methods: methods.iter().map(|method| method.to_string()).collect(),
            matching_by_method: HashMap::new(),
        })
    }

    pub fn impersonates(&self, method: &str) -> bool {
        self.impersonated_methods.contains(method)
    }

    pub fn target(&self) -> &T {
        &*self.target
    }

    /// Matching options for `method`, created on first use. Configure before
    /// the method is first called during replay.
    ///
    /// ```ignore
    /// proxy.configure_matching_for("sum").ignore_arguments_at([0]);
    /// ```
    pub fn configure_matching_for(&mut self, method: &str) -> &mut MatchingConfiguration {
        self.matching_by_method
            .entry(method.to_string())
            .or_default()
    }

    pub fn call(
        &mut self,
        recording: &mut Recording,
        method: &str,
        arguments: &[Value],
        block: Option<Callback<'_>>,
    ) -> Result<Value, ImpersonatorError> {
        if !self.impersonates(method) {
            if !self.target.responds_to(method) {
                return Err(unknown_method(method));
            }
            return self.target.dispatch(method, arguments, block);
        }

        let descriptor = Method::new(method, arguments.to_vec(), block.is_some())
            .with_matching(self.matching_by_method.get(method).cloned());
        recording.invoke(&mut *self.target, descriptor, block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::double::Double;
    use crate::store::{InvocationStore, MemoryStore};
    use serde_json::json;
    use std::sync::Arc;

    struct Greeter {
        greeted: usize,
    }

    impl Impersonate for Greeter {
        fn method_names(&self) -> Vec<String> {
            vec!["greet".to_string(), "count".to_string()]
        }

        fn dispatch(
            &mut self,
            method: &str,
            arguments: &[Value],
            _block: Option<Callback<'_>>,
        ) -> Result<Value, ImpersonatorError> {
            match method {
                "greet" => {
                    self.greeted += 1;
                    Ok(json!(format!("hello {}", arguments[0].as_str().unwrap_or("?"))))
                }
                "count" => Ok(json!(self.greeted)),
                other => Err(unknown_method(other)),
            }
        }
    }

    #[test]
    fn rejects_methods_the_target_lacks() {
        let mut greeter = Greeter { greeted: 0 };
        let error = Proxy::new(&mut greeter, &["greet", "wave", "bow"])
            .err()
            .expect("missing");
        assert!(error.is_configuration());
        assert!(error.to_string().contains("[\"wave\", \"bow\"]"));
    }

    #[test]
    fn delegates_methods_that_are_not_impersonated() {
        let store = Arc::new(MemoryStore::default());
        let mut recording = Recording::new("greeter", false, store.clone()).expect("new");
        recording.start().expect("start");

        let mut greeter = Greeter { greeted: 0 };
        let mut proxy = Proxy::new(&mut greeter, &["greet"]).expect("proxy");
        assert_eq!(
            proxy
                .call(&mut recording, "greet", &[json!("ada")], None)
                .expect("greet"),
            json!("hello ada")
        );
        assert_eq!(
            proxy.call(&mut recording, "count", &[], None).expect("count"),
            json!(1)
        );
        assert!(proxy
            .call(&mut recording, "wave", &[], None)
            .expect_err("unknown")
            .is_configuration());
        recording.finish().expect("finish");

        let stored = store.read("greeter").expect("read");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].method_instance.name, "greet");
    }

    #[test]
    fn matching_configuration_is_created_once_and_accumulates() {
        let mut double = Double::new(["sum"]);
        let mut proxy = Proxy::new(&mut double, &["sum"]).expect("proxy");
        proxy.configure_matching_for("sum").ignore_arguments_at([0]);
        proxy.configure_matching_for("sum").ignore_arguments_at([2]);
        let positions: Vec<usize> = proxy
            .configure_matching_for("sum")
            .ignored_positions()
            .iter()
            .copied()
            .collect();
        assert_eq!(positions, vec![0, 2]);
    }
}
