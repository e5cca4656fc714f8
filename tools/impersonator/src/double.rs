use crate::errors::ImpersonatorError;
use crate::target::{unknown_method, Callback, Impersonate};
use serde_json::Value;
use std::collections::BTreeSet;

/// Stand-in object that answers a fixed list of methods with `null`.
///
/// Used in replay mode so the real object never has to be built.
#[derive(Debug, Clone, Default)]
pub struct Double {
    methods: BTreeSet<String>,
}

impl Double {
    pub fn new<I, S>(methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            methods: methods.into_iter().map(Into::into).collect(),
        }
    }
}

impl Impersonate for Double {
    fn method_names(&self) -> Vec<String> {
        self.methods.iter().cloned().collect()
    }

    fn dispatch(
        &mut self,
        method: &str,
        _arguments: &[Value],
        _block: Option<Callback<'_>>,
    ) -> Result<Value, ImpersonatorError> {
        if self.methods.contains(method) {
            Ok(Value::Null)
        } else {
            Err(unknown_method(method))
        }
    }

    fn responds_to(&self, method: &str) -> bool {
        self.methods.contains(method)
    }
}

#[cfg(test)]
mod tests {
    use super::Double;
    use crate::target::Impersonate;
    use serde_json::{json, Value};

    #[test]
    fn answers_only_the_given_methods() {
        let mut double = Double::new(["add", "next"]);
        assert_eq!(double.method_names(), vec!["add", "next"]);
        assert_eq!(double.dispatch("add", &[json!(1)], None).expect("add"), Value::Null);
        assert_eq!(double.dispatch("next", &[], None).expect("next"), Value::Null);
        assert!(double.dispatch("previous", &[], None).expect_err("missing").is_configuration());
    }
}
