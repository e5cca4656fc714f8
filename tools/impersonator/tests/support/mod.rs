#![allow(dead_code)]

use impersonator::config::Settings;
use impersonator::{Callback, Impersonate, Impersonator, ImpersonatorError};
use serde_json::{json, Value};
use std::path::Path;

pub const CALCULATOR_METHODS: &[&str] = &["next", "previous", "sum", "add", "lineal_sequence", "enumerate"];

/// Counter-style test object that remembers whether any of its working
/// methods ran since the last `reset`.
#[derive(Debug, Default)]
pub struct Calculator {
    counter: i64,
    invoked: bool,
}

impl Calculator {
    pub fn invoked(&self) -> bool {
        self.invoked
    }

    pub fn reset(&mut self) {
        self.invoked = false;
    }
}

impl Impersonate for Calculator {
    fn method_names(&self) -> Vec<String> {
        [
            "next",
            "previous",
            "sum",
            "add",
            "lineal_sequence",
            "enumerate",
            "invoked",
            "reset",
        ]
        .iter()
        .map(|name| name.to_string())
        .collect()
    }

    fn dispatch(
        &mut self,
        method: &str,
        arguments: &[Value],
        block: Option<Callback<'_>>,
    ) -> Result<Value, ImpersonatorError> {
        match method {
            "next" => {
                self.invoked = true;
                self.counter += 1;
                Ok(json!(self.counter))
            }
            "previous" => {
                self.invoked = true;
                self.counter -= 1;
                Ok(json!(self.counter))
            }
            "sum" | "add" => {
                self.invoked = true;
                let total = integer(arguments, 0)? + integer(arguments, 1)?;
                if let Some(block) = block {
                    block(&[json!(total)]);
                }
                Ok(json!(total))
            }
            "lineal_sequence" => {
                self.invoked = true;
                let count = integer(arguments, 0)?;
                if let Some(block) = block {
                    for n in 1..=count {
                        block(&[json!(n)]);
                    }
                }
                Ok(json!(count))
            }
            "enumerate" => {
                self.invoked = true;
                let items = arguments
                    .first()
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                let mut collected = Vec::new();
                if let Some(block) = block {
                    for (index, item) in items.iter().enumerate() {
                        collected.push(block(&[json!(index), item.clone()]));
                    }
                }
                Ok(Value::Array(collected))
            }
            "invoked" => Ok(json!(self.invoked)),
            "reset" => {
                self.reset();
                Ok(Value::Null)
            }
            other => Err(ImpersonatorError::Configuration(format!(
                "undefined method `{other}`"
            ))),
        }
    }
}

fn integer(arguments: &[Value], position: usize) -> Result<i64, ImpersonatorError> {
    arguments
        .get(position)
        .and_then(Value::as_i64)
        .ok_or_else(|| ImpersonatorError::Target(format!("argument {position} must be an integer")))
}

pub fn impersonator_in(dir: &Path) -> Impersonator {
    Impersonator::new(Settings::for_working_dir(dir)).expect("impersonator")
}

/// Collects every argument tuple passed to it.
#[derive(Debug, Default)]
pub struct YieldLog {
    pub calls: Vec<Vec<Value>>,
}

impl YieldLog {
    pub fn block(&mut self) -> impl FnMut(&[Value]) -> Value + '_ {
        move |arguments: &[Value]| {
            self.calls.push(arguments.to_vec());
            json!(self.calls.len())
        }
    }
}
