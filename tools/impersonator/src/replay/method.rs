//! Value types captured while recording and compared while replaying.
//!
//! These are the records persisted by an
//! [`InvocationStore`](crate::store::InvocationStore): an ordered list of
//! [`MethodInvocation`]s, each carrying its [`Method`] descriptor.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

// ── MatchingConfiguration ─────────────────────────────────────────────────────

/// Argument positions (zero-based) excluded when comparing a replayed call
/// against its recording.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchingConfiguration {
    ignored_positions: BTreeSet<usize>,
}

impl MatchingConfiguration {
    pub fn ignore_arguments_at(&mut self, positions: impl IntoIterator<Item = usize>) -> &mut Self {
        self.ignored_positions.extend(positions);
        self
    }

    pub fn ignored_positions(&self) -> &BTreeSet<usize> {
        &self.ignored_positions
    }
}

// ── BlockSpy ──────────────────────────────────────────────────────────────────

/// Arguments passed to a callback on one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockInvocation {
    pub arguments: Vec<Value>,
}

/// Captures every call a recorded method makes to its callback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockSpy {
    #[serde(default)]
    pub block_invocations: Vec<BlockInvocation>,
}

impl BlockSpy {
    /// Wrap `actual` so every call is appended to this spy before being
    /// forwarded. The forwarded return value is passed back untouched.
    pub fn wrap<'a>(
        &'a mut self,
        actual: &'a mut dyn FnMut(&[Value]) -> Value,
    ) -> impl FnMut(&[Value]) -> Value + 'a {
        move |arguments: &[Value]| {
            self.block_invocations.push(BlockInvocation {
                arguments: arguments.to_vec(),
            });
            actual(arguments)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.block_invocations.is_empty()
    }
}

// ── Method ────────────────────────────────────────────────────────────────────

/// Descriptor of one call: name, positional arguments and, when a callback
/// was passed, the spy that observed it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Method {
    pub name: String,
    #[serde(default)]
    pub arguments: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_spy: Option<BlockSpy>,
    /// Attached by the proxy at call time; never stored.
    #[serde(skip)]
    pub matching: Option<MatchingConfiguration>,
}

impl Method {
    pub fn new(name: impl Into<String>, arguments: Vec<Value>, with_block: bool) -> Self {
        Self {
            name: name.into(),
            arguments,
            block_spy: with_block.then(BlockSpy::default),
            matching: None,
        }
    }

    pub fn with_matching(mut self, matching: Option<MatchingConfiguration>) -> Self {
        self.matching = matching;
        self
    }

    pub fn has_block(&self) -> bool {
        self.block_spy.is_some()
    }

    /// Structural comparison of an incoming call (`self`) against a recorded
    /// one. Ignored positions come from the incoming call only; only the
    /// presence of a callback is compared, never its identity.
    pub fn matches(&self, recorded: &Method) -> bool {
        let ignored = self
            .matching
            .as_ref()
            .map(MatchingConfiguration::ignored_positions);
        self.name == recorded.name
            && self.has_block() == recorded.has_block()
            && retained(&self.arguments, ignored).eq(retained(&recorded.arguments, ignored))
    }
}

fn retained<'a>(
    arguments: &'a [Value],
    ignored: Option<&'a BTreeSet<usize>>,
) -> impl Iterator<Item = &'a Value> + 'a {
    arguments
        .iter()
        .enumerate()
        .filter(move |(position, _)| !ignored.is_some_and(|set| set.contains(position)))
        .map(|(_, value)| value)
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (idx, argument) in self.arguments.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{argument}")?;
        }
        f.write_str(")")?;
        if self.has_block() {
            f.write_str(" {with block}")?;
        }
        Ok(())
    }
}

// ── MethodInvocation ──────────────────────────────────────────────────────────

/// A recorded call and the value it returned. Identity is its position in
/// the recorded list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodInvocation {
    #[serde(rename = "method")]
    pub method_instance: Method,
    pub return_value: Value,
}

impl fmt::Display for MethodInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.method_instance, self.return_value)
    }
}
