//! The object-side contract for anything a [`Proxy`](crate::proxy::Proxy) can wrap.

use crate::errors::ImpersonatorError;
use serde_json::Value;

/// A callback handed to a method call. It receives the yielded arguments and
/// returns whatever the caller's block evaluates to.
pub type Callback<'a> = &'a mut dyn FnMut(&[Value]) -> Value;

/// An object whose methods can be intercepted by name.
///
/// `method_names` enumerates every method `dispatch` accepts; a proxy only
/// agrees to impersonate names from that list.
pub trait Impersonate {
    fn method_names(&self) -> Vec<String>;

    fn dispatch(
        &mut self,
        method: &str,
        arguments: &[Value],
        block: Option<Callback<'_>>,
    ) -> Result<Value, ImpersonatorError>;

    fn responds_to(&self, method: &str) -> bool {
        self.method_names().iter().any(|name| name == method)
    }
}

impl<T: Impersonate + ?Sized> Impersonate for Box<T> {
    fn method_names(&self) -> Vec<String> {
        (**self).method_names()
    }

    fn dispatch(
        &mut self,
        method: &str,
        arguments: &[Value],
        block: Option<Callback<'_>>,
    ) -> Result<Value, ImpersonatorError> {
        (**self).dispatch(method, arguments, block)
    }

    fn responds_to(&self, method: &str) -> bool {
        (**self).responds_to(method)
    }
}

pub(crate) fn unknown_method(method: &str) -> ImpersonatorError {
    ImpersonatorError::Configuration(format!("undefined method `{method}`"))
}
