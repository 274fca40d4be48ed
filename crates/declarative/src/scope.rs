//! Parameter resolution for catalog compilers
//!
//! A compiler expands parameterized declarations into concrete resources.
//! Every parameter resolves through the same cascade: the value set on the
//! scope being compiled, then the value set on the enclosing module, then a
//! built-in default. A required parameter with no value anywhere fails with
//! [`Error::MissingParameter`] naming the parameter and the scope.

use crate::error::{Error, Result};
use std::fmt;

/// Named compilation scope, e.g. `instance foo`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    name: String,
}

impl Scope {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A nested scope, e.g. `instance foo` -> `instance foo, replication`
    pub fn child(&self, name: &str) -> Self {
        Self::new(format!("{}, {name}", self.name))
    }

    /// Resolve a parameter: own value, then module value, then default
    pub fn resolve<T: Clone>(
        &self,
        parameter: &str,
        own: Option<&T>,
        module: Option<&T>,
        default: Option<T>,
    ) -> Result<T> {
        own.or(module)
            .cloned()
            .or(default)
            .ok_or_else(|| self.missing(parameter))
    }

    /// A parameter with no module level and no default
    pub fn require<T: Clone>(&self, parameter: &str, own: Option<&T>) -> Result<T> {
        self.resolve(parameter, own, None, None)
    }

    /// Fail with `InvalidParameter` unless `valid` holds
    pub fn check(&self, parameter: &str, valid: bool, message: impl Into<String>) -> Result<()> {
        if valid {
            Ok(())
        } else {
            Err(Error::InvalidParameter {
                parameter: parameter.to_string(),
                scope: self.name.clone(),
                message: message.into(),
            })
        }
    }

    fn missing(&self, parameter: &str) -> Error {
        Error::MissingParameter {
            parameter: parameter.to_string(),
            scope: self.name.clone(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
