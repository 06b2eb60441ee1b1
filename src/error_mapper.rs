// This file is part of dynbus, a library of dynamic client proxies for D-Bus objects.
//
// Copyright 2025 Canonical Ltd.
//
// SPDX-License-Identifier: GPL-3.0-only
//
// dynbus is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License version 3, as published by the Free Software Foundation.
//
// dynbus is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranties of MERCHANTABILITY, SATISFACTORY QUALITY, or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with this program.  If not, see http://www.gnu.org/licenses/.

//! Bidirectional mapping between D-Bus error names and local error types.
//!
//! An [`ErrorMapper`] holds an ordered list of [`ErrorRule`]s. Rules are consulted in the
//! order they were added and the first match wins.
//!
//! ```
//! use dynbus::error::RemoteError;
//! use dynbus::error_mapper::{ErrorMapper, ErrorRule};
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("{0}")]
//! struct NotFound(String);
//!
//! let mapper = ErrorMapper::new();
//! mapper.add_rule(ErrorRule::new(NotFound).error_name("org.example.Error.NotFound"));
//!
//! let error = mapper.map_error(RemoteError::new("org.example.Error.NotFound", "No such file."));
//! assert_eq!(error.mapped::<NotFound>().map(|e| e.0.as_str()), Some("No such file."));
//! ```

use crate::config;
use crate::error::{MappedError, ProxyError, RemoteError};
use log::{debug, trace};
use std::error::Error;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

type Predicate = Box<dyn Fn(&RemoteError) -> bool + Send + Sync>;
type Constructor = Box<dyn Fn(String) -> Box<dyn Error + Send + Sync> + Send + Sync>;

/// One association between a D-Bus error and a local error type.
pub struct ErrorRule {
    error_name: Option<String>,
    predicate: Option<Predicate>,
    constructor: Constructor,
    type_check: fn(&(dyn Error + 'static)) -> bool,
    type_name: &'static str,
}

impl ErrorRule {
    /// A rule that builds `E` from the message of a matching remote error.
    ///
    /// Without [`error_name`](Self::error_name) or [`predicate`](Self::predicate) the rule
    /// matches no remote error, but it still knows the local type `E`.
    pub fn new<E, F>(constructor: F) -> Self
    where
        E: Error + Send + Sync + 'static,
        F: Fn(String) -> E + Send + Sync + 'static,
    {
        ErrorRule {
            error_name: None,
            predicate: None,
            constructor: Box::new(move |message: String| -> Box<dyn Error + Send + Sync> {
                Box::new(constructor(message))
            }),
            type_check: |error| error.is::<E>(),
            type_name: std::any::type_name::<E>(),
        }
    }

    /// Match remote errors with exactly this name, and send local `E`s under this name.
    pub fn error_name(mut self, name: impl Into<String>) -> Self {
        self.error_name = Some(name.into());
        self
    }

    /// Match remote errors for which `predicate` returns `true`. Takes priority over the name.
    pub fn predicate<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&RemoteError) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Box::new(predicate));
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.error_name.as_deref()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Does this rule apply to the given remote error?
    pub fn matches(&self, error: &RemoteError) -> bool {
        match (&self.predicate, &self.error_name) {
            (Some(predicate), _) => predicate(error),
            (None, Some(name)) => name == error.name(),
            (None, None) => false,
        }
    }

    /// Does this rule describe the type of `error`?
    pub fn handles(&self, error: &(dyn Error + 'static)) -> bool {
        (self.type_check)(error)
    }

    fn construct(&self, message: &str) -> MappedError {
        MappedError::new(self.type_name, (self.constructor)(message.to_string()))
    }
}

impl fmt::Debug for ErrorRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorRule")
            .field("error_name", &self.error_name)
            .field("predicate", &self.predicate.is_some())
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// The name and message to report for a local error, e.g. in a method reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReply {
    pub name: String,
    pub message: String,
}

/// An ordered, shareable list of [`ErrorRule`]s.
#[derive(Debug, Default)]
pub struct ErrorMapper {
    rules: RwLock<Vec<Arc<ErrorRule>>>,
}

static GLOBAL_ERROR_MAPPER: OnceLock<Arc<ErrorMapper>> = OnceLock::new();

impl ErrorMapper {
    pub fn new() -> Self {
        ErrorMapper::default()
    }

    /// The process-wide mapper used by proxies created without an explicit one.
    pub fn global() -> Arc<ErrorMapper> {
        GLOBAL_ERROR_MAPPER
            .get_or_init(|| Arc::new(ErrorMapper::new()))
            .clone()
    }

    /// Register a rule. It is consulted after every rule added earlier.
    pub fn add_rule(&self, rule: ErrorRule) {
        trace!(
            "Adding an error rule for {:?} -> {}",
            rule.name(),
            rule.type_name()
        );
        let mut rules = self.rules.write().unwrap_or_else(|e| e.into_inner());
        rules.push(Arc::new(rule));
    }

    pub fn rule_count(&self) -> usize {
        self.rules.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn rules(&self) -> Vec<Arc<ErrorRule>> {
        self.rules.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Find the first rule matching a remote error.
    pub fn find_rule(&self, error: &RemoteError) -> Option<Arc<ErrorRule>> {
        self.rules().into_iter().find(|rule| rule.matches(error))
    }

    /// Convert a remote error into the local error it stands for.
    ///
    /// # Returns: `ProxyError`
    /// * `ProxyError::Mapped` - a rule matched, the error was built by its constructor
    /// * `ProxyError::Remote` - no rule matched, the remote error is kept as it is
    pub fn map_error(&self, error: RemoteError) -> ProxyError {
        match self.find_rule(&error) {
            Some(rule) => {
                debug!(
                    "Mapped DBus error {} to {}",
                    error.name(),
                    rule.type_name()
                );
                ProxyError::Mapped(rule.construct(error.message()))
            }
            None => {
                debug!("No error rule for DBus error {}", error.name());
                ProxyError::Remote(error)
            }
        }
    }

    /// The D-Bus error name and message to report for a local error.
    ///
    /// The first rule that handles the error's type and has a name decides. Remote errors
    /// keep their own name. Anything else is reported as
    /// [`DEFAULT_ERROR_NAME`](config::DEFAULT_ERROR_NAME).
    pub fn get_error_reply(&self, error: &(dyn Error + 'static)) -> ErrorReply {
        let inner = unwrap_local_error(error);
        let named_rule = self
            .rules()
            .into_iter()
            .find(|rule| rule.name().is_some() && rule.handles(inner));
        if let Some(name) = named_rule.as_ref().and_then(|rule| rule.name()) {
            return ErrorReply {
                name: name.to_string(),
                message: inner.to_string(),
            };
        }
        if let Some(remote) = inner.downcast_ref::<RemoteError>() {
            return ErrorReply {
                name: remote.name().to_string(),
                message: remote.message().to_string(),
            };
        }
        ErrorReply {
            name: config::DEFAULT_ERROR_NAME.to_string(),
            message: inner.to_string(),
        }
    }
}

// Look through the wrappers this crate puts around remote and mapped errors.
fn unwrap_local_error<'a>(error: &'a (dyn Error + 'static)) -> &'a (dyn Error + 'static) {
    match error.downcast_ref::<ProxyError>() {
        Some(ProxyError::Remote(remote)) => remote,
        Some(ProxyError::Mapped(mapped)) => mapped.inner(),
        _ => match error.downcast_ref::<MappedError>() {
            Some(mapped) => mapped.inner(),
            None => error,
        },
    }
}
