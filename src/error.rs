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

//! Error types of the proxy layer.
//!
//! Failures fall into four groups, and each group has its own variant family in [`ProxyError`]:
//!
//! - **Local usage errors** ([`ProxyError::Attribute`], [`ProxyError::Arguments`]) are raised
//!   at the call site, before anything is sent on the bus.
//! - **Remote errors** ([`ProxyError::Remote`], [`ProxyError::Mapped`]) were reported by the
//!   far side and have been passed through an [`ErrorMapper`](crate::error_mapper::ErrorMapper).
//! - **Reply-shape errors** ([`ProxyError::ReplyShape`]) mean that a reply or a signal body does
//!   not match the introspected signature.
//! - **Transport-local errors** ([`ProxyError::Transport`]) come from below this crate and are
//!   propagated untouched.
//!
//! No error is ever retried by this crate.

use std::fmt;

/// The kind of member a name resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Method,
    Property,
    Signal,
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberKind::Method => write!(f, "method"),
            MemberKind::Property => write!(f, "property"),
            MemberKind::Signal => write!(f, "signal"),
        }
    }
}

/// Attribute-style errors: the member does not exist, or it exists but was misused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttributeError {
    #[error("DBus object has no attribute '{0}'.")]
    NoSuchMember(String),
    #[error("DBus attribute '{name}' is ambiguous, it is defined by interfaces {interfaces:?}.")]
    Ambiguous {
        name: String,
        interfaces: Vec<String>,
    },
    #[error("Can't read DBus property '{0}'.")]
    CantRead(String),
    #[error("Can't set DBus property '{0}'.")]
    CantWrite(String),
    #[error("Can't set DBus attribute '{0}'.")]
    CantSet(String),
    #[error("DBus attribute '{name}' is a {kind}, not a {expected}.")]
    WrongKind {
        name: String,
        kind: MemberKind,
        expected: MemberKind,
    },
}

impl AttributeError {
    /// Name of the member the error is about.
    pub fn member(&self) -> &str {
        match self {
            AttributeError::NoSuchMember(name)
            | AttributeError::CantRead(name)
            | AttributeError::CantWrite(name)
            | AttributeError::CantSet(name)
            | AttributeError::Ambiguous { name, .. }
            | AttributeError::WrongKind { name, .. } => name,
        }
    }
}

/// An error reported by the remote side of a call: a D-Bus error name plus its message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{name}: {message}")]
pub struct RemoteError {
    name: String,
    message: String,
}

impl RemoteError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        RemoteError {
            name: name.into(),
            message: message.into(),
        }
    }

    /// The D-Bus error name, e.g. `org.freedesktop.DBus.Error.Failed`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The human-readable message attached to the error.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A remote error converted into a local error type by an error rule.
///
/// Displays exactly as the wrapped error does.
#[derive(Debug, thiserror::Error)]
#[error("{inner}")]
pub struct MappedError {
    type_name: &'static str,
    inner: Box<dyn std::error::Error + Send + Sync>,
}

impl MappedError {
    pub(crate) fn new(
        type_name: &'static str,
        inner: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        MappedError { type_name, inner }
    }

    /// Rust type name of the wrapped error.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<E: std::error::Error + 'static>(&self) -> bool {
        self.inner.is::<E>()
    }

    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }

    pub fn inner(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.inner.as_ref()
    }
}

/// Result of a call as reported by a [`Connection`](crate::connection::Connection).
///
/// The transport decides whether a failure originated on the remote side; only remote errors
/// are ever handed to an error mapper.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error(transparent)]
    Remote(RemoteError),
    #[error(transparent)]
    Transport(zbus::Error),
}

impl CallError {
    pub fn is_remote_error(&self) -> bool {
        matches!(self, CallError::Remote(_))
    }

    pub fn remote_error_name(&self) -> Option<&str> {
        match self {
            CallError::Remote(error) => Some(error.name()),
            CallError::Transport(_) => None,
        }
    }

    pub fn remote_error_message(&self) -> Option<&str> {
        match self {
            CallError::Remote(error) => Some(error.message()),
            CallError::Transport(_) => None,
        }
    }
}

/// Introspection data could not be turned into a specification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("FormatError::Xml: introspection data is not well-formed: {0}")]
    Xml(String),
    #[error("FormatError::NoRootNode: introspection data has no <node> element")]
    NoRootNode,
    #[error("FormatError::UnexpectedEof: introspection data ended inside <{0}>")]
    UnexpectedEof(String),
    #[error("FormatError::MissingAttribute: <{element}> is missing the '{attribute}' attribute")]
    MissingAttribute {
        element: String,
        attribute: &'static str,
    },
    #[error("FormatError::InvalidValue: <{element}> has an invalid '{attribute}' value {value:?}")]
    InvalidValue {
        element: String,
        attribute: &'static str,
        value: String,
    },
    #[error("FormatError::InvalidSignature: <{element}> has an invalid type {signature:?}: {reason}")]
    InvalidSignature {
        element: String,
        signature: String,
        reason: String,
    },
}

/// Every error a proxy call can produce.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error(transparent)]
    Attribute(#[from] AttributeError),
    #[error("Invalid arguments for DBus member '{member}': {reason}")]
    Arguments { member: String, reason: String },
    #[error("Invalid reply for DBus member '{member}': {reason}")]
    ReplyShape { member: String, reason: String },
    #[error("Remote DBus error {0}")]
    Remote(RemoteError),
    #[error(transparent)]
    Mapped(MappedError),
    #[error(transparent)]
    Transport(zbus::Error),
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error("A signal callback failed: {0}")]
    Callback(Box<dyn std::error::Error + Send + Sync>),
    #[error("DBus proxy of {0} is disconnected")]
    Disconnected(String),
    #[error("An internal error occurred: {0}")]
    Internal(String),
}

impl ProxyError {
    /// `true` for "no such capability" and "capability misused" errors.
    pub fn is_attribute_error(&self) -> bool {
        matches!(self, ProxyError::Attribute(_))
    }

    /// The error built by an error rule, if it has type `E`.
    pub fn mapped<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            ProxyError::Mapped(mapped) => mapped.downcast_ref::<E>(),
            _ => None,
        }
    }
}
