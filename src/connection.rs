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

//! The narrow interface between proxies and the bus.
//!
//! Proxies never talk to the bus directly. Everything they send goes through a [`Connection`],
//! which makes it possible to drive them with [`BusConnection`](crate::bus::BusConnection) in
//! production and with a recording fake in tests.

use crate::error::{CallError, ProxyError};
use std::fmt;
use std::time::Duration;
use zbus::zvariant::{StructureBuilder, Structure, Value};

/// Flags of a method call. Only [`CallFlags::NONE`] is used by proxies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallFlags(pub u32);

impl CallFlags {
    pub const NONE: CallFlags = CallFlags(0);
}

/// Flags of a signal subscription. Only [`SubscribeFlags::NONE`] is used by proxies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubscribeFlags(pub u32);

impl SubscribeFlags {
    pub const NONE: SubscribeFlags = SubscribeFlags(0);
}

/// How long to wait for a reply. `NONE` waits forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timeout(Option<Duration>);

impl Timeout {
    pub const NONE: Timeout = Timeout(None);

    pub fn from_duration(duration: Duration) -> Self {
        Timeout(Some(duration))
    }

    pub fn duration(&self) -> Option<Duration> {
        self.0
    }
}

/// The body of a call: values already coerced to the input signature.
#[derive(Debug, PartialEq)]
pub struct Arguments {
    signature: String,
    values: Vec<Value<'static>>,
}

impl Arguments {
    /// `signature` is the tuple signature of `values`, e.g. `"(ado)"`.
    pub fn new(signature: impl Into<String>, values: Vec<Value<'static>>) -> Self {
        Arguments {
            signature: signature.into(),
            values,
        }
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn values(&self) -> &[Value<'static>] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value<'static>> {
        self.values
    }

    /// Pack the values into one structure, the way they travel in a message body.
    pub fn into_structure(self) -> Result<Structure<'static>, zbus::zvariant::Error> {
        self.values
            .into_iter()
            .fold(StructureBuilder::new(), |builder, value| {
                builder.append_field(value)
            })
            .build()
    }
}

/// Everything needed to send one method call.
#[derive(Debug, PartialEq)]
pub struct MethodCall {
    pub service_name: String,
    pub object_path: String,
    pub interface_name: String,
    pub member_name: String,
    /// `None` when the method takes no arguments.
    pub parameters: Option<Arguments>,
    /// Tuple signature of the expected reply, `None` when nothing is returned.
    pub reply_type: Option<String>,
    pub flags: CallFlags,
    pub timeout: Timeout,
}

/// The signals a subscription is interested in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalMatch {
    pub service_name: String,
    pub interface_name: String,
    pub signal_name: String,
    pub object_path: String,
    /// Only deliver signals whose first argument is this string. Proxies never filter on it.
    pub arg0: Option<String>,
    pub flags: SubscribeFlags,
}

/// Identifies one subscription of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receives the outcome of an asynchronous call: the reply fields or the call error.
pub type Completion =
    Box<dyn FnOnce(Result<Vec<Value<'static>>, CallError>) -> Result<(), ProxyError> + Send>;

/// Receives the fields of every signal matching a subscription.
pub type SignalDelivery =
    std::sync::Arc<dyn Fn(Vec<Value<'static>>) -> Result<(), ProxyError> + Send + Sync>;

/// A message bus connection as seen by proxies.
pub trait Connection: Send + Sync {
    /// Send a method call and block until its reply arrives.
    ///
    /// # Returns: `Result<Vec<Value<'static>>, CallError>`
    /// * `Ok(Vec<Value>)` - the top-level fields of the reply body, empty for an empty reply
    /// * `Err(CallError::Remote)` - the remote side replied with a D-Bus error
    /// * `Err(CallError::Transport)` - the call could not be completed locally
    fn call_sync(&self, call: MethodCall) -> Result<Vec<Value<'static>>, CallError>;

    /// Send a method call without waiting. `completion` is called exactly once with the outcome.
    fn call(&self, call: MethodCall, completion: Completion);

    /// Start delivering matching signals to `delivery`.
    fn signal_subscribe(
        &self,
        signal: SignalMatch,
        delivery: SignalDelivery,
    ) -> Result<SubscriptionId, CallError>;

    /// Stop a subscription. Unknown ids are ignored.
    fn signal_unsubscribe(&self, id: SubscriptionId);
}
