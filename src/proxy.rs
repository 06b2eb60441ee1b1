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

//! Proxies: name-addressed access to the members of a remote object.
//!
//! Every proxy wraps an [`ObjectHandler`] and dispatches on the kind of the resolved member.
//! [`ObjectProxy`] sees every interface of the object, [`InterfaceProxy`] only one.
//!
//! ```no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use dynbus::bus::BusConnection;
//! use dynbus::proxy::{ObjectProxy, Proxy};
//! use std::sync::Arc;
//! use zbus::zvariant::Value;
//!
//! let bus = Arc::new(BusConnection::session().await?);
//! let proxy = ObjectProxy::new(bus, "org.freedesktop.DBus", "/org/freedesktop/DBus", None);
//! let id = proxy.call("GetId", vec![])?;
//! let features = proxy.get("Features")?;
//! proxy.signal("NameOwnerChanged")?.connect(|fields: &[Value<'static>]| {
//!     println!("{fields:?}");
//!     Ok(())
//! });
//! # Ok(())
//! # }
//! ```

use crate::connection::Connection;
use crate::error::{AttributeError, ProxyError};
use crate::error_mapper::ErrorMapper;
use crate::handler::{ObjectHandler, Output};
use crate::signal::Signal;
use crate::specification::Member;
use std::fmt;
use std::sync::Arc;
use zbus::zvariant::Value;

/// A callable method member, bound to the proxy it was resolved on.
pub struct MethodRef<'p> {
    handler: &'p ObjectHandler,
    name: String,
}

impl MethodRef<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: Vec<Value<'static>>) -> Result<Output, ProxyError> {
        self.handler.call_sync(&self.name, args)
    }

    pub fn call_async<A, F>(
        &self,
        args: Vec<Value<'static>>,
        callback: F,
        callback_args: A,
    ) -> Result<(), ProxyError>
    where
        A: Send + 'static,
        F: FnOnce(Output, A) + Send + 'static,
    {
        self.handler
            .call_async(&self.name, args, callback, callback_args)
    }
}

impl PartialEq for MethodRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.handler, other.handler) && self.name == other.name
    }
}

impl fmt::Debug for MethodRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodRef")
            .field("object_path", &self.handler.object_path())
            .field("name", &self.name)
            .finish()
    }
}

/// What reading an attribute of a proxy produced.
#[derive(Debug)]
pub enum Attribute<'p> {
    Method(MethodRef<'p>),
    /// The current value of a property.
    Property(Value<'static>),
    Signal(Arc<Signal>),
}

/// Access to a remote object through its [`ObjectHandler`].
pub trait Proxy {
    fn handler(&self) -> &ObjectHandler;

    /// Call a method and wait for the reply.
    fn call(&self, name: &str, args: Vec<Value<'static>>) -> Result<Output, ProxyError> {
        self.handler().call_sync(name, args)
    }

    /// Call a method; `callback` receives the output and `callback_args` when it completes.
    fn call_async<A, F>(
        &self,
        name: &str,
        args: Vec<Value<'static>>,
        callback: F,
        callback_args: A,
    ) -> Result<(), ProxyError>
    where
        Self: Sized,
        A: Send + 'static,
        F: FnOnce(Output, A) + Send + 'static,
    {
        self.handler()
            .call_async(name, args, callback, callback_args)
    }

    /// Read a property.
    fn get(&self, name: &str) -> Result<Value<'static>, ProxyError> {
        self.handler().get_property(name)
    }

    /// Write a property. Setting any other kind of member fails.
    fn set(&self, name: &str, value: Value<'static>) -> Result<(), ProxyError> {
        self.handler().set_property(name, value)
    }

    /// The cached local signal of a remote signal member.
    fn signal(&self, name: &str) -> Result<Arc<Signal>, ProxyError> {
        self.handler().get_signal(name)
    }

    /// Resolve a name to whatever member it denotes.
    ///
    /// # Returns: `Result<Attribute, ProxyError>`
    /// * `Ok(Attribute::Method)` - a method, ready to be called
    /// * `Ok(Attribute::Property)` - the value of a readable property
    /// * `Ok(Attribute::Signal)` - the cached signal
    /// * `Err(ProxyError::Attribute)` - no such member, or a property that can't be read
    fn attribute(&self, name: &str) -> Result<Attribute<'_>, ProxyError> {
        let handler = self.handler();
        match handler.member(name)? {
            Member::Method(_) => Ok(Attribute::Method(MethodRef {
                handler,
                name: name.to_string(),
            })),
            Member::Property(property) if !property.access.readable() => {
                Err(AttributeError::CantRead(name.to_string()).into())
            }
            Member::Property(_) => handler.get_property(name).map(Attribute::Property),
            Member::Signal(_) => handler.get_signal(name).map(Attribute::Signal),
        }
    }
}

/// A proxy of a whole remote object.
///
/// A member name defined by more than one interface of the object is ambiguous here; use an
/// [`InterfaceProxy`] to reach it.
pub struct ObjectProxy {
    handler: ObjectHandler,
}

impl ObjectProxy {
    /// Create a proxy. The object is introspected the first time a member is used.
    ///
    /// Without an `error_mapper`, the process-wide [`ErrorMapper::global`] is used.
    pub fn new(
        connection: Arc<dyn Connection>,
        service_name: impl Into<String>,
        object_path: impl Into<String>,
        error_mapper: Option<Arc<ErrorMapper>>,
    ) -> Self {
        ObjectProxy {
            handler: ObjectHandler::new(
                connection,
                service_name,
                object_path,
                None,
                error_mapper.unwrap_or_else(ErrorMapper::global),
            ),
        }
    }
}

impl Proxy for ObjectProxy {
    fn handler(&self) -> &ObjectHandler {
        &self.handler
    }
}

/// A proxy of one interface of a remote object. Members of other interfaces are invisible.
pub struct InterfaceProxy {
    handler: ObjectHandler,
}

impl InterfaceProxy {
    pub fn new(
        connection: Arc<dyn Connection>,
        service_name: impl Into<String>,
        object_path: impl Into<String>,
        interface_name: impl Into<String>,
        error_mapper: Option<Arc<ErrorMapper>>,
    ) -> Self {
        InterfaceProxy {
            handler: ObjectHandler::new(
                connection,
                service_name,
                object_path,
                Some(interface_name.into()),
                error_mapper.unwrap_or_else(ErrorMapper::global),
            ),
        }
    }

    pub fn interface_name(&self) -> &str {
        self.handler.interface_name().unwrap_or_default()
    }
}

impl Proxy for InterfaceProxy {
    fn handler(&self) -> &ObjectHandler {
        &self.handler
    }
}

/// Disconnect the proxy from the bus: release its subscriptions and clear its signals.
///
/// The proxy can't be used for calls afterwards. Disconnecting twice is fine.
pub fn disconnect_proxy<P: Proxy + ?Sized>(proxy: &P) -> Result<(), ProxyError> {
    proxy.handler().disconnect()
}
