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

//! The object handler: everything a proxy does on the bus goes through here.
//!
//! An [`ObjectHandler`] is bound to one remote object (service name and object path) and,
//! optionally, to one of its interfaces. It owns
//!
//! - the [`Specification`] of the object, fetched by introspection on first use unless one was
//!   installed with [`ObjectHandler::set_specification`],
//! - the cached [`Signal`]s, one per accessed signal member, and their bus subscriptions,
//! - the [`ErrorMapper`] used to turn remote errors into local ones.
//!
//! Method calls come in two forms that share member resolution, argument coercion and reply
//! decoding: [`call_sync`](ObjectHandler::call_sync) blocks until the reply arrives and
//! [`call_async`](ObjectHandler::call_async) returns immediately and reports through a
//! callback once the connection completes the call.
//!
//! After [`disconnect`](ObjectHandler::disconnect) the handler is inert: every operation fails
//! with [`ProxyError::Disconnected`], cached signals keep existing without callbacks, and
//! completions of calls issued before the disconnect are dropped.

use crate::config;
use crate::connection::{
    Arguments, CallFlags, Connection, MethodCall, SignalDelivery, SignalMatch, SubscribeFlags,
    SubscriptionId, Timeout,
};
use crate::error::{AttributeError, CallError, MemberKind, ProxyError};
use crate::error_mapper::ErrorMapper;
use crate::signal::Signal;
use crate::specification::{Member, MethodSpec, PropertySpec, SignalSpec, Specification};
use crate::typing::{check_fields, coerce_value, unwrap_variant};
use log::{debug, trace};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use zbus::zvariant::Value;

/// A decoded method reply or signal body.
#[derive(Debug, PartialEq)]
pub enum Output {
    /// No output values.
    Unit,
    /// Exactly one output value.
    Value(Value<'static>),
    /// Two or more output values, in declaration order.
    Tuple(Vec<Value<'static>>),
}

impl Output {
    pub fn from_fields(mut fields: Vec<Value<'static>>) -> Output {
        match fields.len() {
            0 => Output::Unit,
            1 => Output::Value(fields.remove(0)),
            _ => Output::Tuple(fields),
        }
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, Output::Unit)
    }

    /// The single value, if there is exactly one.
    pub fn into_value(self) -> Option<Value<'static>> {
        match self {
            Output::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_values(self) -> Vec<Value<'static>> {
        match self {
            Output::Unit => Vec::new(),
            Output::Value(value) => vec![value],
            Output::Tuple(values) => values,
        }
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>, ProxyError> {
    mutex
        .lock()
        .map_err(|_| ProxyError::Internal(format!("The {what} lock is poisoned")))
}

fn is_standard_member(member: &Member) -> bool {
    [
        config::DBUS_INTROSPECTABLE_INTERFACE,
        config::DBUS_PEER_INTERFACE,
        config::DBUS_PROPERTIES_INTERFACE,
    ]
    .contains(&member.interface_name())
}

/// Route a failed call: remote errors through the mapper, transport errors untouched.
pub fn map_call_error(mapper: &ErrorMapper, error: CallError) -> ProxyError {
    match error {
        CallError::Remote(remote) => mapper.map_error(remote),
        CallError::Transport(error) => ProxyError::Transport(error),
    }
}

/// Turn the outcome of a method call into its decoded output.
///
/// # Returns: `Result<Output, ProxyError>`
/// * `Ok(Output)` - the reply matched the declared output types
/// * `Err(ProxyError::Mapped)` or `Err(ProxyError::Remote)` - the remote side failed
/// * `Err(ProxyError::Transport)` - the call failed locally
/// * `Err(ProxyError::ReplyShape)` - the reply does not match the declared output types
pub fn finish_call(
    mapper: &ErrorMapper,
    method: &MethodSpec,
    result: Result<Vec<Value<'static>>, CallError>,
) -> Result<Output, ProxyError> {
    let fields = result.map_err(|error| map_call_error(mapper, error))?;
    check_fields(&fields, &method.out_args).map_err(|reason| ProxyError::ReplyShape {
        member: method.name.clone(),
        reason,
    })?;
    trace!("{}.{} returned {} value(s)", method.interface_name, method.name, fields.len());
    Ok(Output::from_fields(fields))
}

/// Client-side handler of one remote object.
pub struct ObjectHandler {
    connection: Arc<dyn Connection>,
    service_name: String,
    object_path: String,
    interface_name: Option<String>,
    error_mapper: Arc<ErrorMapper>,
    specification: Mutex<Option<Arc<Specification>>>,
    signals: Mutex<HashMap<(String, String), Arc<Signal>>>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
    generation: Arc<AtomicU64>,
    disconnected: AtomicBool,
}

impl ObjectHandler {
    /// Create a handler. Nothing is sent on the bus until a member is used.
    ///
    /// With an `interface_name`, only members of that interface are visible.
    pub fn new(
        connection: Arc<dyn Connection>,
        service_name: impl Into<String>,
        object_path: impl Into<String>,
        interface_name: Option<String>,
        error_mapper: Arc<ErrorMapper>,
    ) -> Self {
        ObjectHandler {
            connection,
            service_name: service_name.into(),
            object_path: object_path.into(),
            interface_name,
            error_mapper,
            specification: Mutex::new(None),
            signals: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(Vec::new()),
            generation: Arc::new(AtomicU64::new(0)),
            disconnected: AtomicBool::new(false),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn object_path(&self) -> &str {
        &self.object_path
    }

    pub fn interface_name(&self) -> Option<&str> {
        self.interface_name.as_deref()
    }

    pub fn error_mapper(&self) -> &Arc<ErrorMapper> {
        &self.error_mapper
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    /// Number of bus subscriptions currently held.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions
            .lock()
            .map(|subscriptions| subscriptions.len())
            .unwrap_or(0)
    }

    fn check_connected(&self) -> Result<(), ProxyError> {
        if self.is_disconnected() {
            return Err(ProxyError::Disconnected(format!(
                "{} at {}",
                self.service_name, self.object_path
            )));
        }
        Ok(())
    }

    fn map_call_error(&self, error: CallError) -> ProxyError {
        map_call_error(&self.error_mapper, error)
    }

    /// The specification of the remote object, introspected on first use.
    pub fn specification(&self) -> Result<Arc<Specification>, ProxyError> {
        let mut cached = lock(&self.specification, "specification")?;
        if let Some(specification) = cached.as_ref() {
            return Ok(specification.clone());
        }
        self.check_connected()?;
        let xml = self.introspect()?;
        let specification = Arc::new(Specification::from_xml(&xml)?);
        *cached = Some(specification.clone());
        Ok(specification)
    }

    /// Use `specification` instead of introspecting the remote object.
    pub fn set_specification(&self, specification: Specification) -> Result<(), ProxyError> {
        *lock(&self.specification, "specification")? = Some(Arc::new(specification));
        Ok(())
    }

    fn introspect(&self) -> Result<String, ProxyError> {
        debug!(
            "Introspecting {} at {}",
            self.service_name, self.object_path
        );
        let call = MethodCall {
            service_name: self.service_name.clone(),
            object_path: self.object_path.clone(),
            interface_name: config::DBUS_INTROSPECTABLE_INTERFACE.to_string(),
            member_name: config::DBUS_INTROSPECT_METHOD.to_string(),
            parameters: None,
            reply_type: Some("(s)".to_string()),
            flags: CallFlags::NONE,
            timeout: Timeout::NONE,
        };
        let fields = self
            .connection
            .call_sync(call)
            .map_err(|e| self.map_call_error(e))?;
        let reply_error = |reason: String| ProxyError::ReplyShape {
            member: config::DBUS_INTROSPECT_METHOD.to_string(),
            reason,
        };
        check_fields(&fields, &["s".to_string()]).map_err(reply_error)?;
        match fields.into_iter().next() {
            Some(Value::Str(xml)) => Ok(xml.as_str().to_owned()),
            _ => Err(reply_error("the reply has no XML data".to_string())),
        }
    }

    /// Resolve a member name in the visible interfaces.
    ///
    /// A member of the object's own interfaces hides a standard member of the same name.
    ///
    /// # Returns: `Result<Member, ProxyError>`
    /// * `Ok(Member)` - exactly one visible member has this name
    /// * `Err(ProxyError::Attribute)` - no visible member, or several in different interfaces
    pub fn member(&self, name: &str) -> Result<Member, ProxyError> {
        let specification = self.specification()?;
        let mut candidates: Vec<&Member> = specification
            .find(name)
            .filter(|member| {
                self.interface_name
                    .as_deref()
                    .is_none_or(|interface| member.interface_name() == interface)
            })
            .collect();
        if candidates.iter().any(|member| !is_standard_member(member)) {
            candidates.retain(|member| !is_standard_member(member));
        }
        match candidates.as_slice() {
            [] => Err(AttributeError::NoSuchMember(name.to_string()).into()),
            [member] => Ok((*member).clone()),
            members => Err(AttributeError::Ambiguous {
                name: name.to_string(),
                interfaces: members
                    .iter()
                    .map(|member| member.interface_name().to_string())
                    .collect(),
            }
            .into()),
        }
    }

    fn wrong_kind(name: &str, member: &Member, expected: MemberKind) -> ProxyError {
        AttributeError::WrongKind {
            name: name.to_string(),
            kind: member.kind(),
            expected,
        }
        .into()
    }

    fn method(&self, name: &str) -> Result<MethodSpec, ProxyError> {
        match self.member(name)? {
            Member::Method(method) => Ok(method),
            other => Err(Self::wrong_kind(name, &other, MemberKind::Method)),
        }
    }

    fn new_call(&self, interface_name: &str, member_name: &str) -> MethodCall {
        MethodCall {
            service_name: self.service_name.clone(),
            object_path: self.object_path.clone(),
            interface_name: interface_name.to_string(),
            member_name: member_name.to_string(),
            parameters: None,
            reply_type: None,
            flags: CallFlags::NONE,
            timeout: Timeout::NONE,
        }
    }

    fn prepare_call(
        &self,
        method: &MethodSpec,
        args: Vec<Value<'static>>,
    ) -> Result<MethodCall, ProxyError> {
        let argument_error = |reason: String| ProxyError::Arguments {
            member: method.name.clone(),
            reason,
        };
        if args.len() != method.in_args.len() {
            return Err(argument_error(format!(
                "expected {} argument(s), got {}",
                method.in_args.len(),
                args.len()
            )));
        }
        let values = args
            .into_iter()
            .zip(&method.in_args)
            .enumerate()
            .map(|(index, (value, declared))| {
                coerce_value(value, declared)
                    .map_err(|reason| argument_error(format!("argument {index}: {reason}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut call = self.new_call(&method.interface_name, &method.name);
        call.parameters = method
            .in_type()
            .map(|signature| Arguments::new(signature, values));
        call.reply_type = method.out_type();
        Ok(call)
    }

    /// Call a method and wait for its reply.
    ///
    /// # Arguments
    ///
    /// * `name`: the method name
    /// * `args`: one value per declared input argument
    ///
    /// # Returns: `Result<Output, ProxyError>`
    /// * `Ok(Output)` - the decoded reply
    /// * `Err(ProxyError)` - see [`finish_call`]; also attribute and argument errors raised
    ///   before anything is sent
    pub fn call_sync(&self, name: &str, args: Vec<Value<'static>>) -> Result<Output, ProxyError> {
        self.check_connected()?;
        let method = self.method(name)?;
        let call = self.prepare_call(&method, args)?;
        trace!("Calling {}.{} on {}", method.interface_name, method.name, self.object_path);
        let result = self.connection.call_sync(call);
        finish_call(&self.error_mapper, &method, result)
    }

    /// Call a method without waiting for its reply.
    ///
    /// `callback` is invoked with the decoded output and `callback_args` once the connection
    /// completes the call. If the call fails, the callback is not invoked and the error is
    /// returned to the connection from the completion instead.
    ///
    /// Completions arriving after [`disconnect`](Self::disconnect) are dropped.
    pub fn call_async<A, F>(
        &self,
        name: &str,
        args: Vec<Value<'static>>,
        callback: F,
        callback_args: A,
    ) -> Result<(), ProxyError>
    where
        A: Send + 'static,
        F: FnOnce(Output, A) + Send + 'static,
    {
        self.check_connected()?;
        let method = self.method(name)?;
        let call = self.prepare_call(&method, args)?;
        let mapper = self.error_mapper.clone();
        let generation = self.generation.clone();
        let issued_in = generation.load(Ordering::SeqCst);
        trace!(
            "Calling {}.{} on {} asynchronously",
            method.interface_name, method.name, self.object_path
        );
        self.connection.call(
            call,
            Box::new(move |result: Result<Vec<Value<'static>>, CallError>| {
                if generation.load(Ordering::SeqCst) != issued_in {
                    debug!(
                        "Dropping the reply of {}.{}, the proxy was disconnected",
                        method.interface_name, method.name
                    );
                    return Ok(());
                }
                let output = finish_call(&mapper, &method, result)?;
                callback(output, callback_args);
                Ok(())
            }),
        );
        Ok(())
    }

    fn property(&self, name: &str) -> Result<PropertySpec, ProxyError> {
        match self.member(name)? {
            Member::Property(property) => Ok(property),
            other => Err(Self::wrong_kind(name, &other, MemberKind::Property)),
        }
    }

    /// Read a property through `org.freedesktop.DBus.Properties.Get`.
    pub fn get_property(&self, name: &str) -> Result<Value<'static>, ProxyError> {
        self.check_connected()?;
        let property = self.property(name)?;
        if !property.access.readable() {
            return Err(AttributeError::CantRead(name.to_string()).into());
        }
        let mut call = self.new_call(config::DBUS_PROPERTIES_INTERFACE, config::DBUS_GET_PROPERTY_METHOD);
        call.parameters = Some(Arguments::new(
            "(ss)",
            vec![
                Value::from(property.interface_name.clone()),
                Value::from(property.name.clone()),
            ],
        ));
        call.reply_type = Some("(v)".to_string());
        trace!("Reading {}.{}", property.interface_name, property.name);

        let fields = self
            .connection
            .call_sync(call)
            .map_err(|e| self.map_call_error(e))?;
        let reply_error = |reason: String| ProxyError::ReplyShape {
            member: name.to_string(),
            reason,
        };
        check_fields(&fields, &["v".to_string()]).map_err(reply_error)?;
        let value = fields
            .into_iter()
            .next()
            .map(unwrap_variant)
            .ok_or_else(|| reply_error("the reply has no value".to_string()))?;
        let actual = value.value_signature().to_string();
        if actual != property.type_signature {
            return Err(reply_error(format!(
                "the value has type '{actual}', expected '{}'",
                property.type_signature
            )));
        }
        Ok(value)
    }

    /// Write a property through `org.freedesktop.DBus.Properties.Set`.
    ///
    /// Only properties can be set. Setting a method or a signal is an attribute error.
    pub fn set_property(&self, name: &str, value: Value<'static>) -> Result<(), ProxyError> {
        self.check_connected()?;
        let property = match self.member(name)? {
            Member::Property(property) => property,
            _ => return Err(AttributeError::CantSet(name.to_string()).into()),
        };
        if !property.access.writable() {
            return Err(AttributeError::CantWrite(name.to_string()).into());
        }
        let value = coerce_value(value, &property.type_signature).map_err(|reason| {
            ProxyError::Arguments {
                member: name.to_string(),
                reason,
            }
        })?;
        let mut call = self.new_call(config::DBUS_PROPERTIES_INTERFACE, config::DBUS_SET_PROPERTY_METHOD);
        call.parameters = Some(Arguments::new(
            "(ssv)",
            vec![
                Value::from(property.interface_name.clone()),
                Value::from(property.name.clone()),
                Value::Value(Box::new(value)),
            ],
        ));
        trace!("Writing {}.{}", property.interface_name, property.name);

        self.connection
            .call_sync(call)
            .map_err(|e| self.map_call_error(e))?;
        Ok(())
    }

    /// The local [`Signal`] of a remote signal member.
    ///
    /// The first access subscribes on the bus. Later accesses return the same `Signal`.
    pub fn get_signal(&self, name: &str) -> Result<Arc<Signal>, ProxyError> {
        let member = self.member(name)?;
        let spec = match member {
            Member::Signal(spec) => spec,
            other => return Err(Self::wrong_kind(name, &other, MemberKind::Signal)),
        };
        let key = (spec.interface_name.clone(), spec.name.clone());
        let mut signals = lock(&self.signals, "signals")?;
        if let Some(signal) = signals.get(&key) {
            return Ok(signal.clone());
        }
        self.check_connected()?;

        let signal = Arc::new(Signal::new());
        let id = self.subscribe(&spec, Arc::downgrade(&signal))?;
        lock(&self.subscriptions, "subscriptions")?.push(id);
        signals.insert(key, signal.clone());
        Ok(signal)
    }

    fn subscribe(&self, spec: &SignalSpec, signal: Weak<Signal>) -> Result<SubscriptionId, ProxyError> {
        let rule = SignalMatch {
            service_name: self.service_name.clone(),
            interface_name: spec.interface_name.clone(),
            signal_name: spec.name.clone(),
            object_path: self.object_path.clone(),
            arg0: None,
            flags: SubscribeFlags::NONE,
        };
        let out_args = spec.out_args.clone();
        let signal_name = spec.name.clone();
        let delivery: SignalDelivery = Arc::new(move |fields: Vec<Value<'static>>| {
            let Some(signal) = signal.upgrade() else {
                return Ok(());
            };
            check_fields(&fields, &out_args).map_err(|reason| ProxyError::ReplyShape {
                member: signal_name.clone(),
                reason,
            })?;
            trace!("Delivering {} to {} callbacks", signal_name, signal.callback_count());
            signal.emit(&fields).map_err(ProxyError::Callback)
        });
        let id = self
            .connection
            .signal_subscribe(rule, delivery)
            .map_err(|e| self.map_call_error(e))?;
        debug!(
            "Subscribed to {}.{} of {} as {id}",
            spec.interface_name, spec.name, self.object_path
        );
        Ok(id)
    }

    /// Release every subscription and clear the callbacks of every cached signal.
    ///
    /// The handler counts as disconnected only once both are done. Calling it again after
    /// that does nothing.
    pub fn disconnect(&self) -> Result<(), ProxyError> {
        if self.is_disconnected() {
            return Ok(());
        }
        let subscriptions: Vec<SubscriptionId> =
            lock(&self.subscriptions, "subscriptions")?.drain(..).collect();
        for id in &subscriptions {
            self.connection.signal_unsubscribe(*id);
        }
        for signal in lock(&self.signals, "signals")?.values() {
            signal.disconnect_all();
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.disconnected.store(true, Ordering::SeqCst);
        debug!(
            "Disconnected {} at {}, released {} subscription(s)",
            self.service_name,
            self.object_path,
            subscriptions.len()
        );
        Ok(())
    }
}

impl Drop for ObjectHandler {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            debug!("Failed to disconnect {}: {e}", self.object_path);
        }
    }
}
