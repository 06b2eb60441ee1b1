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

//! [`Connection`] implemented on top of a `zbus` connection.
//!
//! Calls and signal subscriptions run as tasks on a tokio runtime. The synchronous call path
//! blocks the calling thread until its task has finished, so it must not be used from inside
//! an async task of the same runtime.

use crate::connection::{
    Arguments, Completion, Connection, MethodCall, SignalDelivery, SignalMatch, SubscriptionId,
    Timeout,
};
use crate::error::{CallError, RemoteError};
use crate::typing::is_single_structure;
use futures_util::StreamExt;
use log::{debug, error, trace};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, mpsc};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use zbus::zvariant::{Structure, Value};
use zbus::{DBusError, MatchRule, Message, MessageStream, OwnedMatchRule};

impl From<zbus::Error> for CallError {
    fn from(error: zbus::Error) -> Self {
        match error {
            zbus::Error::MethodError(name, description, _) => CallError::Remote(RemoteError::new(
                name.as_str(),
                description.unwrap_or_default(),
            )),
            zbus::Error::FDO(error) => CallError::Remote(RemoteError::new(
                error.name().as_str(),
                error.description().unwrap_or_default(),
            )),
            other => CallError::Transport(other),
        }
    }
}

/// A message bus connection usable by proxies.
pub struct BusConnection {
    connection: zbus::Connection,
    runtime: Handle,
    subscriptions: Mutex<HashMap<SubscriptionId, JoinHandle<()>>>,
    next_subscription: AtomicU64,
}

impl BusConnection {
    pub fn new(connection: zbus::Connection, runtime: Handle) -> Self {
        BusConnection {
            connection,
            runtime,
            subscriptions: Mutex::new(HashMap::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    /// Connect to the session bus, using the current tokio runtime.
    pub async fn session() -> Result<Self, zbus::Error> {
        let connection = zbus::Connection::session().await?;
        Ok(BusConnection::new(connection, Handle::current()))
    }

    /// Connect to the system bus, using the current tokio runtime.
    pub async fn system() -> Result<Self, zbus::Error> {
        let connection = zbus::Connection::system().await?;
        Ok(BusConnection::new(connection, Handle::current()))
    }

    pub fn inner(&self) -> &zbus::Connection {
        &self.connection
    }
}

/// The top-level fields of a message body. An empty body has none.
///
/// A body made of a single struct is one field, not the members of that struct.
pub fn body_fields(message: &Message) -> Result<Vec<Value<'static>>, zbus::Error> {
    let body = message.body();
    let signature = body.signature().to_string();
    if signature.is_empty() {
        return Ok(Vec::new());
    }
    let structure: Structure<'_> = body.deserialize()?;
    if is_single_structure(&signature) {
        return Ok(vec![Value::from(Value::from(structure).try_to_owned()?)]);
    }
    structure
        .into_fields()
        .into_iter()
        .map(|field| -> Result<Value<'static>, zbus::Error> {
            Ok(Value::from(field.try_to_owned()?))
        })
        .collect()
}

async fn dispatch(
    connection: &zbus::Connection,
    call: MethodCall,
) -> Result<Vec<Value<'static>>, CallError> {
    let MethodCall {
        service_name,
        object_path,
        interface_name,
        member_name,
        parameters,
        timeout,
        ..
    } = call;
    let body = parameters
        .map(Arguments::into_structure)
        .transpose()
        .map_err(zbus::Error::from)?;
    trace!("Sending {interface_name}.{member_name} to {service_name} at {object_path}");

    let reply = async {
        match &body {
            Some(body) => {
                connection
                    .call_method(
                        Some(service_name.as_str()),
                        object_path.as_str(),
                        Some(interface_name.as_str()),
                        member_name.as_str(),
                        body,
                    )
                    .await
            }
            None => {
                connection
                    .call_method(
                        Some(service_name.as_str()),
                        object_path.as_str(),
                        Some(interface_name.as_str()),
                        member_name.as_str(),
                        &(),
                    )
                    .await
            }
        }
    };
    let label = format!("{interface_name}.{member_name}");
    let message = with_timeout(timeout, &label, reply).await?;
    Ok(body_fields(&message)?)
}

/// Wait for `future`, giving up after the timeout if there is one.
async fn with_timeout<T, F>(timeout: Timeout, label: &str, future: F) -> Result<T, zbus::Error>
where
    F: Future<Output = Result<T, zbus::Error>>,
{
    match timeout.duration() {
        Some(duration) => tokio::time::timeout(duration, future)
            .await
            .map_err(|_| zbus::Error::Failure(format!("{label} timed out after {duration:?}")))?,
        None => future.await,
    }
}

fn match_rule(signal: &SignalMatch) -> Result<OwnedMatchRule, zbus::Error> {
    let mut builder = MatchRule::builder()
        .msg_type(zbus::message::Type::Signal)
        .sender(signal.service_name.as_str())?
        .interface(signal.interface_name.as_str())?
        .member(signal.signal_name.as_str())?
        .path(signal.object_path.as_str())?;
    if let Some(arg0) = &signal.arg0 {
        builder = builder.arg(0, arg0.as_str())?;
    }
    Ok(builder.build().into())
}

impl Connection for BusConnection {
    fn call_sync(&self, call: MethodCall) -> Result<Vec<Value<'static>>, CallError> {
        let connection = self.connection.clone();
        let (sender, receiver) = mpsc::sync_channel(1);
        self.runtime.spawn(async move {
            if sender.send(dispatch(&connection, call).await).is_err() {
                debug!("The caller stopped waiting for a reply");
            }
        });
        receiver.recv().map_err(|_| {
            CallError::Transport(zbus::Error::Failure(
                "The call task ended without a reply".to_string(),
            ))
        })?
    }

    fn call(&self, call: MethodCall, completion: Completion) {
        let connection = self.connection.clone();
        self.runtime.spawn(async move {
            let member = format!("{}.{}", call.interface_name, call.member_name);
            let result = dispatch(&connection, call).await;
            if let Err(e) = completion(result) {
                error!("Failed to complete the call of {member}: {e}");
            }
        });
    }

    fn signal_subscribe(
        &self,
        signal: SignalMatch,
        delivery: SignalDelivery,
    ) -> Result<SubscriptionId, CallError> {
        let rule = match_rule(&signal)?;
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::SeqCst));
        let connection = self.connection.clone();
        let name = format!("{}.{}", signal.interface_name, signal.signal_name);

        let task = self.runtime.spawn(async move {
            let mut stream = match MessageStream::for_match_rule(rule, &connection, None).await {
                Ok(stream) => stream,
                Err(e) => {
                    error!("Failed to subscribe to {name}: {e}");
                    return;
                }
            };
            while let Some(message) = stream.next().await {
                let fields = match message.and_then(|message| body_fields(&message)) {
                    Ok(fields) => fields,
                    Err(e) => {
                        error!("Failed to read an emission of {name}: {e}");
                        continue;
                    }
                };
                if let Err(e) = delivery(fields) {
                    error!("Failed to deliver {name}: {e}");
                }
            }
            debug!("The signal stream of {name} ended");
        });

        self.subscriptions
            .lock()
            .map_err(|_| {
                CallError::Transport(zbus::Error::Failure(
                    "The subscriptions lock is poisoned".to_string(),
                ))
            })?
            .insert(id, task);
        debug!("Subscription {id} matches {} at {}", signal.signal_name, signal.object_path);
        Ok(id)
    }

    fn signal_unsubscribe(&self, id: SubscriptionId) {
        let task = match self.subscriptions.lock() {
            Ok(mut subscriptions) => subscriptions.remove(&id),
            Err(_) => {
                error!("Can't release subscription {id}, the subscriptions lock is poisoned");
                return;
            }
        };
        match task {
            Some(task) => {
                task.abort();
                debug!("Released subscription {id}");
            }
            None => debug!("Subscription {id} is unknown"),
        }
    }
}

impl Drop for BusConnection {
    fn drop(&mut self) {
        if let Ok(mut subscriptions) = self.subscriptions.lock() {
            for (_, task) in subscriptions.drain() {
                task.abort();
            }
        }
    }
}
