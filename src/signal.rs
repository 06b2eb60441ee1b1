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

//! Local fan-out of a remote signal to registered callbacks.

use log::trace;
use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex};
use zbus::zvariant::Value;

/// What a signal callback returns. An error stops the emission.
pub type CallbackResult = Result<(), Box<dyn Error + Send + Sync>>;

/// A callback receiving the fields of one emission.
pub type SignalCallback = Arc<dyn Fn(&[Value<'static>]) -> CallbackResult + Send + Sync>;

/// An ordered list of callbacks.
///
/// The same callback may be connected more than once; it is then called once per connection.
#[derive(Default)]
pub struct Signal {
    callbacks: Mutex<Vec<SignalCallback>>,
}

impl Signal {
    pub fn new() -> Self {
        Signal::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SignalCallback>> {
        self.callbacks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a callback. Returns the handle to pass to [`disconnect`](Self::disconnect).
    pub fn connect<F>(&self, callback: F) -> SignalCallback
    where
        F: Fn(&[Value<'static>]) -> CallbackResult + Send + Sync + 'static,
    {
        let callback: SignalCallback = Arc::new(callback);
        self.connect_callback(callback.clone());
        callback
    }

    /// Append an already shared callback.
    pub fn connect_callback(&self, callback: SignalCallback) {
        self.lock().push(callback);
    }

    /// Remove the first registration of `callback`. Returns `false` if it was not connected.
    pub fn disconnect(&self, callback: &SignalCallback) -> bool {
        let mut callbacks = self.lock();
        match callbacks.iter().position(|c| Arc::ptr_eq(c, callback)) {
            Some(position) => {
                callbacks.remove(position);
                true
            }
            None => false,
        }
    }

    pub fn disconnect_all(&self) {
        self.lock().clear();
    }

    pub fn callback_count(&self) -> usize {
        self.lock().len()
    }

    /// Call every callback in registration order with `fields`.
    ///
    /// Callbacks connected or disconnected during the emission take effect from the next one.
    ///
    /// # Returns: `CallbackResult`
    /// * `Ok(())` - every callback succeeded
    /// * `Err(..)` - the error of the first failing callback; later callbacks were not called
    pub fn emit(&self, fields: &[Value<'static>]) -> CallbackResult {
        let callbacks = self.lock().clone();
        trace!("Emitting a signal to {} callbacks", callbacks.len());
        for callback in callbacks {
            callback(fields)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("callbacks", &self.callback_count())
            .finish()
    }
}
