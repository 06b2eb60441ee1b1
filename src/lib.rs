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

//! # dynbus
//!
//! Dynamic client proxies for D-Bus objects.
//!
//! A proxy is created from nothing more than a service name and an object path. The object's
//! introspection data is fetched on first use and parsed into a
//! [`Specification`](specification::Specification); after that, methods, properties and signals
//! are addressed by name and checked against their introspected types at call time.
//!
//! ## Layers
//!
//! - [`proxy`] - [`ObjectProxy`](proxy::ObjectProxy) and [`InterfaceProxy`](proxy::InterfaceProxy),
//!   the name-addressed surface.
//! - [`handler`] - [`ObjectHandler`](handler::ObjectHandler), which turns member access into bus
//!   calls and subscriptions.
//! - [`specification`] - the typed member table parsed from introspection XML.
//! - [`error_mapper`] - rules that turn D-Bus error names into local error types.
//! - [`signal`] - the local callback registry of one remote signal.
//! - [`connection`] - the [`Connection`](connection::Connection) trait the handler talks to,
//!   and [`bus`] - its implementation over `zbus`.
//!
//! ## Errors
//!
//! Every fallible operation returns [`ProxyError`](error::ProxyError). Misuse of a member is an
//! attribute error, remote failures go through the error mapper, and failures of the transport
//! are passed on unchanged. Nothing is retried.
//!
//! ## Logging
//!
//! The crate logs through the `log` facade. Calls are logged at `trace`, subscriptions and
//! disconnections at `debug`, and failed deliveries in the bus adapter at `error`.

pub mod bus;
pub mod config;
pub mod connection;
pub mod error;
pub mod error_mapper;
pub mod handler;
pub mod proxy;
pub mod signal;
pub mod specification;
pub mod typing;

pub use error::ProxyError;
pub use error_mapper::{ErrorMapper, ErrorRule};
pub use handler::Output;
pub use proxy::{InterfaceProxy, ObjectProxy, Proxy, disconnect_proxy};
pub use signal::Signal;
