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


use dynbus::connection::{Arguments, CallFlags, MethodCall, Timeout};
use dynbus::specification::Specification;
use dynbus::{ErrorMapper, InterfaceProxy, ObjectProxy, Proxy};
use fake_connection::FakeConnection;
use rstest::*;
use std::sync::Arc;

pub static SERVICE_NAME: &str = "my.service";
pub static OBJECT_PATH: &str = "/my/object";

/// Local error type used as the target of error rules.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct FakeException(pub String);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[fixture]
pub fn connection() -> Arc<FakeConnection> {
    init_logging();
    FakeConnection::new()
}

#[fixture]
pub fn error_mapper() -> Arc<ErrorMapper> {
    Arc::new(ErrorMapper::new())
}

/// An object proxy whose specification is parsed from `xml` instead of introspected.
pub fn object_proxy(
    connection: &Arc<FakeConnection>,
    error_mapper: &Arc<ErrorMapper>,
    xml: &str,
) -> ObjectProxy {
    let proxy = ObjectProxy::new(
        connection.clone(),
        SERVICE_NAME,
        OBJECT_PATH,
        Some(error_mapper.clone()),
    );
    proxy
        .handler()
        .set_specification(Specification::from_xml(xml).expect("invalid test XML"))
        .expect("failed to set the specification");
    proxy
}

pub fn interface_proxy(
    connection: &Arc<FakeConnection>,
    error_mapper: &Arc<ErrorMapper>,
    xml: &str,
    interface_name: &str,
) -> InterfaceProxy {
    let proxy = InterfaceProxy::new(
        connection.clone(),
        SERVICE_NAME,
        OBJECT_PATH,
        interface_name,
        Some(error_mapper.clone()),
    );
    proxy
        .handler()
        .set_specification(Specification::from_xml(xml).expect("invalid test XML"))
        .expect("failed to set the specification");
    proxy
}

/// The call a proxy of the test object is expected to send.
pub fn expected_call(
    interface_name: &str,
    member_name: &str,
    parameters: Option<Arguments>,
    reply_type: Option<&str>,
) -> MethodCall {
    MethodCall {
        service_name: SERVICE_NAME.to_string(),
        object_path: OBJECT_PATH.to_string(),
        interface_name: interface_name.to_string(),
        member_name: member_name.to_string(),
        parameters,
        reply_type: reply_type.map(str::to_string),
        flags: CallFlags::NONE,
        timeout: Timeout::NONE,
    }
}

/// Check that exactly one synchronous call was sent since the last check, and that it was `expected`.
pub fn check_call(connection: &FakeConnection, expected: MethodCall) {
    let calls = connection.take_sync_calls();
    assert_eq!(calls, vec![expected]);
}
