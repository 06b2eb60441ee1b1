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

use crate::common::fake_connection::FakeConnection;
use crate::common::*;
use dynbus::error::{CallError, RemoteError};
use dynbus::handler::ObjectHandler;
use dynbus::specification::{Member, MethodSpec};
use dynbus::{ErrorMapper, ErrorRule, ObjectProxy, Output, Proxy, ProxyError};
use googletest::prelude::*;
use rstest::*;
use std::sync::Arc;
use zbus::zvariant::Value;

static XML: &str = r#"
<node>
    <interface name="Interface">
        <method name="Method1"/>
    </interface>
</node>
"#;

fn introspection_call() -> dynbus::connection::MethodCall {
    expected_call(
        "org.freedesktop.DBus.Introspectable",
        "Introspect",
        None,
        Some("(s)"),
    )
}

#[rstest]
fn specification_is_introspected_once(
    connection: Arc<FakeConnection>,
    error_mapper: Arc<ErrorMapper>,
) {
    let handler = ObjectHandler::new(
        connection.clone(),
        SERVICE_NAME,
        OBJECT_PATH,
        None,
        error_mapper,
    );
    connection.set_reply(Ok(vec![Value::from(XML)]));

    let specification = handler.specification().unwrap();
    check_call(&connection, introspection_call());
    assert!(specification.members().contains(&Member::Method(MethodSpec {
        name: "Method1".to_string(),
        interface_name: "Interface".to_string(),
        in_args: vec![],
        out_args: vec![],
    })));

    let again = handler.specification().unwrap();
    assert!(Arc::ptr_eq(&specification, &again));
    assert!(connection.take_sync_calls().is_empty());
}

#[rstest]
fn proxy_introspects_on_first_use(connection: Arc<FakeConnection>, error_mapper: Arc<ErrorMapper>) {
    let proxy = ObjectProxy::new(
        connection.clone(),
        SERVICE_NAME,
        OBJECT_PATH,
        Some(error_mapper),
    );
    assert!(connection.take_sync_calls().is_empty());

    connection.set_reply(Ok(vec![Value::from(XML)]));
    connection.set_no_reply();
    assert_eq!(proxy.call("Method1", vec![]).unwrap(), Output::Unit);
    assert_eq!(
        connection.take_sync_calls(),
        vec![
            introspection_call(),
            expected_call("Interface", "Method1", None, None)
        ]
    );
}

#[gtest]
#[rstest]
fn introspection_errors(connection: Arc<FakeConnection>, error_mapper: Arc<ErrorMapper>) {
    let proxy = ObjectProxy::new(
        connection.clone(),
        SERVICE_NAME,
        OBJECT_PATH,
        Some(error_mapper.clone()),
    );

    error_mapper.add_rule(
        ErrorRule::new(FakeException).error_name("org.freedesktop.DBus.Error.UnknownObject"),
    );
    connection.set_reply(Err(CallError::Remote(RemoteError::new(
        "org.freedesktop.DBus.Error.UnknownObject",
        "No such object.",
    ))));
    let error = proxy.call("Method1", vec![]).unwrap_err();
    assert!(error.mapped::<FakeException>().is_some());

    connection.set_reply(Ok(vec![Value::from("<node><interface>")]));
    assert_that!(
        proxy.call("Method1", vec![]),
        err(displays_as(contains_substring("FormatError::")))
    );

    connection.set_reply(Ok(vec![Value::from(1i32)]));
    assert!(matches!(
        proxy.call("Method1", vec![]),
        Err(ProxyError::ReplyShape { .. })
    ));

    // A failed introspection is retried by the next access.
    connection.set_reply(Ok(vec![Value::from(XML)]));
    connection.set_no_reply();
    assert!(proxy.call("Method1", vec![]).unwrap().is_unit());
}

#[test]
fn global_error_mapper_is_the_default() {
    init_logging();
    let connection = FakeConnection::new();
    let proxy = ObjectProxy::new(connection, SERVICE_NAME, OBJECT_PATH, None);
    assert!(Arc::ptr_eq(proxy.handler().error_mapper(), &ErrorMapper::global()));
}
