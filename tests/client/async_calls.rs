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
use dynbus::connection::Arguments;
use dynbus::error::{CallError, RemoteError};
use dynbus::{ErrorMapper, ErrorRule, Output, Proxy, disconnect_proxy};
use googletest::prelude::*;
use rstest::*;
use std::sync::{Arc, Mutex};
use zbus::zvariant::Value;

static XML: &str = r#"
<node>
    <interface name="Interface">
        <method name="Method1"/>
        <method name="Method2">
            <arg direction="in" name="x" type="i"/>
            <arg direction="in" name="y" type="i"/>
            <arg direction="out" name="return" type="i"/>
        </method>
    </interface>
</node>
"#;

type Received = Arc<Mutex<Vec<(Output, (&'static str, &'static str))>>>;

fn callback(received: &Received) -> impl FnOnce(Output, (&'static str, &'static str)) + Send + 'static {
    let received = received.clone();
    move |output, args| received.lock().unwrap().push((output, args))
}

#[rstest]
fn no_outputs(connection: Arc<FakeConnection>, error_mapper: Arc<ErrorMapper>) {
    let proxy = object_proxy(&connection, &error_mapper, XML);
    let received = Received::default();

    proxy
        .call_async("Method1", vec![], callback(&received), ("A", "B"))
        .unwrap();
    assert!(received.lock().unwrap().is_empty());

    let (call, completion) = connection.take_async_call().expect("no call was sent");
    assert_eq!(call, expected_call("Interface", "Method1", None, None));
    assert!(connection.take_sync_calls().is_empty());

    completion(Ok(vec![])).unwrap();
    assert_eq!(*received.lock().unwrap(), vec![(Output::Unit, ("A", "B"))]);
}

#[rstest]
fn one_output(connection: Arc<FakeConnection>, error_mapper: Arc<ErrorMapper>) {
    let proxy = object_proxy(&connection, &error_mapper, XML);
    let received = Received::default();

    proxy
        .call_async(
            "Method2",
            vec![Value::from(1i32), Value::from(2i32)],
            callback(&received),
            ("A", "B"),
        )
        .unwrap();
    let (call, completion) = connection.take_async_call().expect("no call was sent");
    assert_eq!(
        call,
        expected_call(
            "Interface",
            "Method2",
            Some(Arguments::new("(ii)", vec![Value::from(1i32), Value::from(2i32)])),
            Some("(i)"),
        )
    );

    completion(Ok(vec![Value::from(3i32)])).unwrap();
    assert_eq!(
        *received.lock().unwrap(),
        vec![(Output::Value(Value::from(3i32)), ("A", "B"))]
    );
}

#[gtest]
#[rstest]
fn mapped_error_is_raised_by_the_completion(
    connection: Arc<FakeConnection>,
    error_mapper: Arc<ErrorMapper>,
) {
    let proxy = object_proxy(&connection, &error_mapper, XML);
    error_mapper.add_rule(ErrorRule::new(FakeException).error_name("org.test.Unknown"));
    let received = Received::default();

    proxy
        .call_async("Method1", vec![], callback(&received), ("A", "B"))
        .unwrap();
    let (_, completion) = connection.take_async_call().expect("no call was sent");
    let error = completion(Err(CallError::Remote(RemoteError::new(
        "org.test.Unknown",
        "My message.",
    ))))
    .unwrap_err();

    assert!(error.mapped::<FakeException>().is_some());
    assert_that!(error, displays_as(eq("My message.")));
    assert!(received.lock().unwrap().is_empty());
}

#[gtest]
#[rstest]
fn invalid_calls_fail_immediately(
    connection: Arc<FakeConnection>,
    error_mapper: Arc<ErrorMapper>,
) {
    let proxy = object_proxy(&connection, &error_mapper, XML);
    let received = Received::default();

    let result = proxy.call_async("Method2", vec![], callback(&received), ("A", "B"));
    assert_that!(result, err(displays_as(contains_substring("Method2"))));
    let result = proxy.call_async("Method3", vec![], callback(&received), ("A", "B"));
    assert_that!(
        result,
        err(displays_as(eq("DBus object has no attribute 'Method3'.")))
    );
    assert_eq!(connection.pending_async_calls(), 0);
}

#[rstest]
fn completion_after_disconnect_is_dropped(
    connection: Arc<FakeConnection>,
    error_mapper: Arc<ErrorMapper>,
) {
    let proxy = object_proxy(&connection, &error_mapper, XML);
    let received = Received::default();

    proxy
        .call_async("Method1", vec![], callback(&received), ("A", "B"))
        .unwrap();
    disconnect_proxy(&proxy).unwrap();

    let (_, completion) = connection.take_async_call().expect("no call was sent");
    completion(Ok(vec![])).unwrap();
    assert!(received.lock().unwrap().is_empty());

    let result = proxy.call_async("Method1", vec![], callback(&received), ("A", "B"));
    assert!(matches!(result, Err(dynbus::ProxyError::Disconnected(_))));
}
