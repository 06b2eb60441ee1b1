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
use dynbus::connection::{SignalMatch, SubscribeFlags};
use dynbus::proxy::Attribute;
use dynbus::signal::CallbackResult;
use dynbus::{ErrorMapper, Proxy, ProxyError, disconnect_proxy};
use googletest::prelude::*;
use rstest::*;
use std::sync::{Arc, Mutex};
use zbus::zvariant::Value;

static XML: &str = r#"
<node>
    <interface name="Interface">
        <signal name="Signal1" />
        <signal name="Signal2">
            <arg direction="out" name="x" type="i"/>
            <arg direction="out" name="y" type="s"/>
        </signal>
    </interface>
</node>
"#;

type Emissions = Arc<Mutex<Vec<Vec<Value<'static>>>>>;

fn recorder(emissions: &Emissions) -> impl Fn(&[Value<'static>]) -> CallbackResult + Send + Sync + 'static {
    let emissions = emissions.clone();
    move |fields: &[Value<'static>]| -> CallbackResult {
        let copy = fields
            .iter()
            .map(|field| Value::from(field.try_to_owned().unwrap()))
            .collect();
        emissions.lock().unwrap().push(copy);
        Ok(())
    }
}

fn expected_match(signal_name: &str) -> SignalMatch {
    SignalMatch {
        service_name: SERVICE_NAME.to_string(),
        interface_name: "Interface".to_string(),
        signal_name: signal_name.to_string(),
        object_path: OBJECT_PATH.to_string(),
        arg0: None,
        flags: SubscribeFlags::NONE,
    }
}

#[rstest]
fn signals_are_cached(connection: Arc<FakeConnection>, error_mapper: Arc<ErrorMapper>) {
    let proxy = object_proxy(&connection, &error_mapper, XML);

    let first = proxy.signal("Signal1").unwrap();
    let second = proxy.signal("Signal1").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    let Attribute::Signal(third) = proxy.attribute("Signal1").unwrap() else {
        panic!("Signal1 should resolve to a signal");
    };
    assert!(Arc::ptr_eq(&first, &third));

    assert_eq!(connection.subscriptions(), vec![expected_match("Signal1")]);
    assert_eq!(proxy.handler().subscription_count(), 1);
}

#[rstest]
fn emissions_reach_every_callback(connection: Arc<FakeConnection>, error_mapper: Arc<ErrorMapper>) {
    let proxy = object_proxy(&connection, &error_mapper, XML);
    let signal1 = proxy.signal("Signal1").unwrap();
    let signal2 = proxy.signal("Signal2").unwrap();
    assert_eq!(
        connection.subscriptions(),
        vec![expected_match("Signal1"), expected_match("Signal2")]
    );

    let first = Emissions::default();
    let second = Emissions::default();
    signal1.connect(recorder(&first));
    signal2.connect(recorder(&first));
    signal2.connect(recorder(&second));

    connection.deliver("Signal1", vec![]).unwrap();
    connection
        .deliver("Signal2", vec![Value::from(1i32), Value::from("Test")])
        .unwrap();

    assert_eq!(
        *first.lock().unwrap(),
        vec![vec![], vec![Value::from(1i32), Value::from("Test")]]
    );
    assert_eq!(
        *second.lock().unwrap(),
        vec![vec![Value::from(1i32), Value::from("Test")]]
    );
}

#[gtest]
#[rstest]
fn malformed_emissions_are_rejected(
    connection: Arc<FakeConnection>,
    error_mapper: Arc<ErrorMapper>,
) {
    let proxy = object_proxy(&connection, &error_mapper, XML);
    let emissions = Emissions::default();
    proxy.signal("Signal2").unwrap().connect(recorder(&emissions));

    let result = connection.deliver("Signal2", vec![Value::from("Test"), Value::from(1i32)]);
    assert_that!(
        result,
        err(displays_as(contains_substring(
            "Invalid reply for DBus member 'Signal2'"
        )))
    );
    assert!(emissions.lock().unwrap().is_empty());
}

#[rstest]
fn callback_errors_reach_the_delivery(
    connection: Arc<FakeConnection>,
    error_mapper: Arc<ErrorMapper>,
) {
    let proxy = object_proxy(&connection, &error_mapper, XML);
    let emissions = Emissions::default();
    let signal = proxy.signal("Signal1").unwrap();
    signal.connect(|_: &[Value<'static>]| Err("Callback failed.".into()));
    signal.connect(recorder(&emissions));

    let result = connection.deliver("Signal1", vec![]);
    assert!(matches!(result, Err(ProxyError::Callback(_))));
    assert!(emissions.lock().unwrap().is_empty());
}

#[gtest]
#[rstest]
fn invalid_signals(connection: Arc<FakeConnection>, error_mapper: Arc<ErrorMapper>) {
    let proxy = object_proxy(&connection, &error_mapper, XML);

    assert_that!(
        proxy.signal("SignalInvalid"),
        err(displays_as(eq("DBus object has no attribute 'SignalInvalid'.")))
    );
    assert_that!(
        proxy.set("Signal1", Value::from(1i32)),
        err(displays_as(eq("Can't set DBus attribute 'Signal1'.")))
    );
    assert!(connection.subscriptions().is_empty());
}

#[rstest]
fn disconnect_releases_subscriptions(
    connection: Arc<FakeConnection>,
    error_mapper: Arc<ErrorMapper>,
) {
    let proxy = object_proxy(&connection, &error_mapper, XML);
    let emissions = Emissions::default();
    let signal1 = proxy.signal("Signal1").unwrap();
    let signal2 = proxy.signal("Signal2").unwrap();
    signal1.connect(recorder(&emissions));
    signal2.connect(recorder(&emissions));

    disconnect_proxy(&proxy).unwrap();
    assert_eq!(connection.unsubscribed().len(), 2);
    assert_eq!(proxy.handler().subscription_count(), 0);
    assert_eq!(signal1.callback_count(), 0);
    assert_eq!(signal2.callback_count(), 0);
    assert!(proxy.handler().is_disconnected());

    disconnect_proxy(&proxy).unwrap();
    assert_eq!(connection.unsubscribed().len(), 2);

    // Cached signals stay reachable, new ones can't be created.
    assert!(Arc::ptr_eq(&proxy.signal("Signal1").unwrap(), &signal1));
    connection.deliver("Signal1", vec![]).unwrap();
    assert!(emissions.lock().unwrap().is_empty());
}

#[rstest]
fn no_new_signals_after_disconnect(
    connection: Arc<FakeConnection>,
    error_mapper: Arc<ErrorMapper>,
) {
    let proxy = object_proxy(&connection, &error_mapper, XML);
    disconnect_proxy(&proxy).unwrap();
    assert!(matches!(
        proxy.signal("Signal2"),
        Err(ProxyError::Disconnected(_))
    ));
    assert!(connection.subscriptions().is_empty());
}

#[rstest]
fn dropping_the_proxy_releases_subscriptions(
    connection: Arc<FakeConnection>,
    error_mapper: Arc<ErrorMapper>,
) {
    let proxy = object_proxy(&connection, &error_mapper, XML);
    let signal = proxy.signal("Signal2").unwrap();
    signal.connect(|_: &[Value<'static>]| Ok(()));
    drop(proxy);

    assert_eq!(connection.unsubscribed().len(), 1);
    assert_eq!(signal.callback_count(), 0);
}
