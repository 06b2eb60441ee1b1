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

/// The interface every D-Bus object implements to describe itself.
pub static DBUS_INTROSPECTABLE_INTERFACE: &str = "org.freedesktop.DBus.Introspectable";

/// The single method of [`DBUS_INTROSPECTABLE_INTERFACE`]. Returns the introspection XML.
pub static DBUS_INTROSPECT_METHOD: &str = "Introspect";

/// The interface used to read and write properties of any other interface.
pub static DBUS_PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// Method of [`DBUS_PROPERTIES_INTERFACE`] with signature `(ss) -> (v)`.
pub static DBUS_GET_PROPERTY_METHOD: &str = "Get";

/// Method of [`DBUS_PROPERTIES_INTERFACE`] with signature `(ssv) -> ()`.
pub static DBUS_SET_PROPERTY_METHOD: &str = "Set";

/// The interface used to check that a peer is alive.
pub static DBUS_PEER_INTERFACE: &str = "org.freedesktop.DBus.Peer";

/// Name of the D-Bus error sent back for local errors that no rule knows about.
pub static DEFAULT_ERROR_NAME: &str = "not.known.Error";

/// The standard interfaces implemented by every object on the bus.
///
/// These are merged into every parsed specification before the remote description, so that
/// a proxy can always reach them even if the remote object omits them from its introspection
/// data. See
/// [https://dbus.freedesktop.org/doc/dbus-specification.html#standard-interfaces](https://dbus.freedesktop.org/doc/dbus-specification.html#standard-interfaces)
pub static STANDARD_INTERFACES_XML: &str = r#"
<node>
    <interface name="org.freedesktop.DBus.Introspectable">
        <method name="Introspect">
            <arg type="s" name="xml_data" direction="out"/>
        </method>
    </interface>
    <interface name="org.freedesktop.DBus.Peer">
        <method name="Ping"/>
        <method name="GetMachineId">
            <arg type="s" name="machine_uuid" direction="out"/>
        </method>
    </interface>
    <interface name="org.freedesktop.DBus.Properties">
        <method name="Get">
            <arg type="s" name="interface_name" direction="in"/>
            <arg type="s" name="property_name" direction="in"/>
            <arg type="v" name="value" direction="out"/>
        </method>
        <method name="GetAll">
            <arg type="s" name="interface_name" direction="in"/>
            <arg type="a{sv}" name="properties" direction="out"/>
        </method>
        <method name="Set">
            <arg type="s" name="interface_name" direction="in"/>
            <arg type="s" name="property_name" direction="in"/>
            <arg type="v" name="value" direction="in"/>
        </method>
        <signal name="PropertiesChanged">
            <arg type="s" name="interface_name"/>
            <arg type="a{sv}" name="changed_properties"/>
            <arg type="as" name="invalidated_properties"/>
        </signal>
    </interface>
</node>
"#;
