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

//! Typed description of a remote object, built from its introspection data.
//!
//! A [`Specification`] is an ordered table of [`Member`]s keyed by (interface name, member
//! name). It is built once, when the introspection XML is parsed, and then only read: proxies
//! resolve attribute names against it at call time.
//!
//! # Introspection format
//!
//! The consumed schema is the standard D-Bus one:
//!
//! ```xml
//! <node>
//!     <interface name="org.example.Interface">
//!         <method name="Method">
//!             <arg direction="in" name="x" type="ad"/>
//!             <arg direction="out" name="y" type="(ib)"/>
//!         </method>
//!         <property name="Property" type="i" access="readwrite"/>
//!         <signal name="Signal">
//!             <arg name="x" type="s"/>
//!         </signal>
//!     </interface>
//! </node>
//! ```
//!
//! Elements this crate has no use for (`annotation`, nested `node`, documentation elements)
//! are skipped together with their content.

use crate::config;
use crate::error::{FormatError, MemberKind};
use crate::typing::{tuple_signature, validate_signature};
use log::trace;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;

/// Access mode of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PropertyAccess {
    #[default]
    Read,
    Write,
    ReadWrite,
}

impl PropertyAccess {
    pub fn readable(&self) -> bool {
        matches!(self, PropertyAccess::Read | PropertyAccess::ReadWrite)
    }

    pub fn writable(&self) -> bool {
        matches!(self, PropertyAccess::Write | PropertyAccess::ReadWrite)
    }
}

impl TryFrom<&str> for PropertyAccess {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "read" => Ok(PropertyAccess::Read),
            "write" => Ok(PropertyAccess::Write),
            "readwrite" => Ok(PropertyAccess::ReadWrite),
            other => Err(other.to_string()),
        }
    }
}

/// A method: ordered input and output argument types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSpec {
    pub name: String,
    pub interface_name: String,
    pub in_args: Vec<String>,
    pub out_args: Vec<String>,
}

impl MethodSpec {
    /// Signature of the input aggregate, e.g. `"(ado)"`, or `None` without inputs.
    pub fn in_type(&self) -> Option<String> {
        tuple_signature(&self.in_args)
    }

    /// Signature of the expected reply, e.g. `"(i)"`, or `None` without outputs.
    pub fn out_type(&self) -> Option<String> {
        tuple_signature(&self.out_args)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySpec {
    pub name: String,
    pub interface_name: String,
    pub type_signature: String,
    pub access: PropertyAccess,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalSpec {
    pub name: String,
    pub interface_name: String,
    pub out_args: Vec<String>,
}

impl SignalSpec {
    pub fn out_type(&self) -> Option<String> {
        tuple_signature(&self.out_args)
    }
}

/// One named capability of one interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Member {
    Method(MethodSpec),
    Property(PropertySpec),
    Signal(SignalSpec),
}

impl Member {
    pub fn name(&self) -> &str {
        match self {
            Member::Method(method) => &method.name,
            Member::Property(property) => &property.name,
            Member::Signal(signal) => &signal.name,
        }
    }

    pub fn interface_name(&self) -> &str {
        match self {
            Member::Method(method) => &method.interface_name,
            Member::Property(property) => &property.interface_name,
            Member::Signal(signal) => &signal.interface_name,
        }
    }

    pub fn kind(&self) -> MemberKind {
        match self {
            Member::Method(_) => MemberKind::Method,
            Member::Property(_) => MemberKind::Property,
            Member::Signal(_) => MemberKind::Signal,
        }
    }
}

/// The members of a remote object, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Specification {
    members: Vec<Member>,
    index: HashMap<(String, String), usize>,
}

impl Specification {
    /// Parse introspection XML.
    ///
    /// The standard interfaces (`Introspectable`, `Peer`, `Properties`) are always part of the
    /// result. If the XML describes one of their members again, its description wins.
    ///
    /// # Arguments
    ///
    /// * `xml`: the introspection data of one object
    ///
    /// # Returns: `Result<Specification, FormatError>`
    /// * `Ok(Specification)` - every interface member found in the root `<node>`
    /// * `Err(FormatError)` - malformed XML, missing root node, missing or invalid attributes
    ///
    /// # Examples
    ///
    /// ```
    /// use dynbus::specification::Specification;
    /// let spec = Specification::from_xml(r#"
    ///     <node>
    ///         <interface name="org.example.Interface">
    ///             <method name="Ping"/>
    ///         </interface>
    ///     </node>
    /// "#)?;
    /// assert!(spec.get("org.example.Interface", "Ping").is_some());
    /// # Ok::<(), dynbus::error::FormatError>(())
    /// ```
    pub fn from_xml(xml: &str) -> Result<Specification, FormatError> {
        let mut specification = Specification::default();
        parse_xml(&mut specification, config::STANDARD_INTERFACES_XML)?;
        parse_xml(&mut specification, xml)?;
        trace!(
            "Parsed a specification with {} members",
            specification.members.len()
        );
        Ok(specification)
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// Look up a member by its interface and name.
    pub fn get(&self, interface_name: &str, member_name: &str) -> Option<&Member> {
        self.index
            .get(&(interface_name.to_string(), member_name.to_string()))
            .map(|position| &self.members[*position])
    }

    /// All members called `member_name`, in any interface.
    pub fn find<'a>(&'a self, member_name: &'a str) -> impl Iterator<Item = &'a Member> + 'a {
        self.members
            .iter()
            .filter(move |member| member.name() == member_name)
    }

    /// Names of the interfaces with at least one member, in declaration order.
    pub fn interfaces(&self) -> Vec<&str> {
        let mut interfaces: Vec<&str> = Vec::new();
        for member in &self.members {
            if !interfaces.contains(&member.interface_name()) {
                interfaces.push(member.interface_name());
            }
        }
        interfaces
    }

    /// Add a member, replacing an existing one with the same interface and name in place.
    pub fn add_member(&mut self, member: Member) {
        let key = (
            member.interface_name().to_string(),
            member.name().to_string(),
        );
        match self.index.get(&key) {
            Some(position) => self.members[*position] = member,
            None => {
                self.index.insert(key, self.members.len());
                self.members.push(member);
            }
        }
    }
}

type XmlReader<'x> = Reader<&'x [u8]>;

fn xml_error(error: impl std::fmt::Display) -> FormatError {
    FormatError::Xml(error.to_string())
}

fn parse_xml(specification: &mut Specification, xml: &str) -> Result<(), FormatError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut found_root = false;
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(element) if element.name().as_ref() == b"node" && !found_root => {
                found_root = true;
                parse_node(&mut reader, specification)?;
            }
            Event::Empty(element) if element.name().as_ref() == b"node" && !found_root => {
                found_root = true;
            }
            Event::Start(element) => skip_element(&mut reader, &element)?,
            Event::Eof => break,
            _ => {}
        }
    }
    if !found_root {
        return Err(FormatError::NoRootNode);
    }
    Ok(())
}

fn parse_node(reader: &mut XmlReader<'_>, specification: &mut Specification) -> Result<(), FormatError> {
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(element) if element.name().as_ref() == b"interface" => {
                let name = required_attribute(&element, "name")?;
                parse_interface(reader, specification, &name)?;
            }
            Event::Empty(element) if element.name().as_ref() == b"interface" => {
                required_attribute(&element, "name")?;
            }
            Event::Start(element) => skip_element(reader, &element)?,
            Event::End(_) => return Ok(()),
            Event::Eof => return Err(FormatError::UnexpectedEof("node".to_string())),
            _ => {}
        }
    }
}

fn parse_interface(
    reader: &mut XmlReader<'_>,
    specification: &mut Specification,
    interface_name: &str,
) -> Result<(), FormatError> {
    loop {
        let (element, has_content) = match reader.read_event().map_err(xml_error)? {
            Event::Start(element) => (element, true),
            Event::Empty(element) => (element, false),
            Event::End(_) => return Ok(()),
            Event::Eof => return Err(FormatError::UnexpectedEof("interface".to_string())),
            _ => continue,
        };
        let member = match element.name().as_ref() {
            b"method" => {
                let name = required_attribute(&element, "name")?;
                let args = match has_content {
                    true => parse_args(reader, "method")?,
                    false => Vec::new(),
                };
                let mut in_args = Vec::new();
                let mut out_args = Vec::new();
                for (direction, type_signature) in args {
                    match direction {
                        ArgDirection::In => in_args.push(type_signature),
                        ArgDirection::Out => out_args.push(type_signature),
                    }
                }
                Member::Method(MethodSpec {
                    name,
                    interface_name: interface_name.to_string(),
                    in_args,
                    out_args,
                })
            }
            b"signal" => {
                let name = required_attribute(&element, "name")?;
                let args = match has_content {
                    true => parse_args(reader, "signal")?,
                    false => Vec::new(),
                };
                Member::Signal(SignalSpec {
                    name,
                    interface_name: interface_name.to_string(),
                    out_args: args.into_iter().map(|(_, ty)| ty).collect(),
                })
            }
            b"property" => {
                let name = required_attribute(&element, "name")?;
                let type_signature = required_attribute(&element, "type")?;
                checked_signature("property", &type_signature)?;
                let access = match optional_attribute(&element, "access")? {
                    None => PropertyAccess::default(),
                    Some(value) => PropertyAccess::try_from(value.as_str()).map_err(|value| {
                        FormatError::InvalidValue {
                            element: "property".to_string(),
                            attribute: "access",
                            value,
                        }
                    })?,
                };
                if has_content {
                    skip_element(reader, &element)?;
                }
                Member::Property(PropertySpec {
                    name,
                    interface_name: interface_name.to_string(),
                    type_signature,
                    access,
                })
            }
            _ => {
                if has_content {
                    skip_element(reader, &element)?;
                }
                continue;
            }
        };
        specification.add_member(member);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArgDirection {
    In,
    Out,
}

/// Read the `<arg>` children of a method or signal up to its end tag.
///
/// Signal arguments are always outputs. Method arguments default to inputs.
fn parse_args(
    reader: &mut XmlReader<'_>,
    parent: &str,
) -> Result<Vec<(ArgDirection, String)>, FormatError> {
    let mut args = Vec::new();
    loop {
        let (element, has_content) = match reader.read_event().map_err(xml_error)? {
            Event::Start(element) => (element, true),
            Event::Empty(element) => (element, false),
            Event::End(_) => return Ok(args),
            Event::Eof => return Err(FormatError::UnexpectedEof(parent.to_string())),
            _ => continue,
        };
        if element.name().as_ref() == b"arg" {
            let type_signature = required_attribute(&element, "type")?;
            checked_signature("arg", &type_signature)?;
            let direction = match (parent, optional_attribute(&element, "direction")?.as_deref()) {
                ("signal", _) => ArgDirection::Out,
                (_, None | Some("in")) => ArgDirection::In,
                (_, Some("out")) => ArgDirection::Out,
                (_, Some(value)) => {
                    return Err(FormatError::InvalidValue {
                        element: "arg".to_string(),
                        attribute: "direction",
                        value: value.to_string(),
                    });
                }
            };
            args.push((direction, type_signature));
        }
        if has_content {
            skip_element(reader, &element)?;
        }
    }
}

fn checked_signature(element: &str, signature: &str) -> Result<(), FormatError> {
    validate_signature(signature).map_err(|reason| FormatError::InvalidSignature {
        element: element.to_string(),
        signature: signature.to_string(),
        reason,
    })
}

fn skip_element(reader: &mut XmlReader<'_>, element: &BytesStart<'_>) -> Result<(), FormatError> {
    trace!(
        "Skipping <{}> in introspection data",
        String::from_utf8_lossy(element.name().as_ref())
    );
    reader.read_to_end(element.name()).map_err(xml_error)?;
    Ok(())
}

fn optional_attribute(
    element: &BytesStart<'_>,
    attribute: &'static str,
) -> Result<Option<String>, FormatError> {
    for entry in element.attributes() {
        let entry = entry.map_err(xml_error)?;
        if entry.key.as_ref() == attribute.as_bytes() {
            let value = entry.unescape_value().map_err(xml_error)?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn required_attribute(
    element: &BytesStart<'_>,
    attribute: &'static str,
) -> Result<String, FormatError> {
    match optional_attribute(element, attribute)? {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(FormatError::MissingAttribute {
            element: String::from_utf8_lossy(element.name().as_ref()).into_owned(),
            attribute,
        }),
    }
}
