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

//! Helpers that connect dynamic [`Value`]s with introspected type signatures.
//!
//! The type system itself is `zvariant`'s. This module only checks values against signature
//! strings and performs the two conversions a caller would otherwise have to do by hand.

use zbus::zvariant::{ObjectPath, Signature, Value};

/// Signature string of a value, e.g. `"ad"` or `"(ib)"`.
pub fn signature_of(value: &Value<'_>) -> String {
    value.value_signature().to_string()
}

/// Check that `signature` is a single complete D-Bus type.
///
/// # Returns: `Result<(), String>`
/// * `Ok(())` - the signature is valid
/// * `Err(String)` - reason why it is not
pub fn validate_signature(signature: &str) -> Result<(), String> {
    if signature.is_empty() {
        return Err("the type is empty".to_string());
    }
    Signature::try_from(signature).map_err(|e| e.to_string())?;
    if !single_complete_type(signature) {
        return Err("expected a single complete type".to_string());
    }
    Ok(())
}

/// Join single types into a tuple signature. Returns `None` for an empty list.
///
/// # Examples
///
/// ```
/// use dynbus::typing::tuple_signature;
/// assert_eq!(tuple_signature(&["ad".to_string(), "o".to_string()]), Some("(ado)".to_string()));
/// assert_eq!(tuple_signature(&[]), None);
/// ```
pub fn tuple_signature(types: &[String]) -> Option<String> {
    if types.is_empty() {
        return None;
    }
    Some(format!("({})", types.concat()))
}

/// Is the signature exactly one struct type, e.g. `"(ii)"` but not `"(i)(s)"` or `"ii"`?
pub fn is_single_structure(signature: &str) -> bool {
    signature.starts_with('(') && single_complete_type(signature)
}

fn single_complete_type(signature: &str) -> bool {
    complete_type_len(signature.as_bytes()) == Some(signature.len())
}

// Length of the first complete type in `signature`.
fn complete_type_len(signature: &[u8]) -> Option<usize> {
    match signature.first()? {
        b'a' => complete_type_len(&signature[1..]).map(|len| len + 1),
        open @ (b'(' | b'{') => {
            let close = if *open == b'(' { b')' } else { b'}' };
            let mut pos = 1;
            while *signature.get(pos)? != close {
                pos += complete_type_len(&signature[pos..])?;
            }
            Some(pos + 1)
        }
        b')' | b'}' => None,
        _ => Some(1),
    }
}

/// Convert an argument into the declared type, or explain why it can't be.
///
/// Two conversions are applied on top of an exact signature match:
/// * a string where an object path (`o`) is declared becomes an object path
/// * any value where a variant (`v`) is declared is boxed into a variant
pub fn coerce_value(value: Value<'static>, declared: &str) -> Result<Value<'static>, String> {
    match (declared, value) {
        ("v", value @ Value::Value(_)) => Ok(value),
        ("v", value) => Ok(Value::Value(Box::new(value))),
        ("o", Value::Str(path)) => ObjectPath::try_from(path.as_str().to_owned())
            .map(Value::ObjectPath)
            .map_err(|e| format!("{:?} is not a valid object path: {e}", path.as_str())),
        (_, value) => {
            let actual = signature_of(&value);
            if actual == declared {
                Ok(value)
            } else {
                Err(format!("expected a value of type '{declared}', got '{actual}'"))
            }
        }
    }
}

/// Remove exactly one level of variant boxing. Other values are returned unchanged.
pub fn unwrap_variant(value: Value<'static>) -> Value<'static> {
    match value {
        Value::Value(inner) => *inner,
        other => other,
    }
}

/// Check the top-level fields of a reply or signal body against the declared output types.
pub fn check_fields(fields: &[Value<'static>], declared: &[String]) -> Result<(), String> {
    if fields.len() != declared.len() {
        return Err(format!(
            "expected {} value(s) of type {:?}, got {} value(s) of type {:?}",
            declared.len(),
            declared.concat(),
            fields.len(),
            fields.iter().map(signature_of).collect::<String>()
        ));
    }
    for (index, (field, expected)) in fields.iter().zip(declared).enumerate() {
        let actual = signature_of(field);
        if &actual != expected {
            return Err(format!(
                "value {index} has type '{actual}', expected '{expected}'"
            ));
        }
    }
    Ok(())
}
