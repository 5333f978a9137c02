//! Typed accessors over [`serde_json::Value`] for the JSON ingest path.
//! Every mismatch surfaces as [`AinbError::DictDecode`].

use anyhow::Result;
use serde_json::Value;

use crate::error::AinbError;

fn missing(key: &str) -> AinbError {
    AinbError::DictDecode(format!("Missing key: {key:?}"))
}

fn mismatch(key: &str, expected: &str) -> AinbError {
    AinbError::DictDecode(format!("Key {key:?} is not {expected}"))
}

pub(crate) fn get<'a>(data: &'a Value, key: &str) -> Result<&'a Value> {
    data.get(key).ok_or_else(|| missing(key).into())
}

pub(crate) fn get_str(data: &Value, key: &str) -> Result<String> {
    get(data, key)?
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| mismatch(key, "a string").into())
}

pub(crate) fn get_bool(data: &Value, key: &str) -> Result<bool> {
    get(data, key)?
        .as_bool()
        .ok_or_else(|| mismatch(key, "a bool").into())
}

pub(crate) fn get_u32(data: &Value, key: &str) -> Result<u32> {
    get(data, key)?
        .as_u64()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| mismatch(key, "a u32").into())
}

pub(crate) fn get_u16(data: &Value, key: &str) -> Result<u16> {
    get(data, key)?
        .as_u64()
        .and_then(|v| u16::try_from(v).ok())
        .ok_or_else(|| mismatch(key, "a u16").into())
}

pub(crate) fn get_i32(data: &Value, key: &str) -> Result<i32> {
    get(data, key)?
        .as_i64()
        .and_then(|v| i32::try_from(v).ok())
        .ok_or_else(|| mismatch(key, "an i32").into())
}

pub(crate) fn get_i16(data: &Value, key: &str) -> Result<i16> {
    get(data, key)?
        .as_i64()
        .and_then(|v| i16::try_from(v).ok())
        .ok_or_else(|| mismatch(key, "an i16").into())
}

pub(crate) fn get_f32(data: &Value, key: &str) -> Result<f32> {
    get(data, key)?
        .as_f64()
        .map(|v| v as f32)
        .ok_or_else(|| mismatch(key, "a number").into())
}

pub(crate) fn get_array<'a>(
    data: &'a Value,
    key: &str,
) -> Result<&'a Vec<Value>> {
    get(data, key)?
        .as_array()
        .ok_or_else(|| mismatch(key, "an array").into())
}

pub(crate) fn as_array(data: &Value) -> Result<&Vec<Value>> {
    data.as_array().ok_or_else(|| {
        AinbError::DictDecode("Expected an array".to_owned()).into()
    })
}

pub(crate) fn as_object(
    data: &Value,
) -> Result<&serde_json::Map<String, Value>> {
    data.as_object().ok_or_else(|| {
        AinbError::DictDecode("Expected an object".to_owned()).into()
    })
}
