//! Argument shape checks for ops called from script code.

use crate::codec::{self, ByteView};
use crate::error::{KvError, KvResult};
use crate::handles::HandleId;
use otter_host::HostValue;
use serde::de::DeserializeOwned;

/// Positional arguments of one op call
pub struct Args<'a> {
    values: &'a [HostValue],
}

impl<'a> Args<'a> {
    pub fn new(values: &'a [HostValue]) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Argument `index`, if passed. An explicit `undefined` counts as absent.
    pub fn get(&self, index: usize) -> Option<&'a HostValue> {
        self.values.get(index).filter(|v| !v.is_undefined())
    }

    pub fn required(&self, index: usize, what: &str) -> KvResult<&'a HostValue> {
        self.get(index).ok_or_else(|| {
            KvError::invalid_argument(format!(
                "{what} (argument {}) is required, got {} arguments",
                index + 1,
                self.values.len()
            ))
        })
    }

    pub fn handle(&self, index: usize, what: &str) -> KvResult<HandleId> {
        let value = self.required(index, what)?;
        value.as_u64().map(HandleId::from_raw).ok_or_else(|| {
            KvError::invalid_argument(format!(
                "{what} must be a handle, got {}",
                value.type_name()
            ))
        })
    }

    pub fn bytes(&self, index: usize, what: &str) -> KvResult<ByteView> {
        codec::decode(self.required(index, what)?, what)
    }

    pub fn string(&self, index: usize, what: &str) -> KvResult<&'a str> {
        let value = self.required(index, what)?;
        value.as_str().ok_or_else(|| {
            KvError::invalid_argument(format!(
                "{what} must be a string, got {}",
                value.type_name()
            ))
        })
    }

    pub fn bool_or(&self, index: usize, what: &str, default: bool) -> KvResult<bool> {
        match self.get(index) {
            None | Some(HostValue::Null) => Ok(default),
            Some(value) => value.as_bool().ok_or_else(|| {
                KvError::invalid_argument(format!(
                    "{what} must be a boolean, got {}",
                    value.type_name()
                ))
            }),
        }
    }

    /// Deserialize an optional options object. Missing or null gives the
    /// default options.
    pub fn options<T>(&self, index: usize, what: &str) -> KvResult<T>
    where
        T: DeserializeOwned + Default,
    {
        match self.get(index) {
            None | Some(HostValue::Null) => Ok(T::default()),
            Some(HostValue::Object(map)) => {
                // Fields set to undefined are treated as not passed
                let fields: serde_json::Map<String, serde_json::Value> = map
                    .iter()
                    .filter(|(_, v)| !v.is_undefined())
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect();
                serde_json::from_value(serde_json::Value::Object(fields))
                    .map_err(|e| KvError::invalid_argument(format!("{what}: {e}")))
            }
            Some(value) => Err(KvError::invalid_argument(format!(
                "{what} must be an object, got {}",
                value.type_name()
            ))),
        }
    }
}
