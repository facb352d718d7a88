//! `BreadStruct` — a named, fixed field-set runtime object built from a
//! struct-literal expression and accessed through the `bread_struct_*` ABI.

use crate::error::{RuntimeError, RuntimeResult};
use crate::value::BreadValue;

#[derive(Debug)]
pub struct BreadStruct {
    pub type_name: String,
    fields: Vec<(String, BreadValue)>,
}

impl BreadStruct {
    pub fn new(type_name: impl Into<String>, fields: Vec<(String, BreadValue)>) -> Self {
        BreadStruct { type_name: type_name.into(), fields }
    }

    fn find_field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|(n, _)| n == name)
    }

    pub fn get_field(&self, name: &str) -> RuntimeResult<BreadValue> {
        self.find_field_index(name)
            .map(|i| self.fields[i].1)
            .ok_or_else(|| RuntimeError::NoSuchField(name.to_string()))
    }

    pub fn set_field(&mut self, name: &str, value: BreadValue) -> RuntimeResult<()> {
        let i = self
            .find_field_index(name)
            .ok_or_else(|| RuntimeError::NoSuchField(name.to_string()))?;
        let old = std::mem::replace(&mut self.fields[i].1, value);
        unsafe { old.release() };
        Ok(())
    }
}

impl Drop for BreadStruct {
    fn drop(&mut self) {
        for (_, v) in self.fields.drain(..) {
            unsafe { v.release() };
        }
    }
}
