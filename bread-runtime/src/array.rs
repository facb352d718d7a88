//! `BreadArray` — the runtime array object, accessed through the
//! `bread_array_*` ABI and realized with a plain growable `Vec` instead of
//! manual capacity management.

use crate::error::{RuntimeError, RuntimeResult};
use crate::value::BreadValue;

#[derive(Debug)]
pub struct BreadArray {
    items: Vec<BreadValue>,
}

impl BreadArray {
    pub fn new() -> Self {
        BreadArray { items: Vec::new() }
    }

    pub fn with_capacity(cap: usize) -> Self {
        BreadArray { items: Vec::with_capacity(cap) }
    }

    pub fn from_vec(items: Vec<BreadValue>) -> Self {
        BreadArray { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn append(&mut self, v: BreadValue) {
        self.items.push(v);
    }

    /// Resolves a possibly-negative index (`-1` means last element), per
    /// `bread_array_negative_index` in the original runtime.
    fn resolve_index(&self, index: i64) -> Option<usize> {
        let len = self.items.len() as i64;
        let resolved = if index < 0 { index + len } else { index };
        if resolved >= 0 && resolved < len {
            Some(resolved as usize)
        } else {
            None
        }
    }

    pub fn get(&self, index: i64) -> RuntimeResult<BreadValue> {
        self.resolve_index(index)
            .map(|i| self.items[i])
            .ok_or(RuntimeError::Bounds { index, len: self.items.len() })
    }

    pub fn set(&mut self, index: i64, value: BreadValue) -> RuntimeResult<()> {
        let i = self
            .resolve_index(index)
            .ok_or(RuntimeError::Bounds { index, len: self.items.len() })?;
        let old = std::mem::replace(&mut self.items[i], value);
        unsafe { old.release() };
        Ok(())
    }

    pub fn contains(&self, v: BreadValue, eq: impl Fn(BreadValue, BreadValue) -> bool) -> bool {
        self.items.iter().any(|&item| eq(item, v))
    }

    pub fn iter(&self) -> impl Iterator<Item = BreadValue> + '_ {
        self.items.iter().copied()
    }
}

impl Default for BreadArray {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BreadArray {
    fn drop(&mut self) {
        for v in self.items.drain(..) {
            unsafe { v.release() };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_index_resolves_from_end() {
        let mut a = BreadArray::new();
        a.append(BreadValue::int(10));
        a.append(BreadValue::int(20));
        a.append(BreadValue::int(30));
        assert_eq!(a.get(-1).unwrap().try_as_int(), Some(30));
        assert_eq!(a.get(-3).unwrap().try_as_int(), Some(10));
        assert!(a.get(-4).is_err());
        assert!(a.get(3).is_err());
    }

    #[test]
    fn set_releases_previous_value() {
        let mut a = BreadArray::new();
        a.append(BreadValue::string("old"));
        a.set(0, BreadValue::string("new")).unwrap();
        assert_eq!(a.len(), 1);
    }
}
