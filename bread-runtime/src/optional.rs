//! `BreadOptional` — a presence flag paired with a value, for `T?` types.

use crate::value::BreadValue;

#[derive(Debug)]
pub struct BreadOptional {
    value: Option<BreadValue>,
}

impl BreadOptional {
    pub fn some(v: BreadValue) -> Self {
        BreadOptional { value: Some(v) }
    }

    pub fn none() -> Self {
        BreadOptional { value: None }
    }

    pub fn is_some(&self) -> bool {
        self.value.is_some()
    }

    pub fn get(&self) -> Option<BreadValue> {
        self.value
    }
}

impl Drop for BreadOptional {
    fn drop(&mut self) {
        if let Some(v) = self.value.take() {
            unsafe { v.release() };
        }
    }
}
