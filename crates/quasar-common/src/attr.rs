use serde::{Deserialize, Serialize};

use crate::tensor::Tensor;

/// Tagged operation attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f32),
    Str(String),
    /// Element type name, e.g. "float32". Carried for wire fidelity;
    /// the reference kernels are f32-only.
    Type(String),
    Tensor(Tensor),
}

impl AttrValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            AttrValue::Tensor(t) => Some(t),
            _ => None,
        }
    }
}

/// Look up an attribute by key in an ordered attribute list.
pub fn get_attr<'a>(attrs: &'a [(String, AttrValue)], key: &str) -> Option<&'a AttrValue> {
    attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_attr() {
        let attrs = vec![
            ("transpose_a".to_string(), AttrValue::Bool(false)),
            ("T".to_string(), AttrValue::Type("float32".to_string())),
        ];
        assert_eq!(
            get_attr(&attrs, "transpose_a").and_then(|v| v.as_bool()),
            Some(false)
        );
        assert!(get_attr(&attrs, "missing").is_none());
    }
}
