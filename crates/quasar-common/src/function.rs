use serde::{Deserialize, Serialize};

use crate::attr::AttrValue;

/// One node in a function body. Inputs name either a function argument or
/// an earlier node in the body (single output per node).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionNode {
    pub name: String,
    pub op: String,
    pub inputs: Vec<String>,
    #[serde(default)]
    pub attrs: Vec<(String, AttrValue)>,
}

/// A named function definition, registered once per context and invoked
/// by name like any other operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub args: Vec<String>,
    pub nodes: Vec<FunctionNode>,
    /// Names of the nodes (or args) whose values are the function outputs.
    pub outputs: Vec<String>,
}

impl FunctionDef {
    /// `MatMulFunction(a) -> a x a`, the canonical single-node function
    /// used in tests and demos.
    pub fn matmul_function() -> Self {
        Self {
            name: "MatMulFunction".to_string(),
            args: vec!["a".to_string()],
            nodes: vec![FunctionNode {
                name: "matmul".to_string(),
                op: "MatMul".to_string(),
                inputs: vec!["a".to_string(), "a".to_string()],
                attrs: vec![
                    ("transpose_a".to_string(), AttrValue::Bool(false)),
                    ("transpose_b".to_string(), AttrValue::Bool(false)),
                ],
            }],
            outputs: vec!["matmul".to_string()],
        }
    }
}
