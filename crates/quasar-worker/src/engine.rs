use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use dashmap::DashMap;

use quasar_common::attr::get_attr;
use quasar_common::{AttrValue, DeviceName, Error, FunctionDef, ServerDef, Tensor};

/// The opaque "execute operation" capability: given an op name, a target
/// device, attributes and resolved input tensors, produce output tensors
/// or fail. The queue executor consumes this seam; it never looks inside.
#[async_trait]
pub trait OpExecutor: Send + Sync {
    async fn execute(
        &self,
        op: &str,
        device: &DeviceName,
        attrs: &[(String, AttrValue)],
        inputs: Vec<Tensor>,
    ) -> Result<Vec<Tensor>, Error>;
}

/// Reference CPU kernels: Const, Identity, Add, MatMul. Enough for the
/// service's own tests and demos; real deployments plug their own
/// [`OpExecutor`].
#[derive(Debug, Default)]
pub struct CpuExecutor;

#[async_trait]
impl OpExecutor for CpuExecutor {
    async fn execute(
        &self,
        op: &str,
        _device: &DeviceName,
        attrs: &[(String, AttrValue)],
        inputs: Vec<Tensor>,
    ) -> Result<Vec<Tensor>, Error> {
        match op {
            "Const" => {
                let value = get_attr(attrs, "value")
                    .and_then(|v| v.as_tensor())
                    .ok_or_else(|| {
                        Error::InvalidArgument("Const requires a tensor 'value' attr".to_string())
                    })?;
                Ok(vec![value.clone()])
            }
            "Identity" => {
                let [input] = take_inputs::<1>(op, inputs)?;
                Ok(vec![input])
            }
            "Add" => {
                let [a, b] = take_inputs::<2>(op, inputs)?;
                if a.shape != b.shape {
                    return Err(Error::Execution(format!(
                        "Add shape mismatch: {:?} vs {:?}",
                        a.shape, b.shape
                    )));
                }
                let data = a
                    .data
                    .iter()
                    .zip(b.data.iter())
                    .map(|(x, y)| x + y)
                    .collect();
                Ok(vec![Tensor {
                    shape: a.shape,
                    data,
                }])
            }
            "MatMul" => {
                let [a, b] = take_inputs::<2>(op, inputs)?;
                let transpose_a = get_attr(attrs, "transpose_a")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                let transpose_b = get_attr(attrs, "transpose_b")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                Ok(vec![matmul(&a, &b, transpose_a, transpose_b)?])
            }
            other => Err(Error::InvalidArgument(format!("unknown op '{}'", other))),
        }
    }
}

fn take_inputs<const N: usize>(op: &str, inputs: Vec<Tensor>) -> Result<[Tensor; N], Error> {
    let got = inputs.len();
    inputs.try_into().map_err(|_| {
        Error::InvalidArgument(format!("{} expects {} inputs, got {}", op, N, got))
    })
}

fn matmul(a: &Tensor, b: &Tensor, transpose_a: bool, transpose_b: bool) -> Result<Tensor, Error> {
    if a.rank() != 2 || b.rank() != 2 {
        return Err(Error::Execution(format!(
            "MatMul requires rank-2 inputs, got {:?} and {:?}",
            a.shape, b.shape
        )));
    }

    let (m, k_a) = if transpose_a {
        (a.shape[1], a.shape[0])
    } else {
        (a.shape[0], a.shape[1])
    };
    let (k_b, n) = if transpose_b {
        (b.shape[1], b.shape[0])
    } else {
        (b.shape[0], b.shape[1])
    };
    if k_a != k_b {
        return Err(Error::Execution(format!(
            "MatMul inner dimensions do not agree: {:?} x {:?}",
            a.shape, b.shape
        )));
    }

    let a_at = |i: usize, j: usize| {
        if transpose_a {
            a.data[j * a.shape[1] + i]
        } else {
            a.data[i * a.shape[1] + j]
        }
    };
    let b_at = |i: usize, j: usize| {
        if transpose_b {
            b.data[j * b.shape[1] + i]
        } else {
            b.data[i * b.shape[1] + j]
        }
    };

    let mut data = vec![0.0f32; m * n];
    for i in 0..m {
        for j in 0..n {
            let mut acc = 0.0f32;
            for k in 0..k_a {
                acc += a_at(i, k) * b_at(k, j);
            }
            data[i * n + j] = acc;
        }
    }

    Tensor::new(vec![m, n], data)
}

/// Per-context function registry.
///
/// Re-registration policy: registering under an existing name succeeds
/// only when the definition is identical (idempotent retry); a different
/// body under the same name is rejected as AlreadyExists.
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    functions: DashMap<String, FunctionDef>,
}

impl FunctionRegistry {
    pub fn register(&self, def: FunctionDef) -> Result<(), Error> {
        if let Some(existing) = self.functions.get(&def.name) {
            if *existing == def {
                return Ok(());
            }
            return Err(Error::FunctionAlreadyExists(def.name));
        }
        tracing::debug!(function = %def.name, "registered function");
        self.functions.insert(def.name.clone(), def);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<FunctionDef> {
        self.functions.get(name).map(|d| d.clone())
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// The execution environment a server context operates on: the known
/// device set, the per-context function registry and the op execution
/// capability. The service wraps it; it does not reimplement it.
pub struct ExecutionEnv {
    devices: RwLock<Vec<DeviceName>>,
    functions: FunctionRegistry,
    executor: Arc<dyn OpExecutor>,
}

impl ExecutionEnv {
    pub fn new(server_def: &ServerDef, executor: Arc<dyn OpExecutor>) -> Result<Self, Error> {
        let devices = Self::parse_devices(server_def)?;
        Ok(Self {
            devices: RwLock::new(devices),
            functions: FunctionRegistry::default(),
            executor,
        })
    }

    fn parse_devices(server_def: &ServerDef) -> Result<Vec<DeviceName>, Error> {
        if server_def.devices.is_empty() {
            // A worker always owns at least its own CPU device.
            return Ok(vec![DeviceName::cpu(
                &server_def.job_name,
                server_def.task_index,
                0,
            )]);
        }
        server_def.devices.iter().map(|d| d.parse()).collect()
    }

    /// Replace the device set, e.g. after new workers joined the cluster.
    /// Queue state and registered functions are untouched.
    pub fn update_devices(&self, server_def: &ServerDef) -> Result<(), Error> {
        let devices = Self::parse_devices(server_def)?;
        *self.devices.write().unwrap_or_else(|e| e.into_inner()) = devices;
        Ok(())
    }

    pub fn devices(&self) -> Vec<DeviceName> {
        self.devices
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Execute one operation. Registered function names shadow primitive
    /// ops; everything else goes straight to the executor.
    pub async fn run_op(
        &self,
        name: &str,
        device: &DeviceName,
        attrs: &[(String, AttrValue)],
        inputs: Vec<Tensor>,
    ) -> Result<Vec<Tensor>, Error> {
        match self.functions.get(name) {
            Some(def) => self.run_function(&def, device, inputs).await,
            None => self.executor.execute(name, device, attrs, inputs).await,
        }
    }

    /// Interpret a function body node by node. Node inputs name function
    /// arguments or earlier nodes; node ops are primitive ops (nested
    /// function calls are not supported).
    async fn run_function(
        &self,
        def: &FunctionDef,
        device: &DeviceName,
        inputs: Vec<Tensor>,
    ) -> Result<Vec<Tensor>, Error> {
        if inputs.len() != def.args.len() {
            return Err(Error::InvalidArgument(format!(
                "function '{}' expects {} arguments, got {}",
                def.name,
                def.args.len(),
                inputs.len()
            )));
        }

        let mut values: HashMap<&str, Tensor> = def
            .args
            .iter()
            .map(|a| a.as_str())
            .zip(inputs)
            .collect();

        for node in &def.nodes {
            let node_inputs = node
                .inputs
                .iter()
                .map(|name| {
                    values.get(name.as_str()).cloned().ok_or_else(|| {
                        Error::InvalidArgument(format!(
                            "function '{}' node '{}' references unknown input '{}'",
                            def.name, node.name, name
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let mut outputs = self
                .executor
                .execute(&node.op, device, &node.attrs, node_inputs)
                .await?;
            if outputs.len() != 1 {
                return Err(Error::Execution(format!(
                    "function '{}' node '{}' produced {} outputs, expected 1",
                    def.name,
                    node.name,
                    outputs.len()
                )));
            }
            values.insert(node.name.as_str(), outputs.remove(0));
        }

        def.outputs
            .iter()
            .map(|name| {
                values.get(name.as_str()).cloned().ok_or_else(|| {
                    Error::InvalidArgument(format!(
                        "function '{}' output '{}' was never produced",
                        def.name, name
                    ))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu0() -> DeviceName {
        DeviceName::cpu("localhost", 0, 0)
    }

    fn two_by_two() -> Tensor {
        Tensor::matrix(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap()
    }

    #[tokio::test]
    async fn test_const_returns_value_attr() {
        let attrs = vec![("value".to_string(), AttrValue::Tensor(two_by_two()))];
        let out = CpuExecutor
            .execute("Const", &cpu0(), &attrs, vec![])
            .await
            .unwrap();
        assert_eq!(out, vec![two_by_two()]);
    }

    #[tokio::test]
    async fn test_matmul_two_by_two() {
        let out = CpuExecutor
            .execute("MatMul", &cpu0(), &[], vec![two_by_two(), two_by_two()])
            .await
            .unwrap();
        assert_eq!(out[0].data, vec![7.0, 10.0, 15.0, 22.0]);
        assert_eq!(out[0].shape, vec![2, 2]);
    }

    #[tokio::test]
    async fn test_matmul_transpose() {
        let a = Tensor::matrix(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        // a^T x a: (3x2) x (2x3) -> 3x3
        let out = CpuExecutor
            .execute(
                "MatMul",
                &cpu0(),
                &[("transpose_a".to_string(), AttrValue::Bool(true))],
                vec![a.clone(), a],
            )
            .await
            .unwrap();
        assert_eq!(out[0].shape, vec![3, 3]);
        assert_eq!(out[0].at(0, 0), Some(17.0));
    }

    #[tokio::test]
    async fn test_matmul_inner_dim_mismatch() {
        let a = Tensor::matrix(2, 3, vec![0.0; 6]).unwrap();
        let b = Tensor::matrix(2, 2, vec![0.0; 4]).unwrap();
        let err = CpuExecutor
            .execute("MatMul", &cpu0(), &[], vec![a, b])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Execution(_)));
    }

    #[tokio::test]
    async fn test_unknown_op_is_invalid_argument() {
        let err = CpuExecutor
            .execute("Frobnicate", &cpu0(), &[], vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_registry_idempotent_identical_reregistration() {
        let registry = FunctionRegistry::default();
        registry.register(FunctionDef::matmul_function()).unwrap();
        // Identical definition: accepted.
        registry.register(FunctionDef::matmul_function()).unwrap();
        assert_eq!(registry.len(), 1);

        // Same name, different body: rejected.
        let mut other = FunctionDef::matmul_function();
        other.outputs = vec!["other".to_string()];
        let err = registry.register(other).unwrap_err();
        assert!(matches!(err, Error::FunctionAlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_run_function_matmul() {
        let env = ExecutionEnv::new(&ServerDef::default(), Arc::new(CpuExecutor)).unwrap();
        env.functions()
            .register(FunctionDef::matmul_function())
            .unwrap();

        let out = env
            .run_op("MatMulFunction", &cpu0(), &[], vec![two_by_two()])
            .await
            .unwrap();
        assert_eq!(out[0].data, vec![7.0, 10.0, 15.0, 22.0]);
    }

    #[tokio::test]
    async fn test_run_function_arity_mismatch() {
        let env = ExecutionEnv::new(&ServerDef::default(), Arc::new(CpuExecutor)).unwrap();
        env.functions()
            .register(FunctionDef::matmul_function())
            .unwrap();

        let err = env
            .run_op("MatMulFunction", &cpu0(), &[], vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_default_device_from_server_def() {
        let server_def = ServerDef {
            job_name: "worker".to_string(),
            task_index: 2,
            devices: vec![],
        };
        let env = ExecutionEnv::new(&server_def, Arc::new(CpuExecutor)).unwrap();
        assert_eq!(env.devices(), vec![DeviceName::cpu("worker", 2, 0)]);
    }
}
