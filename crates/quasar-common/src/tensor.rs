use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Dense row-major f32 tensor. This is the value type the worker
/// materializes into its handle store and hands between operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl Tensor {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, Error> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(Error::InvalidArgument(format!(
                "tensor shape {:?} expects {} elements, got {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    pub fn scalar(value: f32) -> Self {
        Self {
            shape: vec![],
            data: vec![value],
        }
    }

    /// 2-D constructor used throughout tests and demos.
    pub fn matrix(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self, Error> {
        Self::new(vec![rows, cols], data)
    }

    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![0.0; len],
        }
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn num_elements(&self) -> usize {
        self.data.len()
    }

    /// Element access for rank-2 tensors.
    pub fn at(&self, row: usize, col: usize) -> Option<f32> {
        if self.rank() != 2 {
            return None;
        }
        let cols = self.shape[1];
        if row >= self.shape[0] || col >= cols {
            return None;
        }
        Some(self.data[row * cols + col])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validates_shape() {
        assert!(Tensor::new(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).is_ok());
        assert!(Tensor::new(vec![2, 2], vec![1.0]).is_err());
    }

    #[test]
    fn test_matrix_access() {
        let t = Tensor::matrix(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(t.at(0, 0), Some(1.0));
        assert_eq!(t.at(1, 1), Some(4.0));
        assert_eq!(t.at(2, 0), None);
    }

    #[test]
    fn test_scalar_rank() {
        let t = Tensor::scalar(3.5);
        assert_eq!(t.rank(), 0);
        assert_eq!(t.num_elements(), 1);
    }
}
