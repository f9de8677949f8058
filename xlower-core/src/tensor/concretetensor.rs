use std::sync::Arc;

use crate::{cpu_storage::CpuStorage, DType, ElemType, Error, Result};

/// Tensors are n dimensional arrays of concrete data, used to feed graph
/// parameters and to read back results.
#[derive(Clone, Debug)]
pub struct Tensor {
    dims: Vec<usize>,
    storage: Arc<CpuStorage>,
}

impl Tensor {
    pub(crate) fn from_storage(dims: Vec<usize>, storage: CpuStorage) -> Self {
        Self {
            dims,
            storage: Arc::new(storage),
        }
    }

    /// Create a tensor from row-major `data`.
    pub fn new<T: DType>(data: &[T], dims: &[usize]) -> Result<Self> {
        let numel: usize = dims.iter().product();
        if numel != data.len() {
            crate::bail!(
                "{} values cannot fill a tensor of dims {dims:?} ({numel} elements)",
                data.len()
            );
        }
        let values = data.iter().map(|x| T::ELEM.round(x.to_scalar()));
        Ok(Self::from_storage(
            dims.to_vec(),
            CpuStorage::from_scalars(T::ELEM, values),
        ))
    }

    pub fn scalar<T: DType>(v: T) -> Self {
        Self::full(v, &[])
    }

    /// A tensor of the given dims filled with `v`.
    pub fn full<T: DType>(v: T, dims: &[usize]) -> Self {
        let numel: usize = dims.iter().product();
        let value = T::ELEM.round(v.to_scalar());
        Self::from_storage(
            dims.to_vec(),
            CpuStorage::from_scalars(T::ELEM, (0..numel).map(|_| value)),
        )
    }

    pub fn zeros<T: DType>(dims: &[usize]) -> Self {
        Self::full(T::ZERO, dims)
    }

    pub fn ones<T: DType>(dims: &[usize]) -> Self {
        Self::full(T::ONE, dims)
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn elem(&self) -> ElemType {
        self.storage.elem
    }

    pub fn element_count(&self) -> usize {
        self.storage.len()
    }

    pub(crate) fn storage(&self) -> &CpuStorage {
        &self.storage
    }

    /// Get the row-major data. `T` must match the element type.
    pub fn to_vec<T: DType>(&self) -> Result<Vec<T>> {
        if T::ELEM != self.elem() {
            return Err(Error::ElemMismatch {
                expected: T::ELEM,
                got: self.elem(),
            });
        }
        Ok(self.storage.iter().map(T::from_scalar).collect())
    }

    /// Get the value of a single-element tensor.
    pub fn to_scalar<T: DType>(&self) -> Result<T> {
        if self.element_count() != 1 {
            crate::bail!("tensor of dims {:?} is not a scalar", self.dims);
        }
        Ok(self.to_vec::<T>()?[0])
    }

    /// Cast this tensor to a different element type on the host.
    pub fn cast(&self, elem: ElemType) -> Tensor {
        let data = self.storage.iter().map(|x| elem.round(x));
        Self::from_storage(self.dims.clone(), CpuStorage::from_scalars(elem, data))
    }
}
