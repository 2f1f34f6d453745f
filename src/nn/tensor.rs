//! Tensor API.
//!
//! Tensors are the inputs and outputs of neural networks: N-dimensional arrays of `f32`s, stored
//! in row-major order.

use std::fmt;

use tinyvec::TinyVec;

use crate::iter::zip_exact;

/// Shape and row-major strides of a tensor.
#[derive(Clone)]
struct Layout {
    shape: TinyVec<[usize; 4]>,
    strides: TinyVec<[usize; 4]>,
}

impl Layout {
    fn from_shape(shape: &[usize]) -> Self {
        let mut strides: TinyVec<[usize; 4]> = shape.iter().map(|_| 0).collect();
        let mut stride = 1;
        for (out, &size) in zip_exact(strides.iter_mut().rev(), shape.iter().rev()) {
            *out = stride;
            stride *= size;
        }

        Self {
            shape: shape.iter().copied().collect(),
            strides,
        }
    }

    fn elements(&self) -> usize {
        self.shape.iter().product()
    }

    /// Drops the `num` outermost dimensions.
    fn remove_prefix(&self, num: usize) -> Layout {
        assert!(num <= self.shape.len());

        Layout {
            shape: self.shape[num..].iter().copied().collect(),
            strides: self.strides[num..].iter().copied().collect(),
        }
    }
}

impl fmt::Debug for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.shape).finish()
    }
}

/// A dynamically shaped tensor of `f32` values.
///
/// Tensors are created from a shape and a function or iterator producing their elements. Data is
/// read back by indexing a prefix of the dimensions with [`Tensor::index`], which yields a
/// [`TensorView`]. One-dimensional tensors and views expose their data as a slice via `as_slice`,
/// zero-dimensional ones expose their single value via `as_singular`.
#[derive(Clone)]
pub struct Tensor {
    layout: Layout,
    data: Box<[f32]>,
}

/// A borrowed view into a [`Tensor`].
#[derive(Clone)]
pub struct TensorView<'a> {
    layout: Layout,
    data: &'a [f32],
}

impl Tensor {
    /// Creates an `N`-dimensional tensor of the given shape by calling `f` for each element.
    ///
    /// `f` is called with the indices of each element in row-major order, starting with
    /// `[0, ..., 0, 0]`, then `[0, ..., 0, 1]` and so on.
    pub fn from_array_shape_fn<const N: usize, F: FnMut([usize; N]) -> f32>(
        shape: [usize; N],
        mut f: F,
    ) -> Self {
        let layout = Layout::from_shape(&shape);
        let data = (0..layout.elements())
            .map(|flat| {
                let mut index = [0; N];
                for (i, (&size, &stride)) in index
                    .iter_mut()
                    .zip(layout.shape.iter().zip(&layout.strides))
                {
                    *i = flat / stride % size;
                }
                f(index)
            })
            .collect();

        Self { layout, data }
    }

    /// Creates a tensor of the given shape by pulling elements from an iterator.
    ///
    /// # Panics
    ///
    /// `iter` must yield exactly as many elements as `shape` describes, otherwise this method will
    /// panic.
    pub fn from_iter<I: IntoIterator<Item = f32>>(shape: &[usize], iter: I) -> Self {
        let layout = Layout::from_shape(shape);
        let data: Box<_> = iter.into_iter().collect();
        assert_eq!(
            data.len(),
            layout.elements(),
            "element count does not match tensor shape {:?}",
            shape,
        );
        Self { layout, data }
    }

    pub(super) fn from_tract(tract: &tract_onnx::prelude::Tensor) -> anyhow::Result<Self> {
        let tract = tract.cast_to::<f32>()?;
        let data = tract.as_slice::<f32>()?;
        Ok(Self::from_iter(tract.shape(), data.iter().copied()))
    }

    pub(super) fn to_tract(&self) -> anyhow::Result<tract_onnx::prelude::Tensor> {
        Ok(tract_onnx::prelude::Tensor::from_shape(
            self.shape(),
            &*self.data,
        )?)
    }

    /// Returns the shape of this tensor.
    pub fn shape(&self) -> &[usize] {
        &self.layout.shape
    }

    /// Returns the number of dimensions of this tensor.
    pub fn rank(&self) -> usize {
        self.shape().len()
    }

    /// Indexes a prefix of the tensor's dimensions with `indices`.
    ///
    /// Indexing a tensor of shape `[2, 3, 4]` with `[a]` yields a view of shape `[3, 4]`, indexing
    /// it with `[a, b, c]` yields a single value. `[]` yields a view of the whole tensor.
    ///
    /// # Panics
    ///
    /// This method will panic if `indices` has more entries than `self` has dimensions, or if any
    /// index is out of bounds.
    #[track_caller]
    pub fn index<const N: usize>(&self, indices: [usize; N]) -> TensorView<'_> {
        self.as_view().index(indices)
    }

    /// Iterates over the outermost dimension of this tensor.
    ///
    /// # Panics
    ///
    /// `self` must have at least one dimension, otherwise this method will panic.
    #[track_caller]
    pub fn iter(&self) -> impl Iterator<Item = TensorView<'_>> {
        assert!(
            self.rank() > 0,
            "attempted to iterate over 0-dimensional tensor"
        );
        (0..self.shape()[0]).map(|index| self.index([index]))
    }

    /// Returns the values stored in a 1-dimensional tensor as a slice.
    ///
    /// # Panics
    ///
    /// `self` must have exactly 1 dimension, otherwise this method panics.
    #[track_caller]
    pub fn as_slice(&self) -> &[f32] {
        assert_eq!(
            self.rank(),
            1,
            "attempted to access tensor of shape {:?} as slice",
            self.shape()
        );
        &self.data
    }

    /// Returns the value stored in a 0-dimensional tensor.
    ///
    /// # Panics
    ///
    /// `self` must have exactly 0 dimensions, otherwise this method will panic.
    #[track_caller]
    pub fn as_singular(&self) -> f32 {
        assert_eq!(
            self.rank(),
            0,
            "attempted to access tensor of shape {:?} as singular element",
            self.shape(),
        );
        self.data[0]
    }

    fn as_view(&self) -> TensorView<'_> {
        TensorView {
            layout: self.layout.clone(),
            data: &self.data,
        }
    }
}

impl<const N: usize> From<[f32; N]> for Tensor {
    fn from(arr: [f32; N]) -> Self {
        Tensor::from_iter(&[N], arr)
    }
}

impl<'d> TensorView<'d> {
    /// Returns the shape of this tensor view.
    pub fn shape(&self) -> &[usize] {
        &self.layout.shape
    }

    /// Returns the number of dimensions of this tensor view.
    pub fn rank(&self) -> usize {
        self.shape().len()
    }

    /// Indexes a prefix of the view's dimensions with `indices`.
    ///
    /// # Panics
    ///
    /// This method will panic if `indices` has more entries than `self` has dimensions, or if any
    /// index is out of bounds.
    #[track_caller]
    pub fn index<const N: usize>(&self, indices: [usize; N]) -> TensorView<'d> {
        assert!(
            N <= self.rank(),
            "attempted to index tensor of shape {:?} with {:?}",
            self.shape(),
            indices
        );

        let mut data = self.data;
        for ((&length, &stride), index) in self
            .layout
            .shape
            .iter()
            .zip(&self.layout.strides)
            .zip(indices)
        {
            assert!(
                index < length,
                "attempted to index tensor of shape {:?} with {:?}",
                self.shape(),
                indices
            );
            data = &data[index * stride..(index + 1) * stride];
        }

        TensorView {
            layout: self.layout.remove_prefix(N),
            data,
        }
    }

    /// Iterates over the outermost dimension of this tensor view.
    ///
    /// # Panics
    ///
    /// `self` must have at least one dimension, otherwise this method will panic.
    #[track_caller]
    pub fn iter(&self) -> impl Iterator<Item = TensorView<'d>> + '_ {
        assert!(
            self.rank() > 0,
            "attempted to iterate over 0-dimensional tensor view"
        );
        (0..self.shape()[0]).map(|index| self.index([index]))
    }

    /// Returns the values stored in a 1-dimensional view as a slice.
    ///
    /// # Panics
    ///
    /// `self` must have exactly 1 dimension, otherwise this method panics.
    #[track_caller]
    pub fn as_slice(&self) -> &'d [f32] {
        assert_eq!(
            self.rank(),
            1,
            "attempted to access tensor view of shape {:?} as slice",
            self.shape()
        );
        self.data
    }

    /// Returns the value stored in a 0-dimensional view.
    ///
    /// # Panics
    ///
    /// `self` must have exactly 0 dimensions, otherwise this method will panic.
    #[track_caller]
    pub fn as_singular(&self) -> f32 {
        assert_eq!(
            self.rank(),
            0,
            "attempted to access view of shape {:?} as singular element",
            self.shape(),
        );
        self.data[0]
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.layout)
            .finish()
    }
}

impl fmt::Debug for TensorView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TensorView")
            .field("shape", &self.layout)
            .finish()
    }
}
