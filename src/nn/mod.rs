//! Neural Network inference.
//!
//! Networks are loaded from TensorFlow Lite or ONNX files and run on the CPU with `tract`.

pub mod tensor;

use std::{
    fmt,
    ops::{Index, RangeInclusive},
    path::Path,
    sync::Arc,
};

use anyhow::{bail, Context};
use tensor::Tensor;
use tract_onnx::prelude::{
    tvec, Framework, Graph, InferenceModelExt, SimplePlan, TValue, TVec, TypedFact, TypedModel,
    TypedOp,
};

use crate::image::{AsImageView, Color, ImageView, Resolution};

type Model = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// A convolutional neural network (CNN) that operates on image data.
///
/// Like the underlying [`NeuralNetwork`], this is a cheaply [`Clone`]able handle to the underlying
/// data.
#[derive(Clone)]
pub struct Cnn {
    nn: NeuralNetwork,
    input_res: Resolution,
    image_map: Arc<dyn Fn(ImageView<'_>) -> Tensor + Send + Sync>,
}

impl Cnn {
    /// Creates a CNN wrapper from a [`NeuralNetwork`].
    ///
    /// The network must have exactly one input with a shape that matches the given
    /// [`CnnInputShape`].
    pub fn new(
        nn: NeuralNetwork,
        shape: CnnInputShape,
        color_mapper: ColorMapper,
    ) -> anyhow::Result<Self> {
        let input_res = Self::get_input_res(&nn, shape)?;
        let (h, w) = (input_res.height() as usize, input_res.width() as usize);

        // Box a closure that maps the whole input image to a tensor, so that the per-pixel work is
        // monomorphized.
        let image_map: Arc<dyn Fn(ImageView<'_>) -> _ + Send + Sync> = match shape {
            CnnInputShape::NCHW => Arc::new(move |view| {
                Tensor::from_array_shape_fn([1, 3, h, w], |[_, c, y, x]| {
                    color_mapper.map(sample(&view, x as f32 / w as f32, y as f32 / h as f32))[c]
                })
            }),
            CnnInputShape::NHWC => Arc::new(move |view| {
                Tensor::from_array_shape_fn([1, h, w, 3], |[_, y, x, c]| {
                    color_mapper.map(sample(&view, x as f32 / w as f32, y as f32 / h as f32))[c]
                })
            }),
        };

        Ok(Self {
            nn,
            input_res,
            image_map,
        })
    }

    fn get_input_res(nn: &NeuralNetwork, shape: CnnInputShape) -> anyhow::Result<Resolution> {
        let input = match nn.inputs() {
            [input] => input,
            inputs => bail!(
                "CNN network has to take exactly 1 input, this one takes {}",
                inputs.len(),
            ),
        };

        let (w, h) = match (shape, input.shape()) {
            (CnnInputShape::NCHW, &[1, 3, h, w]) | (CnnInputShape::NHWC, &[1, h, w, 3]) => (w, h),
            (_, tensor_shape) => {
                bail!(
                    "invalid model input shape for {:?} CNN: {:?}",
                    shape,
                    tensor_shape,
                );
            }
        };

        let (w, h): (u32, u32) = (w.try_into()?, h.try_into()?);
        Ok(Resolution::new(w, h))
    }

    /// Returns the expected input image size.
    #[inline]
    pub fn input_resolution(&self) -> Resolution {
        self.input_res
    }

    /// Returns the underlying [`NeuralNetwork`].
    #[inline]
    pub fn network(&self) -> &NeuralNetwork {
        &self.nn
    }

    /// Runs the network on an input image, returning the estimated outputs.
    ///
    /// The input image will be sampled to create the network's input tensor. If the image's aspect
    /// ratio does not match the network's input aspect ratio, the image will be stretched.
    pub fn estimate<V: AsImageView>(&self, image: &V) -> anyhow::Result<Outputs> {
        let tensor = (self.image_map)(image.as_view());
        self.nn.estimate(&Inputs::from(tensor))
    }
}

impl fmt::Debug for Cnn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cnn")
            .field("input_res", &self.input_res)
            .finish_non_exhaustive()
    }
}

/// Nearest-neighbor sample at normalized coordinates `(u, v)`.
fn sample(view: &ImageView<'_>, u: f32, v: f32) -> Color {
    let (w, h) = (view.width(), view.height());
    if w == 0 || h == 0 {
        return Color::NULL;
    }
    let x = ((u * w as f32).round() as u32).min(w - 1);
    let y = ((v * h as f32).round() as u32).min(h - 1);
    view.get(x, y)
}

/// Maps 8-bit sRGB colors to the value range a network expects.
#[derive(Debug, Clone)]
pub struct ColorMapper {
    target_range: RangeInclusive<f32>,
}

impl ColorMapper {
    /// Creates a simple color mapper that uniformly maps sRGB values to `target_range`.
    ///
    /// Note that this operates on *non-linear* sRGB colors, but maps them linearly to the target
    /// range.
    pub fn linear(target_range: RangeInclusive<f32>) -> Self {
        assert!(target_range.end() > target_range.start());

        Self { target_range }
    }

    fn map(&self, color: Color) -> [f32; 3] {
        let start = *self.target_range.start();
        let end = *self.target_range.end();

        let adjust_range = (end - start) / 255.0;
        [color.r(), color.g(), color.b()].map(|col| col as f32 * adjust_range + start)
    }
}

/// Describes in what order a CNN expects its input image data.
///
/// - `N` is the number of images, fixed at 1.
/// - `C` is the number of color channels, 3 for RGB inputs.
/// - `H` and `W` are the height and width of the input, respectively.
///
/// TensorFlow Lite models use `NHWC`; models converted to ONNX frequently use `NCHW`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CnnInputShape {
    /// Shape is `[N, C, H, W]`.
    NCHW,
    /// Shape is `[N, H, W, C]`.
    NHWC,
}

impl CnnInputShape {
    /// Guesses the input layout of a network from its input tensor shape.
    ///
    /// Returns [`None`] if the shape is neither `[1, 3, H, W]` nor `[1, H, W, 3]`.
    pub fn detect(shape: &[usize]) -> Option<Self> {
        match shape {
            [1, 3, _, _] => Some(Self::NCHW),
            [1, _, _, 3] => Some(Self::NHWC),
            _ => None,
        }
    }
}

/// On-disk format of a neural network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    /// TensorFlow Lite flatbuffer (`.tflite`).
    TfLite,
    /// ONNX protobuf (`.onnx`).
    Onnx,
}

impl ModelFormat {
    /// Determines the format of a network file from its extension.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("tflite") => Ok(Self::TfLite),
            Some("onnx") => Ok(Self::Onnx),
            _ => bail!(
                "neural network file '{}' must have a `.tflite` or `.onnx` extension",
                path.display()
            ),
        }
    }
}

/// A neural network that can be used for inference.
///
/// This is a cheaply [`Clone`]able handle to the underlying network structures.
#[derive(Clone)]
pub struct NeuralNetwork(Arc<NeuralNetworkImpl>);

struct NeuralNetworkImpl {
    inner: Model,
    inputs: Vec<TensorInfo>,
    outputs: Vec<TensorInfo>,
}

impl NeuralNetwork {
    /// Loads a pre-trained model from a `.tflite` or `.onnx` file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let format = ModelFormat::from_path(path)?;
        let data = std::fs::read(path)
            .with_context(|| format!("failed to read neural network '{}'", path.display()))?;
        Self::load(format, &data)
            .with_context(|| format!("failed to load neural network '{}'", path.display()))
    }

    /// Loads a pre-trained model from an in-memory TensorFlow Lite file.
    pub fn from_tflite(raw: &[u8]) -> anyhow::Result<Self> {
        Self::load(ModelFormat::TfLite, raw)
    }

    /// Loads and optimizes a network.
    ///
    /// Returns an error if the network data is malformed, if the network data is incomplete, or if
    /// the network uses unimplemented operations.
    pub fn load(format: ModelFormat, raw: &[u8]) -> anyhow::Result<Self> {
        let graph: TypedModel = match format {
            ModelFormat::TfLite => tract_tflite::tflite()
                .model_for_read(&mut &*raw)?
                .into_optimized()?,
            ModelFormat::Onnx => tract_onnx::onnx()
                .model_for_read(&mut &*raw)?
                .into_optimized()?,
        };

        let inputs = (0..graph.inputs.len())
            .map(|id| TensorInfo::input(&graph, id))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let outputs = (0..graph.outputs.len())
            .map(|id| TensorInfo::output(&graph, id))
            .collect::<anyhow::Result<Vec<_>>>()?;
        log::trace!("loaded {format:?} network; inputs={inputs:?}, outputs={outputs:?}");

        let outlets = graph.output_outlets()?.to_vec();
        let model = SimplePlan::new_for_outputs(graph, &outlets)?;

        Ok(NeuralNetwork(Arc::new(NeuralNetworkImpl {
            inner: model,
            inputs,
            outputs,
        })))
    }

    /// Returns information about the network's input tensors.
    ///
    /// To perform inference, a matching input tensor has to be provided for each input.
    pub fn inputs(&self) -> &[TensorInfo] {
        &self.0.inputs
    }

    /// Returns information about the network's output tensors.
    pub fn outputs(&self) -> &[TensorInfo] {
        &self.0.outputs
    }

    /// Runs the network on a set of [`Inputs`], returning the estimated [`Outputs`].
    #[doc(alias = "infer")]
    pub fn estimate(&self, inputs: &Inputs) -> anyhow::Result<Outputs> {
        if inputs.len() != self.inputs().len() {
            bail!(
                "network takes {} inputs, but {} were provided",
                self.inputs().len(),
                inputs.len(),
            );
        }

        let inputs = inputs
            .inner
            .iter()
            .map(|t| Ok(TValue::from_const(Arc::new(t.to_tract()?))))
            .collect::<anyhow::Result<TVec<_>>>()?;
        let outputs = self.0.inner.run(inputs)?;
        let inner = outputs
            .iter()
            .map(|tract| Tensor::from_tract(tract))
            .collect::<anyhow::Result<_>>()?;

        Ok(Outputs { inner })
    }
}

impl fmt::Debug for NeuralNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NeuralNetwork")
            .field("inputs", &self.0.inputs)
            .field("outputs", &self.0.outputs)
            .finish()
    }
}

/// Name and shape of a network input or output.
#[derive(Debug, Clone)]
pub struct TensorInfo {
    name: String,
    shape: Vec<usize>,
}

impl TensorInfo {
    fn input(graph: &TypedModel, id: usize) -> anyhow::Result<Self> {
        let fact = graph.input_fact(id)?;
        let node = graph.input_outlets()?[id].node;
        Self::new(&graph.node(node).name, fact)
    }

    fn output(graph: &TypedModel, id: usize) -> anyhow::Result<Self> {
        let fact = graph.output_fact(id)?;
        let node = graph.output_outlets()?[id].node;
        Self::new(&graph.node(node).name, fact)
    }

    fn new(name: &str, fact: &TypedFact) -> anyhow::Result<Self> {
        let shape = fact
            .shape
            .as_concrete()
            .with_context(|| format!("tensor '{name}' has symbolic shape {:?}", fact.shape))?;
        Ok(Self {
            name: name.to_string(),
            shape: shape.to_vec(),
        })
    }

    /// Returns the tensor shape.
    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the name of the tensor's node in the network graph.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The result of a neural network inference pass.
///
/// This is a list of tensors corresponding to the network's output nodes.
#[derive(Debug)]
pub struct Outputs {
    inner: TVec<Tensor>,
}

impl Outputs {
    /// Returns the number of tensors in this inference output.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns an iterator over the output tensors.
    pub fn iter(&self) -> std::slice::Iter<'_, Tensor> {
        self.inner.iter()
    }
}

impl Index<usize> for Outputs {
    type Output = Tensor;

    fn index(&self, index: usize) -> &Tensor {
        &self.inner[index]
    }
}

impl<'a> IntoIterator for &'a Outputs {
    type Item = &'a Tensor;
    type IntoIter = std::slice::Iter<'a, Tensor>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<Tensor> for Outputs {
    fn from_iter<T: IntoIterator<Item = Tensor>>(iter: T) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

/// List of input tensors for neural network inference.
#[derive(Debug)]
pub struct Inputs {
    inner: TVec<Tensor>,
}

impl Inputs {
    /// Returns the number of input tensors stored in `self`.
    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

impl From<Tensor> for Inputs {
    fn from(t: Tensor) -> Self {
        Self { inner: tvec![t] }
    }
}
