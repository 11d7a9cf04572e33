//! Python extension module (`--features python`).
//!
//! Batches are returned as `{"x": ndarray, "y": ndarray}` dicts, the shape the
//! training loop reads with `batch['x'], batch['y']`.

use std::sync::Arc;

use numpy::{PyArray1, PyArray2, PyArray3, PyReadonlyArray1};
use pyo3::exceptions::{PyIOError, PyIndexError, PyOverflowError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use crate::combinatorics;
use crate::config::{HierarchyConfig, PartitionMode, SampleConfig};
use crate::error::RhmError;
use crate::hierarchy::RuleBank;
use crate::sampler::{self, Features, SampleBatch};

impl From<RhmError> for PyErr {
    fn from(err: RhmError) -> PyErr {
        match &err {
            RhmError::IndexOutOfRange { .. } | RhmError::SplitPosition { .. } => {
                PyIndexError::new_err(err.to_string())
            }
            RhmError::CountOverflow { .. } => PyOverflowError::new_err(err.to_string()),
            RhmError::Io(_) => PyIOError::new_err(err.to_string()),
            _ => PyValueError::new_err(err.to_string()),
        }
    }
}

/// Immutable rule bank shared with Python.
#[pyclass(name = "RuleBank", frozen)]
struct PyRuleBank {
    inner: Arc<RuleBank>,
}

#[pymethods]
impl PyRuleBank {
    #[new]
    #[pyo3(signature = (num_features, num_layers, m, num_classes, s, seed=0, partition="tuples"))]
    fn new(
        num_features: usize,
        num_layers: usize,
        m: usize,
        num_classes: usize,
        s: usize,
        seed: u64,
        partition: &str,
    ) -> PyResult<Self> {
        let partition = match partition {
            "tuples" => PartitionMode::Tuples,
            "symbols" => PartitionMode::Symbols,
            other => {
                return Err(PyValueError::new_err(format!(
                    "unknown partition '{}', expected 'tuples' or 'symbols'",
                    other
                )))
            }
        };
        let config =
            HierarchyConfig::new(num_features, num_layers, m, num_classes, s, seed).with_partition(partition);
        Ok(Self {
            inner: Arc::new(RuleBank::from_config(&config)?),
        })
    }

    #[getter]
    fn pmax(&self) -> PyResult<u128> {
        Ok(self.inner.pmax()?)
    }

    #[getter]
    fn vocab_sizes(&self) -> Vec<usize> {
        self.inner.vocab_sizes().to_vec()
    }

    #[getter]
    fn num_layers(&self) -> usize {
        self.inner.num_layers()
    }

    /// Rules of `layer` as a `[vocab, m, s]` array.
    fn rules<'py>(&self, py: Python<'py>, layer: usize) -> PyResult<&'py PyArray3<i64>> {
        if layer >= self.inner.num_layers() {
            return Err(PyIndexError::new_err(format!(
                "layer {} out of range [0, {})",
                layer,
                self.inner.num_layers()
            )));
        }
        Ok(PyArray3::from_owned_array(py, self.inner.layer(layer).to_array()))
    }

    /// Sample a batch. `seed_reset_layer=None` (or `>= num_layers`) gives the
    /// canonical realization; otherwise rule choices at depth
    /// `>= seed_reset_layer` are redrawn with `seed + index`. `whitening`
    /// centers and rescales one-hot inputs.
    #[pyo3(signature = (indices, seed=0, seed_reset_layer=None, input_format="onehot", layer_labels=false, whitening=false))]
    fn sample<'py>(
        &self,
        py: Python<'py>,
        indices: PyReadonlyArray1<i64>,
        seed: u64,
        seed_reset_layer: Option<usize>,
        input_format: &str,
        layer_labels: bool,
        whitening: bool,
    ) -> PyResult<&'py PyDict> {
        let indices: Vec<i128> = indices.as_array().iter().map(|&i| i as i128).collect();
        let config = SampleConfig {
            encoding: input_format.parse()?,
            variant_seed: seed,
            seed_reset_layer,
            layer_labels,
            whitening,
        };
        let bank = Arc::clone(&self.inner);
        let batch = py.allow_threads(move || sampler::sample(&indices, &bank, &config))?;
        batch_to_dict(py, batch)
    }
}

fn batch_to_dict(py: Python<'_>, batch: SampleBatch) -> PyResult<&PyDict> {
    let dict = PyDict::new(py);
    match batch.x {
        Features::OneHot(x) => dict.set_item("x", PyArray3::from_owned_array(py, x))?,
        Features::Index(x) => dict.set_item("x", PyArray3::from_owned_array(py, x))?,
    }
    dict.set_item("y", PyArray1::from_owned_array(py, batch.y))?;

    if let Some(labels) = batch.layer_labels {
        let list = PyList::empty(py);
        for depth_labels in labels {
            list.append(PyArray2::from_owned_array(py, depth_labels))?;
        }
        dict.set_item("layer_labels", list)?;
    }
    Ok(dict)
}

/// `m^((s^num_layers - 1)/(s - 1)) * num_classes`
#[pyfunction]
#[pyo3(name = "pmax")]
fn py_pmax(m: usize, s: usize, num_layers: usize, num_classes: usize) -> PyResult<u128> {
    Ok(combinatorics::pmax(m, s, num_layers, num_classes)?)
}

/// Seeded draw of `count` distinct indices from `[0, pmax)`.
#[pyfunction]
#[pyo3(name = "sample_indices")]
fn py_sample_indices(py: Python<'_>, pmax: u128, count: usize, seed: u64) -> PyResult<&PyArray1<i64>> {
    let indices = combinatorics::sample_indices(pmax, count, seed)?
        .into_iter()
        .map(|index| {
            i64::try_from(index).map_err(|_| {
                PyOverflowError::new_err(format!("sample index {} does not fit in int64", index))
            })
        })
        .collect::<PyResult<Vec<i64>>>()?;
    Ok(PyArray1::from_vec(py, indices))
}

#[pymodule]
fn rhm(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<PyRuleBank>()?;
    m.add_function(wrap_pyfunction!(py_pmax, m)?)?;
    m.add_function(wrap_pyfunction!(py_sample_indices, m)?)?;
    Ok(())
}
