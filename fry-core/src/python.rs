//! Python Bindings
//!
//! Exposes the reactive core to Python as the `_core` extension module:
//! `signal`, `computed`, `effect`, the `Signal`/`Computed`/`Disposer`
//! classes and the `PropagationError` exception.
//!
//! Python values live in the graph as `PyValue`. Signals compare them with
//! `same_value` (same object, or same type and `==`), computeds with
//! `python_eq` (plain `==`, so `1`, `1.0` and `True` are one value).

use pyo3::create_exception;
use pyo3::exceptions::{PyException, PyRuntimeError};
use pyo3::prelude::*;
use tracing::warn;

use crate::error::{BoxError, ReactiveError};
use crate::reactive::{Computed, Disposer, Effect, Signal};

create_exception!(
    _core,
    PropagationError,
    PyException,
    "One or more subscribers failed while a write propagated. args[1] lists (sink_id, exception) pairs."
);

/// A Python object stored in a signal or computed.
struct PyValue(PyObject);

impl Clone for PyValue {
    fn clone(&self) -> Self {
        Python::with_gil(|py| Self(self.0.clone_ref(py)))
    }
}

/// Strict policy for signal writes.
fn same_value(old: &PyValue, new: &PyValue) -> bool {
    Python::with_gil(|py| {
        let (old, new) = (old.0.bind(py), new.0.bind(py));
        old.is(new) || (old.get_type().is(&new.get_type()) && compare(old, new))
    })
}

/// Loose policy for computed results.
fn python_eq(old: &PyValue, new: &PyValue) -> bool {
    Python::with_gil(|py| compare(old.0.bind(py), new.0.bind(py)))
}

/// `old == new`. A raising `__eq__` counts as a change and is logged.
fn compare(old: &Bound<'_, PyAny>, new: &Bound<'_, PyAny>) -> bool {
    match old.eq(new) {
        Ok(equal) => equal,
        Err(err) => {
            warn!(error = %err, "__eq__ raised; treating the value as changed");
            false
        }
    }
}

fn call(body: &PyObject) -> Result<PyValue, BoxError> {
    Python::with_gil(|py| body.call0(py).map(PyValue).map_err(BoxError::from))
}

fn to_py_err(py: Python<'_>, error: ReactiveError) -> PyErr {
    match error {
        ReactiveError::Body(source) => match source.downcast::<PyErr>() {
            Ok(err) => *err,
            Err(other) => PyRuntimeError::new_err(other.to_string()),
        },
        ReactiveError::Panicked(message) => {
            PyRuntimeError::new_err(format!("reactive body panicked: {message}"))
        }
        ReactiveError::Propagation(failure) => {
            let message = failure.to_string();
            let failures: Vec<(u64, PyObject)> = failure
                .failures
                .into_iter()
                .map(|f| (f.sink.raw(), to_py_err(py, f.error).into_value(py).into_any()))
                .collect();
            PropagationError::new_err((message, failures))
        }
    }
}

/// Python-exposed Signal type.
#[pyclass(name = "Signal", module = "fry_core")]
pub struct PySignal {
    inner: Signal<PyValue>,
}

#[pymethods]
impl PySignal {
    #[new]
    fn new(value: PyObject) -> Self {
        Self {
            inner: Signal::with_equality(PyValue(value), same_value),
        }
    }

    /// Tracked read.
    #[getter]
    fn value(&self) -> PyObject {
        self.inner.get().0
    }

    /// Write and propagate.
    #[setter]
    fn set_value(&self, py: Python<'_>, value: PyObject) -> PyResult<()> {
        self.inner
            .set(PyValue(value))
            .map_err(|error| to_py_err(py, error))
    }

    /// Untracked read.
    fn peek(&self) -> PyObject {
        self.inner.peek().0
    }

    #[getter]
    fn id(&self) -> u64 {
        self.inner.id().raw()
    }

    fn subscriber_count(&self) -> usize {
        self.inner.subscriber_count()
    }

    fn __repr__(&self, py: Python<'_>) -> String {
        let value = self.inner.peek();
        let repr = value
            .0
            .bind(py)
            .repr()
            .map(|r| r.to_string())
            .unwrap_or_else(|_| "?".to_string());
        format!(
            "Signal(id={}, value={}, subscribers={})",
            self.id(),
            repr,
            self.subscriber_count()
        )
    }
}

/// Python-exposed Computed type.
#[pyclass(name = "Computed", module = "fry_core")]
pub struct PyComputed {
    inner: Computed<PyValue>,
}

#[pymethods]
impl PyComputed {
    #[new]
    fn new(derive: PyObject) -> Self {
        Self {
            inner: Computed::with_equality(move || call(&derive), python_eq),
        }
    }

    /// Evaluates the derivation; tracked read.
    #[getter]
    fn value(&self, py: Python<'_>) -> PyResult<PyObject> {
        self.inner
            .get()
            .map(|value| value.0)
            .map_err(|error| to_py_err(py, error))
    }

    /// Latest value, `None` before the first evaluation.
    fn peek(&self, py: Python<'_>) -> PyObject {
        self.inner.peek().map_or_else(|| py.None(), |value| value.0)
    }

    fn dispose(&self) {
        self.inner.dispose();
    }

    #[getter]
    fn id(&self) -> u64 {
        self.inner.id().raw()
    }

    fn subscriber_count(&self) -> usize {
        self.inner.subscriber_count()
    }
}

/// Callable returned by `effect`; calling it disposes the effect.
#[pyclass(name = "Disposer", module = "fry_core")]
pub struct PyDisposer {
    inner: Disposer,
}

#[pymethods]
impl PyDisposer {
    fn __call__(&self) {
        self.inner.dispose();
    }

    fn dispose(&self) {
        self.inner.dispose();
    }
}

#[pyfunction]
fn signal(value: PyObject) -> PySignal {
    PySignal::new(value)
}

#[pyfunction]
fn computed(derive: PyObject) -> PyComputed {
    PyComputed::new(derive)
}

/// Run `body` now and whenever what it read changes.
#[pyfunction]
fn effect(py: Python<'_>, body: PyObject) -> PyResult<PyDisposer> {
    Effect::try_new(move || call(&body).map(|_| ()))
        .map(|effect| PyDisposer {
            inner: effect.disposer(),
        })
        .map_err(|error| to_py_err(py, error))
}

/// Python module definition.
///
/// This function is called by Python when importing the module.
/// It registers all Python-exposed types and functions.
#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PySignal>()?;
    m.add_class::<PyComputed>()?;
    m.add_class::<PyDisposer>()?;
    m.add_function(wrap_pyfunction!(signal, m)?)?;
    m.add_function(wrap_pyfunction!(computed, m)?)?;
    m.add_function(wrap_pyfunction!(effect, m)?)?;
    m.add("PropagationError", m.py().get_type_bound::<PropagationError>())?;

    // Add version info
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn objects(py: Python<'_>) -> (PyObject, PyObject) {
        let module = PyModule::from_code_bound(
            py,
            "class Touchy:\n    def __eq__(self, other):\n        raise ValueError('no')\n\na = Touchy()\nb = Touchy()\n",
            "touchy.py",
            "touchy",
        )
        .unwrap();
        (
            module.getattr("a").unwrap().unbind(),
            module.getattr("b").unwrap().unbind(),
        )
    }

    #[test]
    fn raising_eq_counts_as_change() {
        pyo3::prepare_freethreaded_python();
        Python::with_gil(|py| {
            let (a, b) = objects(py);
            let (a, b) = (PyValue(a), PyValue(b));
            assert!(!python_eq(&a, &b));
            assert!(!same_value(&a, &b));
            assert!(same_value(&a, &a.clone()));
        });
    }

    #[test]
    fn equal_numbers_compare_by_policy() {
        pyo3::prepare_freethreaded_python();
        Python::with_gil(|py| {
            let one = PyValue(1i32.into_py(py));
            let one_float = PyValue(1.0f64.into_py(py));
            assert!(python_eq(&one, &one_float));
            assert!(!same_value(&one, &one_float));
        });
    }
}
