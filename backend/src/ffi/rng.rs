//! PyO3 wrappers for the deterministic draw service

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::config::SimulationConfig;
use crate::rng::DeterministicRng;

/// Python wrapper for [`DeterministicRng`]
///
/// # Example (from Python)
///
/// ```python
/// from workforce_simulator_core_rs import DeterministicRng
///
/// rng = DeterministicRng(42)
/// p = rng.draw("E000001", 2026, "termination")
/// assert p == rng.draw("E000001", 2026, "termination", "")
/// ```
#[pyclass(name = "DeterministicRng")]
pub struct PyDeterministicRng {
    inner: DeterministicRng,
}

#[pymethods]
impl PyDeterministicRng {
    #[new]
    fn new(seed: u64) -> Self {
        Self {
            inner: DeterministicRng::new(seed),
        }
    }

    #[getter]
    fn seed(&self) -> u64 {
        self.inner.seed()
    }

    /// Uniform value in [0, 1) for the key.
    #[pyo3(signature = (entity_id, year, event_type, salt=None))]
    fn draw(&self, entity_id: &str, year: i32, event_type: &str, salt: Option<&str>) -> f64 {
        self.inner
            .draw(entity_id, year, event_type, salt.unwrap_or_default())
    }

    /// Uniform index in [0, n) for the key.
    #[pyo3(signature = (entity_id, year, event_type, n, salt=None))]
    fn draw_index(
        &self,
        entity_id: &str,
        year: i32,
        event_type: &str,
        n: usize,
        salt: Option<&str>,
    ) -> usize {
        self.inner
            .draw_index(entity_id, year, event_type, salt.unwrap_or_default(), n)
    }

    fn __repr__(&self) -> String {
        format!("DeterministicRng(seed={})", self.inner.seed())
    }
}

/// Config hash of a JSON simulation configuration.
#[pyfunction]
#[pyo3(name = "config_hash")]
pub fn py_config_hash(config_json: &str) -> PyResult<String> {
    let config = SimulationConfig::from_json_str(config_json)
        .map_err(|e| PyErr::new::<PyValueError, _>(e.to_string()))?;
    config
        .config_hash()
        .map_err(|e| PyErr::new::<PyValueError, _>(e.to_string()))
}
