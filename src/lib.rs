//! Environmental rating of storefront products and discovery of greener
//! alternatives.
//!
//! [`EcoPipeline`] is the entry point: it reads the product page, asks the
//! rating oracle for the product's own score, then runs the configured
//! alternative sources (live search + rating, curated catalog, or both) and
//! assembles a capped, deduplicated, best-first list.

pub mod acceptance;
pub mod assembler;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fetch;
pub mod html_extractor;
pub mod logging;
pub mod model;
pub mod oracle;
pub mod pipeline;
pub mod query_planner;
pub mod rating;
pub mod search;
pub mod sources;

pub use config::Settings;
pub use error::EcoError;
pub use model::{Alternative, EcoBucket, ProductDescriptor, RateOutcome, RateRequest, RateResponse, RatingResult};
pub use pipeline::{Components, EcoPipeline};

// ==================== PYO3 BINDINGS ====================

#[cfg(feature = "python")]
mod python {
    use pyo3::exceptions::PyRuntimeError;
    use pyo3::prelude::*;

    use crate::pipeline::deadline_from_secs;
    use crate::{EcoPipeline, RateOutcome, RateRequest, Settings};

    /// Owns one pipeline (and so one catalog cache) for the life of the object.
    #[pyclass(module = "eco_rater")]
    struct EcoRater {
        pipeline: EcoPipeline,
        runtime: tokio::runtime::Runtime,
    }

    #[pymethods]
    impl EcoRater {
        #[new]
        fn new() -> PyResult<Self> {
            crate::logging::init();
            let settings = Settings::from_env().map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
            let pipeline = EcoPipeline::from_settings(&settings).map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
            let runtime = tokio::runtime::Runtime::new().map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
            Ok(Self { pipeline, runtime })
        }

        #[pyo3(signature = (url, timeout_secs=None))]
        fn rate_url(&self, py: Python<'_>, url: String, timeout_secs: Option<f64>) -> PyResult<PyObject> {
            let request = RateRequest { url };
            let deadline = timeout_secs
                .map(deadline_from_secs)
                .transpose()
                .map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
            let outcome = py.allow_threads(|| {
                self.runtime.block_on(async {
                    match deadline {
                        Some(deadline) => self.pipeline.handle_with_deadline(request, deadline).await,
                        None => self.pipeline.handle(request).await,
                    }
                })
            });

            if let RateOutcome::Failed { error } = &outcome {
                return Err(PyRuntimeError::new_err(error.clone()));
            }
            let body = serde_json::to_string(&outcome).map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
            let json = py.import_bound("json")?;
            Ok(json.call_method1("loads", (body,))?.unbind())
        }
    }

    #[pymodule]
    fn eco_rater(m: &Bound<'_, PyModule>) -> PyResult<()> {
        m.add_class::<EcoRater>()?;
        Ok(())
    }
}
