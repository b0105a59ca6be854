//! CPython runtime for the sofa backend (`python` feature)
//!
//! The GIL is taken for every step and released in between; objects outlive it
//! as `Py<..>` references.

use super::interpreter::{InterpreterContext, InterpreterRuntime, ScriptFunction, ScriptModule};
use crate::error::EngineError;
use pyo3::prelude::*;
use pyo3::types::{PyList, PyTuple};
use std::path::Path;
use tracing::{debug, info};

fn engine_error(py: Python<'_>, err: PyErr) -> EngineError {
    let traceback = err
        .traceback(py)
        .and_then(|tb| tb.format().ok())
        .unwrap_or_default();
    EngineError::new(format!("{}{}", traceback, err))
}

/// Process-wide embedded interpreter
#[derive(Debug, Default)]
pub struct PythonRuntime;

impl PythonRuntime {
    pub fn new() -> Self {
        Self
    }
}

impl InterpreterRuntime for PythonRuntime {
    fn initialize(
        &self,
        env_path: &Path,
        custom_path: Option<&Path>,
    ) -> Result<Box<dyn InterpreterContext>, EngineError> {
        pyo3::prepare_freethreaded_python();

        Python::with_gil(|py| -> PyResult<()> {
            let site = py.import("site")?;
            let lib = env_path.join("lib");
            let entries = std::fs::read_dir(&lib).map_err(|e| {
                pyo3::exceptions::PyOSError::new_err(format!("{}: {}", lib.display(), e))
            })?;
            for entry in entries.flatten() {
                let name = entry.file_name();
                if name.to_string_lossy().starts_with("python") {
                    let packages = entry.path().join("site-packages");
                    debug!(path = %packages.display(), "Adding site directory");
                    site.call_method1("addsitedir", (packages.to_string_lossy().into_owned(),))?;
                }
            }

            if let Some(custom) = custom_path {
                let sys = py.import("sys")?;
                let path: &PyList = sys.getattr("path")?.downcast()?;
                path.insert(0, custom.to_string_lossy().into_owned())?;
            }
            Ok(())
        })
        .map_err(|e| Python::with_gil(|py| engine_error(py, e)))?;

        Ok(Box::new(PythonContext))
    }
}

struct PythonContext;

impl InterpreterContext for PythonContext {
    fn import_module(&self, module: &str) -> Result<Box<dyn ScriptModule>, EngineError> {
        Python::with_gil(|py| {
            let imported = py.import(module).map_err(|e| engine_error(py, e))?;
            Ok(Box::new(PythonModule {
                module: imported.into(),
            }) as Box<dyn ScriptModule>)
        })
    }

    // CPython cannot be re-initialized inside one process, so the interpreter
    // stays up; only our references are dropped.
    fn finalize(&self) -> Result<(), EngineError> {
        info!("Python context released");
        Ok(())
    }
}

struct PythonModule {
    module: Py<PyModule>,
}

impl ScriptModule for PythonModule {
    fn function(&self, name: &str) -> Result<Box<dyn ScriptFunction>, EngineError> {
        Python::with_gil(|py| {
            let attr = self
                .module
                .as_ref(py)
                .getattr(name)
                .map_err(|e| engine_error(py, e))?;
            if !attr.is_callable() {
                return Err(EngineError::new(format!("'{}' is not callable", name)));
            }
            Ok(Box::new(PythonFunction {
                function: attr.into(),
            }) as Box<dyn ScriptFunction>)
        })
    }
}

struct PythonFunction {
    function: Py<PyAny>,
}

impl ScriptFunction for PythonFunction {
    fn call(&self, args: &[String]) -> Result<bool, EngineError> {
        Python::with_gil(|py| {
            let args = PyTuple::new(py, args);
            self.function
                .call1(py, args)
                .and_then(|result| result.is_true(py))
                .map_err(|e| engine_error(py, e))
        })
    }
}
