use std::path::{Path, PathBuf};

use pyo3::prelude::*;
use pyo3::types::PyModule;

use crate::config::AgentEntryPointConfig;
use crate::error::EntryPointError;

/// What C3 should call: a bare function, an unbound method that must be
/// dispatched through a freshly-constructed instance, or a class whose
/// instances are themselves callable (spec §4.1 legal combinations).
#[derive(Debug, Clone)]
pub enum Callable {
    Function { name: String },
    Method { class: String, method: String },
    CallableInstance { class: String },
}

/// The outcome of C1: where the module lives and what to call on it.
/// Carries no live Python objects — resolution is re-validated (cheaply)
/// at call time in `ExecutionEngine`, since `PyObject` handles don't
/// survive being moved across the engine's worker-thread boundary for
/// async dispatch.
#[derive(Debug, Clone)]
pub struct ResolvedEntryPoint {
    pub file_path: PathBuf,
    pub module_name: String,
    pub callable: Callable,
}

pub struct EntryPointResolver;

impl EntryPointResolver {
    /// Load `file_path`'s module, locate `(class?, method?)` on it per
    /// `entry`, and validate that the chosen target exists and is
    /// invocable. Never executes user code beyond module-level statements
    /// that run on import (spec §4.1).
    pub fn resolve(file_path: &Path, entry: &AgentEntryPointConfig) -> Result<ResolvedEntryPoint, EntryPointError> {
        Python::with_gil(|py| {
            let module = import_module(py, file_path, &entry.module)?;

            if let Some(class_name) = &entry.class {
                match module.getattr(class_name.as_str()) {
                    Ok(class_obj) => {
                        if !is_callable(&class_obj) {
                            return Err(EntryPointError::NotCallable(class_name.clone()));
                        }
                        let callable = match &entry.method {
                            Some(method) => {
                                validate_method(&class_obj, method)?;
                                Callable::Method { class: class_name.clone(), method: method.clone() }
                            }
                            None => Callable::CallableInstance { class: class_name.clone() },
                        };
                        return Ok(ResolvedEntryPoint {
                            file_path: file_path.to_path_buf(),
                            module_name: entry.module.clone(),
                            callable,
                        });
                    }
                    Err(_) if entry.fallback_to_function => {
                        let method = entry.method.as_ref().ok_or_else(|| {
                            EntryPointError::SymbolNotFound(format!(
                                "class `{class_name}` not found and no `method` given for fallback"
                            ))
                        })?;
                        return resolve_function(py, file_path, &entry.module, &module, method);
                    }
                    Err(_) => return Err(EntryPointError::SymbolNotFound(class_name.clone())),
                }
            }

            let method = entry
                .method
                .as_ref()
                .ok_or_else(|| EntryPointError::SymbolNotFound("agent entry specifies neither class nor method".into()))?;
            resolve_function(py, file_path, &entry.module, &module, method)
        })
    }
}

fn resolve_function(
    _py: Python<'_>,
    file_path: &Path,
    module_name: &str,
    module: &Bound<'_, PyModule>,
    method: &str,
) -> Result<ResolvedEntryPoint, EntryPointError> {
    let func = module.getattr(method).map_err(|_| EntryPointError::SymbolNotFound(method.to_string()))?;
    if !is_callable(&func) {
        return Err(EntryPointError::NotCallable(method.to_string()));
    }
    Ok(ResolvedEntryPoint {
        file_path: file_path.to_path_buf(),
        module_name: module_name.to_string(),
        callable: Callable::Function { name: method.to_string() },
    })
}

fn validate_method(class_obj: &Bound<'_, PyAny>, method: &str) -> Result<(), EntryPointError> {
    let attr = class_obj.getattr(method).map_err(|_| EntryPointError::SymbolNotFound(method.to_string()))?;
    if !is_callable(&attr) {
        return Err(EntryPointError::NotCallable(method.to_string()));
    }
    Ok(())
}

fn is_callable(obj: &Bound<'_, PyAny>) -> bool {
    obj.is_callable()
}

/// Load a module by dotted name against the file's parent directory
/// prepended to `sys.path`; on failure, fall back to loading directly
/// from the file path via `importlib.util` (spec §4.1, §9 "searches
/// upward from the file's directory for a project marker").
///
/// `module_name` is invalidated in `sys.modules` first: CPython's import
/// system caches by name process-wide, and `module_name` is the same
/// string across a run's baseline and every fix attempt for a given
/// config, so a prior successful import must not shadow a file the
/// orchestrator just rewrote on disk.
pub(crate) fn import_module<'py>(
    py: Python<'py>,
    file_path: &Path,
    module_name: &str,
) -> Result<Bound<'py, PyModule>, EntryPointError> {
    let root = project_root(file_path);
    prepend_sys_path(py, &root).map_err(|e| EntryPointError::ModuleNotFound(format!("sys.path setup failed: {e}")))?;
    invalidate_module_cache(py, module_name).map_err(|e| EntryPointError::ModuleNotFound(format!("sys.modules invalidation failed: {e}")))?;

    match PyModule::import(py, module_name) {
        Ok(module) => Ok(module),
        Err(_) => load_module_from_path(py, file_path, module_name),
    }
}

/// `if module_name in sys.modules: del sys.modules[module_name]`, so the
/// next `PyModule::import` always re-reads the file from disk instead of
/// returning a cached module object from before a fix was applied.
fn invalidate_module_cache(py: Python<'_>, module_name: &str) -> PyResult<()> {
    let sys = PyModule::import(py, "sys")?;
    let modules = sys.getattr("modules")?;
    modules.call_method1("pop", (module_name, py.None()))?;
    Ok(())
}

/// Search upward from the file's directory for a well-known project
/// marker (`pyproject.toml`, `setup.py`, `.git`); absent one, the file's
/// own directory is the root (spec §9).
fn project_root(file_path: &Path) -> PathBuf {
    let start = file_path.parent().unwrap_or_else(|| Path::new("."));
    let markers = ["pyproject.toml", "setup.py", ".git"];
    let mut dir = start;
    loop {
        if markers.iter().any(|m| dir.join(m).exists()) {
            return dir.to_path_buf();
        }
        match dir.parent() {
            Some(parent) => dir = parent,
            None => return start.to_path_buf(),
        }
    }
}

fn prepend_sys_path(py: Python<'_>, dir: &Path) -> PyResult<()> {
    let sys = PyModule::import(py, "sys")?;
    let path = sys.getattr("path")?;
    let dir_str = dir.to_string_lossy().to_string();
    let contains: bool = path.call_method1("__contains__", (dir_str.clone(),))?.extract()?;
    if !contains {
        path.call_method1("insert", (0, dir_str))?;
    }
    Ok(())
}

fn load_module_from_path<'py>(
    py: Python<'py>,
    file_path: &Path,
    module_name: &str,
) -> Result<Bound<'py, PyModule>, EntryPointError> {
    if !file_path.exists() {
        return Err(EntryPointError::ModuleNotFound(format!("{}", file_path.display())));
    }
    let importlib_util = PyModule::import(py, "importlib.util")
        .map_err(|e| EntryPointError::ModuleNotFound(format!("importlib.util unavailable: {e}")))?;
    let spec = importlib_util
        .call_method1("spec_from_file_location", (module_name, file_path.to_string_lossy().to_string()))
        .map_err(|e| EntryPointError::ModuleNotFound(format!("{}: {e}", file_path.display())))?;
    if spec.is_none() {
        return Err(EntryPointError::ModuleNotFound(file_path.display().to_string()));
    }
    let module = importlib_util
        .call_method1("module_from_spec", (&spec,))
        .map_err(|e| EntryPointError::ModuleNotFound(format!("{e}")))?;
    let loader = spec.getattr("loader").map_err(|e| EntryPointError::ModuleNotFound(format!("{e}")))?;
    loader
        .call_method1("exec_module", (&module,))
        .map_err(|e| EntryPointError::ModuleNotFound(format!("executing {}: {e}", file_path.display())))?;
    module.downcast_into::<PyModule>().map_err(|e| EntryPointError::ModuleNotFound(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn write_agent(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("agent.py");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    #[serial]
    fn resolves_free_function() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_agent(&dir, "def run(x):\n    return x\n");
        let entry = AgentEntryPointConfig {
            module: "agent".into(),
            class: None,
            method: Some("run".into()),
            fallback_to_function: true,
        };
        let resolved = EntryPointResolver::resolve(&path, &entry).unwrap();
        assert!(matches!(resolved.callable, Callable::Function { .. }));
    }

    #[test]
    #[serial]
    fn resolves_class_method() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_agent(&dir, "class Agent:\n    def run(self, x):\n        return x\n");
        let entry = AgentEntryPointConfig {
            module: "agent".into(),
            class: Some("Agent".into()),
            method: Some("run".into()),
            fallback_to_function: true,
        };
        let resolved = EntryPointResolver::resolve(&path, &entry).unwrap();
        assert!(matches!(resolved.callable, Callable::Method { .. }));
    }

    #[test]
    #[serial]
    fn falls_back_to_function_on_missing_class() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_agent(&dir, "def run(x):\n    return x\n");
        let entry = AgentEntryPointConfig {
            module: "agent".into(),
            class: Some("MissingAgent".into()),
            method: Some("run".into()),
            fallback_to_function: true,
        };
        let resolved = EntryPointResolver::resolve(&path, &entry).unwrap();
        assert!(matches!(resolved.callable, Callable::Function { .. }));
    }

    #[test]
    #[serial]
    fn errors_on_missing_symbol_without_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_agent(&dir, "def run(x):\n    return x\n");
        let entry = AgentEntryPointConfig {
            module: "agent".into(),
            class: Some("MissingAgent".into()),
            method: Some("run".into()),
            fallback_to_function: false,
        };
        let err = EntryPointResolver::resolve(&path, &entry).unwrap_err();
        assert!(matches!(err, EntryPointError::SymbolNotFound(_)));
    }
}
