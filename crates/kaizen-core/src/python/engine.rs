use std::collections::HashMap;
use std::time::Instant;

use pyo3::prelude::*;
use pyo3::types::PyTuple;

use crate::config::AgentEntryPointConfig;
use crate::error::{KaizenError, KaizenResult};
use crate::model::InputDefinition;

use super::import_proxy::{ImportProxyInstaller, DEFAULT_OPTIONAL_PACKAGES};
use super::materializer::InputMaterializer;
use super::resolver::{import_module, Callable, EntryPointResolver};

/// `{return_value, tracked_values, stdout?, stderr?, duration_ms}`
/// (spec §4.3).
#[derive(Debug, Clone)]
pub struct ExecutionOutput {
    pub return_value: serde_json::Value,
    pub tracked_values: HashMap<String, String>,
    pub duration_ms: u64,
}

/// Invokes the resolved callable with materialized arguments, uniformly
/// across sync and async callables, tolerating optional missing imports,
/// and capturing tracked instance attributes (spec §4.3).
pub struct ExecutionEngine {
    file_path: std::path::PathBuf,
    entry: AgentEntryPointConfig,
    required_dependencies: Vec<String>,
    tracked_variables: Vec<String>,
}

impl ExecutionEngine {
    pub fn new(file_path: std::path::PathBuf, entry: AgentEntryPointConfig, required_dependencies: Vec<String>, tracked_variables: Vec<String>) -> Self {
        Self { file_path, entry, required_dependencies, tracked_variables }
    }

    /// Validate that required dependencies resolve and the entry point is
    /// callable, without invoking user code. Call once per run, before the
    /// baseline executes (spec §4.3 "missing required packages surface a
    /// fatal error before any test runs").
    pub async fn preflight(&self) -> KaizenResult<()> {
        let file_path = self.file_path.clone();
        let entry = self.entry.clone();
        let required = self.required_dependencies.clone();
        tokio::task::spawn_blocking(move || {
            Python::with_gil(|py| {
                let allow: Vec<String> = DEFAULT_OPTIONAL_PACKAGES.iter().map(|s| s.to_string()).collect();
                ImportProxyInstaller::install(py, &allow, &required)?;
                EntryPointResolver::resolve(&file_path, &entry)?;
                Ok(())
            })
        })
        .await
        .map_err(|e| KaizenError::UserCode(format!("preflight task panicked: {e}")))?
    }

    /// Invoke the entry point with `inputs`, driving an awaitable result to
    /// completion if the callable is async. Always runs on a dedicated
    /// blocking-pool thread so a caller-side Tokio runtime is never
    /// re-entered by a nested Python event loop (spec §4.3, §9).
    pub async fn execute(&self, inputs: Vec<InputDefinition>) -> KaizenResult<ExecutionOutput> {
        let file_path = self.file_path.clone();
        let entry = self.entry.clone();
        let required = self.required_dependencies.clone();
        let tracked_names = self.tracked_variables.clone();

        tokio::task::spawn_blocking(move || {
            Python::with_gil(|py| {
                let allow: Vec<String> = DEFAULT_OPTIONAL_PACKAGES.iter().map(|s| s.to_string()).collect();
                ImportProxyInstaller::install(py, &allow, &required)?;
                let resolved = EntryPointResolver::resolve(&file_path, &entry)?;
                let module = import_module(py, &file_path, &resolved.module_name)
                    .map_err(|e| KaizenError::UserCode(e.to_string()))?;

                let args = InputMaterializer::materialize(py, &inputs)?;
                let bound_args: Vec<Bound<'_, PyAny>> = args.iter().map(|a| a.bind(py).clone()).collect();
                let args_tuple = PyTuple::new(py, bound_args).map_err(to_user_code_error)?;

                let start = Instant::now();
                let (raw_result, instance) = match &resolved.callable {
                    Callable::Function { name } => {
                        let func = module.getattr(name.as_str()).map_err(to_user_code_error)?;
                        (func.call1(args_tuple).map_err(to_user_code_error)?, None)
                    }
                    Callable::Method { class, method } => {
                        let class_obj = module.getattr(class.as_str()).map_err(to_user_code_error)?;
                        let instance = class_obj.call0().map_err(to_user_code_error)?;
                        let bound_method = instance.getattr(method.as_str()).map_err(to_user_code_error)?;
                        let result = bound_method.call1(args_tuple).map_err(to_user_code_error)?;
                        (result, Some(instance))
                    }
                    Callable::CallableInstance { class } => {
                        let class_obj = module.getattr(class.as_str()).map_err(to_user_code_error)?;
                        let instance = class_obj.call0().map_err(to_user_code_error)?;
                        let result = instance.call1(args_tuple).map_err(to_user_code_error)?;
                        (result, Some(instance))
                    }
                };

                let return_value = drive_to_completion(py, raw_result).map_err(to_user_code_error)?;
                let duration_ms = start.elapsed().as_millis() as u64;

                let return_json = py_to_json(py, &return_value).map_err(to_user_code_error)?;
                let tracked_values = match &instance {
                    Some(instance) => capture_tracked(py, instance, &tracked_names).map_err(to_user_code_error)?,
                    None => HashMap::new(),
                };

                Ok(ExecutionOutput { return_value: return_json, tracked_values, duration_ms })
            })
        })
        .await
        .map_err(|e| KaizenError::UserCode(format!("execution task panicked: {e}")))?
    }
}

fn to_user_code_error(e: PyErr) -> KaizenError {
    KaizenError::UserCode(e.to_string())
}

/// If `result` is awaitable, drive it to completion via `asyncio.run`
/// (spec §4.3 "coroutine handling"); otherwise return it unchanged. Since
/// this always executes on a dedicated blocking-pool thread with no
/// pre-existing event loop, `asyncio.run` never raises for "already
/// running loop" — the dedicated-thread dispatch is what the spec's
/// "schedule on a private loop hosted by a worker thread" rule collapses
/// to when there is no ambient loop to avoid re-entering.
fn drive_to_completion<'py>(py: Python<'py>, result: Bound<'py, PyAny>) -> PyResult<Bound<'py, PyAny>> {
    let inspect = PyModule::import(py, "inspect")?;
    let is_coroutine: bool = inspect.call_method1("iscoroutine", (&result,))?.extract()?;
    let is_awaitable: bool = inspect.call_method1("isawaitable", (&result,))?.extract()?;
    if is_coroutine || is_awaitable {
        let asyncio = PyModule::import(py, "asyncio")?;
        asyncio.call_method1("run", (result,))
    } else {
        Ok(result)
    }
}

/// Read each named public attribute off `instance` after the call and
/// record its string projection (spec §4.3 "tracked variables"). Unnamed
/// attributes are not captured — only those declared in configuration.
fn capture_tracked(py: Python<'_>, instance: &Bound<'_, PyAny>, names: &[String]) -> PyResult<HashMap<String, String>> {
    let mut out = HashMap::new();
    for name in names {
        if name.starts_with('_') {
            continue;
        }
        if let Ok(value) = instance.getattr(name.as_str()) {
            let text: String = value.call_method0("__str__").and_then(|s| s.extract()).unwrap_or_else(|_| "<unrepresentable>".to_string());
            out.insert(name.clone(), text);
        }
        let _ = py;
    }
    Ok(out)
}

/// Best-effort conversion of a Python return value to JSON for storage in
/// `TestCaseResult`. Falls back to `str()` for values with no natural JSON
/// shape (custom objects, etc).
fn py_to_json(py: Python<'_>, value: &Bound<'_, PyAny>) -> PyResult<serde_json::Value> {
    if value.is_none() {
        return Ok(serde_json::Value::Null);
    }
    if let Ok(b) = value.extract::<bool>() {
        return Ok(serde_json::Value::Bool(b));
    }
    if let Ok(i) = value.extract::<i64>() {
        return Ok(serde_json::json!(i));
    }
    if let Ok(f) = value.extract::<f64>() {
        return Ok(serde_json::json!(f));
    }
    if let Ok(s) = value.extract::<String>() {
        return Ok(serde_json::Value::String(s));
    }
    if let Ok(list) = value.downcast::<pyo3::types::PyList>() {
        let items: PyResult<Vec<_>> = list.iter().map(|item| py_to_json(py, &item)).collect();
        return Ok(serde_json::Value::Array(items?));
    }
    if let Ok(dict) = value.downcast::<pyo3::types::PyDict>() {
        let mut map = serde_json::Map::new();
        for (k, v) in dict.iter() {
            let key: String = k.str()?.extract()?;
            map.insert(key, py_to_json(py, &v)?);
        }
        return Ok(serde_json::Value::Object(map));
    }
    let text: String = value.str()?.extract()?;
    Ok(serde_json::Value::String(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn write_agent(dir: &tempfile::TempDir, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join("agent.py");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[tokio::test]
    #[serial]
    async fn executes_sync_free_function() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_agent(&dir, "def run(x):\n    return x.upper()\n");
        let entry = AgentEntryPointConfig { module: "agent".into(), class: None, method: Some("run".into()), fallback_to_function: true };
        let engine = ExecutionEngine::new(path, entry, vec![], vec![]);
        let out = engine.execute(vec![InputDefinition::String { value: "hello".into() }]).await.unwrap();
        assert_eq!(out.return_value, serde_json::json!("HELLO"));
    }

    #[tokio::test]
    #[serial]
    async fn executes_async_method_and_tracks_attribute() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_agent(
            &dir,
            "class Agent:\n    def __init__(self):\n        self.counter = 0\n    async def run(self, x):\n        self.counter += 1\n        return x\n",
        );
        let entry = AgentEntryPointConfig { module: "agent".into(), class: Some("Agent".into()), method: Some("run".into()), fallback_to_function: true };
        let engine = ExecutionEngine::new(path, entry, vec![], vec!["counter".to_string()]);
        let out = engine.execute(vec![InputDefinition::String { value: "x".into() }]).await.unwrap();
        assert_eq!(out.return_value, serde_json::json!("x"));
        assert_eq!(out.tracked_values.get("counter"), Some(&"1".to_string()));
        assert!(out.duration_ms < 5_000);
    }

    #[tokio::test]
    #[serial]
    async fn tolerates_missing_optional_import_not_on_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_agent(
            &dir,
            "try:\n    import llama_index\nexcept ImportError:\n    llama_index = None\n\ndef run(x):\n    return x\n",
        );
        let entry = AgentEntryPointConfig { module: "agent".into(), class: None, method: Some("run".into()), fallback_to_function: true };
        let engine = ExecutionEngine::new(path, entry, vec![], vec![]);
        let out = engine.execute(vec![InputDefinition::String { value: "ok".into() }]).await.unwrap();
        assert_eq!(out.return_value, serde_json::json!("ok"));
    }
}
