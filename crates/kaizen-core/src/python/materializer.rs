use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use crate::error::{KaizenError, KaizenResult};
use crate::model::InputDefinition;

/// Turns a declarative input list into positional call arguments (spec
/// §4.2). Each definition is materialized independently; the result is
/// an owned, GIL-independent handle (`Py<PyAny>`) so the engine can carry
/// it across the sync/async dispatch boundary.
pub struct InputMaterializer;

impl InputMaterializer {
    pub fn materialize(py: Python<'_>, definitions: &[InputDefinition]) -> KaizenResult<Vec<Py<PyAny>>> {
        definitions
            .iter()
            .enumerate()
            .map(|(index, def)| materialize_one(py, def).map_err(|message| KaizenError::InputMaterialization { index, message }))
            .collect()
    }
}

fn materialize_one(py: Python<'_>, def: &InputDefinition) -> Result<Py<PyAny>, String> {
    let result: PyResult<Py<PyAny>> = (|| match def {
        InputDefinition::String { value } => Ok(value.into_pyobject(py)?.into_any().unbind()),
        InputDefinition::Number { value } => Ok(value.into_pyobject(py)?.into_any().unbind()),
        InputDefinition::Bool { value } => Ok(value.into_pyobject(py)?.to_owned().into_any().unbind()),
        InputDefinition::List { value } => {
            let list = PyList::empty(py);
            for item in value {
                list.append(json_to_py(py, item)?)?;
            }
            Ok(list.into_any().unbind())
        }
        InputDefinition::Map { value } => {
            let dict = PyDict::new(py);
            for (k, v) in value {
                dict.set_item(k, json_to_py(py, v)?)?;
            }
            Ok(dict.into_any().unbind())
        }
        InputDefinition::Object { class_path, value } => {
            let class = import_class(py, class_path)?;
            let kwargs = PyDict::new(py);
            for (k, v) in value {
                kwargs.set_item(k, json_to_py(py, v)?)?;
            }
            Ok(class.call((), Some(&kwargs))?.unbind())
        }
        InputDefinition::ClassObject { import_path, pickle_path } => {
            if let Some(path) = import_path {
                Ok(import_class(py, path)?.unbind())
            } else if let Some(path) = pickle_path {
                let pickle = PyModule::import(py, "pickle")?;
                let builtins = PyModule::import(py, "builtins")?;
                let file = builtins.call_method1("open", (path.to_string_lossy().to_string(), "rb"))?;
                let obj = pickle.call_method1("load", (&file,))?;
                file.call_method0("close")?;
                Ok(obj.unbind())
            } else {
                Err(pyo3::exceptions::PyValueError::new_err(
                    "class_object requires either import_path or pickle_path",
                ))
            }
        }
        InputDefinition::InlineObject { class_path, attributes } => {
            let class = import_class(py, class_path)?;
            let instance = class.call0()?;
            for (k, v) in attributes {
                instance.setattr(k.as_str(), json_to_py(py, v)?)?;
            }
            Ok(instance.unbind())
        }
    })();
    result.map_err(|e| e.to_string())
}

/// Import `module.sub:ClassName` or `module.sub.ClassName` by splitting on
/// the last dotted component and importing the remainder as a module.
fn import_class<'py>(py: Python<'py>, dotted_path: &str) -> PyResult<Bound<'py, PyAny>> {
    let (module_path, class_name) = dotted_path
        .rsplit_once('.')
        .ok_or_else(|| pyo3::exceptions::PyValueError::new_err(format!("invalid class path: {dotted_path}")))?;
    let module = PyModule::import(py, module_path)?;
    module.getattr(class_name)
}

fn json_to_py(py: Python<'_>, value: &serde_json::Value) -> PyResult<Py<PyAny>> {
    use serde_json::Value;
    match value {
        Value::Null => Ok(py.None()),
        Value::Bool(b) => Ok(b.into_pyobject(py)?.to_owned().into_any().unbind()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i.into_pyobject(py)?.into_any().unbind())
            } else {
                Ok(n.as_f64().unwrap_or(0.0).into_pyobject(py)?.into_any().unbind())
            }
        }
        Value::String(s) => Ok(s.into_pyobject(py)?.into_any().unbind()),
        Value::Array(items) => {
            let list = PyList::empty(py);
            for item in items {
                list.append(json_to_py(py, item)?)?;
            }
            Ok(list.into_any().unbind())
        }
        Value::Object(map) => {
            let dict = PyDict::new(py);
            for (k, v) in map {
                dict.set_item(k, json_to_py(py, v)?)?;
            }
            Ok(dict.into_any().unbind())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn materializes_primitives() {
        Python::with_gil(|py| {
            let defs = vec![
                InputDefinition::String { value: "hello".into() },
                InputDefinition::Number { value: 3.5 },
                InputDefinition::Bool { value: true },
            ];
            let args = InputMaterializer::materialize(py, &defs).unwrap();
            assert_eq!(args.len(), 3);
            let s: String = args[0].extract(py).unwrap();
            assert_eq!(s, "hello");
        });
    }

    #[test]
    #[serial]
    fn materializes_list_and_map() {
        Python::with_gil(|py| {
            let defs = vec![
                InputDefinition::List { value: vec![serde_json::json!(1), serde_json::json!("a")] },
                InputDefinition::Map { value: [("k".to_string(), serde_json::json!(1))].into_iter().collect() },
            ];
            let args = InputMaterializer::materialize(py, &defs).unwrap();
            assert_eq!(args.len(), 2);
        });
    }
}
