use pyo3::prelude::*;
use pyo3::types::PyList;

use crate::error::{KaizenError, KaizenResult};

/// Embedded shim that installs a `sys.meta_path` finder proxying imports
/// for an allow-listed set of optional packages: a failed import of an
/// allow-listed package (or any of its submodules) yields an inert stand-in
/// object whose attribute access and calls return further stand-ins,
/// instead of raising `ModuleNotFoundError` (spec §4.3 "import tolerance",
/// §9 "dynamic third-party imports"). Declared `required` packages bypass
/// the proxy entirely and must resolve normally.
const PROXY_SHIM: &str = r#"
import sys
import types

class _KaizenProxyObject:
    def __getattr__(self, name):
        return _KaizenProxyObject()

    def __call__(self, *args, **kwargs):
        return _KaizenProxyObject()

    def __iter__(self):
        return iter(())

    def __bool__(self):
        return False

    def __repr__(self):
        return "<kaizen-proxy>"


class _KaizenProxyLoader:
    def create_module(self, spec):
        module = types.ModuleType(spec.name)
        module.__getattr__ = lambda name: _KaizenProxyObject()
        return module

    def exec_module(self, module):
        pass


class _KaizenProxyFinder:
    def __init__(self, allow_prefixes):
        self.allow_prefixes = tuple(allow_prefixes)

    def find_spec(self, fullname, path, target=None):
        top = fullname.split(".", 1)[0]
        if top not in self.allow_prefixes:
            return None
        return importlib.util.spec_from_loader(fullname, _KaizenProxyLoader())


import importlib.util


def install(allow_list):
    # Remove any finder installed by a prior run (tests re-install per case).
    sys.meta_path[:] = [f for f in sys.meta_path if not isinstance(f, _KaizenProxyFinder)]
    sys.meta_path.append(_KaizenProxyFinder(allow_list))
"#;

/// Default allow-list of optional third-party packages commonly imported
/// by LLM agents under test and guarded with `try/except ImportError`.
pub const DEFAULT_OPTIONAL_PACKAGES: &[&str] =
    &["llama_index", "langchain", "openai", "anthropic", "cohere", "transformers", "torch"];

pub struct ImportProxyInstaller;

impl ImportProxyInstaller {
    /// Install the proxy finder for `allow_list`, then verify every
    /// `required` package resolves normally. A missing required package is
    /// fatal and surfaces before any test runs (spec §4.3, §7).
    pub fn install(py: Python<'_>, allow_list: &[String], required: &[String]) -> KaizenResult<()> {
        let shim = PyModule::from_code(py, std::ffi::CString::new(PROXY_SHIM).unwrap().as_c_str(), c"kaizen_proxy_shim.py", c"kaizen_proxy_shim")
            .map_err(|e| KaizenError::Configuration(format!("failed to install import proxy shim: {e}")))?;
        let list = PyList::new(py, allow_list).map_err(|e| KaizenError::Configuration(e.to_string()))?;
        shim.call_method1("install", (list,))
            .map_err(|e| KaizenError::Configuration(format!("failed to install import proxy: {e}")))?;

        for package in required {
            if PyModule::import(py, package.as_str()).is_err() {
                return Err(KaizenError::Environment(format!(
                    "required dependency `{package}` is not installed in the test environment"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn proxies_allow_listed_missing_package() {
        Python::with_gil(|py| {
            let allow = vec!["definitely_not_a_real_package_xyz".to_string()];
            ImportProxyInstaller::install(py, &allow, &[]).unwrap();
            let module = PyModule::import(py, "definitely_not_a_real_package_xyz");
            assert!(module.is_ok(), "proxy should satisfy the import");
        });
    }

    #[test]
    #[serial]
    fn required_missing_package_is_fatal() {
        Python::with_gil(|py| {
            let required = vec!["definitely_not_a_real_required_pkg_xyz".to_string()];
            let result = ImportProxyInstaller::install(py, &[], &required);
            assert!(result.is_err());
        });
    }
}
