//! Python interop: entry-point resolution (C1), argument materialization
//! (C2), and execution (C3). Grounded in the teacher's `ota/sandbox_runner.rs`
//! (subprocess/interpreter isolation) and `ota/test_runner.rs` (invoking a
//! user-supplied callable and capturing its result), reimplemented against
//! an embedded interpreter via `pyo3` since the agent under test is Python.

pub mod engine;
pub mod import_proxy;
pub mod materializer;
pub mod resolver;

pub use engine::{ExecutionEngine, ExecutionOutput};
pub use materializer::InputMaterializer;
pub use resolver::{EntryPointResolver, ResolvedEntryPoint};
