//! The data model of spec.md §3: test cases and their inputs, per-case and
//! per-run results, the append-only execution history, fix attempts, and
//! memory records. Types here carry no behavior beyond small derivations
//! (`Summary::from_cases`, `TestExecutionHistory::best`); the components in
//! `crate::runner`, `crate::orchestrator`, etc. own the behavior.

pub mod attempt;
pub mod history;
pub mod input;
pub mod memory;
pub mod test_case;
pub mod test_result;

pub use attempt::{AttemptStatus, ChangeRecord, FixAttempt};
pub use history::{CaseDelta, TestExecutionHistory};
pub use input::{Criteria, EvaluationSource, EvaluationTarget, InputDefinition};
pub use memory::{LlmInteraction, MemoryRecord};
pub use test_case::{AssertionRule, TestCase};
pub use test_result::{CaseStatus, RunStatus, RunType, Summary, TargetEvaluation, TestCaseResult, TestExecutionResult};
