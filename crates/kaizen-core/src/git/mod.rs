//! Git working-tree operations and the hosting-provider REST API, the two
//! external systems C12 talks to (spec §4.12, §6). Grounded in the
//! teacher's `autonomous/branch_manager.rs`: a `GitExecutor` trait abstracts
//! the subprocess boundary so tests can mock it, and a small value type
//! (`PullRequestSpec`) carries everything one PR needs.

mod executor;
mod hosting;
mod remote;

pub use executor::{GitExecutor, GitOpResult, GitOps, RealGitExecutor};
pub use hosting::{HostingClient, HostingError, PullRequestSpec};
pub use remote::RemoteRepo;
