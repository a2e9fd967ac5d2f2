pub mod build;
pub mod member;
pub mod namespace;
pub mod pipeline;
pub mod project;
pub mod protected_branch;

pub use build::Build;
pub use member::AccessLevel;
pub use namespace::Namespace;
pub use pipeline::Pipeline;
pub use project::{Project, Visibility};
pub use protected_branch::{BranchAccess, ProtectedBranch};
