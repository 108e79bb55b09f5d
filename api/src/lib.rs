/*
 * nodeprep/api - the data model shared by the provisioner: versions, os
 * release, repositories, kernel prerequisites, node roles and the
 * configuration file.
 */

pub mod config;
pub use config::NodeprepConfig;

pub mod errors;
pub use errors::Error;

pub mod kernel;
pub use kernel::ModuleSet;
pub use kernel::SysctlSet;

pub mod node;
pub use node::NodeRole;
pub use node::RoleSetting;
pub use node::StepState;

pub mod osrelease;
pub use osrelease::OsRelease;

pub mod repo;
pub use repo::RepoDescriptor;
pub use repo::RepoSource;

pub mod version;
pub use version::KubeVersion;
pub use version::RuntimeVersion;
