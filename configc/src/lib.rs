/*
 * configc - converge a Linux host towards a desired configuration.
 *
 * Everything goes through the Host trait so the same managers run against
 * the real machine (SystemHost) or an in-memory one (FakeHost).
 */

pub mod errors;
pub use errors::HostError;

pub mod host;
pub use host::Host;

pub mod manager;
pub use manager::Manager;
pub use manager::converge;

mod file;
pub use file::File;
pub use file::Lines;
pub use file::Rewrite;

mod module;
pub use module::KernelModule;

mod sysctl;
pub use sysctl::Sysctl;

pub mod system;
pub use system::SystemHost;

pub mod fake;
pub use fake::FakeHost;
