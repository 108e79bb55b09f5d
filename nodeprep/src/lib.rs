/*
 * nodeprep - prepare a RHEL family host to join a Kubernetes cluster with
 * kubeadm and the cri-o runtime.
 */

pub mod errors;
pub use errors::Error;

pub mod kernel;

pub mod provisioner;
pub use provisioner::Provisioner;
pub use provisioner::Step;

pub mod report;
pub use report::ProvisionReport;

pub mod resolver;
