use crate::errors::Error;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum NodeRole {
    /* runs the api server and the scheduler, gets `kubeadm init` */
    ControlPlane,

    /* runs workloads, gets `kubeadm join` */
    Worker,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	match self {
	    NodeRole::ControlPlane => write!(f, "control-plane"),
	    NodeRole::Worker => write!(f, "worker"),
	}
    }
}

/*
 * RoleSetting is what the operator writes in the configuration. `auto` keeps
 * the old hostname convention around, but refuses to guess when the hostname
 * says nothing about the role.
 */
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum RoleSetting {
    ControlPlane,
    Worker,
    Auto,
}

impl FromStr for RoleSetting {
    type Err = Error;

    /* same words as the configuration file */
    fn from_str(input: &str) -> Result<Self, Self::Err> {
	match input.trim() {
	    "control-plane" => Ok(RoleSetting::ControlPlane),
	    "worker" => Ok(RoleSetting::Worker),
	    "auto" => Ok(RoleSetting::Auto),
	    _ => Err(Error::InvalidRole(input.to_string())),
	}
    }
}

impl RoleSetting {

    /*
     * Resolve the effective role. The hostname is only looked at for `auto`.
     */
    pub fn resolve(&self, hostname: &str) -> Result<NodeRole, Error> {
	match self {
	    RoleSetting::ControlPlane => Ok(NodeRole::ControlPlane),
	    RoleSetting::Worker => Ok(NodeRole::Worker),
	    RoleSetting::Auto => infer_role(hostname),
	}
    }
}

fn infer_role(hostname: &str) -> Result<NodeRole, Error> {
    let name = hostname.to_lowercase();

    if name.contains("master") || name.contains("control") {
	return Ok(NodeRole::ControlPlane);
    }
    if name.contains("worker") {
	return Ok(NodeRole::Worker);
    }
    Err(Error::AmbiguousRole(hostname.to_string()))
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StepState {
    /*
     * The step did its work
     */
    DONE,

    /*
     * Nothing had drifted, the host was already in the desired state
     */
    UNCHANGED,

    /*
     * Not applicable on this host, or turned off in the configuration
     */
    SKIPPED,
}

impl ToString for StepState {
    fn to_string(&self) -> String {
	match self {
	    StepState::DONE => String::from("done"),
	    StepState::UNCHANGED => String::from("unchanged"),
	    StepState::SKIPPED => String::from("skipped"),
	}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_role_ignores_hostname() {
	assert_eq!(RoleSetting::Worker.resolve("master-1").unwrap(), NodeRole::Worker);
	assert_eq!(RoleSetting::ControlPlane.resolve("node-x").unwrap(), NodeRole::ControlPlane);
    }

    #[test]
    fn test_auto_role_from_hostname() {
	assert_eq!(RoleSetting::Auto.resolve("master-1").unwrap(), NodeRole::ControlPlane);
	assert_eq!(RoleSetting::Auto.resolve("k8s-Control-1").unwrap(), NodeRole::ControlPlane);
	assert_eq!(RoleSetting::Auto.resolve("worker-3").unwrap(), NodeRole::Worker);
    }

    #[test]
    fn test_auto_role_refuses_to_guess() {
	let err = RoleSetting::Auto.resolve("node-x").unwrap_err();
	assert!(matches!(err, Error::AmbiguousRole(ref h) if h == "node-x"));
    }

    #[test]
    fn test_parse_role_setting() {
	assert_eq!("control-plane".parse::<RoleSetting>().unwrap(), RoleSetting::ControlPlane);
	assert_eq!("worker".parse::<RoleSetting>().unwrap(), RoleSetting::Worker);
	assert_eq!("auto".parse::<RoleSetting>().unwrap(), RoleSetting::Auto);
	assert!("bastion".parse::<RoleSetting>().is_err());
	assert!("Worker".parse::<RoleSetting>().is_err());
	assert!("control".parse::<RoleSetting>().is_err());
    }

    #[test]
    fn test_role_display() {
	assert_eq!(NodeRole::ControlPlane.to_string(), "control-plane");
	assert_eq!(StepState::UNCHANGED.to_string(), "unchanged");
    }
}
