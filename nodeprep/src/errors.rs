use crate::provisioner::Step;
use nodeprep_api as api;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {

    /* configuration, versions, os-release, role */
    #[error(transparent)]
    Api(#[from] api::Error),

    /* encapsulate a failing host collaborator (dnf, systemctl, modprobe, http ...) */
    #[error(transparent)]
    Host(#[from] configc::HostError),

    #[error("unsupported operating system: {0}")]
    UnsupportedOs(String),

    #[error("no node role given: pass --role or set `role` in the configuration")]
    MissingRole,

    #[error("kernel module {0} is not loaded after modprobe")]
    ModuleNotLoaded(String),

    #[error("{url} does not look like a yum repository file")]
    MalformedRepo { url: String },

    #[error("step '{step}' failed: {source}")]
    Step { step: Step, source: Box<Error> },
}

impl Error {

    /*
     * Tag the error with the provisioning step it happened in.
     */
    pub fn at(self, step: Step) -> Error {
	match self {
	    Error::Step { .. } => self,
	    other => Error::Step { step: step, source: Box::new(other) },
	}
    }

    pub fn step(&self) -> Option<Step> {
	match self {
	    Error::Step { step, .. } => Some(*step),
	    _ => None,
	}
    }

    /*
     * The process exit code: the failing tool's own status when there is
     * one, 1 otherwise.
     */
    pub fn exit_code(&self) -> u8 {
	let status = match self {
	    Error::Step { source, .. } => return source.exit_code(),
	    Error::Host(err) => err.exit_status(),
	    _ => None,
	};

	match status {
	    Some(code) if code > 0 && code < 256 => code as u8,
	    _ => 1,
	}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use configc::HostError;

    #[test]
    fn test_step_wrapping_keeps_innermost_step() {
	let err = Error::MissingRole.at(Step::Preflight).at(Step::Report);
	assert_eq!(err.step(), Some(Step::Preflight));
	assert!(err.to_string().starts_with("step 'preflight' failed"));
    }

    #[test]
    fn test_exit_code_from_tool() {
	let host_err = HostError::CommandFailed {
	    command: String::from("dnf install -y cri-o"),
	    status: Some(7),
	    stderr: String::new(),
	};
	let err = Error::from(host_err).at(Step::RuntimeInstall);
	assert_eq!(err.exit_code(), 7);
	assert!(err.to_string().contains("dnf install -y cri-o"));
    }

    #[test]
    fn test_exit_code_defaults_to_one() {
	assert_eq!(Error::ModuleNotLoaded(String::from("br_netfilter")).exit_code(), 1);

	let host_err = HostError::CommandFailed {
	    command: String::from("modprobe br_netfilter"),
	    status: Some(300),
	    stderr: String::new(),
	};
	assert_eq!(Error::from(host_err).exit_code(), 1);
    }
}
