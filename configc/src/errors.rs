use thiserror::Error;

fn exit_text(status: &Option<i32>) -> String {
    match status {
	Some(code) => format!("exit status {}", code),
	None => String::from("killed by signal"),
    }
}

#[derive(Error, Debug)]
pub enum HostError {

    #[error("io error on {path}: {source}")]
    Io { path: String, source: std::io::Error },

    #[error("unable to spawn `{command}`: {source}")]
    Spawn { command: String, source: std::io::Error },

    #[error("`{command}` failed with {}: {stderr}", exit_text(.status))]
    CommandFailed { command: String, status: Option<i32>, stderr: String },

    #[error("`{command}` timed out after {secs} seconds")]
    CommandTimeout { command: String, secs: u64 },

    #[error("unable to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("http client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl HostError {

    /*
     * Exit code of the underlying tool, when there was one.
     */
    pub fn exit_status(&self) -> Option<i32> {
	match self {
	    HostError::CommandFailed { status, .. } => *status,
	    _ => None,
	}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failed_message() {
	let err = HostError::CommandFailed {
	    command: String::from("dnf install -y cri-o"),
	    status: Some(1),
	    stderr: String::from("No match for argument: cri-o"),
	};
	assert_eq!(err.to_string(), "`dnf install -y cri-o` failed with exit status 1: No match for argument: cri-o");
	assert_eq!(err.exit_status(), Some(1));
    }

    #[test]
    fn test_signal_and_non_command_errors() {
	let err = HostError::CommandFailed {
	    command: String::from("modprobe overlay"),
	    status: None,
	    stderr: String::new(),
	};
	assert!(err.to_string().contains("killed by signal"));
	assert_eq!(err.exit_status(), None);

	let err = HostError::Fetch { url: String::from("https://example.invalid"), message: String::from("404") };
	assert_eq!(err.exit_status(), None);
    }
}
