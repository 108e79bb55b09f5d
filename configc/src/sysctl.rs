use crate::errors::HostError;
use crate::host::Host;
use crate::manager::Manager;
use async_trait::async_trait;

/*
 * Sysctl: the live value of a kernel tunable, as read from /proc/sys. The
 * persistent side (the sysctl.d file) is a plain File.
 */
#[derive(Debug, Clone)]
pub struct Sysctl {
    name: String,
    value: String,
}

impl Sysctl {
    pub fn new(name: &str, value: &str) -> Self {
	Self{
	    name: name.to_string(),
	    value: value.to_string(),
	}
    }
}

#[async_trait]
impl Manager for Sysctl {

    fn describe(&self) -> String {
	format!("sysctl {}={}", self.name, self.value)
    }

    async fn has_drifted(&self, host: &dyn Host) -> Result<bool, HostError> {
	match host.read_sysctl(&self.name).await? {
	    Some(current) => Ok(current.trim() != self.value.trim()),
	    None => Ok(true),
	}
    }

    async fn ensure(&self, host: &dyn Host) -> Result<(), HostError> {
	host.set_sysctl(&self.name, &self.value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeHost;
    use crate::manager::converge;

    #[tokio::test]
    async fn test_sysctl_converges() {
	let host = FakeHost::new();
	let sysctl = Sysctl::new("net.ipv4.ip_forward", "1");

	assert!(sysctl.has_drifted(&host).await.unwrap());
	assert!(converge(&sysctl, &host).await.unwrap());
	assert_eq!(host.sysctl("net.ipv4.ip_forward"), Some(String::from("1")));
	assert!(!converge(&sysctl, &host).await.unwrap());
	assert_eq!(host.calls(), vec!["sysctl -w net.ipv4.ip_forward=1"]);
    }
}
