use crate::errors::HostError;
use crate::host::Host;
use async_trait::async_trait;
use log;
use std::fmt::Debug;

/*
 * A Manager owns one piece of desired host state. has_drifted() only looks,
 * ensure() makes it so. Calling ensure() on a host that hasn't drifted must
 * leave it untouched.
 */
#[async_trait]
pub trait Manager: Debug + Send + Sync {

    /* short human readable description, e.g. "file /etc/sysctl.d/k8s.conf" */
    fn describe(&self) -> String;

    async fn has_drifted(&self, host: &dyn Host) -> Result<bool, HostError>;

    async fn ensure(&self, host: &dyn Host) -> Result<(), HostError>;
}

/*
 * Bring the manager's state in place only when it has drifted. Returns
 * whether anything was changed.
 */
pub async fn converge(manager: &dyn Manager, host: &dyn Host) -> Result<bool, HostError> {
    if !manager.has_drifted(host).await? {
	log::debug!("{} is up to date", manager.describe());
	return Ok(false);
    }

    log::info!("updating {}", manager.describe());
    manager.ensure(host).await?;
    Ok(true)
}
