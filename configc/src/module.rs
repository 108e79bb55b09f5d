use crate::errors::HostError;
use crate::host::Host;
use crate::manager::Manager;
use async_trait::async_trait;

/*
 * KernelModule: a module that must be present in the running kernel. Boot
 * time loading is the job of a modules-load.d File.
 */
#[derive(Debug, Clone)]
pub struct KernelModule {
    name: String,
}

impl KernelModule {
    pub fn new(name: &str) -> Self {
	Self{ name: name.to_string() }
    }

    pub fn name(&self) -> &str {
	&self.name
    }

    pub async fn is_loaded(&self, host: &dyn Host) -> Result<bool, HostError> {
	let loaded = host.list_modules().await?;
	Ok(loaded.iter().any(|m| m == &self.name))
    }
}

#[async_trait]
impl Manager for KernelModule {

    fn describe(&self) -> String {
	format!("kernel module {}", self.name)
    }

    async fn has_drifted(&self, host: &dyn Host) -> Result<bool, HostError> {
	Ok(!self.is_loaded(host).await?)
    }

    async fn ensure(&self, host: &dyn Host) -> Result<(), HostError> {
	host.load_module(&self.name).await
    }
}
