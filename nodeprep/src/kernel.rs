use crate::errors::Error;
use configc::{Host, KernelModule, Manager};
use log;
use nodeprep_api::config::KernelConfig;

/*
 * Everything the kernel prerequisites want to see on the host, in the order
 * they must be applied: boot time declaration, live modules, then the
 * sysctls (net.bridge.* only exists once br_netfilter is in).
 */
pub fn managers(kernel: &KernelConfig) -> Vec<Box<dyn Manager>> {
    let mut managers: Vec<Box<dyn Manager>> = vec![];

    managers.push(Box::new(configc::File::new(&kernel.modules_file, &kernel.modules.render(), 0o644)));
    for module in kernel.modules.iter() {
	managers.push(Box::new(KernelModule::new(module)));
    }
    managers.push(Box::new(configc::File::new(&kernel.sysctl_file, &kernel.sysctls.render(), 0o644)));
    for (name, value) in kernel.sysctls.iter() {
	managers.push(Box::new(configc::Sysctl::new(name, value)));
    }
    managers
}

/*
 * The one explicit fail-fast check of the run: after the load attempts the
 * required module must be in the live module list.
 */
pub async fn verify_module(host: &dyn Host, name: &str) -> Result<(), Error> {
    let module = KernelModule::new(name);

    if !module.is_loaded(host).await? {
	log::error!("{} is missing from the live module list", name);
	return Err(Error::ModuleNotLoaded(name.to_string()));
    }
    log::debug!("{} is loaded", name);
    Ok(())
}

/*
 * Declare, load, verify, persist and apply. Returns whether anything
 * changed on the host.
 */
pub async fn configure(host: &dyn Host, kernel: &KernelConfig) -> Result<bool, Error> {
    let mut changed = false;

    let modules_file = configc::File::new(&kernel.modules_file, &kernel.modules.render(), 0o644);
    changed |= configc::converge(&modules_file, host).await?;

    for module in kernel.modules.iter() {
	changed |= configc::converge(&KernelModule::new(module), host).await?;
    }

    verify_module(host, &kernel.required_module).await?;

    let sysctl_file = configc::File::new(&kernel.sysctl_file, &kernel.sysctls.render(), 0o644);
    changed |= configc::converge(&sysctl_file, host).await?;
    host.apply_sysctl().await?;

    /* whatever `sysctl --system` didn't settle (overridden by a later file) */
    for (name, value) in kernel.sysctls.iter() {
	let sysctl = configc::Sysctl::new(name, value);
	if configc::converge(&sysctl, host).await? {
	    log::warn!("{}={} was overridden by another sysctl.d file, set it live", name, value);
	    changed = true;
	}
    }

    Ok(changed)
}
