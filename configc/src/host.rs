use crate::errors::HostError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/*
 * Host is every way the provisioner touches the machine it runs on: the
 * package manager, the init system, the kernel module loader, sysctl, the
 * filesystem and the network. SystemHost talks to the real thing, FakeHost
 * keeps everything in memory for tests.
 */
#[async_trait]
pub trait Host: Send + Sync {

    /* raw contents of /etc/os-release */
    async fn os_release(&self) -> Result<String, HostError>;

    async fn hostname(&self) -> Result<String, HostError>;

    /* home directory of the invoking user, if known */
    fn home_dir(&self) -> Option<PathBuf>;

    /* Ok(None) when the file doesn't exist */
    async fn read_file(&self, path: &Path) -> Result<Option<String>, HostError>;

    /* permission bits of an existing file, Ok(None) when it doesn't exist */
    async fn stat_mode(&self, path: &Path) -> Result<Option<u32>, HostError>;

    /* creates missing parent directories, replaces `path` in one rename */
    async fn write_file(&self, path: &Path, content: &str, mode: u32) -> Result<(), HostError>;

    async fn fetch_url(&self, url: &str) -> Result<String, HostError>;

    async fn update_packages(&self) -> Result<(), HostError>;

    async fn install_packages(&self, packages: &[String], extra_args: &[String]) -> Result<(), HostError>;

    async fn load_module(&self, name: &str) -> Result<(), HostError>;

    /* names of the modules currently loaded in the kernel */
    async fn list_modules(&self) -> Result<Vec<String>, HostError>;

    /* live value of a sysctl, Ok(None) when the kernel doesn't know it */
    async fn read_sysctl(&self, name: &str) -> Result<Option<String>, HostError>;

    async fn set_sysctl(&self, name: &str, value: &str) -> Result<(), HostError>;

    /* load every sysctl.d file, i.e. `sysctl --system` */
    async fn apply_sysctl(&self) -> Result<(), HostError>;

    async fn has_service(&self, name: &str) -> Result<bool, HostError>;

    /* enable and start */
    async fn enable_service(&self, name: &str) -> Result<(), HostError>;

    /* stop and disable */
    async fn disable_service(&self, name: &str) -> Result<(), HostError>;

    /*
     * Anything else (setenforce, swapoff, ...). Returns stdout.
     */
    async fn exec(&self, program: &str, args: &[&str]) -> Result<String, HostError>;
}

/*
 * Render a command line the way it shows up in logs and errors.
 */
pub fn command_line(program: &str, args: &[&str]) -> String {
    let mut line = String::from(program);
    for arg in args {
	line.push(' ');
	line.push_str(arg);
    }
    line
}

/*
 * Path of a sysctl inside /proc/sys, e.g. net.ipv4.ip_forward becomes
 * /proc/sys/net/ipv4/ip_forward.
 */
pub fn sysctl_path(name: &str) -> PathBuf {
    PathBuf::from(format!("/proc/sys/{}", name.replace('.', "/")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line() {
	assert_eq!(command_line("systemctl", &["enable", "--now", "crio"]), "systemctl enable --now crio");
	assert_eq!(command_line("swapoff", &[]), "swapoff");
    }

    #[test]
    fn test_sysctl_path() {
	assert_eq!(sysctl_path("net.ipv4.ip_forward"), PathBuf::from("/proc/sys/net/ipv4/ip_forward"));
	assert_eq!(sysctl_path("net.bridge.bridge-nf-call-iptables"),
		   PathBuf::from("/proc/sys/net/bridge/bridge-nf-call-iptables"));
    }
}
