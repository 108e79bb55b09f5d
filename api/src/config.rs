use crate::errors::Error;
use crate::kernel::{ModuleSet, SysctlSet};
use crate::node::RoleSetting;
use crate::version::{self, KubeVersion, RuntimeVersion};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/*
 * NodeprepConfig is the whole input of a provisioning run. Every field has a
 * default matching a stock Rocky/RHEL host, except the node role which must
 * be given either here or on the command line.
 *
 * for example:
 *
 *   kube_version = "1.29.0"
 *   runtime_version = "1.29"
 *   role = "control-plane"
 *
 *   [kernel]
 *   modules = ["overlay", "br_netfilter"]
 */
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NodeprepConfig {

    #[serde(default = "default_kube_version")]
    pub kube_version: String,

    /* cri-o stream, its major.minor must equal kube_version's */
    #[serde(default = "default_runtime_version")]
    pub runtime_version: String,

    pub role: Option<RoleSetting>,

    /* only used in the control-plane instructions */
    #[serde(default = "default_pod_network_cidr")]
    pub pod_network_cidr: String,

    #[serde(default)]
    pub packages: PackagesConfig,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub swap: SwapConfig,

    #[serde(default)]
    pub kernel: KernelConfig,

    #[serde(default)]
    pub repos: ReposConfig,

    #[serde(default = "default_services")]
    pub services: Vec<String>,

    #[serde(default)]
    pub profile: ProfileConfig,

    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PackagesConfig {

    /* run `dnf update -y` before anything else */
    #[serde(default = "default_true")]
    pub update: bool,

    #[serde(default = "default_dependencies")]
    pub dependencies: Vec<String>,

    #[serde(default = "default_runtime_packages")]
    pub runtime: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SecurityConfig {

    #[serde(default = "default_true")]
    pub selinux_permissive: bool,

    #[serde(default = "default_selinux_config")]
    pub selinux_config: PathBuf,

    #[serde(default = "default_true")]
    pub disable_firewalld: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwapConfig {

    /* kubelet refuses to start with swap on, unless told otherwise */
    #[serde(default = "default_true")]
    pub disable: bool,

    #[serde(default = "default_fstab")]
    pub fstab: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct KernelConfig {

    #[serde(default = "default_modules_file")]
    pub modules_file: PathBuf,

    #[serde(default)]
    pub modules: ModuleSet,

    /* the module whose absence after loading aborts the run */
    #[serde(default = "default_required_module")]
    pub required_module: String,

    #[serde(default = "default_sysctl_file")]
    pub sysctl_file: PathBuf,

    #[serde(default)]
    pub sysctls: SysctlSet,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReposConfig {

    #[serde(default = "default_repo_dir")]
    pub repo_dir: PathBuf,

    /* base of the opensuse kubic tree hosting the cri-o .repo files */
    #[serde(default = "default_runtime_mirror")]
    pub runtime_mirror: String,

    /* base of the kubernetes community rpm tree, without the /vX.Y suffix */
    #[serde(default = "default_kubernetes_mirror")]
    pub kubernetes_mirror: String,

    #[serde(default = "default_kubernetes_repo_file")]
    pub kubernetes_repo_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProfileConfig {

    /* defaults to $HOME/.bashrc of the invoking user */
    pub path: Option<PathBuf>,

    #[serde(default = "default_profile_lines")]
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TimeoutsConfig {

    #[serde(default = "default_command_timeout")]
    pub command_secs: u64,

    #[serde(default = "default_fetch_timeout")]
    pub fetch_secs: u64,
}

impl Default for NodeprepConfig {
    fn default() -> Self {
	Self{
	    kube_version: default_kube_version(),
	    runtime_version: default_runtime_version(),
	    role: None,
	    pod_network_cidr: default_pod_network_cidr(),
	    packages: PackagesConfig::default(),
	    security: SecurityConfig::default(),
	    swap: SwapConfig::default(),
	    kernel: KernelConfig::default(),
	    repos: ReposConfig::default(),
	    services: default_services(),
	    profile: ProfileConfig::default(),
	    timeouts: TimeoutsConfig::default(),
	}
    }
}

impl Default for PackagesConfig {
    fn default() -> Self {
	Self{
	    update: true,
	    dependencies: default_dependencies(),
	    runtime: default_runtime_packages(),
	}
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
	Self{
	    selinux_permissive: true,
	    selinux_config: default_selinux_config(),
	    disable_firewalld: true,
	}
    }
}

impl Default for SwapConfig {
    fn default() -> Self {
	Self{
	    disable: true,
	    fstab: default_fstab(),
	}
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
	Self{
	    modules_file: default_modules_file(),
	    modules: ModuleSet::default(),
	    required_module: default_required_module(),
	    sysctl_file: default_sysctl_file(),
	    sysctls: SysctlSet::default(),
	}
    }
}

impl Default for ReposConfig {
    fn default() -> Self {
	Self{
	    repo_dir: default_repo_dir(),
	    runtime_mirror: default_runtime_mirror(),
	    kubernetes_mirror: default_kubernetes_mirror(),
	    kubernetes_repo_file: default_kubernetes_repo_file(),
	}
    }
}

impl Default for ProfileConfig {
    fn default() -> Self {
	Self{
	    path: None,
	    lines: default_profile_lines(),
	}
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
	Self{
	    command_secs: default_command_timeout(),
	    fetch_secs: default_fetch_timeout(),
	}
    }
}

impl NodeprepConfig {

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
	let path = path.as_ref();
	let contents = match std::fs::read_to_string(path) {
	    Ok(contents) => contents,
	    Err(err) => {
		return Err(Error::ConfigRead {
		    path: path.display().to_string(),
		    source: err,
		});
	    }
	};

	Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, Error> {
	let config: NodeprepConfig = toml::from_str(contents)?;
	Ok(config)
    }

    /*
     * Parse both versions and make sure they are a valid pair.
     */
    pub fn versions(&self) -> Result<(KubeVersion, RuntimeVersion), Error> {
	let kube: KubeVersion = self.kube_version.parse()?;
	let runtime: RuntimeVersion = self.runtime_version.parse()?;
	version::check_pairing(&kube, &runtime)?;

	Ok((kube, runtime))
    }

    pub fn validate(&self) -> Result<(), Error> {
	self.versions()?;

	if self.kernel.modules.is_empty() {
	    return Err(Error::InvalidConfig(String::from("kernel.modules cannot be empty")));
	}
	if !self.kernel.modules.contains(&self.kernel.required_module) {
	    let errmsg = format!("kernel.required_module '{}' is not listed in kernel.modules", self.kernel.required_module);
	    return Err(Error::InvalidConfig(errmsg));
	}
	if self.repos.kubernetes_repo_file.is_empty() || self.repos.kubernetes_repo_file.contains('/') {
	    return Err(Error::InvalidConfig(String::from("repos.kubernetes_repo_file must be a plain file name")));
	}
	if self.timeouts.command_secs == 0 || self.timeouts.fetch_secs == 0 {
	    return Err(Error::InvalidConfig(String::from("timeouts must be greater than zero")));
	}

	Ok(())
    }
}

// defaults

fn default_kube_version() -> String {
    String::from("1.29.0")
}

fn default_runtime_version() -> String {
    String::from("1.29")
}

fn default_pod_network_cidr() -> String {
    String::from("10.244.0.0/16")
}

fn default_true() -> bool {
    true
}

fn default_dependencies() -> Vec<String> {
    ["curl", "wget", "yum-utils", "iproute-tc", "bash-completion"]
	.iter().map(|s| s.to_string()).collect()
}

fn default_runtime_packages() -> Vec<String> {
    vec![String::from("cri-o")]
}

fn default_selinux_config() -> PathBuf {
    PathBuf::from("/etc/selinux/config")
}

fn default_fstab() -> PathBuf {
    PathBuf::from("/etc/fstab")
}

fn default_modules_file() -> PathBuf {
    PathBuf::from("/etc/modules-load.d/k8s.conf")
}

fn default_required_module() -> String {
    String::from("br_netfilter")
}

fn default_sysctl_file() -> PathBuf {
    PathBuf::from("/etc/sysctl.d/k8s.conf")
}

fn default_repo_dir() -> PathBuf {
    PathBuf::from("/etc/yum.repos.d")
}

fn default_runtime_mirror() -> String {
    String::from("https://download.opensuse.org/repositories")
}

fn default_kubernetes_mirror() -> String {
    String::from("https://pkgs.k8s.io/core:/stable:")
}

fn default_kubernetes_repo_file() -> String {
    String::from("kubernetes.repo")
}

fn default_services() -> Vec<String> {
    vec![String::from("crio"), String::from("kubelet")]
}

fn default_profile_lines() -> Vec<String> {
    vec![
	String::from("alias k=kubectl"),
	String::from("source <(kubectl completion bash)"),
    ]
}

fn default_command_timeout() -> u64 {
    1800
}

fn default_fetch_timeout() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::RoleSetting;

    #[test]
    fn test_default_config_is_valid() {
	let config = NodeprepConfig::default();
	assert!(config.validate().is_ok());
	assert!(config.role.is_none());
	assert_eq!(config.kernel.modules_file, PathBuf::from("/etc/modules-load.d/k8s.conf"));
	assert_eq!(config.services, vec!["crio", "kubelet"]);
    }

    #[test]
    fn test_empty_toml_gets_defaults() {
	let config = NodeprepConfig::from_toml("").unwrap();
	assert_eq!(config.kube_version, "1.29.0");
	assert_eq!(config.runtime_version, "1.29");
	assert!(config.packages.update);
	assert_eq!(config.profile.lines, vec!["alias k=kubectl", "source <(kubectl completion bash)"]);
    }

    #[test]
    fn test_parse_toml_config() {
	let toml_content = r#"
	    kube_version = "1.30.1"
	    runtime_version = "1.30"
	    role = "worker"

	    [packages]
	    update = false
	    dependencies = ["curl"]

	    [kernel]
	    modules = ["overlay", "br_netfilter", "ip_vs"]

	    [kernel.sysctls]
	    "net.ipv4.ip_forward" = "1"

	    [repos]
	    repo_dir = "/tmp/repos"

	    [timeouts]
	    fetch_secs = 5
	"#;

	let config = NodeprepConfig::from_toml(toml_content).unwrap();
	assert_eq!(config.role, Some(RoleSetting::Worker));
	assert!(!config.packages.update);
	assert_eq!(config.kernel.modules.len(), 3);
	assert_eq!(config.kernel.sysctls.len(), 1);
	assert_eq!(config.repos.repo_dir, PathBuf::from("/tmp/repos"));
	assert_eq!(config.timeouts.fetch_secs, 5);
	assert_eq!(config.timeouts.command_secs, 1800);
	assert!(config.validate().is_ok());
    }

    #[test]
    fn test_role_words_match_command_line() {
	for word in ["control-plane", "worker", "auto", "Worker", "control", "controlplane"] {
	    let from_file = NodeprepConfig::from_toml(&format!("role = \"{}\"", word)).ok().and_then(|c| c.role);
	    let from_flag = word.parse::<RoleSetting>().ok();
	    assert_eq!(from_file, from_flag, "{}", word);
	}
    }

    #[test]
    fn test_validation_rejects_mismatched_versions() {
	let mut config = NodeprepConfig::default();
	config.runtime_version = String::from("1.28");
	assert!(matches!(config.validate(), Err(Error::VersionMismatch { .. })));
    }

    #[test]
    fn test_validation_rejects_missing_required_module() {
	let mut config = NodeprepConfig::default();
	config.kernel.modules = ModuleSet::new(["overlay"]);
	assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_from_file_not_found() {
	let err = NodeprepConfig::from_file("/nonexistent/nodeprep.toml").unwrap_err();
	assert!(matches!(err, Error::ConfigRead { .. }));
    }
}
