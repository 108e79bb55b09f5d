use crate::errors::Error;
use crate::kernel;
use crate::report::{self, ProvisionReport};
use crate::resolver::{self, RuntimeRepos};
use configc::{Host, Manager};
use log;
use nodeprep_api::{KubeVersion, NodeRole, NodeprepConfig, OsRelease, RepoDescriptor, RuntimeVersion, StepState};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Step {
    Preflight,
    Dependencies,
    SecurityPosture,
    Swap,
    KernelPrerequisites,
    RuntimeRepositories,
    RuntimeInstall,
    KubernetesRepository,
    KubernetesInstall,
    Services,
    ShellProfile,
    Report,
}

impl Step {

    /* every step but the preflight, in execution order */
    pub const SEQUENCE: [Step; 10] = [
	Step::Dependencies,
	Step::SecurityPosture,
	Step::Swap,
	Step::KernelPrerequisites,
	Step::RuntimeRepositories,
	Step::RuntimeInstall,
	Step::KubernetesRepository,
	Step::KubernetesInstall,
	Step::Services,
	Step::ShellProfile,
    ];

    pub fn name(&self) -> &'static str {
	match self {
	    Step::Preflight => "preflight",
	    Step::Dependencies => "dependencies",
	    Step::SecurityPosture => "security-posture",
	    Step::Swap => "swap",
	    Step::KernelPrerequisites => "kernel",
	    Step::RuntimeRepositories => "runtime-repositories",
	    Step::RuntimeInstall => "runtime-install",
	    Step::KubernetesRepository => "kubernetes-repository",
	    Step::KubernetesInstall => "kubernetes-install",
	    Step::Services => "services",
	    Step::ShellProfile => "shell-profile",
	    Step::Report => "report",
	}
    }

    fn title(&self) -> &'static str {
	match self {
	    Step::Preflight => "Checking versions, operating system and node role",
	    Step::Dependencies => "Updating packages and installing dependencies",
	    Step::SecurityPosture => "Setting SELinux to permissive and disabling firewalld",
	    Step::Swap => "Disabling swap",
	    Step::KernelPrerequisites => "Configuring kernel modules and sysctls",
	    Step::RuntimeRepositories => "Registering the CRI-O repositories",
	    Step::RuntimeInstall => "Installing CRI-O",
	    Step::KubernetesRepository => "Registering the Kubernetes repository",
	    Step::KubernetesInstall => "Installing kubelet, kubeadm and kubectl",
	    Step::Services => "Enabling services",
	    Step::ShellProfile => "Extending the shell profile",
	    Step::Report => "Summarizing",
	}
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	write!(f, "{}", self.name())
    }
}

/*
 * Everything the run decides before touching the host.
 */
#[derive(Debug, Clone)]
pub struct Preflight {
    pub os: OsRelease,
    pub hostname: String,
    pub role: NodeRole,
    pub runtime_repos: RuntimeRepos,
    pub kubernetes_repo: RepoDescriptor,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Planned {
    /* has drifted, apply would change it */
    Change,
    UpToDate,
    /* a command apply runs every time (dnf, systemctl ...) */
    Always,
}

impl fmt::Display for Planned {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	match self {
	    Planned::Change => write!(f, "change"),
	    Planned::UpToDate => write!(f, "up-to-date"),
	    Planned::Always => write!(f, "run"),
	}
    }
}

#[derive(Debug, Clone)]
pub struct PlanEntry {
    pub step: Step,
    pub what: String,
    pub planned: Planned,
}

/*
 * Flip SELINUX=enforcing to permissive in /etc/selinux/config, quoted or
 * not, in any case. A disabled SELinux is left disabled.
 */
pub fn selinux_permissive(content: &str) -> String {
    rewrite_lines(content, |line| {
	match line.trim().split_once('=') {
	    Some((key, value)) if key.trim() == "SELINUX" && unquote(value).eq_ignore_ascii_case("enforcing") => {
		String::from("SELINUX=permissive")
	    },
	    _ => line.to_string(),
	}
    })
}

fn unquote(value: &str) -> &str {
    value.trim().trim_matches(|c| c == '"' || c == '\'')
}

/*
 * Comment out every active swap entry of /etc/fstab, e.g.
 *
 *   /dev/mapper/rl-swap none swap defaults 0 0
 */
pub fn comment_swap_entries(content: &str) -> String {
    rewrite_lines(content, |line| {
	let trimmed = line.trim_start();
	if trimmed.starts_with('#') {
	    return line.to_string();
	}
	match trimmed.split_whitespace().nth(2) {
	    Some("swap") => format!("#{}", line),
	    _ => line.to_string(),
	}
    })
}

fn rewrite_lines<F: Fn(&str) -> String>(content: &str, rewrite: F) -> String {
    let mut out: Vec<String> = content.lines().map(|line| rewrite(line)).collect();
    if content.ends_with('\n') {
	out.push(String::new());
    }
    out.join("\n")
}

pub struct Provisioner {
    config: NodeprepConfig,
    kube: KubeVersion,
    runtime: RuntimeVersion,
    banners: bool,
}

impl Provisioner {

    /*
     * Validates the configuration, including the kubernetes/cri-o pairing,
     * before anything can reach the host.
     */
    pub fn new(config: NodeprepConfig) -> Result<Self, Error> {
	config.validate()?;
	let (kube, runtime) = config.versions()?;

	Ok(Self{
	    config: config,
	    kube: kube,
	    runtime: runtime,
	    banners: false,
	})
    }

    /* print a progress banner on stdout before each step */
    pub fn with_banners(mut self, banners: bool) -> Self {
	self.banners = banners;
	self
    }

    fn banner(&self, step: Step) {
	log::info!("step {}: {}", step, step.title());
	if self.banners {
	    println!("==> {}", step.title());
	}
    }

    pub async fn preflight(&self, host: &dyn Host) -> Result<Preflight, Error> {
	let role_setting = match self.config.role {
	    Some(role) => role,
	    None => return Err(Error::MissingRole),
	};

	let os = resolver::detect_os(&host.os_release().await?)?;
	log::info!("detected {} (major release {})", os.display_name(), os.major);

	let hostname = host.hostname().await?;
	let role = role_setting.resolve(&hostname)?;
	log::info!("provisioning {} as a {} node", hostname, role);

	Ok(Preflight {
	    runtime_repos: resolver::runtime_repos(os.major, &self.runtime, &self.config.repos.runtime_mirror),
	    kubernetes_repo: resolver::kubernetes_repo(&self.kube, &self.config.repos.kubernetes_mirror),
	    os: os,
	    hostname: hostname,
	    role: role,
	})
    }

    /*
     * The whole sequence. Stops at the first failing step; there is no
     * rollback, but every file is drift-checked so running it again picks
     * up where it stopped.
     */
    pub async fn run(&self, host: &dyn Host) -> Result<ProvisionReport, Error> {
	self.banner(Step::Preflight);
	let preflight = match self.preflight(host).await {
	    Ok(preflight) => preflight,
	    Err(err) => {
		log::error!("preflight failed: {}", err);
		return Err(err.at(Step::Preflight));
	    }
	};

	let mut report = ProvisionReport {
	    hostname: preflight.hostname.clone(),
	    os: preflight.os.display_name(),
	    role: preflight.role,
	    kube_version: self.kube.to_string(),
	    runtime_version: self.runtime.to_string(),
	    runtime_repos: preflight.runtime_repos.sources().iter().map(|s| s.url.clone()).collect(),
	    kubernetes_repo: preflight.kubernetes_repo.base_url.clone(),
	    steps: vec![],
	    instructions: report::instructions(preflight.role, &self.kube, &self.config.pod_network_cidr),
	};
	report.record(Step::Preflight.name(), StepState::DONE);

	for step in Step::SEQUENCE {
	    self.banner(step);

	    let state = match self.execute(step, host, &preflight).await {
		Ok(state) => state,
		Err(err) => {
		    log::error!("step {} failed: {}", step, err);
		    return Err(err.at(step));
		}
	    };
	    log::debug!("step {} finished: {}", step, state.to_string());
	    report.record(step.name(), state);
	}

	self.banner(Step::Report);
	report.record(Step::Report.name(), StepState::DONE);
	Ok(report)
    }

    async fn execute(&self, step: Step, host: &dyn Host, preflight: &Preflight) -> Result<StepState, Error> {
	match step {
	    Step::Preflight | Step::Report => Ok(StepState::DONE),
	    Step::Dependencies => self.dependencies(host).await,
	    Step::SecurityPosture => self.security_posture(host).await,
	    Step::Swap => self.swap(host).await,
	    Step::KernelPrerequisites => {
		let changed = kernel::configure(host, &self.config.kernel).await?;
		Ok(changed_state(changed))
	    },
	    Step::RuntimeRepositories => self.runtime_repositories(host, &preflight.runtime_repos).await,
	    Step::RuntimeInstall => self.install(host, &self.config.packages.runtime, &[]).await,
	    Step::KubernetesRepository => {
		let changed = configc::converge(&self.kubernetes_repo_file(&preflight.kubernetes_repo), host).await?;
		Ok(changed_state(changed))
	    },
	    Step::KubernetesInstall => {
		let disable_excludes = vec![format!("--disableexcludes={}", preflight.kubernetes_repo.id)];
		self.install(host, &self.kubernetes_packages(), &disable_excludes).await
	    },
	    Step::Services => self.services(host).await,
	    Step::ShellProfile => self.shell_profile(host).await,
	}
    }

    async fn dependencies(&self, host: &dyn Host) -> Result<StepState, Error> {
	let packages = &self.config.packages;

	if packages.update {
	    host.update_packages().await?;
	}
	if packages.dependencies.len() > 0 {
	    host.install_packages(&packages.dependencies, &[]).await?;
	}

	match packages.update || packages.dependencies.len() > 0 {
	    true => Ok(StepState::DONE),
	    false => Ok(StepState::SKIPPED),
	}
    }

    async fn security_posture(&self, host: &dyn Host) -> Result<StepState, Error> {
	let security = &self.config.security;
	if !security.selinux_permissive && !security.disable_firewalld {
	    return Ok(StepState::SKIPPED);
	}

	let mut changed = false;
	if security.selinux_permissive {
	    if selinux_enforcing(host).await? {
		host.exec("setenforce", &["0"]).await?;
		changed = true;
	    }
	    changed |= configc::converge(&self.selinux_config(), host).await?;
	}

	if security.disable_firewalld {
	    match host.has_service("firewalld").await? {
		true => {
		    host.disable_service("firewalld").await?;
		    changed = true;
		},
		false => log::info!("firewalld is not installed, nothing to disable"),
	    }
	}

	Ok(changed_state(changed))
    }

    async fn swap(&self, host: &dyn Host) -> Result<StepState, Error> {
	if !self.config.swap.disable {
	    return Ok(StepState::SKIPPED);
	}

	host.exec("swapoff", &["-a"]).await?;
	configc::converge(&self.fstab(), host).await?;
	Ok(StepState::DONE)
    }

    async fn runtime_repositories(&self, host: &dyn Host, repos: &RuntimeRepos) -> Result<StepState, Error> {
	let mut changed = false;

	for file in self.runtime_repo_files(host, repos).await? {
	    changed |= configc::converge(&file, host).await?;
	}
	Ok(changed_state(changed))
    }

    async fn install(&self, host: &dyn Host, packages: &[String], extra_args: &[String]) -> Result<StepState, Error> {
	if packages.is_empty() {
	    return Ok(StepState::SKIPPED);
	}

	host.install_packages(packages, extra_args).await?;
	Ok(StepState::DONE)
    }

    async fn services(&self, host: &dyn Host) -> Result<StepState, Error> {
	if self.config.services.is_empty() {
	    return Ok(StepState::SKIPPED);
	}

	for service in &self.config.services {
	    host.enable_service(service).await?;
	}
	Ok(StepState::DONE)
    }

    async fn shell_profile(&self, host: &dyn Host) -> Result<StepState, Error> {
	let profile = match self.profile(host) {
	    Some(profile) => profile,
	    None => {
		log::warn!("no shell profile to extend: set profile.path or HOME");
		return Ok(StepState::SKIPPED);
	    }
	};

	let changed = configc::converge(&profile, host).await?;
	Ok(changed_state(changed))
    }

    /*
     * Fetch the cri-o .repo files and wrap them as Files of the repo
     * directory.
     */
    async fn runtime_repo_files(&self, host: &dyn Host, repos: &RuntimeRepos) -> Result<Vec<configc::File>, Error> {
	let mut files = vec![];

	for source in repos.sources() {
	    let content = host.fetch_url(&source.url).await?;
	    resolver::check_repo_file(&source.url, &content)?;

	    let dest = self.config.repos.repo_dir.join(&source.file_name);
	    files.push(configc::File::new(dest, &content, 0o644));
	}
	Ok(files)
    }

    fn kubernetes_repo_file(&self, repo: &RepoDescriptor) -> configc::File {
	let dest = self.config.repos.repo_dir.join(&self.config.repos.kubernetes_repo_file);
	configc::File::new(dest, &repo.render(), 0o644)
    }

    fn kubernetes_packages(&self) -> Vec<String> {
	["kubelet", "kubeadm", "kubectl"].iter()
	    .map(|tool| format!("{}-{}", tool, self.kube))
	    .collect()
    }

    fn selinux_config(&self) -> configc::Rewrite {
	configc::Rewrite::new(&self.config.security.selinux_config, "SELINUX=permissive", selinux_permissive, 0o644)
    }

    fn fstab(&self) -> configc::Rewrite {
	configc::Rewrite::new(&self.config.swap.fstab, "swap entries", comment_swap_entries, 0o644)
    }

    fn profile(&self, host: &dyn Host) -> Option<configc::Lines> {
	if self.config.profile.lines.is_empty() {
	    return None;
	}

	let path: Option<PathBuf> = match &self.config.profile.path {
	    Some(path) => Some(path.clone()),
	    None => host.home_dir().map(|home| home.join(".bashrc")),
	};
	path.map(|path| configc::Lines::new(path, &self.config.profile.lines, 0o644))
    }

    /*
     * What `run` would do, without doing it. Files, modules, sysctls and the
     * live SELinux mode are drift-checked; package, service and swapoff
     * commands are always listed.
     */
    pub async fn plan(&self, host: &dyn Host) -> Result<Vec<PlanEntry>, Error> {
	let preflight = match self.preflight(host).await {
	    Ok(preflight) => preflight,
	    Err(err) => return Err(err.at(Step::Preflight)),
	};

	let mut entries = vec![];

	if self.config.packages.update {
	    always(Step::Dependencies, String::from("dnf -y update"), &mut entries);
	}
	if self.config.packages.dependencies.len() > 0 {
	    always(Step::Dependencies, format!("dnf install -y {}", self.config.packages.dependencies.join(" ")), &mut entries);
	}

	/* live state the security step acts on */
	let security = &self.config.security;
	let enforcing = match security.selinux_permissive {
	    true => selinux_enforcing(host).await.map_err(|err| Error::from(err).at(Step::SecurityPosture))?,
	    false => false,
	};
	let firewalld = match security.disable_firewalld {
	    true => host.has_service("firewalld").await.map_err(|err| Error::from(err).at(Step::SecurityPosture))?,
	    false => false,
	};

	if enforcing {
	    entries.push(PlanEntry { step: Step::SecurityPosture, what: String::from("setenforce 0"), planned: Planned::Change });
	}
	if firewalld {
	    always(Step::SecurityPosture, String::from("systemctl disable --now firewalld"), &mut entries);
	}
	if self.config.swap.disable {
	    always(Step::Swap, String::from("swapoff -a"), &mut entries);
	}

	let mut managers: Vec<(Step, Box<dyn Manager>)> = vec![];
	if self.config.security.selinux_permissive {
	    managers.push((Step::SecurityPosture, Box::new(self.selinux_config())));
	}
	if self.config.swap.disable {
	    managers.push((Step::Swap, Box::new(self.fstab())));
	}
	for manager in kernel::managers(&self.config.kernel) {
	    managers.push((Step::KernelPrerequisites, manager));
	}
	let repo_files = match self.runtime_repo_files(host, &preflight.runtime_repos).await {
	    Ok(files) => files,
	    Err(err) => return Err(err.at(Step::RuntimeRepositories)),
	};
	for file in repo_files {
	    managers.push((Step::RuntimeRepositories, Box::new(file)));
	}
	managers.push((Step::KubernetesRepository, Box::new(self.kubernetes_repo_file(&preflight.kubernetes_repo))));
	if let Some(profile) = self.profile(host) {
	    managers.push((Step::ShellProfile, Box::new(profile)));
	}

	for (step, manager) in managers {
	    let drifted = match manager.has_drifted(host).await {
		Ok(drifted) => drifted,
		Err(err) => return Err(Error::from(err).at(step)),
	    };
	    let planned = match drifted {
		true => Planned::Change,
		false => Planned::UpToDate,
	    };
	    entries.push(PlanEntry { step: step, what: manager.describe(), planned: planned });
	}

	if self.config.packages.runtime.len() > 0 {
	    always(Step::RuntimeInstall, format!("dnf install -y {}", self.config.packages.runtime.join(" ")), &mut entries);
	}
	always(Step::KubernetesInstall,
	       format!("dnf install -y {} --disableexcludes={}", self.kubernetes_packages().join(" "), preflight.kubernetes_repo.id),
	       &mut entries);
	for service in &self.config.services {
	    always(Step::Services, format!("systemctl enable --now {}", service), &mut entries);
	}

	Ok(entries)
    }
}

async fn selinux_enforcing(host: &dyn Host) -> Result<bool, configc::HostError> {
    let mode = host.exec("getenforce", &[]).await?;
    Ok(mode.trim().eq_ignore_ascii_case("enforcing"))
}

fn always(step: Step, what: String, entries: &mut Vec<PlanEntry>) {
    entries.push(PlanEntry { step: step, what: what, planned: Planned::Always });
}

fn changed_state(changed: bool) -> StepState {
    match changed {
	true => StepState::DONE,
	false => StepState::UNCHANGED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selinux_permissive() {
	let config = "# This file controls the state of SELinux\nSELINUX=enforcing\nSELINUXTYPE=targeted\n";
	assert_eq!(selinux_permissive(config), "# This file controls the state of SELinux\nSELINUX=permissive\nSELINUXTYPE=targeted\n");

	assert_eq!(selinux_permissive("SELINUX=\"enforcing\"\n"), "SELINUX=permissive\n");
	assert_eq!(selinux_permissive("SELINUX=Enforcing\n"), "SELINUX=permissive\n");
	assert_eq!(selinux_permissive("  SELINUX = 'ENFORCING'\n"), "SELINUX=permissive\n");

	let disabled = "SELINUX=disabled\nSELINUXTYPE=targeted\n";
	assert_eq!(selinux_permissive(disabled), disabled);
	assert_eq!(selinux_permissive("SELINUX=permissive"), "SELINUX=permissive");
    }

    #[test]
    fn test_comment_swap_entries() {
	let fstab = "/dev/mapper/rl-root /  xfs defaults 0 0\n\
		     /dev/mapper/rl-swap none swap defaults 0 0\n\
		     #/dev/sdb1 none swap defaults 0 0\n";
	let expected = "/dev/mapper/rl-root /  xfs defaults 0 0\n\
			#/dev/mapper/rl-swap none swap defaults 0 0\n\
			#/dev/sdb1 none swap defaults 0 0\n";
	assert_eq!(comment_swap_entries(fstab), expected);
	assert_eq!(comment_swap_entries(expected), expected);
    }

    #[test]
    fn test_step_sequence_order() {
	assert_eq!(Step::SEQUENCE.first(), Some(&Step::Dependencies));
	assert_eq!(Step::SEQUENCE.last(), Some(&Step::ShellProfile));
	assert!(!Step::SEQUENCE.contains(&Step::Preflight));

	let kernel = Step::SEQUENCE.iter().position(|s| *s == Step::KernelPrerequisites).unwrap();
	let runtime = Step::SEQUENCE.iter().position(|s| *s == Step::RuntimeInstall).unwrap();
	assert!(kernel < runtime);
    }

    #[test]
    fn test_provisioner_rejects_version_mismatch() {
	let mut config = NodeprepConfig::default();
	config.runtime_version = String::from("1.28");
	assert!(matches!(Provisioner::new(config), Err(Error::Api(nodeprep_api::Error::VersionMismatch { .. }))));
    }

    #[test]
    fn test_kubernetes_packages_are_pinned() {
	let provisioner = Provisioner::new(NodeprepConfig::default()).unwrap();
	assert_eq!(provisioner.kubernetes_packages(), vec!["kubelet-1.29.0", "kubeadm-1.29.0", "kubectl-1.29.0"]);
    }
}
