/*
 * FakeHost: an in-memory Host for tests. Every call is recorded as the
 * command line the real host would have run, and any of them can be made to
 * fail.
 */

use crate::errors::HostError;
use crate::host::{self, Host};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const SYSCTL_DIRS: &[&str] = &["/etc/sysctl.d", "/run/sysctl.d", "/usr/lib/sysctl.d"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeFile {
    pub content: String,
    pub mode: u32,
}

#[derive(Debug, Default)]
struct FakeState {
    os_release: String,
    hostname: String,
    home: Option<PathBuf>,
    files: BTreeMap<PathBuf, FakeFile>,
    urls: BTreeMap<String, String>,
    loaded_modules: Vec<String>,
    /* modprobe "succeeds" but the module never shows up */
    phantom_modules: BTreeSet<String>,
    sysctls: BTreeMap<String, String>,
    installed: Vec<String>,
    /* unit name -> enabled */
    services: BTreeMap<String, bool>,
    selinux: String,
    failing: Vec<(String, i32)>,
    calls: Vec<String>,
}

#[derive(Debug)]
pub struct FakeHost {
    state: Mutex<FakeState>,
}

impl Default for FakeHost {
    fn default() -> Self {
	Self::new()
    }
}

impl FakeHost {

    pub fn new() -> Self {
	let state = FakeState {
	    hostname: String::from("localhost"),
	    home: Some(PathBuf::from("/root")),
	    selinux: String::from("Enforcing"),
	    ..FakeState::default()
	};
	Self{ state: Mutex::new(state) }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
	match self.state.lock() {
	    Ok(guard) => guard,
	    Err(poisoned) => poisoned.into_inner(),
	}
    }

    pub fn with_os_release(self, content: &str) -> Self {
	self.state().os_release = content.to_string();
	self
    }

    pub fn with_hostname(self, hostname: &str) -> Self {
	self.state().hostname = hostname.to_string();
	self
    }

    pub fn with_home(self, home: Option<&str>) -> Self {
	self.state().home = home.map(PathBuf::from);
	self
    }

    pub fn with_file(self, path: &str, content: &str) -> Self {
	self.with_file_mode(path, content, 0o644)
    }

    pub fn with_file_mode(self, path: &str, content: &str, mode: u32) -> Self {
	self.state().files.insert(PathBuf::from(path), FakeFile { content: content.to_string(), mode: mode });
	self
    }

    pub fn with_url(self, url: &str, body: &str) -> Self {
	self.state().urls.insert(url.to_string(), body.to_string());
	self
    }

    /* an installed (disabled) systemd unit */
    pub fn with_service(self, name: &str) -> Self {
	self.state().services.insert(name.to_string(), false);
	self
    }

    pub fn with_loaded_module(self, name: &str) -> Self {
	self.state().loaded_modules.push(name.to_string());
	self
    }

    pub fn with_phantom_module(self, name: &str) -> Self {
	self.state().phantom_modules.insert(name.to_string());
	self
    }

    pub fn with_selinux(self, mode: &str) -> Self {
	self.state().selinux = mode.to_string();
	self
    }

    /*
     * Any command whose line starts with `prefix` exits with `status`.
     */
    pub fn failing(self, prefix: &str, status: i32) -> Self {
	self.state().failing.push((prefix.to_string(), status));
	self
    }

    pub fn file(&self, path: &str) -> Option<String> {
	self.state().files.get(Path::new(path)).map(|f| f.content.clone())
    }

    pub fn file_mode(&self, path: &str) -> Option<u32> {
	self.state().files.get(Path::new(path)).map(|f| f.mode)
    }

    pub fn files(&self) -> BTreeMap<PathBuf, FakeFile> {
	self.state().files.clone()
    }

    pub fn calls(&self) -> Vec<String> {
	self.state().calls.clone()
    }

    pub fn installed(&self) -> Vec<String> {
	self.state().installed.clone()
    }

    pub fn loaded_modules(&self) -> Vec<String> {
	self.state().loaded_modules.clone()
    }

    pub fn sysctl(&self, name: &str) -> Option<String> {
	self.state().sysctls.get(name).cloned()
    }

    pub fn service_enabled(&self, name: &str) -> bool {
	self.state().services.get(name).copied().unwrap_or(false)
    }

    pub fn selinux(&self) -> String {
	self.state().selinux.clone()
    }

    /*
     * Record the call and fail it if it was asked to.
     */
    fn record(&self, program: &str, args: &[&str]) -> Result<(), HostError> {
	let line = host::command_line(program, args);
	let mut state = self.state();
	state.calls.push(line.clone());

	let failure = state.failing.iter().find(|(prefix, _)| line.starts_with(prefix.as_str())).cloned();
	if let Some((_, status)) = failure {
	    return Err(HostError::CommandFailed {
		command: line,
		status: Some(status),
		stderr: String::from("injected failure"),
	    });
	}
	Ok(())
    }
}

/*
 * Read "name = value" lines the way sysctl --system does.
 */
fn sysctl_assignments(content: &str) -> Vec<(String, String)> {
    content.lines()
	.map(|line| line.trim())
	.filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with(';'))
	.filter_map(|line| line.split_once('='))
	.map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
	.collect()
}

#[async_trait]
impl Host for FakeHost {

    async fn os_release(&self) -> Result<String, HostError> {
	Ok(self.state().os_release.clone())
    }

    async fn hostname(&self) -> Result<String, HostError> {
	Ok(self.state().hostname.clone())
    }

    fn home_dir(&self) -> Option<PathBuf> {
	self.state().home.clone()
    }

    async fn read_file(&self, path: &Path) -> Result<Option<String>, HostError> {
	Ok(self.state().files.get(path).map(|f| f.content.clone()))
    }

    async fn stat_mode(&self, path: &Path) -> Result<Option<u32>, HostError> {
	Ok(self.state().files.get(path).map(|f| f.mode))
    }

    async fn write_file(&self, path: &Path, content: &str, mode: u32) -> Result<(), HostError> {
	let path_str = path.display().to_string();
	self.record("write", &[path_str.as_str()])?;

	let file = FakeFile { content: content.to_string(), mode: mode };
	self.state().files.insert(path.to_path_buf(), file);
	Ok(())
    }

    async fn fetch_url(&self, url: &str) -> Result<String, HostError> {
	self.record("fetch", &[url])?;

	match self.state().urls.get(url) {
	    Some(body) => Ok(body.clone()),
	    None => Err(HostError::Fetch {
		url: url.to_string(),
		message: String::from("server answered 404 Not Found"),
	    }),
	}
    }

    async fn update_packages(&self) -> Result<(), HostError> {
	self.record("dnf", &["-y", "update"])
    }

    async fn install_packages(&self, packages: &[String], extra_args: &[String]) -> Result<(), HostError> {
	let mut args: Vec<&str> = vec!["install", "-y"];
	args.extend(packages.iter().map(|p| p.as_str()));
	args.extend(extra_args.iter().map(|a| a.as_str()));
	self.record("dnf", &args)?;

	let mut state = self.state();
	for package in packages {
	    if !state.installed.contains(package) {
		state.installed.push(package.clone());
	    }
	}
	Ok(())
    }

    async fn load_module(&self, name: &str) -> Result<(), HostError> {
	self.record("modprobe", &[name])?;

	let mut state = self.state();
	if !state.phantom_modules.contains(name) && !state.loaded_modules.iter().any(|m| m == name) {
	    state.loaded_modules.push(name.to_string());
	}
	Ok(())
    }

    async fn list_modules(&self) -> Result<Vec<String>, HostError> {
	Ok(self.state().loaded_modules.clone())
    }

    async fn read_sysctl(&self, name: &str) -> Result<Option<String>, HostError> {
	Ok(self.state().sysctls.get(name).cloned())
    }

    async fn set_sysctl(&self, name: &str, value: &str) -> Result<(), HostError> {
	let assignment = format!("{}={}", name, value);
	self.record("sysctl", &["-w", assignment.as_str()])?;

	self.state().sysctls.insert(name.to_string(), value.to_string());
	Ok(())
    }

    async fn apply_sysctl(&self) -> Result<(), HostError> {
	self.record("sysctl", &["--system"])?;

	let mut state = self.state();
	let mut assignments = vec![];
	for (path, file) in &state.files {
	    let in_sysctl_dir = SYSCTL_DIRS.iter().any(|dir| path.starts_with(dir));
	    if in_sysctl_dir || path == Path::new("/etc/sysctl.conf") {
		assignments.extend(sysctl_assignments(&file.content));
	    }
	}
	for (name, value) in assignments {
	    state.sysctls.insert(name, value);
	}
	Ok(())
    }

    async fn has_service(&self, name: &str) -> Result<bool, HostError> {
	Ok(self.state().services.contains_key(name))
    }

    async fn enable_service(&self, name: &str) -> Result<(), HostError> {
	self.record("systemctl", &["enable", "--now", name])?;

	self.state().services.insert(name.to_string(), true);
	Ok(())
    }

    async fn disable_service(&self, name: &str) -> Result<(), HostError> {
	self.record("systemctl", &["disable", "--now", name])?;

	self.state().services.insert(name.to_string(), false);
	Ok(())
    }

    async fn exec(&self, program: &str, args: &[&str]) -> Result<String, HostError> {
	self.record(program, args)?;

	let mut state = self.state();
	match (program, args) {
	    ("getenforce", _) => Ok(format!("{}\n", state.selinux)),
	    ("setenforce", ["0"]) => {
		state.selinux = String::from("Permissive");
		Ok(String::new())
	    },
	    _ => Ok(String::new()),
	}
    }
}
