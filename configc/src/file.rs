use crate::errors::HostError;
use crate::host::Host;
use crate::manager::Manager;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};

/*
 * File: the whole content of `dest` is ours. The mode is applied on every
 * write but not checked for drift.
 */
#[derive(Debug, Clone)]
pub struct File {
    dest: PathBuf,
    content: String,
    mode: u32,
}

impl File {
    pub fn new<P: AsRef<Path>>(dest: P, content: &str, mode: u32) -> Self {
	Self{
	    dest: dest.as_ref().to_path_buf(),
	    content: content.to_string(),
	    mode: mode,
	}
    }
}

#[async_trait]
impl Manager for File {

    fn describe(&self) -> String {
	format!("file {}", self.dest.display())
    }

    async fn has_drifted(&self, host: &dyn Host) -> Result<bool, HostError> {
	let current = host.read_file(&self.dest).await?;
	Ok(current.as_deref() != Some(self.content.as_str()))
    }

    async fn ensure(&self, host: &dyn Host) -> Result<(), HostError> {
	host.write_file(&self.dest, &self.content, self.mode).await
    }
}

/*
 * Mode to write `dest` with: whatever it already has, `mode` for a new file.
 */
async fn keep_mode(host: &dyn Host, dest: &Path, mode: u32) -> Result<u32, HostError> {
    Ok(host.stat_mode(dest).await?.unwrap_or(mode))
}

/*
 * Lines: a set of lines that must appear somewhere in `dest` (shell profiles
 * and the like). Missing lines are appended, the rest of the file is left
 * alone, so is its mode. The file is created with `mode` if it doesn't exist.
 */
#[derive(Debug, Clone)]
pub struct Lines {
    dest: PathBuf,
    lines: Vec<String>,
    mode: u32,
}

impl Lines {
    pub fn new<P: AsRef<Path>>(dest: P, lines: &[String], mode: u32) -> Self {
	Self{
	    dest: dest.as_ref().to_path_buf(),
	    lines: lines.to_vec(),
	    mode: mode,
	}
    }

    fn missing<'a>(&'a self, content: &str) -> Vec<&'a String> {
	self.lines.iter()
	    .filter(|wanted| !content.lines().any(|line| line.trim() == wanted.trim()))
	    .collect()
    }
}

#[async_trait]
impl Manager for Lines {

    fn describe(&self) -> String {
	format!("lines in {}", self.dest.display())
    }

    async fn has_drifted(&self, host: &dyn Host) -> Result<bool, HostError> {
	let current = host.read_file(&self.dest).await?.unwrap_or_default();
	Ok(self.missing(&current).len() > 0)
    }

    async fn ensure(&self, host: &dyn Host) -> Result<(), HostError> {
	let mut content = host.read_file(&self.dest).await?.unwrap_or_default();
	let missing: Vec<String> = self.missing(&content).into_iter().cloned().collect();
	if missing.is_empty() {
	    return Ok(());
	}

	if !content.is_empty() && !content.ends_with('\n') {
	    content.push('\n');
	}
	for line in missing {
	    content.push_str(&line);
	    content.push('\n');
	}
	let mode = keep_mode(host, &self.dest, self.mode).await?;
	host.write_file(&self.dest, &content, mode).await
    }
}

/*
 * Rewrite: pass an existing file through a pure transformation (comment out
 * swap entries in fstab, flip SELINUX= ...). A missing file is left missing,
 * there is nothing to rewrite.
 */
#[derive(Clone)]
pub struct Rewrite {
    dest: PathBuf,
    what: String,
    transform: fn(&str) -> String,
    mode: u32,
}

impl Rewrite {
    pub fn new<P: AsRef<Path>>(dest: P, what: &str, transform: fn(&str) -> String, mode: u32) -> Self {
	Self{
	    dest: dest.as_ref().to_path_buf(),
	    what: what.to_string(),
	    transform: transform,
	    mode: mode,
	}
    }
}

impl fmt::Debug for Rewrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	f.debug_struct("Rewrite")
	    .field("dest", &self.dest)
	    .field("what", &self.what)
	    .field("mode", &self.mode)
	    .finish()
    }
}

#[async_trait]
impl Manager for Rewrite {

    fn describe(&self) -> String {
	format!("{} in {}", self.what, self.dest.display())
    }

    async fn has_drifted(&self, host: &dyn Host) -> Result<bool, HostError> {
	match host.read_file(&self.dest).await? {
	    Some(content) => Ok((self.transform)(&content) != content),
	    None => Ok(false),
	}
    }

    async fn ensure(&self, host: &dyn Host) -> Result<(), HostError> {
	if let Some(content) = host.read_file(&self.dest).await? {
	    let rewritten = (self.transform)(&content);
	    if rewritten != content {
		let mode = keep_mode(host, &self.dest, self.mode).await?;
		host.write_file(&self.dest, &rewritten, mode).await?;
	    }
	}
	Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeHost;
    use crate::manager::converge;

    #[tokio::test]
    async fn test_file_drift_and_converge() {
	let host = FakeHost::new().with_file("/etc/modules-load.d/k8s.conf", "overlay\n");
	let file = File::new("/etc/modules-load.d/k8s.conf", "overlay\nbr_netfilter\n", 0o644);

	assert!(file.has_drifted(&host).await.unwrap());
	assert!(converge(&file, &host).await.unwrap());
	assert_eq!(host.file("/etc/modules-load.d/k8s.conf").unwrap(), "overlay\nbr_netfilter\n");

	assert!(!file.has_drifted(&host).await.unwrap());
	assert!(!converge(&file, &host).await.unwrap());
	assert_eq!(host.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_file_missing_is_drifted() {
	let host = FakeHost::new();
	let file = File::new("/etc/sysctl.d/k8s.conf", "net.ipv4.ip_forward = 1\n", 0o600);

	assert!(file.has_drifted(&host).await.unwrap());
	file.ensure(&host).await.unwrap();
	assert_eq!(host.file_mode("/etc/sysctl.d/k8s.conf"), Some(0o600));
    }

    #[tokio::test]
    async fn test_lines_appended_once() {
	let host = FakeHost::new().with_file("/root/.bashrc", "# .bashrc\nalias ll='ls -l'");
	let lines = Lines::new("/root/.bashrc", &[String::from("alias k=kubectl"), String::from("source <(kubectl completion bash)")], 0o644);

	assert!(converge(&lines, &host).await.unwrap());
	assert!(!converge(&lines, &host).await.unwrap());

	assert_eq!(host.file("/root/.bashrc").unwrap(),
		   "# .bashrc\nalias ll='ls -l'\nalias k=kubectl\nsource <(kubectl completion bash)\n");
    }

    #[tokio::test]
    async fn test_lines_only_missing_ones() {
	let host = FakeHost::new().with_file("/root/.bashrc", "alias k=kubectl\n");
	let lines = Lines::new("/root/.bashrc", &[String::from("alias k=kubectl"), String::from("source <(kubectl completion bash)")], 0o644);

	lines.ensure(&host).await.unwrap();
	assert_eq!(host.file("/root/.bashrc").unwrap(), "alias k=kubectl\nsource <(kubectl completion bash)\n");
    }

    #[tokio::test]
    async fn test_lines_keep_existing_mode() {
	let host = FakeHost::new().with_file_mode("/root/.bashrc", "# .bashrc\n", 0o600);
	let lines = Lines::new("/root/.bashrc", &[String::from("alias k=kubectl")], 0o644);

	assert!(converge(&lines, &host).await.unwrap());
	assert_eq!(host.file_mode("/root/.bashrc"), Some(0o600));

	let fresh = FakeHost::new();
	lines.ensure(&fresh).await.unwrap();
	assert_eq!(fresh.file_mode("/root/.bashrc"), Some(0o644));
    }

    fn shout(content: &str) -> String {
	content.to_uppercase()
    }

    #[tokio::test]
    async fn test_rewrite() {
	let host = FakeHost::new().with_file("/etc/motd", "hello\n");
	let rewrite = Rewrite::new("/etc/motd", "shouting", shout, 0o644);

	assert_eq!(rewrite.describe(), "shouting in /etc/motd");
	assert!(converge(&rewrite, &host).await.unwrap());
	assert_eq!(host.file("/etc/motd").unwrap(), "HELLO\n");
	assert!(!rewrite.has_drifted(&host).await.unwrap());
    }

    #[tokio::test]
    async fn test_rewrite_keeps_existing_mode() {
	let host = FakeHost::new().with_file_mode("/etc/selinux/config", "selinux=enforcing\n", 0o600);
	let rewrite = Rewrite::new("/etc/selinux/config", "shouting", shout, 0o644);

	assert!(converge(&rewrite, &host).await.unwrap());
	assert_eq!(host.file("/etc/selinux/config").unwrap(), "SELINUX=ENFORCING\n");
	assert_eq!(host.file_mode("/etc/selinux/config"), Some(0o600));
    }

    #[tokio::test]
    async fn test_rewrite_missing_file_is_left_alone() {
	let host = FakeHost::new();
	let rewrite = Rewrite::new("/etc/fstab", "shouting", shout, 0o644);

	assert!(!rewrite.has_drifted(&host).await.unwrap());
	rewrite.ensure(&host).await.unwrap();
	assert_eq!(host.file("/etc/fstab"), None);
    }
}
