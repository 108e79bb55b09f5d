use crate::errors::HostError;
use crate::host::{self, Host};
use async_trait::async_trait;
use gethostname::gethostname;
use log;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tempfile::NamedTempFile;
use tokio::time::timeout;

const OS_RELEASE: &str = "/etc/os-release";
const PROC_MODULES: &str = "/proc/modules";
const PACKAGE_MANAGER: &str = "dnf";

/*
 * SystemHost drives the local machine through dnf, systemctl, modprobe and
 * sysctl. It expects to run as root.
 */
pub struct SystemHost {
    command_timeout: Duration,
    http: reqwest::Client,
}

fn io_error(path: &Path, source: std::io::Error) -> HostError {
    HostError::Io {
	path: path.display().to_string(),
	source: source,
    }
}

/*
 * Write `content` to a temporary file next to `dest` and rename it over
 * `dest`, so readers see either the old or the new file, never half of it.
 */
fn replace_file(dir: &Path, dest: &Path, content: &str, mode: u32) -> Result<(), HostError> {
    let mut tmp = NamedTempFile::new_in(dir).map_err(|err| io_error(dir, err))?;

    tmp.write_all(content.as_bytes()).map_err(|err| io_error(dest, err))?;
    tmp.as_file().set_permissions(std::fs::Permissions::from_mode(mode)).map_err(|err| io_error(dest, err))?;
    tmp.as_file().sync_all().map_err(|err| io_error(dest, err))?;

    tmp.persist(dest).map_err(|err| io_error(dest, err.error))?;
    Ok(())
}

/*
 * /proc/modules has one module per line, name first:
 *
 *   br_netfilter 32768 0 - Live 0x0000000000000000
 */
pub fn parse_proc_modules(content: &str) -> Vec<String> {
    content.lines()
	.filter_map(|line| line.split_whitespace().next())
	.map(|name| name.to_string())
	.collect()
}

impl SystemHost {

    pub fn new(command_timeout: Duration, fetch_timeout: Duration) -> Result<Self, HostError> {
	let http = reqwest::Client::builder()
	    .user_agent(concat!("nodeprep/", env!("CARGO_PKG_VERSION")))
	    .timeout(fetch_timeout)
	    .build()?;

	Ok(Self{
	    command_timeout: command_timeout,
	    http: http,
	})
    }

    /*
     * Run a command to completion and hand back its raw output, whatever the
     * exit status was.
     */
    async fn output(&self, program: &str, args: &[&str]) -> Result<std::process::Output, HostError> {
	let line = host::command_line(program, args);
	log::debug!("running: {}", line);

	let child = Command::new(program)
	    .args(args)
	    .stdin(Stdio::null())
	    .stdout(Stdio::piped())
	    .stderr(Stdio::piped())
	    .kill_on_drop(true)
	    .spawn();

	let child = match child {
	    Ok(child) => child,
	    Err(err) => return Err(HostError::Spawn { command: line, source: err }),
	};

	match timeout(self.command_timeout, child.wait_with_output()).await {
	    Ok(Ok(output)) => Ok(output),
	    Ok(Err(err)) => Err(HostError::Spawn { command: line, source: err }),
	    Err(_) => Err(HostError::CommandTimeout {
		command: line,
		secs: self.command_timeout.as_secs(),
	    }),
	}
    }

    async fn run(&self, program: &str, args: &[&str]) -> Result<String, HostError> {
	let output = self.output(program, args).await?;

	if !output.status.success() {
	    return Err(HostError::CommandFailed {
		command: host::command_line(program, args),
		status: output.status.code(),
		stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
	    });
	}
	Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl Host for SystemHost {

    async fn os_release(&self) -> Result<String, HostError> {
	match self.read_file(Path::new(OS_RELEASE)).await? {
	    Some(content) => Ok(content),
	    None => Ok(String::new()),
	}
    }

    async fn hostname(&self) -> Result<String, HostError> {
	Ok(gethostname().to_string_lossy().to_string())
    }

    fn home_dir(&self) -> Option<PathBuf> {
	std::env::var_os("HOME").map(PathBuf::from)
    }

    async fn read_file(&self, path: &Path) -> Result<Option<String>, HostError> {
	match tokio::fs::read_to_string(path).await {
	    Ok(content) => Ok(Some(content)),
	    Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
	    Err(err) => Err(io_error(path, err)),
	}
    }

    async fn stat_mode(&self, path: &Path) -> Result<Option<u32>, HostError> {
	match tokio::fs::metadata(path).await {
	    Ok(metadata) => Ok(Some(metadata.permissions().mode() & 0o7777)),
	    Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
	    Err(err) => Err(io_error(path, err)),
	}
    }

    async fn write_file(&self, path: &Path, content: &str, mode: u32) -> Result<(), HostError> {
	let dir = match path.parent() {
	    Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
	    _ => PathBuf::from("."),
	};
	if let Err(err) = tokio::fs::create_dir_all(&dir).await {
	    return Err(io_error(&dir, err));
	}

	let dest = path.to_path_buf();
	let content = content.to_string();
	match tokio::task::spawn_blocking(move || replace_file(&dir, &dest, &content, mode)).await {
	    Ok(result) => result,
	    Err(err) => Err(io_error(path, std::io::Error::new(std::io::ErrorKind::Other, err))),
	}
    }

    async fn fetch_url(&self, url: &str) -> Result<String, HostError> {
	log::debug!("fetching {}", url);

	let response = match self.http.get(url).send().await {
	    Ok(response) => response,
	    Err(err) => {
		return Err(HostError::Fetch { url: url.to_string(), message: err.to_string() });
	    }
	};

	let status = response.status();
	if !status.is_success() {
	    return Err(HostError::Fetch { url: url.to_string(), message: format!("server answered {}", status) });
	}

	match response.text().await {
	    Ok(body) => Ok(body),
	    Err(err) => Err(HostError::Fetch { url: url.to_string(), message: err.to_string() }),
	}
    }

    async fn update_packages(&self) -> Result<(), HostError> {
	self.run(PACKAGE_MANAGER, &["-y", "update"]).await?;
	Ok(())
    }

    async fn install_packages(&self, packages: &[String], extra_args: &[String]) -> Result<(), HostError> {
	let mut args: Vec<&str> = vec!["install", "-y"];
	args.extend(packages.iter().map(|p| p.as_str()));
	args.extend(extra_args.iter().map(|a| a.as_str()));

	self.run(PACKAGE_MANAGER, &args).await?;
	Ok(())
    }

    async fn load_module(&self, name: &str) -> Result<(), HostError> {
	self.run("modprobe", &[name]).await?;
	Ok(())
    }

    async fn list_modules(&self) -> Result<Vec<String>, HostError> {
	match self.read_file(Path::new(PROC_MODULES)).await? {
	    Some(content) => Ok(parse_proc_modules(&content)),
	    None => Ok(vec![]),
	}
    }

    async fn read_sysctl(&self, name: &str) -> Result<Option<String>, HostError> {
	let value = self.read_file(&host::sysctl_path(name)).await?;
	Ok(value.map(|v| v.trim().to_string()))
    }

    async fn set_sysctl(&self, name: &str, value: &str) -> Result<(), HostError> {
	let assignment = format!("{}={}", name, value);
	self.run("sysctl", &["-w", assignment.as_str()]).await?;
	Ok(())
    }

    async fn apply_sysctl(&self) -> Result<(), HostError> {
	self.run("sysctl", &["--system"]).await?;
	Ok(())
    }

    async fn has_service(&self, name: &str) -> Result<bool, HostError> {
	let unit = format!("{}.service", name);

	/* list-unit-files exits non-zero when nothing matches, only stdout matters */
	let output = self.output("systemctl", &["list-unit-files", "--no-legend", "--no-pager", unit.as_str()]).await?;
	let stdout = String::from_utf8_lossy(&output.stdout);
	Ok(stdout.lines().any(|line| line.split_whitespace().next() == Some(unit.as_str())))
    }

    async fn enable_service(&self, name: &str) -> Result<(), HostError> {
	self.run("systemctl", &["enable", "--now", name]).await?;
	Ok(())
    }

    async fn disable_service(&self, name: &str) -> Result<(), HostError> {
	self.run("systemctl", &["disable", "--now", name]).await?;
	Ok(())
    }

    async fn exec(&self, program: &str, args: &[&str]) -> Result<String, HostError> {
	self.run(program, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn system_host() -> SystemHost {
	SystemHost::new(Duration::from_secs(30), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_parse_proc_modules() {
	let content = "br_netfilter 32768 0 - Live 0x0000000000000000\n\
		       bridge 315392 1 br_netfilter, Live 0x0000000000000000\n\
		       overlay 151552 0 - Live 0x0000000000000000\n";
	assert_eq!(parse_proc_modules(content), vec!["br_netfilter", "bridge", "overlay"]);
	assert!(parse_proc_modules("").is_empty());
    }

    #[tokio::test]
    async fn test_write_and_read_file() {
	let dir = tempdir().unwrap();
	let path = dir.path().join("nested/dir/k8s.conf");
	let host = system_host();

	assert_eq!(host.read_file(&path).await.unwrap(), None);
	host.write_file(&path, "overlay\n", 0o600).await.unwrap();
	assert_eq!(host.read_file(&path).await.unwrap(), Some(String::from("overlay\n")));

	let mode = std::fs::metadata(&path).unwrap().permissions().mode();
	assert_eq!(mode & 0o777, 0o600);
	assert_eq!(host.stat_mode(&path).await.unwrap(), Some(0o600));
    }

    #[tokio::test]
    async fn test_write_file_replaces_in_one_rename() {
	let dir = tempdir().unwrap();
	let path = dir.path().join("fstab");
	std::fs::write(&path, "/dev/sda2 none swap defaults 0 0\n").unwrap();
	let host = system_host();

	host.write_file(&path, "#/dev/sda2 none swap defaults 0 0\n", 0o644).await.unwrap();
	assert_eq!(std::fs::read_to_string(&path).unwrap(), "#/dev/sda2 none swap defaults 0 0\n");
	assert_eq!(host.stat_mode(&path).await.unwrap(), Some(0o644));

	/* no temporary file left behind */
	let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
	assert_eq!(entries.len(), 1);
	assert_eq!(host.stat_mode(&dir.path().join("missing")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_exec_success_and_failure() {
	let host = system_host();

	let out = host.exec("sh", &["-c", "echo provisioned"]).await.unwrap();
	assert_eq!(out.trim(), "provisioned");

	let err = host.exec("sh", &["-c", "echo nope >&2; exit 3"]).await.unwrap_err();
	assert_eq!(err.exit_status(), Some(3));
	assert!(err.to_string().contains("nope"));
    }

    #[tokio::test]
    async fn test_exec_missing_program() {
	let host = system_host();
	let err = host.exec("/nonexistent/nodeprep-tool", &[]).await.unwrap_err();
	assert!(matches!(err, HostError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_exec_timeout() {
	let host = SystemHost::new(Duration::from_millis(100), Duration::from_secs(5)).unwrap();
	let err = host.exec("sleep", &["5"]).await.unwrap_err();
	assert!(matches!(err, HostError::CommandTimeout { .. }));
    }
}
