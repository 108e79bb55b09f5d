use clap::{Parser, Subcommand, ValueEnum};
use configc::{Host, SystemHost};
use env_logger::Env;
use log;
use nodeprep::{resolver, Error, Provisioner};
use nodeprep_api::{KubeVersion, NodeprepConfig, RoleSetting, RuntimeVersion};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

const DEFAULT_CONFIG: &str = "/etc/nodeprep.toml";

#[derive(Parser, Debug)]
#[command(name = "nodeprep", version, about = "Prepare a RHEL family host for kubeadm and cri-o")]
struct Cli {
    /// Configuration file (defaults to /etc/nodeprep.toml when present)
    #[arg(short, long, global = true, env = "NODEPREP_CONFIG")]
    config: Option<PathBuf>,

    /// Kubernetes release to install, e.g. 1.29.0
    #[arg(long, global = true)]
    kube_version: Option<String>,

    /// cri-o stream to install, e.g. 1.29
    #[arg(long, global = true)]
    runtime_version: Option<String>,

    /// control-plane, worker or auto (guess from the hostname)
    #[arg(long, global = true)]
    role: Option<RoleSetting>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Provision this host
    Apply {
	#[arg(short, long, value_enum, default_value_t = Output::Text)]
	output: Output,

	/// No progress banners
	#[arg(short, long)]
	quiet: bool,
    },

    /// Show what apply would change, without changing anything
    Plan,

    /// Print the repositories selected for this host
    Resolve {
	/// Resolve for this major release instead of /etc/os-release
	#[arg(long)]
	os_major: Option<u32>,
    },

    /// Print the JSON schema of the configuration file
    Schema,
}

#[derive(ValueEnum, Debug, Copy, Clone, PartialEq, Eq)]
enum Output {
    Text,
    Json,
}

fn load_config(cli: &Cli) -> Result<NodeprepConfig, Error> {
    let mut config = match &cli.config {
	Some(path) => NodeprepConfig::from_file(path)?,
	None if Path::new(DEFAULT_CONFIG).exists() => NodeprepConfig::from_file(DEFAULT_CONFIG)?,
	None => NodeprepConfig::default(),
    };

    if let Some(kube_version) = &cli.kube_version {
	config.kube_version = kube_version.clone();
    }
    if let Some(runtime_version) = &cli.runtime_version {
	config.runtime_version = runtime_version.clone();
    }
    if let Some(role) = cli.role {
	config.role = Some(role);
    }

    config.validate()?;
    Ok(config)
}

fn system_host(config: &NodeprepConfig) -> Result<SystemHost, Error> {
    let host = SystemHost::new(Duration::from_secs(config.timeouts.command_secs),
			       Duration::from_secs(config.timeouts.fetch_secs))?;
    Ok(host)
}

async fn apply(config: NodeprepConfig, output: Output, quiet: bool) -> Result<(), Error> {
    let host = system_host(&config)?;
    let provisioner = Provisioner::new(config)?.with_banners(!quiet && output == Output::Text);

    let report = provisioner.run(&host).await?;
    match output {
	Output::Text => print!("{}", report.render_text()),
	Output::Json => println!("{}", to_json(&report)),
    }
    Ok(())
}

async fn plan(config: NodeprepConfig) -> Result<(), Error> {
    let host = system_host(&config)?;
    let provisioner = Provisioner::new(config)?;

    for entry in provisioner.plan(&host).await? {
	println!("{:<22} {:<11} {}", entry.step.to_string(), entry.planned.to_string(), entry.what);
    }
    Ok(())
}

/*
 * Only needs the versions and, without --os-major, /etc/os-release.
 */
async fn resolve(config: NodeprepConfig, os_major: Option<u32>) -> Result<(), Error> {
    let (kube, runtime): (KubeVersion, RuntimeVersion) = config.versions()?;

    let major = match os_major {
	Some(major) => major,
	None => {
	    let host = system_host(&config)?;
	    resolver::detect_os(&host.os_release().await?)?.major
	},
    };

    let repos = resolver::runtime_repos(major, &runtime, &config.repos.runtime_mirror);
    println!("# {} for major release {}", resolver::os_flavor(major), major);
    for source in repos.sources() {
	println!("{}", source.url);
    }

    let kubernetes = resolver::kubernetes_repo(&kube, &config.repos.kubernetes_mirror);
    println!("\n# {}", config.repos.repo_dir.join(&config.repos.kubernetes_repo_file).display());
    print!("{}", kubernetes.render());
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    match serde_json::to_string_pretty(value) {
	Ok(json) => json,
	Err(err) => {
	    log::error!("unable to serialize to json: {}", err);
	    String::from("{}")
	}
    }
}

async fn dispatch(cli: Cli) -> Result<(), Error> {
    if let Command::Schema = cli.command {
	let schema = schemars::schema_for!(NodeprepConfig);
	println!("{}", to_json(&schema));
	return Ok(());
    }

    let config = load_config(&cli)?;
    match cli.command {
	Command::Apply { output, quiet } => apply(config, output, quiet).await,
	Command::Plan => plan(config).await,
	Command::Resolve { os_major } => resolve(config, os_major).await,
	Command::Schema => Ok(()),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    log::debug!("{:?}", cli);

    match dispatch(cli).await {
	Ok(()) => ExitCode::SUCCESS,
	Err(err) => {
	    log::error!("{}", err);
	    eprintln!("nodeprep: {}", err);
	    ExitCode::from(err.exit_code())
	}
    }
}
