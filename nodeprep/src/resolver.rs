use crate::errors::Error;
use nodeprep_api as api;
use nodeprep_api::{KubeVersion, OsRelease, RepoDescriptor, RepoSource, RuntimeVersion};

/* packages kept out of regular upgrades, see --disableexcludes */
const KUBERNETES_EXCLUDES: &[&str] = &["kubelet", "kubeadm", "kubectl", "cri-tools", "kubernetes-cni"];

/*
 * The two .repo files needed to install cri-o: the libcontainers base
 * repository and the one pinned to a cri-o stream.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeRepos {
    pub base: RepoSource,
    pub pinned: RepoSource,
}

impl RuntimeRepos {
    pub fn sources(&self) -> [&RepoSource; 2] {
	[&self.base, &self.pinned]
    }
}

/*
 * The kubic tree only knows two Red Hat flavors. Release 9 and newer use the
 * Stream 9 one, everything below gets the 8 one.
 */
pub fn os_flavor(major: u32) -> &'static str {
    if major >= 9 {
	"CentOS_9_Stream"
    } else {
	"CentOS_8"
    }
}

pub fn runtime_repos(major: u32, runtime: &RuntimeVersion, mirror: &str) -> RuntimeRepos {
    let mirror = mirror.trim_end_matches('/');
    let flavor = os_flavor(major);
    let stream = runtime.stream();

    let base_file = String::from("devel:kubic:libcontainers:stable.repo");
    let pinned_file = format!("devel:kubic:libcontainers:stable:cri-o:{}.repo", stream);

    RuntimeRepos {
	base: RepoSource {
	    url: format!("{}/devel:/kubic:/libcontainers:/stable/{}/{}", mirror, flavor, base_file),
	    file_name: base_file,
	},
	pinned: RepoSource {
	    url: format!("{}/devel:/kubic:/libcontainers:/stable:/cri-o:/{}/{}/{}", mirror, stream, flavor, pinned_file),
	    file_name: pinned_file,
	},
    }
}

pub fn kubernetes_repo(kube: &KubeVersion, mirror: &str) -> RepoDescriptor {
    let base_url = format!("{}/{}/rpm/", mirror.trim_end_matches('/'), kube.stream());

    RepoDescriptor {
	id: String::from("kubernetes"),
	name: String::from("Kubernetes"),
	gpg_key: Some(format!("{}repodata/repomd.xml.key", base_url)),
	base_url: base_url,
	enabled: true,
	gpgcheck: true,
	exclude: KUBERNETES_EXCLUDES.iter().map(|s| s.to_string()).collect(),
    }
}

/*
 * Parse /etc/os-release and refuse anything we don't have repositories for.
 */
pub fn detect_os(content: &str) -> Result<OsRelease, Error> {
    let os = OsRelease::parse(content)?;

    if !os.is_rhel_family() {
	let errmsg = format!("{} is not a Red Hat family distribution", os.display_name());
	return Err(Error::UnsupportedOs(errmsg));
    }
    if !os.is_supported() {
	let errmsg = format!("{} (major release {}) is not supported, expected one of {:?}",
			     os.display_name(), os.major, api::osrelease::SUPPORTED_MAJORS);
	return Err(Error::UnsupportedOs(errmsg));
    }
    Ok(os)
}

/*
 * A fetched .repo file must at least carry one [section] header; mirrors
 * happily answer 200 with an html error page.
 */
pub fn check_repo_file(url: &str, content: &str) -> Result<(), Error> {
    let has_section = content.lines()
	.map(|line| line.trim())
	.any(|line| line.starts_with('[') && line.ends_with(']') && line.len() > 2);

    match has_section {
	true => Ok(()),
	false => Err(Error::MalformedRepo { url: url.to_string() }),
    }
}
