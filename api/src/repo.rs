use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/*
 * RepoDescriptor is a yum/dnf repository section that we render ourselves,
 * e.g. the kubernetes.repo:
 *
 *   [kubernetes]
 *   name=Kubernetes
 *   baseurl=https://pkgs.k8s.io/core:/stable:/v1.29/rpm/
 *   [ ... ]
 */
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RepoDescriptor {

    /* section id, also the dnf repo id used by --disableexcludes */
    pub id: String,

    pub name: String,

    pub base_url: String,

    pub gpg_key: Option<String>,

    pub enabled: bool,

    pub gpgcheck: bool,

    /* packages hidden from regular dnf upgrades */
    pub exclude: Vec<String>,
}

fn flag(value: bool) -> &'static str {
    match value {
	true => "1",
	false => "0",
    }
}

impl RepoDescriptor {

    pub fn render(&self) -> String {
	let mut out = format!("[{}]\nname={}\nbaseurl={}\nenabled={}\ngpgcheck={}\n",
			      self.id, self.name, self.base_url, flag(self.enabled), flag(self.gpgcheck));

	if let Some(key) = &self.gpg_key {
	    out.push_str(&format!("gpgkey={}\n", key));
	}
	if self.exclude.len() > 0 {
	    out.push_str(&format!("exclude={}\n", self.exclude.join(" ")));
	}
	out
    }
}

/*
 * RepoSource is a .repo file published by a third party (the opensuse kubic
 * mirrors for cri-o) that we download and drop as-is in the repo directory.
 */
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RepoSource {
    pub url: String,

    /* file name inside the repo directory */
    pub file_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_with_key_and_excludes() {
	let repo = RepoDescriptor {
	    id: "kubernetes".to_string(),
	    name: "Kubernetes".to_string(),
	    base_url: "https://pkgs.k8s.io/core:/stable:/v1.29/rpm/".to_string(),
	    gpg_key: Some("https://pkgs.k8s.io/core:/stable:/v1.29/rpm/repodata/repomd.xml.key".to_string()),
	    enabled: true,
	    gpgcheck: true,
	    exclude: vec!["kubelet".to_string(), "kubeadm".to_string()],
	};

	let rendered = repo.render();
	assert!(rendered.starts_with("[kubernetes]\nname=Kubernetes\n"));
	assert!(rendered.contains("baseurl=https://pkgs.k8s.io/core:/stable:/v1.29/rpm/\n"));
	assert!(rendered.contains("enabled=1\ngpgcheck=1\n"));
	assert!(rendered.contains("gpgkey=https://pkgs.k8s.io/core:/stable:/v1.29/rpm/repodata/repomd.xml.key\n"));
	assert!(rendered.ends_with("exclude=kubelet kubeadm\n"));
    }

    #[test]
    fn test_render_minimal() {
	let repo = RepoDescriptor {
	    id: "local".to_string(),
	    name: "Local".to_string(),
	    base_url: "file:///srv/repo".to_string(),
	    gpg_key: None,
	    enabled: false,
	    gpgcheck: false,
	    exclude: vec![],
	};

	assert_eq!(repo.render(), "[local]\nname=Local\nbaseurl=file:///srv/repo\nenabled=0\ngpgcheck=0\n");
    }
}
