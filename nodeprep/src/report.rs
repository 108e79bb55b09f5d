use nodeprep_api::{KubeVersion, NodeRole, StepState};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub step: String,
    pub state: String,
}

/*
 * What a run did, and what the operator has to do next.
 */
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReport {
    pub hostname: String,
    pub os: String,
    pub role: NodeRole,
    pub kube_version: String,
    pub runtime_version: String,
    pub runtime_repos: Vec<String>,
    pub kubernetes_repo: String,
    pub steps: Vec<StepOutcome>,
    pub instructions: Vec<String>,
}

impl ProvisionReport {

    pub fn record(&mut self, step: &str, state: StepState) {
	self.steps.push(StepOutcome {
	    step: step.to_string(),
	    state: state.to_string(),
	});
    }

    pub fn render_text(&self) -> String {
	let mut out = String::new();

	out.push_str(&format!("Node {} ({}) is ready to be a Kubernetes {} node.\n", self.hostname, self.os, self.role));
	out.push_str(&format!("  kubernetes {}, cri-o {}\n", self.kube_version, self.runtime_version));
	for repo in &self.runtime_repos {
	    out.push_str(&format!("  runtime repo: {}\n", repo));
	}
	out.push_str(&format!("  kubernetes repo: {}\n", self.kubernetes_repo));

	out.push_str("\nSteps:\n");
	for outcome in &self.steps {
	    out.push_str(&format!("  {:<24} {}\n", outcome.step, outcome.state));
	}

	out.push_str(&format!("\nNext steps ({}):\n", self.role));
	for line in &self.instructions {
	    out.push_str("  ");
	    out.push_str(line);
	    out.push('\n');
	}
	out
    }
}

/*
 * Manual follow-up for the operator. Control-plane nodes bootstrap the
 * cluster, workers join an existing one.
 */
pub fn instructions(role: NodeRole, kube: &KubeVersion, pod_network_cidr: &str) -> Vec<String> {
    match role {
	NodeRole::ControlPlane => vec![
	    String::from("1. Initialize the control plane:"),
	    format!("     sudo kubeadm init --kubernetes-version=v{} --pod-network-cidr={}", kube, pod_network_cidr),
	    String::from("2. Configure kubectl for your user:"),
	    String::from("     mkdir -p $HOME/.kube"),
	    String::from("     sudo cp -i /etc/kubernetes/admin.conf $HOME/.kube/config"),
	    String::from("     sudo chown $(id -u):$(id -g) $HOME/.kube/config"),
	    String::from("3. Install a pod network add-on (Calico, Flannel, ...)."),
	    String::from("4. Print the command workers need to join:"),
	    String::from("     kubeadm token create --print-join-command"),
	],
	NodeRole::Worker => vec![
	    String::from("1. On a control-plane node, print the join command:"),
	    String::from("     kubeadm token create --print-join-command"),
	    String::from("2. Run the printed command on this node:"),
	    String::from("     sudo kubeadm join <control-plane>:6443 --token <token> --discovery-token-ca-cert-hash sha256:<hash>"),
	],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kube() -> KubeVersion {
	"1.29.0".parse().unwrap()
    }

    #[test]
    fn test_control_plane_instructions() {
	let lines = instructions(NodeRole::ControlPlane, &kube(), "10.244.0.0/16").join("\n");
	assert!(lines.contains("kubeadm init --kubernetes-version=v1.29.0 --pod-network-cidr=10.244.0.0/16"));
	assert!(!lines.contains("kubeadm join"));
    }

    #[test]
    fn test_worker_instructions() {
	let lines = instructions(NodeRole::Worker, &kube(), "10.244.0.0/16").join("\n");
	assert!(lines.contains("kubeadm join"));
	assert!(!lines.contains("kubeadm init"));
    }

    #[test]
    fn test_render_text() {
	let mut report = ProvisionReport {
	    hostname: String::from("control-1"),
	    os: String::from("Rocky Linux 9.3"),
	    role: NodeRole::ControlPlane,
	    kube_version: String::from("1.29.0"),
	    runtime_version: String::from("1.29"),
	    runtime_repos: vec![String::from("https://mirror/a.repo")],
	    kubernetes_repo: String::from("https://pkgs.k8s.io/core:/stable:/v1.29/rpm/"),
	    steps: vec![],
	    instructions: instructions(NodeRole::ControlPlane, &kube(), "10.244.0.0/16"),
	};
	report.record("kernel", StepState::UNCHANGED);

	let text = report.render_text();
	assert!(text.starts_with("Node control-1 (Rocky Linux 9.3) is ready to be a Kubernetes control-plane node.\n"));
	assert!(text.contains("  runtime repo: https://mirror/a.repo\n"));
	assert!(text.contains("kernel"));
	assert!(text.contains("unchanged"));
	assert!(text.contains("Next steps (control-plane):"));
    }

    #[test]
    fn test_report_json() {
	let report = ProvisionReport {
	    hostname: String::from("worker-3"),
	    os: String::from("centos 8"),
	    role: NodeRole::Worker,
	    kube_version: String::from("1.29.0"),
	    runtime_version: String::from("1.29"),
	    runtime_repos: vec![],
	    kubernetes_repo: String::new(),
	    steps: vec![],
	    instructions: vec![],
	};

	let json = serde_json::to_value(&report).unwrap();
	assert_eq!(json["role"], "worker");
	assert_eq!(json["hostname"], "worker-3");
    }
}
