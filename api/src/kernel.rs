use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/*
 * ModuleSet is the ordered list of kernel modules the container network
 * stack needs. Order is preserved; new() drops duplicates.
 */
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ModuleSet {
    modules: Vec<String>,
}

impl ModuleSet {

    pub fn new<I, S>(modules: I) -> Self
    where
	I: IntoIterator<Item = S>,
	S: Into<String>,
    {
	let mut set = Self{ modules: vec![] };
	for module in modules {
	    let module = module.into();
	    if !set.modules.contains(&module) {
		set.modules.push(module);
	    }
	}
	set
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
	self.modules.iter()
    }

    pub fn contains(&self, name: &str) -> bool {
	self.modules.iter().any(|m| m == name)
    }

    pub fn len(&self) -> usize {
	self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
	self.modules.is_empty()
    }

    /*
     * Content of the modules-load.d(5) file: one module per line.
     */
    pub fn render(&self) -> String {
	let mut out = String::new();
	for module in &self.modules {
	    out.push_str(module);
	    out.push('\n');
	}
	out
    }
}

impl Default for ModuleSet {
    fn default() -> Self {
	Self::new(["overlay", "br_netfilter"])
    }
}

/*
 * SysctlSet maps a kernel tunable (dotted name) to the value it must hold.
 */
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct SysctlSet {
    params: BTreeMap<String, String>,
}

impl SysctlSet {

    pub fn new<I, K, V>(params: I) -> Self
    where
	I: IntoIterator<Item = (K, V)>,
	K: Into<String>,
	V: Into<String>,
    {
	Self{
	    params: params.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
	}
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
	self.params.iter()
    }

    pub fn len(&self) -> usize {
	self.params.len()
    }

    pub fn is_empty(&self) -> bool {
	self.params.is_empty()
    }

    /*
     * Content of the sysctl.d(5) file: "name = value" per line.
     */
    pub fn render(&self) -> String {
	let mut out = String::new();
	for (name, value) in &self.params {
	    out.push_str(&format!("{} = {}\n", name, value));
	}
	out
    }
}

impl Default for SysctlSet {
    fn default() -> Self {
	Self::new([
	    ("net.bridge.bridge-nf-call-ip6tables", "1"),
	    ("net.bridge.bridge-nf-call-iptables", "1"),
	    ("net.ipv4.ip_forward", "1"),
	])
    }
}
