use crate::errors::Error;
use std::collections::BTreeMap;

/*
 * The Red Hat family identifiers we are willing to provision. Anything that
 * doesn't carry one of them in ID or ID_LIKE is refused.
 */
const RHEL_FAMILY: &[&str] = &["rhel", "centos", "fedora", "rocky", "almalinux", "ol"];

/* Major releases that have a cri-o repository flavor */
pub const SUPPORTED_MAJORS: &[u32] = &[8, 9];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsRelease {
    pub id: String,
    pub id_like: Vec<String>,
    pub version_id: String,
    pub major: u32,
    pub pretty_name: Option<String>,
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    let value = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')).unwrap_or(value);
    let value = value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')).unwrap_or(value);
    value.to_string()
}

impl OsRelease {

    /*
     * Parse the KEY=value contents of /etc/os-release.
     *
     * VERSION_ID is mandatory and its first dot-separated component must be
     * numeric, e.g.:
     *
     *   ID="rocky"
     *   ID_LIKE="rhel centos fedora"
     *   VERSION_ID="9.3"
     */
    pub fn parse(content: &str) -> Result<Self, Error> {
	let mut fields: BTreeMap<String, String> = BTreeMap::new();

	for line in content.lines() {
	    let line = line.trim();
	    if line.is_empty() || line.starts_with('#') {
		continue;
	    }
	    if let Some((key, value)) = line.split_once('=') {
		fields.insert(key.trim().to_string(), unquote(value));
	    }
	}

	let version_id = match fields.get("VERSION_ID") {
	    Some(v) if !v.is_empty() => v.clone(),
	    _ => return Err(Error::MalformedOsRelease(String::from("VERSION_ID is missing or empty"))),
	};

	let major = match version_id.split('.').next().map(|m| m.parse::<u32>()) {
	    Some(Ok(major)) => major,
	    _ => {
		let errmsg = format!("VERSION_ID '{}' does not start with a numeric major release", version_id);
		return Err(Error::MalformedOsRelease(errmsg));
	    }
	};

	let id = fields.get("ID").cloned().unwrap_or_default();
	let id_like = match fields.get("ID_LIKE") {
	    Some(like) => like.split_whitespace().map(|s| s.to_string()).collect(),
	    None => vec![],
	};

	Ok(Self{
	    id: id,
	    id_like: id_like,
	    version_id: version_id,
	    major: major,
	    pretty_name: fields.get("PRETTY_NAME").cloned(),
	})
    }

    pub fn is_rhel_family(&self) -> bool {
	RHEL_FAMILY.contains(&self.id.as_str())
	    || self.id_like.iter().any(|like| RHEL_FAMILY.contains(&like.as_str()))
    }

    pub fn is_supported(&self) -> bool {
	self.is_rhel_family() && SUPPORTED_MAJORS.contains(&self.major)
    }

    pub fn display_name(&self) -> String {
	match &self.pretty_name {
	    Some(name) => name.clone(),
	    None => format!("{} {}", self.id, self.version_id),
	}
    }
}
