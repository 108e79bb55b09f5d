use crate::errors::Error;
use std::fmt;
use std::str::FromStr;

/*
 * KubeVersion is the Kubernetes release the node is pinned to, e.g. "1.29.0".
 * A leading 'v' is accepted and dropped.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KubeVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

/*
 * RuntimeVersion is the CRI-O release stream, e.g. "1.29". CRI-O follows the
 * Kubernetes minor cadence so only major.minor are meaningful; a patch part is
 * tolerated but kept for display only.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: Option<u32>,
}

fn numeric_parts(input: &str) -> Result<Vec<u32>, Error> {
    let trimmed = input.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);

    if trimmed.is_empty() {
	return Err(Error::InvalidVersion {
	    input: input.to_string(),
	    reason: String::from("empty version"),
	});
    }

    let mut parts = vec![];
    for part in trimmed.split('.') {
	match part.parse::<u32>() {
	    Ok(n) => parts.push(n),
	    Err(_) => {
		return Err(Error::InvalidVersion {
		    input: input.to_string(),
		    reason: format!("'{}' is not a number", part),
		});
	    }
	}
    }
    Ok(parts)
}

impl FromStr for KubeVersion {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
	let parts = numeric_parts(input)?;
	if parts.len() != 3 {
	    return Err(Error::InvalidVersion {
		input: input.to_string(),
		reason: String::from("expected major.minor.patch"),
	    });
	}

	Ok(Self{
	    major: parts[0],
	    minor: parts[1],
	    patch: parts[2],
	})
    }
}

impl KubeVersion {

    /*
     * The "v1.29" form used in the pkgs.k8s.io repository layout.
     */
    pub fn stream(&self) -> String {
	format!("v{}.{}", self.major, self.minor)
    }
}

impl fmt::Display for KubeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for RuntimeVersion {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
	let parts = numeric_parts(input)?;
	match parts.len() {
	    2 => Ok(Self{ major: parts[0], minor: parts[1], patch: None }),
	    3 => Ok(Self{ major: parts[0], minor: parts[1], patch: Some(parts[2]) }),
	    _ => Err(Error::InvalidVersion {
		input: input.to_string(),
		reason: String::from("expected major.minor"),
	    }),
	}
    }
}

impl RuntimeVersion {

    /*
     * The "1.29" form used by the cri-o repository names.
     */
    pub fn stream(&self) -> String {
	format!("{}.{}", self.major, self.minor)
    }
}

impl fmt::Display for RuntimeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	match self.patch {
	    Some(patch) => write!(f, "{}.{}.{}", self.major, self.minor, patch),
	    None => write!(f, "{}.{}", self.major, self.minor),
	}
    }
}

/*
 * CRI-O must track the Kubernetes minor it runs under; a mismatched pair is
 * refused before anything touches the host.
 */
pub fn check_pairing(kube: &KubeVersion, runtime: &RuntimeVersion) -> Result<(), Error> {
    if kube.major != runtime.major || kube.minor != runtime.minor {
	return Err(Error::VersionMismatch {
	    kube: kube.to_string(),
	    runtime: runtime.to_string(),
	});
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kube_version() {
	let v: KubeVersion = "1.29.0".parse().unwrap();
	assert_eq!(v, KubeVersion { major: 1, minor: 29, patch: 0 });
	assert_eq!(v.stream(), "v1.29");

	let v: KubeVersion = "v1.30.2".parse().unwrap();
	assert_eq!(v.to_string(), "1.30.2");
    }

    #[test]
    fn test_parse_kube_version_rejects_partial() {
	assert!("1.29".parse::<KubeVersion>().is_err());
	assert!("".parse::<KubeVersion>().is_err());
	assert!("1.x.0".parse::<KubeVersion>().is_err());
    }

    #[test]
    fn test_parse_runtime_version() {
	let v: RuntimeVersion = "1.29".parse().unwrap();
	assert_eq!(v.stream(), "1.29");
	assert_eq!(v.to_string(), "1.29");

	let v: RuntimeVersion = "1.29.1".parse().unwrap();
	assert_eq!(v.stream(), "1.29");
	assert_eq!(v.patch, Some(1));

	assert!("1".parse::<RuntimeVersion>().is_err());
    }

    #[test]
    fn test_pairing_matches_minor() {
	let kube: KubeVersion = "1.29.0".parse().unwrap();
	assert!(check_pairing(&kube, &"1.29".parse().unwrap()).is_ok());
	assert!(check_pairing(&kube, &"1.29.3".parse().unwrap()).is_ok());
    }

    #[test]
    fn test_pairing_rejects_mismatch() {
	let kube: KubeVersion = "1.29.0".parse().unwrap();
	let err = check_pairing(&kube, &"1.28".parse().unwrap()).unwrap_err();
	assert!(matches!(err, Error::VersionMismatch { .. }));
	assert!(check_pairing(&kube, &"2.29".parse().unwrap()).is_err());
    }
}
