//! Distribution detection and per-family package sets.

use crate::{ProvisionError, ProvisionResult};
use node::{ExecuteRequest, Node};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

const PACKAGE_INSTALL_TIMEOUT: Duration = Duration::from_secs(1800);

/// Tools the build itself runs, installed before anything else.
pub const BUILD_TOOLS: &[&str] = &["git", "gcc", "make"];

/// Packages every family needs to build LTP.
pub const COMMON_PACKAGES: &[&str] = &["m4", "bison", "flex", "psmisc", "autoconf", "automake"];

/// The fields of `/etc/os-release` used for family detection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsRelease {
    pub id: String,
    pub id_like: Vec<String>,
    pub version_id: String,
    pub pretty_name: String,
}

impl OsRelease {
    pub fn parse(content: &str) -> Self {
        let mut fields = HashMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let value = value.trim().trim_matches('"').trim_matches('\'');
                fields.insert(key.trim().to_string(), value.to_string());
            }
        }

        let field = |key: &str| fields.get(key).cloned().unwrap_or_default();
        let id = field("ID").to_lowercase();
        let pretty_name = match fields.get("PRETTY_NAME") {
            Some(name) => name.clone(),
            None => format!("{} {}", id, field("VERSION_ID")).trim().to_string(),
        };

        Self {
            id,
            id_like: field("ID_LIKE")
                .split_whitespace()
                .map(|s| s.to_lowercase())
                .collect(),
            version_id: field("VERSION_ID"),
            pretty_name,
        }
    }

    fn is_like(&self, names: &[&str]) -> bool {
        names.contains(&self.id.as_str())
            || self.id_like.iter().any(|like| names.contains(&like.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OsFamily {
    Fedora,
    Debian,
    Suse,
    Mariner,
}

impl std::fmt::Display for OsFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OsFamily::Fedora => write!(f, "fedora"),
            OsFamily::Debian => write!(f, "debian"),
            OsFamily::Suse => write!(f, "suse"),
            OsFamily::Mariner => write!(f, "mariner"),
        }
    }
}

impl OsFamily {
    pub fn install_command(&self, packages: &[&str]) -> String {
        let packages = packages.join(" ");
        match self {
            OsFamily::Fedora => format!("yum install -y {}", packages),
            OsFamily::Debian => format!(
                "DEBIAN_FRONTEND=noninteractive apt-get install -y -q {}",
                packages
            ),
            OsFamily::Suse => format!("zypper --non-interactive install {}", packages),
            OsFamily::Mariner => format!("tdnf install -y {}", packages),
        }
    }

    /// Index refresh to run once before installing, if the family needs one.
    pub fn refresh_command(&self) -> Option<&'static str> {
        match self {
            OsFamily::Debian => Some("apt-get update -q"),
            OsFamily::Suse => Some("zypper --non-interactive refresh"),
            OsFamily::Fedora | OsFamily::Mariner => None,
        }
    }
}

const REDHAT_IDS: &[&str] = &["rhel", "centos", "rocky", "almalinux", "ol"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsInfo {
    pub family: OsFamily,
    pub release: OsRelease,
}

impl OsInfo {
    pub fn from_release(release: OsRelease) -> ProvisionResult<Self> {
        let family = if release.is_like(&["mariner", "azurelinux"]) {
            OsFamily::Mariner
        } else if release.is_like(&["debian", "ubuntu"]) {
            OsFamily::Debian
        } else if release.is_like(&["sles", "suse", "opensuse", "opensuse-leap", "opensuse-tumbleweed", "sle_hpc"]) {
            OsFamily::Suse
        } else if release.is_like(&["fedora", "rhel", "centos", "rocky", "almalinux", "ol"]) {
            OsFamily::Fedora
        } else {
            return Err(ProvisionError::UnsupportedEnvironment {
                os: release.pretty_name.clone(),
            });
        };

        Ok(Self { family, release })
    }

    pub async fn detect(node: &Node) -> ProvisionResult<Self> {
        let content = node.os_release().await?;
        let info = Self::from_release(OsRelease::parse(&content))?;
        info!(
            "Detected {} ({} family)",
            info.release.pretty_name, info.family
        );
        Ok(info)
    }

    pub fn is_redhat(&self) -> bool {
        REDHAT_IDS.contains(&self.release.id.as_str())
    }

    pub fn major_version(&self) -> Option<u32> {
        self.release
            .version_id
            .split('.')
            .next()
            .and_then(|major| major.parse().ok())
    }

    /// Distribution specific LTP build dependencies.
    pub fn ltp_packages(&self) -> Vec<&'static str> {
        match self.family {
            OsFamily::Fedora => {
                let mut packages = vec!["libaio-devel", "libattr", "libcap-devel", "libdb"];
                if self.is_redhat() && self.major_version().is_some_and(|major| major >= 8) {
                    packages.push("ntp");
                } else {
                    packages.push("db4-utils");
                }
                packages
            }
            OsFamily::Debian => vec![
                "ntp",
                "libaio-dev",
                "libattr1",
                "libcap-dev",
                "keyutils",
                "libdb4.8",
                "libberkeleydb-perl",
                "expect",
                "dh-autoreconf",
                "gdb",
                "libnuma-dev",
                "quota",
                "genisoimage",
                "db-util",
                "unzip",
                "exfat-utils",
            ],
            OsFamily::Suse => vec![
                "ntp",
                "git-core",
                "db48-utils",
                "libaio-devel",
                "libattr1",
                "libcap-progs",
                "libdb-4_8",
                "perl-BerkeleyDB",
            ],
            OsFamily::Mariner => vec!["kernel-headers", "binutils", "glibc-devel", "zlib-devel"],
        }
    }
}

pub async fn install_packages(node: &Node, family: OsFamily, packages: &[&str]) -> ProvisionResult<()> {
    if packages.is_empty() {
        return Ok(());
    }

    info!("Installing packages on {}: {}", family, packages.join(", "));
    let request = ExecuteRequest::new(family.install_command(packages))
        .with_sudo(true)
        .with_force_run(true)
        .with_timeout(PACKAGE_INSTALL_TIMEOUT);
    node.execute_checked(request).await?;
    Ok(())
}

pub async fn refresh_package_index(node: &Node, family: OsFamily) -> ProvisionResult<()> {
    if let Some(command) = family.refresh_command() {
        let request = ExecuteRequest::new(command)
            .with_sudo(true)
            .with_timeout(PACKAGE_INSTALL_TIMEOUT);
        node.execute_checked(request).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const UBUNTU: &str = r#"
NAME="Ubuntu"
VERSION_ID="22.04"
ID=ubuntu
ID_LIKE=debian
PRETTY_NAME="Ubuntu 22.04.3 LTS"
"#;

    fn info(content: &str) -> ProvisionResult<OsInfo> {
        OsInfo::from_release(OsRelease::parse(content))
    }

    #[test]
    fn test_parse_os_release() {
        let release = OsRelease::parse(UBUNTU);
        assert_eq!(release.id, "ubuntu");
        assert_eq!(release.id_like, vec!["debian".to_string()]);
        assert_eq!(release.version_id, "22.04");
        assert_eq!(release.pretty_name, "Ubuntu 22.04.3 LTS");
    }

    #[test]
    fn test_family_detection() {
        assert_eq!(info(UBUNTU).unwrap().family, OsFamily::Debian);
        assert_eq!(
            info("ID=\"rhel\"\nVERSION_ID=\"8.6\"\nID_LIKE=\"fedora\"").unwrap().family,
            OsFamily::Fedora
        );
        assert_eq!(
            info("ID=\"sles\"\nVERSION_ID=\"15.4\"").unwrap().family,
            OsFamily::Suse
        );
        assert_eq!(
            info("ID=mariner\nVERSION_ID=\"2.0\"").unwrap().family,
            OsFamily::Mariner
        );
        assert_eq!(
            info("ID=opensuse-leap\nID_LIKE=\"suse opensuse\"").unwrap().family,
            OsFamily::Suse
        );
    }

    #[test]
    fn test_unknown_family_is_unsupported() {
        let error = info("ID=freebsd\nPRETTY_NAME=\"FreeBSD 14.0\"").unwrap_err();
        assert!(matches!(
            error,
            ProvisionError::UnsupportedEnvironment { ref os } if os == "FreeBSD 14.0"
        ));
    }

    #[test]
    fn test_fedora_packages_depend_on_redhat_release() {
        let rhel8 = info("ID=rhel\nVERSION_ID=\"8.6\"").unwrap();
        assert!(rhel8.is_redhat());
        assert!(rhel8.ltp_packages().contains(&"ntp"));
        assert!(!rhel8.ltp_packages().contains(&"db4-utils"));

        let centos7 = info("ID=centos\nVERSION_ID=\"7\"").unwrap();
        assert!(centos7.ltp_packages().contains(&"db4-utils"));

        let fedora = info("ID=fedora\nVERSION_ID=38").unwrap();
        assert!(!fedora.is_redhat());
        assert!(fedora.ltp_packages().contains(&"db4-utils"));
    }

    #[test]
    fn test_install_commands() {
        assert_eq!(
            OsFamily::Mariner.install_command(&["binutils", "zlib-devel"]),
            "tdnf install -y binutils zlib-devel"
        );
        assert!(OsFamily::Debian
            .install_command(&["gdb"])
            .starts_with("DEBIAN_FRONTEND=noninteractive apt-get install"));
        assert_eq!(OsFamily::Debian.refresh_command(), Some("apt-get update -q"));
        assert_eq!(OsFamily::Fedora.refresh_command(), None);
    }

    #[test]
    fn test_every_family_has_packages() {
        for content in [UBUNTU, "ID=fedora", "ID=sles", "ID=mariner"] {
            assert!(!info(content).unwrap().ltp_packages().is_empty());
        }
    }
}
