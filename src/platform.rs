//! Platform profiles
//!
//! Everything that differs between the supported operating systems lives in
//! one [`Platform`] value, picked once before compilation. The compiler never
//! branches on a distribution name.

use anyhow::{Context, Result};
use declarative::{
    CommandRunner, CommandSpec, DEFAULT_SEARCH_PATH, HostCommands, PackageManager, ServiceManager,
};
use std::time::Duration;
use thiserror::Error;

/// How the open-file limit for the server is configured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UlimitStyle {
    /// `LimitNOFILE` in the `[Service]` section of a systemd environment file
    Ini { path: &'static str },
    /// `ulimit -n N` line in a shell defaults file
    FileLine { path: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub id: &'static str,
    pub package_manager: PackageManager,
    pub service_manager: ServiceManager,
    pub package_name: &'static str,
    pub nss_package: &'static str,
    /// Instance setup tool
    pub setup_command: &'static str,
    pub ulimit: UlimitStyle,
    pub rehash_command: &'static str,
    pub user_shell: &'static str,
    /// Directory for concatenated external certificate bundles
    pub bundle_dir: &'static str,
    /// Whether the server understands `sslVersionMin`
    pub supports_ssl_version_min: bool,
}

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("unknown platform `{id}` (known: {})", known_ids().join(", "))]
    Unknown { id: String },
}

const DEBIAN_7: Platform = Platform {
    id: "debian-7",
    package_manager: PackageManager::Apt,
    service_manager: ServiceManager::SysV,
    package_name: "389-ds-base",
    nss_package: "libnss3-tools",
    setup_command: "setup-ds",
    ulimit: UlimitStyle::FileLine {
        path: "/etc/default/dirsrv",
    },
    rehash_command: "c_rehash",
    user_shell: "/bin/false",
    bundle_dir: "/etc/ssl",
    supports_ssl_version_min: false,
};

const DEBIAN_8: Platform = Platform {
    id: "debian-8",
    service_manager: ServiceManager::Systemd,
    ulimit: UlimitStyle::Ini {
        path: "/etc/default/dirsrv.systemd",
    },
    supports_ssl_version_min: true,
    ..DEBIAN_7
};

const REDHAT_6: Platform = Platform {
    id: "redhat-6",
    package_manager: PackageManager::Yum,
    service_manager: ServiceManager::SysV,
    package_name: "389-ds-base",
    nss_package: "nss-tools",
    setup_command: "setup-ds.pl",
    ulimit: UlimitStyle::FileLine {
        path: "/etc/sysconfig/dirsrv",
    },
    rehash_command: "cacertdir_rehash",
    user_shell: "/sbin/nologin",
    bundle_dir: "/etc/pki/tls/certs",
    supports_ssl_version_min: false,
};

const REDHAT_7: Platform = Platform {
    id: "redhat-7",
    service_manager: ServiceManager::Systemd,
    ulimit: UlimitStyle::Ini {
        path: "/etc/sysconfig/dirsrv.systemd",
    },
    supports_ssl_version_min: true,
    ..REDHAT_6
};

const PROFILES: &[Platform] = &[
    DEBIAN_7,
    DEBIAN_8,
    Platform {
        id: "ubuntu-14.04",
        ..DEBIAN_7
    },
    Platform {
        id: "ubuntu-16.04",
        ..DEBIAN_8
    },
    REDHAT_6,
    REDHAT_7,
    Platform {
        id: "debian-generic",
        ..DEBIAN_8
    },
    Platform {
        id: "redhat-generic",
        ..REDHAT_7
    },
];

fn known_ids() -> Vec<&'static str> {
    PROFILES.iter().map(|p| p.id).collect()
}

impl Platform {
    /// Look up a profile by id
    pub fn lookup(id: &str) -> Result<Self, PlatformError> {
        PROFILES
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| PlatformError::Unknown { id: id.to_string() })
    }

    /// Pick a profile from the contents of `/etc/os-release`.
    ///
    /// Exact `ID-VERSION_ID` matches win; otherwise the `ID`/`ID_LIKE` family
    /// decides between the generic debian and redhat profiles.
    pub fn from_os_release(text: &str) -> Result<Self, PlatformError> {
        let field = |key: &str| {
            text.lines()
                .filter_map(|line| line.split_once('='))
                .find(|(k, _)| k.trim() == key)
                .map(|(_, v)| v.trim().trim_matches('"').to_string())
                .unwrap_or_default()
        };
        let id = field("ID");
        let version = field("VERSION_ID");
        let major = version.split('.').next().unwrap_or_default();

        let exact = match id.as_str() {
            "ubuntu" => format!("ubuntu-{version}"),
            "rhel" | "centos" => format!("redhat-{major}"),
            other => format!("{other}-{major}"),
        };
        if let Ok(platform) = Self::lookup(&exact) {
            return Ok(platform);
        }

        let like = field("ID_LIKE");
        let family = |name: &str| id == name || like.split_whitespace().any(|l| l == name);
        if family("debian") || family("ubuntu") {
            Self::lookup("debian-generic")
        } else if family("rhel") || family("fedora") || family("centos") {
            Self::lookup("redhat-generic")
        } else {
            Err(PlatformError::Unknown { id: exact })
        }
    }

    /// Detect the local platform from `/etc/os-release`
    pub fn detect() -> Result<Self> {
        let text = std::fs::read_to_string("/etc/os-release")
            .context("Could not read /etc/os-release; set [facts] platform in the manifest")?;
        Ok(Self::from_os_release(&text)?)
    }

    /// Host query and mutation commands for this platform
    pub fn host_commands(&self) -> HostCommands {
        HostCommands::new(self.package_manager, self.service_manager)
    }

    pub fn is_systemd(&self) -> bool {
        self.service_manager == ServiceManager::Systemd
    }
}

/// Host facts the compiler depends on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Facts {
    pub fqdn: String,
}

impl Facts {
    /// Use the manifest override, otherwise ask `hostname -f`
    pub fn gather(fqdn: Option<&str>, runner: &dyn CommandRunner) -> Result<Self> {
        if let Some(fqdn) = fqdn {
            return Ok(Self {
                fqdn: fqdn.to_string(),
            });
        }
        let output = runner.run(&CommandSpec {
            command: "hostname -f".to_string(),
            cwd: None,
            search_path: DEFAULT_SEARCH_PATH.to_string(),
            timeout: Duration::from_secs(10),
        })?;
        let fqdn = output.stdout_str().trim().to_string();
        if !output.success() || fqdn.is_empty() {
            anyhow::bail!(
                "Could not determine the host fqdn (hostname -f exited {}); set [facts] fqdn",
                output.status_label()
            );
        }
        log::debug!("detected fqdn {fqdn}");
        Ok(Self { fqdn })
    }
}
