use anyhow::{Context, Result};
use declarative::ServiceEnsure;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

// ============================================================================
// Manifest
// ============================================================================

/// The ds389 manifest: module defaults, fact overrides and named instances
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Module-wide parameters; every field falls back to a built-in default
    #[serde(default)]
    pub module: ModuleConfig,

    /// Overrides for detected host facts
    #[serde(default)]
    pub facts: FactsConfig,

    /// Directory server instances, compiled in name order
    #[serde(default)]
    pub instances: BTreeMap<String, InstanceConfig>,
}

impl Manifest {
    /// Load a manifest from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read manifest: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid manifest: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid TOML format in ds389 manifest")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleConfig {
    /// Server package; the platform profile decides when unset
    pub package_name: Option<String>,
    pub user: Option<String>,
    pub group: Option<String>,
    /// Directory where CA and server certificates are published
    pub cacerts_path: Option<String>,
    pub home_dir: Option<String>,
    /// Open file limit for the server processes
    pub nofile_limit: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FactsConfig {
    pub fqdn: Option<String>,
    /// Platform profile id, e.g. `debian-8` or `redhat-7`
    pub platform: Option<String>,
}

// ============================================================================
// Instance
// ============================================================================

/// One directory server instance.
///
/// Required: `root_dn`, `root_dn_pass`, `suffix`, `cert_db_pass`. They are
/// optional here so a missing value is reported with the instance name
/// instead of as a TOML error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstanceConfig {
    pub root_dn: Option<String>,
    pub root_dn_pass: Option<String>,
    pub suffix: Option<String>,
    pub cert_db_pass: Option<String>,

    /// Defaults to the instance name
    pub server_id: Option<String>,
    /// Defaults to the host's fqdn
    pub server_host: Option<String>,
    pub server_port: Option<u32>,
    pub server_ssl_port: Option<u32>,
    pub user: Option<String>,
    pub group: Option<String>,
    pub minssf: Option<u32>,
    /// Empty string leaves `sslVersionMin` unmanaged
    pub ssl_version_min: Option<String>,
    #[serde(default)]
    pub subject_alt_names: Vec<String>,
    pub service_ensure: Option<ServiceEnsure>,
    pub service_enable: Option<bool>,

    /// External certificate bundle; self-signed certificates when unset
    pub ssl: Option<SslConfig>,
    pub replication: Option<ReplicationConfig>,

    /// LDIF name -> local source path
    #[serde(default)]
    pub modify_ldifs: BTreeMap<String, String>,
    #[serde(default)]
    pub add_ldifs: BTreeMap<String, String>,
    #[serde(default)]
    pub base_load_ldifs: BTreeMap<String, String>,
    #[serde(default)]
    pub schema_ldifs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SslConfig {
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
    pub ca_bundle_path: Option<String>,
    /// Nicknames of the CA certificates contained in the bundle, in order
    #[serde(default)]
    pub ca_cert_names: Vec<String>,
    /// Nickname of the server certificate
    pub cert_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicationRole {
    Consumer,
    Hub,
    Supplier,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplicationConfig {
    pub role: Option<ReplicationRole>,
    pub replication_pass: Option<String>,
    pub bind_dn: Option<String>,
    /// Replica id, required for suppliers
    pub id: Option<u32>,
    pub purge_delay: Option<u64>,
    /// `ldap` or `ldaps`
    pub protocol: Option<String>,
    /// Defaults to true when the instance sets a non-zero `minssf`
    pub starttls: Option<bool>,
    pub replica_port: Option<u32>,
    /// `LDAP`, `SSL` or `TLS`
    pub replica_transport: Option<String>,
    #[serde(default)]
    pub suppliers: Vec<String>,
    #[serde(default)]
    pub hubs: Vec<String>,
    #[serde(default)]
    pub consumers: Vec<String>,
    #[serde(default)]
    pub init_suppliers: bool,
    #[serde(default)]
    pub init_hubs: bool,
    #[serde(default)]
    pub init_consumers: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_example_manifest() {
        let toml = r#"
[module]
user = "custom_user"
nofile_limit = 16384

[facts]
fqdn = "foo.example.com"
platform = "debian-8"

[instances.foo]
root_dn = "cn=Directory Manager"
root_dn_pass = "supersecret"
suffix = "dc=example,dc=com"
cert_db_pass = "secret"
service_ensure = "stopped"

[instances.foo.ssl]
cert_path = "/tmp/external.pem"
key_path = "/tmp/external-key.pem"
ca_bundle_path = "/tmp/external-ca.pem"
ca_cert_names = ["Acme Root CA"]
cert_name = "foo.example.com"

[instances.foo.replication]
role = "supplier"
replication_pass = "supersecret"
id = 1
consumers = ["consumer1"]

[instances.foo.modify_ldifs]
acl = "/srv/ldif/acl.ldif"
"#;
        let manifest = Manifest::parse(toml).unwrap();
        assert_eq!(manifest.module.user.as_deref(), Some("custom_user"));
        assert_eq!(manifest.module.nofile_limit, Some(16384));
        assert_eq!(manifest.facts.platform.as_deref(), Some("debian-8"));

        let foo = &manifest.instances["foo"];
        assert_eq!(foo.service_ensure, Some(ServiceEnsure::Stopped));
        assert_eq!(foo.ssl.as_ref().unwrap().ca_cert_names.len(), 1);
        let replication = foo.replication.as_ref().unwrap();
        assert_eq!(replication.role, Some(ReplicationRole::Supplier));
        assert_eq!(replication.consumers, vec!["consumer1"]);
        assert_eq!(foo.modify_ldifs["acl"], "/srv/ldif/acl.ldif");
    }

    #[test]
    fn test_empty_manifest() {
        let manifest = Manifest::parse("").unwrap();
        assert!(manifest.instances.is_empty());
        assert!(manifest.module.package_name.is_none());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = Manifest::parse("[instances.foo]\nroot_pass = \"x\"\n").unwrap_err();
        assert!(format!("{err:#}").contains("root_pass"));
    }

    #[test]
    fn test_instances_sorted_by_name() {
        let manifest = Manifest::parse("[instances.zeta]\n[instances.alpha]\n").unwrap();
        let names: Vec<_> = manifest.instances.keys().collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
