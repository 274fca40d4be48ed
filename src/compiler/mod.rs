//! The ds389 module compiler
//!
//! Expands a [`Manifest`] into a [`Catalog`]: the module's base resources
//! once, then one subtree per named instance. Every parameter is resolved up
//! front through [`Scope`] so resource builders only see concrete values.

mod base;
mod certs;
mod instance;
mod ldif;
mod replication;
mod service;
mod ssl;
mod templates;

use crate::platform::{Facts, Platform};
use crate::schema::{InstanceConfig, Manifest, ModuleConfig, ReplicationConfig, ReplicationRole};
use declarative::{Catalog, CatalogBuilder, Result, Scope, ServiceEnsure};
use std::collections::BTreeMap;

pub use base::BaseRefs;

const DEFAULT_USER: &str = "dirsrv";
const DEFAULT_CACERTS: &str = "/etc/openldap/cacerts";
const DEFAULT_HOME: &str = "/usr/share/dirsrv";
const DEFAULT_NOFILE: u32 = 8192;
const DEFAULT_REPLICATION_BIND_DN: &str = "cn=Replication Manager,cn=config";
const DEFAULT_PURGE_DELAY: u64 = 604_800;

/// Search path used by most generated execs
pub(crate) const SBIN_PATH: &str = "/usr/sbin:/usr/bin:/sbin:/bin";
/// Search path for the certificate and LDAP client tools
pub(crate) const BIN_PATH: &str = "/usr/bin:/bin";

/// Compile a manifest for one platform
pub fn compile(manifest: &Manifest, platform: &Platform, facts: &Facts) -> Result<Catalog> {
    let module = ModuleParams::resolve(&manifest.module, platform)?;
    let mut builder = CatalogBuilder::new();

    let base = base::declare(&mut builder, &module, platform)?;
    for (name, config) in &manifest.instances {
        let instance = InstanceParams::resolve(name, config, &module, facts)?;
        log::debug!("compiling instance {name} (server id {})", instance.server_id);
        instance::declare(&mut builder, &instance, &base, platform)?;
    }

    let catalog = builder.build()?;
    log::info!(
        "compiled {} resources for {} instance(s) on {}",
        catalog.len(),
        manifest.instances.len(),
        platform.id
    );
    Ok(catalog)
}

// ============================================================================
// Resolved parameters
// ============================================================================

#[derive(Debug, Clone)]
pub(crate) struct ModuleParams {
    pub package_name: String,
    pub user: String,
    pub group: String,
    pub cacerts_path: String,
    pub home_dir: String,
    pub nofile_limit: u32,
}

impl ModuleParams {
    fn resolve(config: &ModuleConfig, platform: &Platform) -> Result<Self> {
        let scope = Scope::new("module");
        let text = |parameter: &str, own: Option<&String>, default: &str| {
            scope.resolve(parameter, own, None, Some(default.to_string()))
        };
        Ok(Self {
            package_name: text(
                "package_name",
                config.package_name.as_ref(),
                platform.package_name,
            )?,
            user: text("user", config.user.as_ref(), DEFAULT_USER)?,
            group: text("group", config.group.as_ref(), DEFAULT_USER)?,
            cacerts_path: text("cacerts_path", config.cacerts_path.as_ref(), DEFAULT_CACERTS)?,
            home_dir: text("home_dir", config.home_dir.as_ref(), DEFAULT_HOME)?,
            nofile_limit: scope.resolve(
                "nofile_limit",
                config.nofile_limit.as_ref(),
                None,
                Some(DEFAULT_NOFILE),
            )?,
        })
    }
}

/// Externally issued certificate material
#[derive(Debug, Clone)]
pub(crate) struct ExternalSsl {
    pub cert_path: String,
    pub key_path: String,
    pub ca_bundle_path: String,
    pub ca_cert_names: Vec<String>,
    pub cert_name: String,
}

#[derive(Debug, Clone)]
pub(crate) struct ReplicationParams {
    pub role: ReplicationRole,
    pub replication_pass: String,
    pub bind_dn: String,
    pub id: Option<u32>,
    pub purge_delay: u64,
    pub protocol: String,
    pub starttls: bool,
    pub replica_port: u32,
    pub replica_transport: String,
    pub suppliers: Vec<String>,
    pub hubs: Vec<String>,
    pub consumers: Vec<String>,
    pub init_suppliers: bool,
    pub init_hubs: bool,
    pub init_consumers: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct InstanceParams {
    /// Manifest key; names the LDIF barriers
    pub name: String,
    pub server_id: String,
    pub server_host: String,
    pub server_port: u32,
    pub server_ssl_port: u32,
    pub root_dn: String,
    pub root_dn_pass: String,
    pub suffix: String,
    pub cert_db_pass: String,
    pub user: String,
    pub group: String,
    pub minssf: u32,
    pub ssl_version_min: String,
    pub subject_alt_names: Vec<String>,
    pub service_ensure: ServiceEnsure,
    pub service_enable: bool,
    pub cacerts_path: String,
    pub ssl: Option<ExternalSsl>,
    pub replication: Option<ReplicationParams>,
    pub modify_ldifs: BTreeMap<String, String>,
    pub add_ldifs: BTreeMap<String, String>,
    pub base_load_ldifs: BTreeMap<String, String>,
    pub schema_ldifs: BTreeMap<String, String>,
}

fn check_port(scope: &Scope, parameter: &str, port: u32) -> Result<()> {
    scope.check(
        parameter,
        (1..=65535).contains(&port),
        format!("port {port} must be between 1 and 65535"),
    )
}

impl InstanceParams {
    fn resolve(
        name: &str,
        config: &InstanceConfig,
        module: &ModuleParams,
        facts: &Facts,
    ) -> Result<Self> {
        let scope = Scope::new(format!("instance {name}"));

        let server_port =
            scope.resolve("server_port", config.server_port.as_ref(), None, Some(389))?;
        check_port(&scope, "server_port", server_port)?;
        let server_ssl_port =
            scope.resolve("server_ssl_port", config.server_ssl_port.as_ref(), None, Some(636))?;
        check_port(&scope, "server_ssl_port", server_ssl_port)?;

        let server_id = scope.resolve(
            "server_id",
            config.server_id.as_ref(),
            None,
            Some(name.to_string()),
        )?;
        scope.check(
            "server_id",
            !server_id.is_empty() && !server_id.contains(['/', ' ']),
            "must be non-empty without spaces or slashes",
        )?;
        let minssf = scope.resolve("minssf", config.minssf.as_ref(), None, Some(0))?;

        let ssl = config
            .ssl
            .as_ref()
            .map(|ssl| {
                let scope = scope.child("ssl");
                Ok::<_, declarative::Error>(ExternalSsl {
                    cert_path: scope.require("cert_path", ssl.cert_path.as_ref())?,
                    key_path: scope.require("key_path", ssl.key_path.as_ref())?,
                    ca_bundle_path: scope.require("ca_bundle_path", ssl.ca_bundle_path.as_ref())?,
                    ca_cert_names: ssl.ca_cert_names.clone(),
                    cert_name: scope.require("cert_name", ssl.cert_name.as_ref())?,
                })
            })
            .transpose()?;

        let replication = config
            .replication
            .as_ref()
            .map(|replication| {
                ReplicationParams::resolve(&scope.child("replication"), replication, minssf)
            })
            .transpose()?;

        Ok(Self {
            name: name.to_string(),
            server_host: scope.resolve(
                "server_host",
                config.server_host.as_ref(),
                None,
                Some(facts.fqdn.clone()),
            )?,
            server_port,
            server_ssl_port,
            root_dn: scope.require("root_dn", config.root_dn.as_ref())?,
            root_dn_pass: scope.require("root_dn_pass", config.root_dn_pass.as_ref())?,
            suffix: scope.require("suffix", config.suffix.as_ref())?,
            cert_db_pass: scope.require("cert_db_pass", config.cert_db_pass.as_ref())?,
            user: scope.resolve("user", config.user.as_ref(), Some(&module.user), None)?,
            group: scope.resolve("group", config.group.as_ref(), Some(&module.group), None)?,
            minssf,
            ssl_version_min: scope.resolve(
                "ssl_version_min",
                config.ssl_version_min.as_ref(),
                None,
                Some("TLS1.1".to_string()),
            )?,
            subject_alt_names: config.subject_alt_names.clone(),
            service_ensure: scope.resolve(
                "service_ensure",
                config.service_ensure.as_ref(),
                None,
                Some(ServiceEnsure::Running),
            )?,
            service_enable: scope.resolve(
                "service_enable",
                config.service_enable.as_ref(),
                None,
                Some(true),
            )?,
            cacerts_path: module.cacerts_path.clone(),
            server_id,
            ssl,
            replication,
            modify_ldifs: config.modify_ldifs.clone(),
            add_ldifs: config.add_ldifs.clone(),
            base_load_ldifs: config.base_load_ldifs.clone(),
            schema_ldifs: config.schema_ldifs.clone(),
        })
    }

    /// Instance configuration directory
    pub fn dir(&self) -> String {
        format!("/etc/dirsrv/slapd-{}", self.server_id)
    }

    /// Path of a file inside the instance directory
    pub fn path(&self, file: &str) -> String {
        format!("{}/{file}", self.dir())
    }

    /// Exec title for this instance, `"<action>: <server_id>"`
    pub fn title(&self, action: &str) -> String {
        format!("{action}: {}", self.server_id)
    }

    /// StartTLS flag for the LDAP client tools
    pub fn starttls_flag(&self) -> &'static str {
        if self.minssf > 0 { "Z" } else { "" }
    }
}

impl ReplicationParams {
    fn resolve(scope: &Scope, config: &ReplicationConfig, minssf: u32) -> Result<Self> {
        let role = scope.require("role", config.role.as_ref())?;
        let protocol = scope.resolve(
            "protocol",
            config.protocol.as_ref(),
            None,
            Some("ldap".to_string()),
        )?;
        scope.check(
            "protocol",
            matches!(protocol.as_str(), "ldap" | "ldaps"),
            format!("`{protocol}` is not one of ldap, ldaps"),
        )?;
        let replica_transport = scope.resolve(
            "replica_transport",
            config.replica_transport.as_ref(),
            None,
            Some("LDAP".to_string()),
        )?;
        scope.check(
            "replica_transport",
            matches!(replica_transport.as_str(), "LDAP" | "SSL" | "TLS"),
            format!("`{replica_transport}` is not one of LDAP, SSL, TLS"),
        )?;
        let replica_port =
            scope.resolve("replica_port", config.replica_port.as_ref(), None, Some(389))?;
        check_port(scope, "replica_port", replica_port)?;

        let id = if role == ReplicationRole::Supplier {
            let id = scope.require("id", config.id.as_ref())?;
            scope.check(
                "id",
                (1..=65534).contains(&id),
                format!("replica id {id} must be between 1 and 65534"),
            )?;
            Some(id)
        } else {
            config.id
        };

        Ok(Self {
            role,
            replication_pass: scope.require("replication_pass", config.replication_pass.as_ref())?,
            bind_dn: scope.resolve(
                "bind_dn",
                config.bind_dn.as_ref(),
                None,
                Some(DEFAULT_REPLICATION_BIND_DN.to_string()),
            )?,
            id,
            purge_delay: scope.resolve(
                "purge_delay",
                config.purge_delay.as_ref(),
                None,
                Some(DEFAULT_PURGE_DELAY),
            )?,
            protocol,
            starttls: scope.resolve("starttls", config.starttls.as_ref(), None, Some(minssf > 0))?,
            replica_port,
            replica_transport,
            suppliers: config.suppliers.clone(),
            hubs: config.hubs.clone(),
            consumers: config.consumers.clone(),
            init_suppliers: config.init_suppliers,
            init_hubs: config.init_hubs,
            init_consumers: config.init_consumers,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use declarative::{Attributes, Error, Resource, ResourceKind, ResourceRef};

    pub(crate) const FOO: &str = r#"
[instances.foo]
root_dn = "cn=Directory Manager"
root_dn_pass = "supersecret"
suffix = "dc=example,dc=com"
cert_db_pass = "secret"
"#;

    pub(crate) fn facts() -> Facts {
        Facts {
            fqdn: "foo.example.com".to_string(),
        }
    }

    pub(crate) fn compile_on(toml: &str, platform: &str) -> Catalog {
        let manifest = Manifest::parse(toml).unwrap();
        compile(&manifest, &Platform::lookup(platform).unwrap(), &facts()).unwrap()
    }

    pub(crate) fn compile_err(toml: &str) -> Error {
        let manifest = Manifest::parse(toml).unwrap();
        compile(&manifest, &Platform::lookup("debian-8").unwrap(), &facts()).unwrap_err()
    }

    pub(crate) fn exec<'a>(catalog: &'a Catalog, title: &str) -> &'a declarative::ExecAttrs {
        match catalog.get(&ResourceRef::new(ResourceKind::Exec, title)) {
            Some(Resource {
                attributes: Attributes::Exec(attrs),
                ..
            }) => attrs,
            _ => panic!("Exec[{title}] not in catalog"),
        }
    }

    pub(crate) fn file<'a>(catalog: &'a Catalog, path: &str) -> &'a declarative::FileAttrs {
        match catalog.get(&ResourceRef::new(ResourceKind::File, path)) {
            Some(Resource {
                attributes: Attributes::File(attrs),
                ..
            }) => attrs,
            _ => panic!("File[{path}] not in catalog"),
        }
    }

    pub(crate) fn r(kind: ResourceKind, title: &str) -> ResourceRef {
        ResourceRef::new(kind, title)
    }

    #[test]
    fn test_missing_required_parameter_names_scope() {
        let err = compile_err("[instances.foo]\nroot_dn = \"cn=Directory Manager\"\n");
        assert_eq!(
            err.to_string(),
            "missing required parameter `root_dn_pass` for instance foo"
        );

        let toml = format!("{FOO}[instances.foo.replication]\nrole = \"hub\"\n");
        assert_eq!(
            compile_err(&toml).to_string(),
            "missing required parameter `replication_pass` for instance foo, replication"
        );

        let toml = format!("{FOO}[instances.foo.ssl]\ncert_path = \"/tmp/c.pem\"\n");
        assert_eq!(
            compile_err(&toml).to_string(),
            "missing required parameter `key_path` for instance foo, ssl"
        );
    }

    #[test]
    fn test_supplier_needs_replica_id() {
        let toml = format!(
            "{FOO}[instances.foo.replication]\nrole = \"supplier\"\nreplication_pass = \"x\"\n"
        );
        assert!(matches!(
            compile_err(&toml),
            Error::MissingParameter { parameter, .. } if parameter == "id"
        ));

        let toml = format!(
            "{FOO}[instances.foo.replication]\nrole = \"supplier\"\nreplication_pass = \"x\"\nid = 70000\n"
        );
        assert!(matches!(compile_err(&toml), Error::InvalidParameter { .. }));
    }

    #[test]
    fn test_invalid_port_and_protocol() {
        let toml = format!("{FOO}server_port = 70000\n");
        let err = compile_err(&toml);
        assert!(matches!(
            &err,
            Error::InvalidParameter { parameter, .. } if parameter == "server_port"
        ));

        let toml = format!(
            "{FOO}[instances.foo.replication]\nrole = \"consumer\"\nreplication_pass = \"x\"\nprotocol = \"http\"\n"
        );
        assert!(matches!(
            compile_err(&toml),
            Error::InvalidParameter { parameter, .. } if parameter == "protocol"
        ));
    }

    #[test]
    fn test_defaults_cascade() {
        let manifest = Manifest::parse(&format!(
            "[module]\nuser = \"module_user\"\n{FOO}group = \"custom_group\"\n"
        ))
        .unwrap();
        let platform = Platform::lookup("debian-8").unwrap();
        let module = ModuleParams::resolve(&manifest.module, &platform).unwrap();
        let foo =
            InstanceParams::resolve("foo", &manifest.instances["foo"], &module, &facts()).unwrap();

        assert_eq!(foo.server_id, "foo");
        assert_eq!(foo.server_host, "foo.example.com");
        assert_eq!(foo.server_port, 389);
        assert_eq!(foo.server_ssl_port, 636);
        assert_eq!(foo.user, "module_user");
        assert_eq!(foo.group, "custom_group");
        assert_eq!(foo.ssl_version_min, "TLS1.1");
        assert_eq!(foo.service_ensure, ServiceEnsure::Running);
        assert!(foo.service_enable);
        assert_eq!(module.package_name, "389-ds-base");
        assert_eq!(module.nofile_limit, 8192);
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let toml = format!(
            "{FOO}[instances.foo.add_ldifs]\nb = \"/srv/b.ldif\"\na = \"/srv/a.ldif\"\n\
             [instances.bar]\nroot_dn = \"cn=dm\"\nroot_dn_pass = \"p\"\nsuffix = \"dc=bar\"\ncert_db_pass = \"c\"\n"
        );
        let first = compile_on(&toml, "redhat-7");
        let second = compile_on(&toml, "redhat-7");
        let titles = |c: &Catalog| c.ordered().map(ToString::to_string).collect::<Vec<_>>();
        assert_eq!(titles(&first), titles(&second));
        assert_eq!(first.resources(), second.resources());
    }

    #[test]
    fn test_two_instances_share_base_resources() {
        let toml = format!(
            "{FOO}[instances.bar]\nroot_dn = \"cn=dm\"\nroot_dn_pass = \"p\"\nsuffix = \"dc=bar\"\ncert_db_pass = \"c\"\n"
        );
        let catalog = compile_on(&toml, "debian-8");
        assert!(catalog.contains(&r(ResourceKind::Package, "389-ds-base")));
        assert!(catalog.contains(&r(ResourceKind::Exec, "setup ds: foo")));
        assert!(catalog.contains(&r(ResourceKind::Exec, "setup ds: bar")));
        assert!(catalog.contains(&r(ResourceKind::Service, "dirsrv@bar")));
    }
}
