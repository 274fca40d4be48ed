//! Turn on LDAPS once the server certificate is trusted

use super::certs::CertRefs;
use super::instance::InstanceRefs;
use super::{BIN_PATH, InstanceParams, templates};
use crate::platform::Platform;
use declarative::{
    CatalogBuilder, ExecAttrs, FileAttrs, Resource, ResourceRef, Result, shell_quote,
};

const RESTART_PATH: &str = "/usr/bin:/usr/sbin:/bin:/sbin";

/// Declares the SSL LDIF and its import; returns the restart exec
pub(super) fn declare(
    builder: &mut CatalogBuilder,
    instance: &InstanceParams,
    platform: &Platform,
    refs: &InstanceRefs,
    certs: &CertRefs,
) -> Result<ResourceRef> {
    let id = &instance.server_id;
    let ldif_path = instance.path("ssl.ldif");
    let done = instance.path("ssl.done");

    let ldif = builder.declare(Resource::file(
        &ldif_path,
        FileAttrs::file()
            .content(templates::ssl_ldif(
                instance,
                &certs.cert_name,
                platform.supports_ssl_version_min,
            ))
            .mode("0440")
            .owner(&instance.user)
            .group(&instance.group),
    ))?;
    builder
        .require(&ldif, &certs.server_trust)
        .require(&ldif, &refs.token_restart);

    let import = builder.declare(Resource::exec(
        instance.title("Import ssl ldif"),
        ExecAttrs::new(format!(
            "ldapmodify -h {} -p {} -x -D \"{}\" -w {} -f {ldif_path} ; touch {done}",
            instance.server_host,
            instance.server_port,
            instance.root_dn,
            shell_quote(&instance.root_dn_pass)
        ))
        .path(BIN_PATH)
        .creates(&done),
    ))?;

    let command = if platform.is_systemd() {
        format!("systemctl restart dirsrv@{id} ; sleep 2")
    } else {
        format!("service dirsrv restart {id} ; sleep 2")
    };
    let restart = builder.declare(Resource::exec(
        format!("Restart {id} to enable SSL"),
        ExecAttrs::new(command).path(RESTART_PATH).refreshonly(),
    ))?;
    builder.require(&import, &ldif).notify(&import, &restart);

    Ok(restart)
}

#[cfg(test)]
mod tests {
    use super::super::tests::{FOO, compile_on, exec, file, r};
    use declarative::{Guard, ResourceKind};

    #[test]
    fn test_import_and_restart() {
        let catalog = compile_on(FOO, "debian-8");
        let import = exec(&catalog, "Import ssl ldif: foo");
        assert_eq!(
            import.command,
            "ldapmodify -h foo.example.com -p 389 -x -D \"cn=Directory Manager\" -w supersecret \
             -f /etc/dirsrv/slapd-foo/ssl.ldif ; touch /etc/dirsrv/slapd-foo/ssl.done"
        );
        assert_eq!(
            import.guard(),
            Some(Guard::Creates("/etc/dirsrv/slapd-foo/ssl.done".to_string()))
        );

        let restart = exec(&catalog, "Restart foo to enable SSL");
        assert_eq!(restart.command, "systemctl restart dirsrv@foo ; sleep 2");
        assert_eq!(restart.path.as_deref(), Some("/usr/bin:/usr/sbin:/bin:/sbin"));
        assert!(restart.refreshonly);

        let ldif = r(ResourceKind::File, "/etc/dirsrv/slapd-foo/ssl.ldif");
        assert!(catalog.precedes(&r(ResourceKind::Exec, "Add trust for server cert: foo"), &ldif));
        assert!(catalog.precedes(
            &r(ResourceKind::Exec, "restart foo to pick up new token"),
            &ldif
        ));
    }

    #[test]
    fn test_ssl_ldif_per_platform() {
        let catalog = compile_on(FOO, "redhat-7");
        let ldif = file(&catalog, "/etc/dirsrv/slapd-foo/ssl.ldif");
        assert!(ldif.content.as_deref().unwrap().contains("sslVersionMin: TLS1.1\n"));
        assert_eq!(ldif.mode.as_deref(), Some("0440"));

        let catalog = compile_on(&format!("{FOO}minssf = 128\n"), "redhat-6");
        let content = file(&catalog, "/etc/dirsrv/slapd-foo/ssl.ldif")
            .content
            .clone()
            .unwrap();
        assert!(!content.contains("sslVersionMin"));
        assert!(content.contains("nsslapd-minssf: 128\n"));
        assert_eq!(
            exec(&catalog, "Restart foo to enable SSL").command,
            "service dirsrv restart foo ; sleep 2"
        );
    }
}
