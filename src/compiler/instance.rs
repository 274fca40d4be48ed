//! One directory server instance: setup, NSS token, certificates, SSL,
//! service, LDIF loading and replication

use super::{BaseRefs, InstanceParams, SBIN_PATH, certs, ldif, replication, service, ssl, templates};
use crate::platform::Platform;
use declarative::{
    CatalogBuilder, ExecAttrs, FileAttrs, Resource, ResourceRef, Result, shell_quote,
};

/// Exec resources later stages of an instance order against
#[derive(Debug, Clone)]
pub(super) struct InstanceRefs {
    pub setup: ResourceRef,
    pub token_stop: ResourceRef,
    pub token_restart: ResourceRef,
}

pub(super) fn declare(
    builder: &mut CatalogBuilder,
    instance: &InstanceParams,
    base: &BaseRefs,
    platform: &Platform,
) -> Result<()> {
    let refs = declare_setup(builder, instance, base, platform)?;

    let certs = certs::declare(builder, instance, base, platform, &refs)?;
    let ssl_restart = ssl::declare(builder, instance, platform, &refs, &certs)?;
    let service = service::declare(builder, instance, platform, &ssl_restart)?;
    ldif::declare(builder, instance, &refs, &service)?;
    if let Some(replication) = &instance.replication {
        replication::declare(builder, instance, replication, &ssl_restart, &service)?;
    }
    Ok(())
}

/// Token control commands for the platform's init system
fn service_command(platform: &Platform, action: &str, server_id: &str) -> String {
    if platform.is_systemd() {
        format!("/bin/systemctl {action} dirsrv@{server_id} ; sleep 2")
    } else {
        format!("service dirsrv {action} {server_id} ; sleep 2")
    }
}

fn declare_setup(
    builder: &mut CatalogBuilder,
    instance: &InstanceParams,
    base: &BaseRefs,
    platform: &Platform,
) -> Result<InstanceRefs> {
    let id = &instance.server_id;
    let command = format!(
        "{} --silent General.FullMachineName={} General.SuiteSpotGroup={} \
         General.SuiteSpotUserID={} slapd.InstallLdifFile=none slapd.RootDN=\"{}\" \
         slapd.RootDNPwd={} slapd.ServerIdentifier={id} slapd.ServerPort={} slapd.Suffix={}",
        platform.setup_command,
        instance.server_host,
        instance.group,
        instance.user,
        instance.root_dn,
        shell_quote(&instance.root_dn_pass),
        instance.server_port,
        instance.suffix
    );
    let setup = builder.declare(Resource::exec(
        instance.title("setup ds"),
        ExecAttrs::new(command).path(SBIN_PATH).creates(instance.dir()),
    ))?;
    for package in &base.packages {
        builder.require(&setup, package);
    }
    builder.require(&setup, &base.user);

    let token_stop = builder.declare(Resource::exec(
        format!("stop {id} to create new token"),
        ExecAttrs::new(service_command(platform, "stop", id))
            .path(SBIN_PATH)
            .refreshonly(),
    ))?;
    let token_restart = builder.declare(Resource::exec(
        format!("restart {id} to pick up new token"),
        ExecAttrs::new(service_command(platform, "restart", id))
            .path(SBIN_PATH)
            .refreshonly(),
    ))?;
    builder.notify(&setup, &token_stop);

    let pin = builder.declare(Resource::file(
        instance.path("pin.txt"),
        FileAttrs::file()
            .content(templates::pin(instance))
            .mode("0440")
            .owner(&instance.user)
            .group(&instance.group),
    ))?;
    builder
        .require(&pin, &setup)
        .require(&pin, &token_stop)
        .notify(&pin, &token_restart);

    Ok(InstanceRefs {
        setup,
        token_stop,
        token_restart,
    })
}

#[cfg(test)]
mod tests {
    use super::super::tests::{FOO, compile_on, exec, file, r};
    use declarative::{Guard, ResourceKind};

    #[test]
    fn test_setup_quotes_root_password() {
        let catalog = compile_on(&FOO.replace("supersecret", "pa ss;word"), "debian-8");
        let setup = exec(&catalog, "setup ds: foo");
        assert!(
            setup
                .command
                .contains(" slapd.RootDNPwd='pa ss;word' slapd.ServerIdentifier=foo ")
        );
    }

    #[test]
    fn test_setup_exec_is_gated_by_instance_dir() {
        let catalog = compile_on(FOO, "debian-8");
        let setup = exec(&catalog, "setup ds: foo");
        assert_eq!(
            setup.command,
            "setup-ds --silent General.FullMachineName=foo.example.com \
             General.SuiteSpotGroup=dirsrv General.SuiteSpotUserID=dirsrv \
             slapd.InstallLdifFile=none slapd.RootDN=\"cn=Directory Manager\" \
             slapd.RootDNPwd=supersecret slapd.ServerIdentifier=foo slapd.ServerPort=389 \
             slapd.Suffix=dc=example,dc=com"
        );
        assert_eq!(setup.path.as_deref(), Some("/usr/sbin:/usr/bin:/sbin:/bin"));
        assert_eq!(
            setup.guard(),
            Some(Guard::Creates("/etc/dirsrv/slapd-foo".to_string()))
        );

        let setup_ref = r(ResourceKind::Exec, "setup ds: foo");
        for required in [
            r(ResourceKind::Package, "389-ds-base"),
            r(ResourceKind::Package, "libnss3-tools"),
            r(ResourceKind::User, "dirsrv"),
        ] {
            assert!(catalog.precedes(&required, &setup_ref), "{required}");
        }
    }

    #[test]
    fn test_setup_uses_platform_tool_and_overrides() {
        let toml = format!("{FOO}server_id = \"ldap1\"\nserver_port = 1389\n");
        let catalog = compile_on(&toml, "redhat-6");
        let setup = exec(&catalog, "setup ds: ldap1");
        assert!(setup.command.starts_with("setup-ds.pl --silent "));
        assert!(setup.command.contains("slapd.ServerIdentifier=ldap1 slapd.ServerPort=1389"));
        assert_eq!(
            setup.guard(),
            Some(Guard::Creates("/etc/dirsrv/slapd-ldap1".to_string()))
        );
    }

    #[test]
    fn test_token_execs_per_init_system() {
        let catalog = compile_on(FOO, "debian-8");
        assert_eq!(
            exec(&catalog, "stop foo to create new token").command,
            "/bin/systemctl stop dirsrv@foo ; sleep 2"
        );
        assert_eq!(
            exec(&catalog, "restart foo to pick up new token").command,
            "/bin/systemctl restart dirsrv@foo ; sleep 2"
        );

        let catalog = compile_on(FOO, "redhat-6");
        let stop = exec(&catalog, "stop foo to create new token");
        assert_eq!(stop.command, "service dirsrv stop foo ; sleep 2");
        assert!(stop.refreshonly);
    }

    #[test]
    fn test_pin_file() {
        let catalog = compile_on(FOO, "debian-8");
        let pin = file(&catalog, "/etc/dirsrv/slapd-foo/pin.txt");
        assert_eq!(
            pin.content.as_deref(),
            Some("Internal (Software) Token:supersecret\n")
        );
        assert_eq!(pin.mode.as_deref(), Some("0440"));
        assert_eq!(pin.owner.as_deref(), Some("dirsrv"));

        let pin_ref = r(ResourceKind::File, "/etc/dirsrv/slapd-foo/pin.txt");
        assert!(catalog.precedes(&r(ResourceKind::Exec, "setup ds: foo"), &pin_ref));
        assert!(catalog.precedes(
            &pin_ref,
            &r(ResourceKind::Exec, "restart foo to pick up new token")
        ));
    }
}
