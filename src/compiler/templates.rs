//! Text rendered into instance files: the token pin, LDIF change records and
//! the SysV wrapper script.

use super::{InstanceParams, ReplicationParams};
use crate::schema::ReplicationRole;
use std::fmt::Write;

/// NSS token pin file
pub fn pin(instance: &InstanceParams) -> String {
    format!("Internal (Software) Token:{}\n", instance.root_dn_pass)
}

/// Enables LDAPS on `cn=config` with the given server certificate nickname
pub fn ssl_ldif(instance: &InstanceParams, cert_name: &str, with_version_min: bool) -> String {
    let mut out = String::from("dn: cn=encryption,cn=config\nchangetype: modify\n");
    if with_version_min && !instance.ssl_version_min.is_empty() {
        let _ = write!(
            out,
            "replace: sslVersionMin\nsslVersionMin: {}\n-\n",
            instance.ssl_version_min
        );
    }
    out.push_str(
        "replace: nsSSLClientAuth\nnsSSLClientAuth: off\n-\n\
         replace: nsSSL3\nnsSSL3: off\n-\n\
         replace: nsSSL2\nnsSSL2: off\n\n",
    );
    let _ = write!(
        out,
        "dn: cn=RSA,cn=encryption,cn=config\n\
         changetype: add\n\
         objectclass: top\n\
         objectclass: nsEncryptionModule\n\
         nsSSLPersonalitySSL: {cert_name}\n\
         nsSSLActivation: on\n\
         nsSSLToken: internal (software)\n\
         cn: RSA\n\n"
    );
    let _ = write!(
        out,
        "dn: cn=config\n\
         changetype: modify\n\
         replace: nsslapd-security\n\
         nsslapd-security: on\n\
         -\n\
         replace: nsslapd-minssf\n\
         nsslapd-minssf: {}\n\
         -\n\
         replace: nsslapd-secureport\n\
         nsslapd-securePort: {}\n",
        instance.minssf, instance.server_ssl_port
    );
    out
}

/// Value of the first RDN of a DN, e.g. `Replication Manager`
fn rdn_value(dn: &str) -> &str {
    dn.split(',')
        .next()
        .and_then(|rdn| rdn.split_once('='))
        .map_or(dn, |(_, value)| value.trim())
}

/// Replication manager entry, changelog and replica configuration
pub fn replication_ldif(instance: &InstanceParams, replication: &ReplicationParams) -> String {
    let bind_dn = &replication.bind_dn;
    let mut out = format!(
        "dn: {bind_dn}\n\
         changetype: add\n\
         objectClass: inetorgperson\n\
         objectClass: person\n\
         objectClass: top\n\
         cn: {}\n\
         givenName: Replication\n\
         sn: Manager\n\
         userPassword: {}\n\
         passwordExpirationTime: 20380119031407Z\n\
         nsIdleTimeout: 0\n\n",
        rdn_value(bind_dn),
        replication.replication_pass
    );

    if replication.role != ReplicationRole::Consumer {
        let _ = write!(
            out,
            "dn: cn=changelog5,cn=config\n\
             changetype: add\n\
             objectClass: top\n\
             objectClass: extensibleObject\n\
             cn: changelog5\n\
             nsslapd-changelogdir: /var/lib/dirsrv/slapd-{}/changelogdb\n\n",
            instance.server_id
        );
    }

    let (replica_type, flags) = match replication.role {
        ReplicationRole::Supplier => (3, 1),
        ReplicationRole::Hub => (2, 1),
        ReplicationRole::Consumer => (2, 0),
    };
    let suffix = &instance.suffix;
    let _ = write!(
        out,
        "dn: cn=replica,cn=\"{suffix}\",cn=mapping tree,cn=config\n\
         changetype: add\n\
         objectClass: top\n\
         objectClass: nsDS5replica\n\
         objectClass: extensibleObject\n\
         cn: replica\n\
         nsDS5ReplicaRoot: {suffix}\n\
         nsDS5ReplicaType: {replica_type}\n\
         nsDS5Flags: {flags}\n\
         nsDS5ReplicaBindDN: {bind_dn}\n"
    );
    if replication.role != ReplicationRole::Consumer {
        let _ = writeln!(out, "nsDS5ReplicaPurgeDelay: {}", replication.purge_delay);
    }
    if let Some(id) = replication.id.filter(|_| replication.role == ReplicationRole::Supplier) {
        let _ = writeln!(out, "nsDS5ReplicaId: {id}");
    }
    out
}

fn agreement_dn(instance: &InstanceParams, peer: &str) -> String {
    format!(
        "cn={} to {peer} agreement,cn=replica,cn=\"{}\",cn=mapping tree,cn=config",
        instance.server_id, instance.suffix
    )
}

/// Replication agreement from this instance to `peer`
pub fn agreement_ldif(
    instance: &InstanceParams,
    replication: &ReplicationParams,
    peer: &str,
) -> String {
    let id = &instance.server_id;
    format!(
        "dn: {}\n\
         changetype: add\n\
         objectClass: top\n\
         objectClass: nsDS5ReplicationAgreement\n\
         cn: {id} to {peer} agreement\n\
         nsDS5ReplicaHost: {peer}\n\
         nsDS5ReplicaPort: {}\n\
         nsDS5ReplicaTransportInfo: {}\n\
         nsDS5ReplicaBindDN: {}\n\
         nsDS5ReplicaBindMethod: SIMPLE\n\
         nsDS5ReplicaCredentials: {}\n\
         nsDS5ReplicaRoot: {}\n\
         description: replication agreement from {id} to {peer}\n",
        agreement_dn(instance, peer),
        replication.replica_port,
        replication.replica_transport,
        replication.bind_dn,
        replication.replication_pass,
        instance.suffix
    )
}

/// Starts a total update of `peer` over its agreement
pub fn init_ldif(instance: &InstanceParams, peer: &str) -> String {
    format!(
        "dn: {}\n\
         changetype: modify\n\
         replace: nsDS5BeginReplicaRefresh\n\
         nsDS5BeginReplicaRefresh: start\n",
        agreement_dn(instance, peer)
    )
}

/// SysV init wrapper delegating to the stock `dirsrv` script for one instance
pub fn init_script(server_id: &str) -> String {
    let mut out = format!(
        "#!/bin/sh\n\
         #\n\
         # dirsrv    This starts and stops the {server_id} dirsrv instance\n\
         #\n\
         # chkconfig:   - 79 21\n\
         # description: 389 Directory Server instance wrapper\n\
         # processname: /usr/sbin/ns-slapd\n\
         # configdir:   /etc/dirsrv/\n\
         # piddir:      /var/run/dirsrv\n\
         # datadir:     /var/lib/dirsrv/slapd-{server_id}\n\
         #\n\n"
    );
    out.push_str("case \"$1\" in\n");
    for action in ["start", "stop", "restart", "status"] {
        let _ = write!(
            out,
            "    {action})\n        /etc/init.d/dirsrv {action} {server_id}\n        ;;\n"
        );
    }
    out.push_str(
        "    *)\n        echo \"Usage: $0 {start|stop|restart|status}\"\n        exit 1\n        ;;\n",
    );
    out.push_str("esac\n\nexit 0\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::tests::FOO;
    use crate::compiler::{InstanceParams, ModuleParams};
    use crate::platform::{Facts, Platform};
    use crate::schema::Manifest;

    fn foo(extra: &str) -> InstanceParams {
        let manifest = Manifest::parse(&format!("{FOO}{extra}")).unwrap();
        let platform = Platform::lookup("debian-8").unwrap();
        let module = ModuleParams::resolve(&manifest.module, &platform).unwrap();
        let facts = Facts {
            fqdn: "foo.example.com".to_string(),
        };
        InstanceParams::resolve("foo", &manifest.instances["foo"], &module, &facts).unwrap()
    }

    #[test]
    fn test_ssl_ldif_with_version_min() {
        let ldif = ssl_ldif(&foo(""), "fooCert", true);
        assert!(ldif.starts_with(
            "dn: cn=encryption,cn=config\nchangetype: modify\n\
             replace: sslVersionMin\nsslVersionMin: TLS1.1\n-\n\
             replace: nsSSLClientAuth\n"
        ));
        assert!(ldif.contains("nsSSLPersonalitySSL: fooCert\n"));
        assert!(ldif.ends_with(
            "replace: nsslapd-minssf\nnsslapd-minssf: 0\n-\n\
             replace: nsslapd-secureport\nnsslapd-securePort: 636\n"
        ));
    }

    #[test]
    fn test_ssl_ldif_without_version_min() {
        let ldif = ssl_ldif(&foo(""), "fooCert", false);
        assert!(!ldif.contains("sslVersionMin"));

        let ldif = ssl_ldif(&foo("ssl_version_min = \"\"\n"), "fooCert", true);
        assert!(!ldif.contains("sslVersionMin"));
    }

    #[test]
    fn test_replication_ldif_by_role() {
        let instance = foo(
            "[instances.foo.replication]\nrole = \"supplier\"\nreplication_pass = \"rp\"\nid = 7\n",
        );
        let replication = instance.replication.clone().unwrap();
        let ldif = replication_ldif(&instance, &replication);
        assert!(ldif.starts_with("dn: cn=Replication Manager,cn=config\nchangetype: add\n"));
        assert!(ldif.contains("cn: Replication Manager\n"));
        assert!(ldif.contains("userPassword: rp\n"));
        assert!(ldif.contains("nsslapd-changelogdir: /var/lib/dirsrv/slapd-foo/changelogdb\n"));
        assert!(ldif.contains(
            "dn: cn=replica,cn=\"dc=example,dc=com\",cn=mapping tree,cn=config\n"
        ));
        assert!(ldif.contains("nsDS5ReplicaType: 3\nnsDS5Flags: 1\n"));
        assert!(ldif.ends_with("nsDS5ReplicaPurgeDelay: 604800\nnsDS5ReplicaId: 7\n"));

        let instance =
            foo("[instances.foo.replication]\nrole = \"consumer\"\nreplication_pass = \"rp\"\n");
        let replication = instance.replication.clone().unwrap();
        let ldif = replication_ldif(&instance, &replication);
        assert!(!ldif.contains("changelog5"));
        assert!(ldif.contains("nsDS5ReplicaType: 2\nnsDS5Flags: 0\n"));
        assert!(ldif.ends_with("nsDS5ReplicaBindDN: cn=Replication Manager,cn=config\n"));
    }

    #[test]
    fn test_agreement_and_init_ldif() {
        let instance =
            foo("[instances.foo.replication]\nrole = \"hub\"\nreplication_pass = \"rp\"\n");
        let replication = instance.replication.clone().unwrap();
        let ldif = agreement_ldif(&instance, &replication, "consumer1");
        assert!(ldif.starts_with(
            "dn: cn=foo to consumer1 agreement,cn=replica,cn=\"dc=example,dc=com\",cn=mapping tree,cn=config\n"
        ));
        assert!(ldif.contains("nsDS5ReplicaHost: consumer1\nnsDS5ReplicaPort: 389\n"));
        assert!(ldif.contains("nsDS5ReplicaTransportInfo: LDAP\n"));
        assert!(ldif.ends_with("description: replication agreement from foo to consumer1\n"));

        let init = init_ldif(&instance, "consumer1");
        assert!(init.ends_with("nsDS5BeginReplicaRefresh: start\n"));
    }

    #[test]
    fn test_init_script() {
        let script = init_script("foo");
        assert!(script.starts_with("#!/bin/sh\n#\n# dirsrv    This starts and stops the foo dirsrv instance\n"));
        assert!(script.contains("# datadir:     /var/lib/dirsrv/slapd-foo\n"));
        assert!(script.contains("    restart)\n        /etc/init.d/dirsrv restart foo\n"));
        assert!(script.ends_with("esac\n\nexit 0\n"));
    }

    #[test]
    fn test_pin() {
        assert_eq!(pin(&foo("")), "Internal (Software) Token:supersecret\n");
    }
}
