//! Replica configuration and agreements towards peers

use super::{BIN_PATH, InstanceParams, ReplicationParams, templates};
use crate::schema::ReplicationRole;
use declarative::{
    CatalogBuilder, ExecAttrs, FileAttrs, Resource, ResourceRef, Result, shell_quote,
};

/// Peer roles in barrier order
const ROLES: [&str; 3] = ["supplier", "hub", "consumer"];

struct Replication<'a> {
    instance: &'a InstanceParams,
    replication: &'a ReplicationParams,
}

impl Replication<'_> {
    fn ldif_file(
        &self,
        builder: &mut CatalogBuilder,
        name: &str,
        content: String,
    ) -> Result<ResourceRef> {
        builder.declare(Resource::file(
            self.instance.path(&format!("{name}.ldif")),
            FileAttrs::file()
                .content(content)
                .mode("0440")
                .owner(&self.instance.user)
                .group(&self.instance.group),
        ))
    }

    /// `ldapmodify` of `<name>.ldif`, recorded by `<name>.done`
    fn ldapmodify(
        &self,
        builder: &mut CatalogBuilder,
        title: String,
        name: &str,
    ) -> Result<ResourceRef> {
        let instance = self.instance;
        let replication = self.replication;
        let port = if replication.protocol == "ldaps" {
            instance.server_ssl_port
        } else {
            instance.server_port
        };
        let tls = if replication.starttls { "Z" } else { "" };
        let done = instance.path(&format!("{name}.done"));
        builder.declare(Resource::exec(
            title,
            ExecAttrs::new(format!(
                "ldapmodify -{tls}xH {}://{}:{port} -D \"{}\" -w {} -f {} ; touch {done}",
                replication.protocol,
                instance.server_host,
                instance.root_dn,
                shell_quote(&instance.root_dn_pass),
                instance.path(&format!("{name}.ldif")),
            ))
            .path(BIN_PATH)
            .creates(&done),
        ))
    }

    fn peers(&self, role: &str) -> (&[String], bool) {
        let r = self.replication;
        match role {
            "supplier" => (&r.suppliers, r.init_suppliers),
            "hub" => (&r.hubs, r.init_hubs),
            _ => (&r.consumers, r.init_consumers),
        }
    }

    /// Index into [`ROLES`] of the first role this instance pushes changes to
    fn first_target(&self) -> usize {
        match self.replication.role {
            ReplicationRole::Supplier => 0,
            ReplicationRole::Hub => 2,
            ReplicationRole::Consumer => ROLES.len(),
        }
    }
}

pub(super) fn declare(
    builder: &mut CatalogBuilder,
    instance: &InstanceParams,
    replication: &ReplicationParams,
    ssl_restart: &ResourceRef,
    service: &ResourceRef,
) -> Result<()> {
    let id = &instance.server_id;
    let repl = Replication {
        instance,
        replication,
    };

    let ldif = repl.ldif_file(
        builder,
        "replication",
        templates::replication_ldif(instance, replication),
    )?;
    builder.require(&ldif, ssl_restart).require(&ldif, service);
    let setup = repl.ldapmodify(builder, instance.title("Set up replication"), "replication")?;
    builder.require(&setup, &ldif);

    let mut previous = setup.clone();
    let mut barriers = Vec::new();
    for role in ROLES {
        let barrier = builder.barrier(format!("{id}_replication_{role}s"))?;
        builder.require(&barrier, &previous);
        barriers.push(barrier.clone());
        previous = barrier;
    }

    for (index, role) in ROLES.iter().enumerate().skip(repl.first_target()) {
        let (peers, init) = repl.peers(role);
        for peer in peers.iter().filter(|peer| *peer != id) {
            let name = format!("{role}_{peer}");
            let content = templates::agreement_ldif(instance, replication, peer);
            let file = repl.ldif_file(builder, &name, content)?;
            let agreement = repl.ldapmodify(
                builder,
                instance.title(&format!("Create replication agreement for {role} {peer}")),
                &name,
            )?;
            builder
                .require(&file, &barriers[index])
                .require(&agreement, &file)
                .require(&agreement, &setup)
                .require(&agreement, &barriers[index]);
            if let Some(next) = barriers.get(index + 1) {
                builder.before(&agreement, next);
            }

            if init {
                let init_name = format!("{name}_init");
                let content = templates::init_ldif(instance, peer);
                let init_file = repl.ldif_file(builder, &init_name, content)?;
                let initialize = repl.ldapmodify(
                    builder,
                    instance.title(&format!("Initialize {role} {peer}")),
                    &init_name,
                )?;
                builder
                    .require(&init_file, &agreement)
                    .require(&initialize, &init_file)
                    .require(&initialize, &setup)
                    .require(&initialize, &agreement);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::tests::{FOO, compile_on, exec, file, r};
    use declarative::{Guard, ResourceKind};

    const D: &str = "/etc/dirsrv/slapd-foo";

    fn with_replication(body: &str) -> String {
        format!("{FOO}[instances.foo.replication]\nreplication_pass = \"rp\"\n{body}")
    }

    #[test]
    fn test_setup_and_barriers() {
        let catalog = compile_on(&with_replication("role = \"consumer\"\n"), "debian-8");
        let setup = exec(&catalog, "Set up replication: foo");
        assert_eq!(
            setup.command,
            format!(
                "ldapmodify -xH ldap://foo.example.com:389 -D \"cn=Directory Manager\" -w supersecret \
                 -f {D}/replication.ldif ; touch {D}/replication.done"
            )
        );
        assert_eq!(
            setup.guard(),
            Some(Guard::Creates(format!("{D}/replication.done")))
        );
        assert_eq!(file(&catalog, &format!("{D}/replication.ldif")).mode.as_deref(), Some("0440"));

        let suppliers = r(ResourceKind::Barrier, "foo_replication_suppliers");
        let hubs = r(ResourceKind::Barrier, "foo_replication_hubs");
        let consumers = r(ResourceKind::Barrier, "foo_replication_consumers");
        assert!(catalog.precedes(&r(ResourceKind::Exec, "Set up replication: foo"), &suppliers));
        assert!(catalog.precedes(&suppliers, &hubs));
        assert!(catalog.precedes(&hubs, &consumers));
        assert!(catalog.precedes(
            &r(ResourceKind::Service, "dirsrv@foo"),
            &r(ResourceKind::Exec, "Set up replication: foo")
        ));
    }

    #[test]
    fn test_starttls_and_ldaps() {
        let catalog = compile_on(
            &with_replication("role = \"consumer\"\nstarttls = true\n"),
            "debian-8",
        );
        assert!(
            exec(&catalog, "Set up replication: foo")
                .command
                .starts_with("ldapmodify -ZxH ldap://foo.example.com:389 ")
        );

        let catalog = compile_on(
            &with_replication("role = \"consumer\"\nprotocol = \"ldaps\"\n"),
            "debian-8",
        );
        assert!(
            exec(&catalog, "Set up replication: foo")
                .command
                .starts_with("ldapmodify -xH ldaps://foo.example.com:636 ")
        );
    }

    #[test]
    fn test_supplier_agreements_skip_self() {
        let catalog = compile_on(
            &with_replication(
                "role = \"supplier\"\nid = 1\n\
                 suppliers = [\"foo\", \"supplier1\"]\nhubs = [\"hub1\"]\nconsumers = [\"consumer1\"]\n",
            ),
            "debian-8",
        );
        let agreements = [
            ("supplier", "supplier1"),
            ("hub", "hub1"),
            ("consumer", "consumer1"),
        ];
        for (role, peer) in agreements {
            let title = format!("Create replication agreement for {role} {peer}: foo");
            let agreement = exec(&catalog, &title);
            assert_eq!(
                agreement.guard(),
                Some(Guard::Creates(format!("{D}/{role}_{peer}.done")))
            );
            assert!(
                file(&catalog, &format!("{D}/{role}_{peer}.ldif"))
                    .content
                    .as_deref()
                    .unwrap()
                    .contains(&format!("nsDS5ReplicaHost: {peer}\n"))
            );
        }
        assert!(!catalog.contains(&r(
            ResourceKind::Exec,
            "Create replication agreement for supplier foo: foo"
        )));
        assert!(catalog.precedes(
            &r(ResourceKind::Exec, "Create replication agreement for supplier supplier1: foo"),
            &r(ResourceKind::Barrier, "foo_replication_hubs")
        ));
        assert!(catalog.precedes(
            &r(ResourceKind::Barrier, "foo_replication_consumers"),
            &r(ResourceKind::Exec, "Create replication agreement for consumer consumer1: foo")
        ));
        assert!(!catalog.contains(&r(ResourceKind::Exec, "Initialize consumer consumer1: foo")));
    }

    #[test]
    fn test_hub_only_targets_consumers() {
        let catalog = compile_on(
            &with_replication(
                "role = \"hub\"\nsuppliers = [\"supplier1\"]\nconsumers = [\"consumer1\"]\ninit_consumers = true\n",
            ),
            "debian-8",
        );
        assert!(!catalog.contains(&r(
            ResourceKind::Exec,
            "Create replication agreement for supplier supplier1: foo"
        )));
        let init = exec(&catalog, "Initialize consumer consumer1: foo");
        assert_eq!(
            init.command,
            format!(
                "ldapmodify -xH ldap://foo.example.com:389 -D \"cn=Directory Manager\" -w supersecret \
                 -f {D}/consumer_consumer1_init.ldif ; touch {D}/consumer_consumer1_init.done"
            )
        );
        assert!(catalog.precedes(
            &r(ResourceKind::Exec, "Create replication agreement for consumer consumer1: foo"),
            &r(ResourceKind::Exec, "Initialize consumer consumer1: foo")
        ));
    }

    #[test]
    fn test_consumer_has_no_agreements() {
        let catalog = compile_on(
            &with_replication("role = \"consumer\"\nconsumers = [\"consumer1\"]\n"),
            "debian-8",
        );
        assert!(!catalog.contains(&r(
            ResourceKind::Exec,
            "Create replication agreement for consumer consumer1: foo"
        )));
    }
}
