//! LDIF content loaded into a running instance.
//!
//! Loading is staged by barriers so every modify LDIF is applied before any
//! add LDIF, and every add LDIF before any base-load LDIF. Schema LDIFs are
//! dropped into the schema directory and picked up by a service restart.

use super::instance::InstanceRefs;
use super::{BIN_PATH, InstanceParams};
use declarative::{
    CatalogBuilder, ExecAttrs, FileAttrs, Resource, ResourceRef, Result, shell_quote,
};
use std::collections::BTreeMap;

pub(super) fn declare(
    builder: &mut CatalogBuilder,
    instance: &InstanceParams,
    refs: &InstanceRefs,
    service: &ResourceRef,
) -> Result<()> {
    let name = &instance.name;
    let modify = builder.barrier(format!("{name}_ldif_modify"))?;
    let add = builder.barrier(format!("{name}_ldif_add"))?;
    let base_load = builder.barrier(format!("{name}_ldif_base_load"))?;
    builder
        .require(&modify, service)
        .require(&add, &modify)
        .require(&base_load, &add);

    let stages: [(&BTreeMap<String, String>, &ResourceRef, Option<&ResourceRef>, Kind); 3] = [
        (&instance.modify_ldifs, &modify, Some(&add), Kind::Modify),
        (&instance.add_ldifs, &add, Some(&base_load), Kind::Add),
        (&instance.base_load_ldifs, &base_load, None, Kind::Add),
    ];
    for (ldifs, after, before, kind) in stages {
        for (ldif, source) in ldifs {
            let item = (ldif.as_str(), source.as_str());
            let exec = declare_one(builder, instance, &refs.setup, item, kind)?;
            builder.require(&exec, after);
            if let Some(before) = before {
                builder.before(&exec, before);
            }
        }
    }

    for (ldif, source) in &instance.schema_ldifs {
        let schema = builder.declare(Resource::file(
            instance.path(&format!("schema/{ldif}.ldif")),
            installed_ldif(instance, source),
        ))?;
        builder
            .require(&schema, &refs.setup)
            .notify(&schema, service);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    Modify,
    Add,
}

fn installed_ldif(instance: &InstanceParams, source: &str) -> FileAttrs {
    FileAttrs::file()
        .source(source)
        .mode("0440")
        .owner(&instance.user)
        .group(&instance.group)
}

fn declare_one(
    builder: &mut CatalogBuilder,
    instance: &InstanceParams,
    setup: &ResourceRef,
    (ldif, source): (&str, &str),
    kind: Kind,
) -> Result<ResourceRef> {
    let path = instance.path(&format!("{ldif}.ldif"));
    let done = instance.path(&format!("{ldif}.done"));
    let file = builder.declare(Resource::file(&path, installed_ldif(instance, source)))?;

    let (action, command) = match kind {
        Kind::Modify => (
            "Modify ldif",
            format!(
                "cat {path} | ldapmodify -h {} -p {} -x -D \"{}\" -w {} ; touch {done}",
                instance.server_host,
                instance.server_ssl_port,
                instance.root_dn,
                shell_quote(&instance.root_dn_pass)
            ),
        ),
        Kind::Add => (
            "Add ldif",
            format!(
                "ldapadd -{}xH ldap://{}:{} -D \"{}\" -w {} -f {path} ; touch {done}",
                instance.starttls_flag(),
                instance.server_host,
                instance.server_port,
                instance.root_dn,
                shell_quote(&instance.root_dn_pass)
            ),
        ),
    };
    let exec = builder.declare(Resource::exec(
        instance.title(&format!("{action} {ldif}")),
        ExecAttrs::new(command).path(BIN_PATH).creates(&done),
    ))?;
    builder.require(&file, setup).require(&exec, &file);
    Ok(exec)
}
