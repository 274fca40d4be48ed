//! The instance's `dirsrv@<id>` service

use super::{InstanceParams, templates};
use crate::platform::Platform;
use declarative::{CatalogBuilder, FileAttrs, Resource, ResourceRef, Result, ServiceAttrs};

pub(super) fn declare(
    builder: &mut CatalogBuilder,
    instance: &InstanceParams,
    platform: &Platform,
    ssl_restart: &ResourceRef,
) -> Result<ResourceRef> {
    let id = &instance.server_id;
    let service = builder.declare(Resource::service(
        format!("dirsrv@{id}"),
        ServiceAttrs::running()
            .ensure(instance.service_ensure)
            .enable(instance.service_enable)
            .hasrestart(true),
    ))?;
    builder.require(&service, ssl_restart);

    // SysV has no instance units; a wrapper script stands in for dirsrv@<id>
    if !platform.is_systemd() {
        let script = builder.declare(Resource::file(
            format!("/etc/init.d/dirsrv@{id}"),
            FileAttrs::file()
                .content(templates::init_script(id))
                .mode("0755"),
        ))?;
        builder.require(&service, &script);
    }

    Ok(service)
}
