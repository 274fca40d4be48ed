//! Module-wide resources shared by every instance

use super::ModuleParams;
use crate::platform::{Platform, UlimitStyle};
use declarative::{
    CatalogBuilder, ExecAttrs, FileAttrs, FileLineAttrs, GroupAttrs, IniSettingAttrs, PackageAttrs,
    Resource, ResourceRef, Result, UserAttrs,
};

/// References instance subtrees hang off
#[derive(Debug, Clone)]
pub struct BaseRefs {
    /// Server package and NSS tools
    pub packages: Vec<ResourceRef>,
    pub user: ResourceRef,
    pub cacerts_dir: ResourceRef,
}

pub(super) fn declare(
    builder: &mut CatalogBuilder,
    module: &ModuleParams,
    platform: &Platform,
) -> Result<BaseRefs> {
    let config_dir = builder.declare(Resource::file("/etc/dirsrv", FileAttrs::directory()))?;
    let cacerts_dir = builder.declare(Resource::exec(
        "Create ldap cacerts directory",
        ExecAttrs::new(format!("/bin/mkdir -p {}", module.cacerts_path))
            .creates(&module.cacerts_path),
    ))?;

    let package = builder.declare(Resource::package(
        &module.package_name,
        PackageAttrs::installed(),
    ))?;
    builder
        .require(&package, &config_dir)
        .require(&package, &cacerts_dir);
    let nss = builder.declare(Resource::package(
        platform.nss_package,
        PackageAttrs::installed(),
    ))?;

    let group = builder.declare(Resource::group(
        &module.group,
        GroupAttrs::present().system(true),
    ))?;
    let user = builder.declare(Resource::user(
        &module.user,
        UserAttrs::present()
            .system(true)
            .home(&module.home_dir)
            .shell(platform.user_shell)
            .gid(&module.group),
    ))?;
    builder.require(&user, &group);

    let ulimit = match platform.ulimit {
        UlimitStyle::Ini { path } => Resource::ini_setting(
            "dirsrv ulimit",
            IniSettingAttrs::new(path, "Service", "LimitNOFILE", module.nofile_limit.to_string()),
        ),
        UlimitStyle::FileLine { path } => Resource::file_line(
            "dirsrv ulimit",
            FileLineAttrs::new(path, format!("ulimit -n {}", module.nofile_limit))
                .matching("^ulimit -n "),
        ),
    };
    let ulimit = builder.declare(ulimit)?;
    builder.require(&ulimit, &package);

    Ok(BaseRefs {
        packages: vec![package, nss],
        user,
        cacerts_dir,
    })
}
