//! Resource model
//!
//! A [`Resource`] is a `(kind, title)` identity plus a closed, kind-specific
//! attribute set. Validation runs when the resource is declared into a
//! [`CatalogBuilder`](crate::CatalogBuilder), so a built catalog only holds
//! well-formed declarations.
//!
//! Each kind except `Exec` and `Barrier` has a provider that reads the live
//! host state, reports differing properties, and converges them. Execs go
//! through the command adapter in [`crate::exec`]; barriers carry no state.

mod account;
mod exec;
mod file;
mod file_line;
mod ini_setting;
mod package;
mod service;

pub use account::{GroupAttrs, UserAttrs};
pub use exec::{ExecAttrs, Guard};
pub use file::{FileAttrs, FileEnsure};
pub use file_line::FileLineAttrs;
pub use ini_setting::IniSettingAttrs;
pub use package::{PackageAttrs, PackageEnsure};
pub use service::{ServiceAttrs, ServiceEnsure};

use crate::context::ApplyContext;
use crate::error::{Error, Result};
use crate::types::{PropertyChange, ResourceKind, ResourceRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Target state shared by kinds that are either present or absent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    #[default]
    Present,
    Absent,
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present => f.write_str("present"),
            Self::Absent => f.write_str("absent"),
        }
    }
}

/// Kind-specific attributes of a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Attributes {
    File(FileAttrs),
    Package(PackageAttrs),
    User(UserAttrs),
    Group(GroupAttrs),
    Service(ServiceAttrs),
    Exec(ExecAttrs),
    FileLine(FileLineAttrs),
    IniSetting(IniSettingAttrs),
    Barrier,
}

impl Attributes {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::File(_) => ResourceKind::File,
            Self::Package(_) => ResourceKind::Package,
            Self::User(_) => ResourceKind::User,
            Self::Group(_) => ResourceKind::Group,
            Self::Service(_) => ResourceKind::Service,
            Self::Exec(_) => ResourceKind::Exec,
            Self::FileLine(_) => ResourceKind::FileLine,
            Self::IniSetting(_) => ResourceKind::IniSetting,
            Self::Barrier => ResourceKind::Barrier,
        }
    }
}

/// A declared resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub title: String,
    pub attributes: Attributes,
}

impl Resource {
    pub fn new(title: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            title: title.into(),
            attributes,
        }
    }

    /// A file or directory; the title is the absolute path
    pub fn file(path: impl Into<String>, attrs: FileAttrs) -> Self {
        Self::new(path, Attributes::File(attrs))
    }

    pub fn package(name: impl Into<String>, attrs: PackageAttrs) -> Self {
        Self::new(name, Attributes::Package(attrs))
    }

    pub fn user(name: impl Into<String>, attrs: UserAttrs) -> Self {
        Self::new(name, Attributes::User(attrs))
    }

    pub fn group(name: impl Into<String>, attrs: GroupAttrs) -> Self {
        Self::new(name, Attributes::Group(attrs))
    }

    pub fn service(name: impl Into<String>, attrs: ServiceAttrs) -> Self {
        Self::new(name, Attributes::Service(attrs))
    }

    pub fn exec(title: impl Into<String>, attrs: ExecAttrs) -> Self {
        Self::new(title, Attributes::Exec(attrs))
    }

    pub fn file_line(title: impl Into<String>, attrs: FileLineAttrs) -> Self {
        Self::new(title, Attributes::FileLine(attrs))
    }

    pub fn ini_setting(title: impl Into<String>, attrs: IniSettingAttrs) -> Self {
        Self::new(title, Attributes::IniSetting(attrs))
    }

    pub fn barrier(title: impl Into<String>) -> Self {
        Self::new(title, Attributes::Barrier)
    }

    pub fn kind(&self) -> ResourceKind {
        self.attributes.kind()
    }

    /// Typed identity of this resource
    pub fn reference(&self) -> ResourceRef {
        ResourceRef::new(self.kind(), self.title.clone())
    }

    /// Kind-specific validation, run at declaration time
    pub fn validate(&self) -> Result<()> {
        let reference = self.reference();
        if self.title.trim().is_empty() {
            return Err(Error::invalid_attribute(&reference, "title", "must not be empty"));
        }
        match &self.attributes {
            Attributes::File(attrs) => attrs.validate(&reference),
            Attributes::Package(_) | Attributes::Group(_) | Attributes::Barrier => Ok(()),
            Attributes::User(attrs) => attrs.validate(&reference),
            Attributes::Service(_) => Ok(()),
            Attributes::Exec(attrs) => attrs.validate(&reference),
            Attributes::FileLine(attrs) => attrs.validate(&reference),
            Attributes::IniSetting(attrs) => attrs.validate(&reference),
        }
    }

    /// Provider for kinds with observable host state
    pub(crate) fn provider(&self) -> Option<&dyn Provider> {
        match &self.attributes {
            Attributes::File(attrs) => Some(attrs),
            Attributes::Package(attrs) => Some(attrs),
            Attributes::User(attrs) => Some(attrs),
            Attributes::Group(attrs) => Some(attrs),
            Attributes::Service(attrs) => Some(attrs),
            Attributes::FileLine(attrs) => Some(attrs),
            Attributes::IniSetting(attrs) => Some(attrs),
            Attributes::Exec(_) | Attributes::Barrier => None,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind(), self.title)
    }
}

/// Reads and converges one kind of host state.
///
/// `diff` must not mutate the host; it is the only method called in noop
/// mode (besides `refresh`, which checks `ctx.noop()` itself).
pub(crate) trait Provider {
    /// Properties that differ between the host and the declaration
    fn diff(&self, title: &str, ctx: &ApplyContext<'_>) -> anyhow::Result<Vec<PropertyChange>>;

    /// Converge the properties reported by `diff`
    fn apply(
        &self,
        title: &str,
        changes: &[PropertyChange],
        ctx: &ApplyContext<'_>,
    ) -> anyhow::Result<()>;

    /// React to a refresh event. `applied` holds the changes made in this pass.
    fn refresh(
        &self,
        _title: &str,
        _applied: &[PropertyChange],
        _ctx: &ApplyContext<'_>,
    ) -> anyhow::Result<Option<PropertyChange>> {
        Ok(None)
    }
}

pub(crate) fn validate_mode(resource: &ResourceRef, mode: Option<&str>) -> Result<()> {
    match mode {
        Some(mode) if !is_octal_mode(mode) => Err(Error::invalid_attribute(
            resource,
            "mode",
            format!("'{mode}' is not an octal mode"),
        )),
        _ => Ok(()),
    }
}

fn is_octal_mode(mode: &str) -> bool {
    (3..=4).contains(&mode.len()) && mode.chars().all(|c| ('0'..='7').contains(&c))
}

pub(crate) fn validate_absolute(resource: &ResourceRef, attribute: &str, path: &str) -> Result<()> {
    if Path::new(path).is_absolute() {
        Ok(())
    } else {
        Err(Error::invalid_attribute(
            resource,
            attribute,
            format!("'{path}' is not an absolute path"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_and_display() {
        let resource = Resource::file("/etc/dirsrv", FileAttrs::directory());
        assert_eq!(
            resource.reference(),
            ResourceRef::new(ResourceKind::File, "/etc/dirsrv")
        );
        assert_eq!(resource.to_string(), "File[/etc/dirsrv]");
    }

    #[test]
    fn test_mode_validation() {
        let ok = Resource::file("/etc/x", FileAttrs::file().mode("0440"));
        assert!(ok.validate().is_ok());

        let bad = Resource::file("/etc/x", FileAttrs::file().mode("rwx"));
        let err = bad.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidAttribute { ref attribute, .. } if attribute == "mode"));
    }

    #[test]
    fn test_empty_title_rejected() {
        let err = Resource::package(" ", PackageAttrs::installed())
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("title"));
    }

    #[test]
    fn test_barrier_has_no_provider() {
        assert!(Resource::barrier("foo_ldif_add").provider().is_none());
        assert!(
            Resource::package("389-ds-base", PackageAttrs::installed())
                .provider()
                .is_some()
        );
    }
}
