//! # Declarative
//!
//! A framework for declarative resource convergence.
//!
//! A compiler declares the desired state of a host as a [`Catalog`] of
//! typed resources plus ordering and notification relations. The
//! [`applier`] walks the catalog in dependency order, converges each
//! resource idempotently and propagates refresh events along notify edges.
//!
//! ## Core Concepts
//!
//! - **Resource**: A typed, titled piece of host state (file, package, user,
//!   group, service, exec, file line, ini setting, barrier)
//! - **Relation**: `before`, `require`, `notify` or `subscribe`, normalized
//!   into graph edges
//! - **Catalog**: Resources plus relations, validated and topologically ordered
//! - **Outcome**: What happened to a resource in one run
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{
//!     ApplyContext, CatalogBuilder, ExecAttrs, FileAttrs, HostCommands, NoProgress, Resource,
//!     ShellRunner, apply,
//! };
//!
//! let mut builder = CatalogBuilder::new();
//! let ldif = builder.declare(Resource::file(
//!     "/etc/dirsrv/slapd-foo/ssl.ldif",
//!     FileAttrs::file().content("dn: cn=config\n").mode("0440"),
//! ))?;
//! let import = builder.declare(Resource::exec(
//!     "Import ssl ldif: foo",
//!     ExecAttrs::new("ldapmodify -xH ldap://localhost:389 -f ssl.ldif").refreshonly(),
//! ))?;
//! builder.notify(&ldif, &import);
//! let catalog = builder.build()?;
//!
//! let runner = ShellRunner;
//! let commands = HostCommands::default();
//! let report = apply(&catalog, &ApplyContext::new(&runner, &commands), &mut NoProgress);
//! std::process::exit(report.exit_code());
//! ```
//!
//! ## Provider Traits
//!
//! The crate uses traits for dependency injection:
//!
//! - [`CommandRunner`]: Spawns every external process
//! - [`ProgressCallback`]: Receives progress updates
//! - [`ConfirmCallback`]: Handles user confirmations
//!
//! This allows the crate to be used without hard dependencies on
//! specific UI frameworks or process handling, and lets tests fake the host.

pub mod applier;
pub mod catalog;
pub mod context;
pub mod diff;
pub mod error;
pub mod exec;
pub mod graph;
pub mod resource;
pub mod runner;
pub mod scope;
pub mod types;

// Re-export main types at crate root
pub use applier::{Convergence, apply, apply_all, converge_confirmed};
pub use catalog::{Catalog, CatalogBuilder, Relation, RelationKind};
pub use context::{
    ApplyContext, AutoConfirm, AutoDecline, CancelToken, ConfirmCallback, DEFAULT_SEARCH_PATH,
    HostCommands, NoProgress, PackageManager, ProgressCallback, ServiceManager, shell_quote,
};
pub use diff::{DiffSummary, content_diff, group_by_kind};
pub use error::{Error, ErrorPhase, Result};
pub use exec::{ExecOutcome, run_exec};
pub use graph::{Edge, Graph};
pub use resource::{
    Attributes, ExecAttrs, FileAttrs, FileEnsure, FileLineAttrs, GroupAttrs, Guard,
    IniSettingAttrs, PackageAttrs, PackageEnsure, Presence, Resource, ServiceAttrs, ServiceEnsure,
    UserAttrs,
};
pub use runner::{CommandRunner, CommandSpec, ShellRunner};
pub use scope::Scope;
pub use types::{
    ApplyOptions, ApplyReport, ApplySummary, CommandOutput, Outcome, PropertyChange,
    ResourceKind, ResourceReport, ResourceRef,
};
