//! Subcommand implementations

pub mod catalog;
pub mod converge;

use crate::compiler;
use crate::config;
use crate::platform::{Facts, Platform};
use crate::schema::Manifest;
use anyhow::{Context as AnyhowContext, Result};
use declarative::{Catalog, CommandRunner};
use std::path::{Path, PathBuf};

/// A manifest compiled for the host it will be applied to
pub struct Compiled {
    pub path: PathBuf,
    pub platform: Platform,
    pub facts: Facts,
    pub catalog: Catalog,
}

/// Load the manifest, resolve platform and facts, and compile the catalog
pub fn compile(manifest: Option<&Path>, runner: &dyn CommandRunner) -> Result<Compiled> {
    let path = config::manifest_path(manifest)?;
    log::info!("Loading manifest {}", path.display());
    let manifest = Manifest::load(&path)?;

    let platform = match manifest.facts.platform.as_deref() {
        Some(id) => Platform::lookup(id)?,
        None => Platform::detect()?,
    };
    let facts = Facts::gather(manifest.facts.fqdn.as_deref(), runner)?;
    log::debug!("Platform {} on {}", platform.id, facts.fqdn);

    let catalog = compiler::compile(&manifest, &platform, &facts)
        .with_context(|| format!("Could not compile {}", path.display()))?;
    Ok(Compiled {
        path,
        platform,
        facts,
        catalog,
    })
}
