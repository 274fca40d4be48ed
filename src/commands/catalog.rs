//! Read-only views of the compiled catalog: `compile` and `graph`

use super::Compiled;
use crate::Context;
use crate::cli::{CompileArgs, ManifestArgs, OutputFormat};
use crate::ui;
use anyhow::Result;
use declarative::{Catalog, ResourceRef, ShellRunner};
use serde::Serialize;

/// JSON document printed by `compile --format json`
#[derive(Serialize)]
struct CompiledDocument<'a> {
    platform: &'a str,
    fqdn: &'a str,
    /// Resource references in evaluation order
    order: Vec<ResourceRef>,
    catalog: &'a Catalog,
}

pub fn compile(ctx: &Context, args: CompileArgs) -> Result<i32> {
    let compiled = super::compile(args.manifest.manifest.as_deref(), &ShellRunner)?;
    match args.format {
        OutputFormat::Json => println!("{}", render_json(&compiled)?),
        OutputFormat::Text => {
            if !ctx.quiet {
                ui::header(&format!(
                    "Catalog for {} ({})",
                    compiled.facts.fqdn, compiled.platform.id
                ));
                ui::kv("manifest", &compiled.path.display().to_string());
                println!();
            }
            print!("{}", render_text(&compiled.catalog));
        }
    }
    Ok(0)
}

pub fn graph(args: ManifestArgs) -> Result<i32> {
    let compiled = super::compile(args.manifest.as_deref(), &ShellRunner)?;
    print!("{}", compiled.catalog.to_dot());
    Ok(0)
}

/// Resources in evaluation order, each followed by its declared relations
fn render_text(catalog: &Catalog) -> String {
    let width = catalog.len().to_string().len();
    let mut out = String::new();
    for (n, resource) in catalog.ordered().enumerate() {
        out.push_str(&format!("{:>width$}. {resource}\n", n + 1));
        for relation in catalog.relations_of(&resource.reference()) {
            out.push_str(&format!(
                "{:width$}    {} {}\n",
                "", relation.kind, relation.target
            ));
        }
    }
    out.push_str(&format!(
        "\n{} resources, {} relations\n",
        catalog.len(),
        catalog.relations().len()
    ));
    out
}

fn render_json(compiled: &Compiled) -> Result<String> {
    let document = CompiledDocument {
        platform: compiled.platform.id,
        fqdn: &compiled.facts.fqdn,
        order: compiled.catalog.ordered().map(|r| r.reference()).collect(),
        catalog: &compiled.catalog,
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::tests::{FOO, compile_on, facts};
    use crate::platform::Platform;
    use std::path::PathBuf;

    fn compiled() -> Compiled {
        Compiled {
            path: PathBuf::from("/srv/manifest.toml"),
            platform: Platform::lookup("debian-8").unwrap(),
            facts: facts(),
            catalog: compile_on(FOO, "debian-8"),
        }
    }

    #[test]
    fn test_text_lists_resources_in_order() {
        let compiled = compiled();
        let text = render_text(&compiled.catalog);
        let package = text.find("Package[389-ds-base]").unwrap();
        let setup = text.find("Exec[setup ds: foo]").unwrap();
        assert!(package < setup);
        assert!(text.contains(&format!("{} resources", compiled.catalog.len())));
        assert!(text.contains("    notify "));
    }

    #[test]
    fn test_json_document() {
        let compiled = compiled();
        let json: serde_json::Value = serde_json::from_str(&render_json(&compiled).unwrap()).unwrap();
        assert_eq!(json["platform"], "debian-8");
        assert_eq!(json["fqdn"], "foo.example.com");
        let order = json["order"].as_array().unwrap();
        assert_eq!(order.len(), compiled.catalog.len());
        assert_eq!(
            json["catalog"]["resources"].as_array().unwrap().len(),
            compiled.catalog.len()
        );
    }
}
