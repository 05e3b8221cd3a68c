//! Inspect command - show the control-flow graph of a method body.

use anyhow::{Context, Result, bail};
use clap::Args;
use firmil_bytecode::ControlFlowGraph;
use firmil_types::Assembly;
use std::fmt::Write;
use std::path::PathBuf;

use super::load_assembly;
use crate::config::Config;

#[derive(Args)]
pub struct InspectCommand {
    /// Assembly description (JSON)
    pub assembly: PathBuf,

    /// Method as Type::method
    #[arg(long, short)]
    pub method: String,
}

impl InspectCommand {
    pub async fn run(&self, _config: &Config) -> Result<()> {
        let assembly = load_assembly(&self.assembly)?;
        print!("{}", render(&assembly, &self.method)?);
        Ok(())
    }
}

/// Listing of one method: every instruction marked live or pruned
fn render(assembly: &Assembly, path: &str) -> Result<String> {
    let key = assembly
        .find_method_by_path(path)
        .with_context(|| format!("Method {path} not found"))?;
    let Some((_, method)) = assembly.find_method(&key) else {
        bail!("Method {key} not found");
    };
    let Some(body) = &method.body else {
        bail!("{key} has no IL body");
    };

    let mut graph = ControlFlowGraph::build(body, &method.exception_clauses)?;
    let live = graph.compute_reachability()?;
    let nodes = graph.nodes();

    let mut out = String::new();
    writeln!(out, "{key}")?;
    for node in nodes {
        let marker = if node.is_reachable() { ' ' } else { '-' };
        write!(out, "{marker} {}", node.instruction)?;
        if !node.targets.is_empty() {
            let targets: Vec<_> = node
                .targets
                .iter()
                .filter_map(|t| nodes.get(t.index()))
                .map(|n| format!("IL_{:04X}", n.instruction.offset))
                .collect();
            write!(out, "  -> {}", targets.join(", "))?;
        }
        writeln!(out)?;
    }
    for (region, is_live) in graph.regions() {
        writeln!(
            out,
            "  {:?} try IL_{:04X}+{} handler IL_{:04X}+{}{}",
            region.kind,
            region.try_offset,
            region.try_length,
            region.handler_offset,
            region.handler_length,
            if is_live { "" } else { " (dead)" }
        )?;
    }
    writeln!(out, "{live} of {} instructions reachable", nodes.len())?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SKIP: &str = r#"{
        "name": "Skip",
        "types": [
            {
                "name": "Demo.Program",
                "methods": [
                    { "name": "Main", "is_static": true, "body": [0, 43, 1, 0, 42] },
                    { "name": "Extern", "is_static": true }
                ]
            }
        ]
    }"#;

    #[test]
    fn test_pruned_instructions_marked() {
        let assembly = Assembly::from_json(SKIP).unwrap();
        let listing = render(&assembly, "Demo.Program::Main").unwrap();
        let lines: Vec<_> = listing.lines().collect();
        assert_eq!(lines[0], "Demo.Program::Main()");
        assert!(lines[1].starts_with("  IL_0000"));
        assert!(lines[2].starts_with("  IL_0001"));
        assert!(lines[2].ends_with("-> IL_0004"));
        assert!(lines[3].starts_with("- IL_0003"));
        assert!(lines[4].starts_with("  IL_0004"));
        assert_eq!(lines[5], "3 of 4 instructions reachable");
    }

    #[test]
    fn test_missing_body_reported() {
        let assembly = Assembly::from_json(SKIP).unwrap();
        assert!(render(&assembly, "Demo.Program::Extern").is_err());
        assert!(render(&assembly, "Demo.Program::Absent").is_err());
    }
}
