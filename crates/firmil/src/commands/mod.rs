//! CLI command implementations.

pub mod compile;
pub mod info;
pub mod inspect;

use anyhow::Context;
use firmil_types::Assembly;
use std::path::Path;

/// Read and parse an assembly description
pub(crate) fn load_assembly(path: &Path) -> anyhow::Result<Assembly> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Assembly::from_json(&text).with_context(|| format!("Failed to parse {}", path.display()))
}
