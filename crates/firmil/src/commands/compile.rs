//! Compile command - build the upload for one entry point.

use anyhow::Result;
use clap::Args;
use firmil_compiler::{CompiledProgram, Compiler};
use firmil_wire::Frame;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::load_assembly;
use crate::config::Config;

#[derive(Args)]
pub struct CompileCommand {
    /// Assembly description (JSON)
    pub assembly: PathBuf,

    /// Entry method as Type::method
    #[arg(long, short)]
    pub entry: String,

    /// Write the upload frames as hex, one frame per line
    #[arg(long, short, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Largest frame the device accepts (overrides firmil.toml)
    #[arg(long)]
    pub max_message_size: Option<usize>,

    /// Append flash commit commands with this data version
    #[arg(long, value_name = "VERSION")]
    pub flash: Option<u32>,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

/// What a compilation produced
#[derive(Debug, Serialize)]
pub struct Summary {
    pub entry: String,
    pub entry_token: u32,
    pub methods: usize,
    pub native_methods: usize,
    pub classes: usize,
    pub type_initializers: usize,
    pub code_size: usize,
    pub removed_instructions: usize,
    pub constant_memory: u32,
    pub string_memory: u32,
    pub frames: usize,
    pub upload_bytes: usize,
    pub hash: u32,
}

impl Summary {
    pub fn of(program: &CompiledProgram, frames: &[Frame]) -> Self {
        let (constant_memory, string_memory) = program.constant_memory();
        Self {
            entry: program.entry.to_string(),
            entry_token: program.entry_token.value(),
            methods: program.methods.len(),
            native_methods: program.methods.iter().filter(|m| m.is_native()).count(),
            classes: program.classes.len(),
            type_initializers: program.type_initializers.len(),
            code_size: program.code_size(),
            removed_instructions: program.removed_instructions(),
            constant_memory,
            string_memory,
            frames: frames.len(),
            upload_bytes: frames.iter().map(Frame::len).sum(),
            hash: program.hash(),
        }
    }

    fn print(&self) {
        println!("Compiled {} (token 0x{:X})", self.entry, self.entry_token);
        println!("  methods:            {} ({} native)", self.methods, self.native_methods);
        println!("  classes:            {}", self.classes);
        println!("  type initializers:  {}", self.type_initializers);
        println!("  IL bytes:           {}", self.code_size);
        println!("  pruned:             {} instructions", self.removed_instructions);
        println!("  constant memory:    {} + {} string bytes", self.constant_memory, self.string_memory);
        println!("  upload:             {} frames, {} bytes", self.frames, self.upload_bytes);
        println!("  hash:               0x{:08X}", self.hash);
    }
}

impl CompileCommand {
    pub async fn run(&self, config: &Config) -> Result<()> {
        let assembly = load_assembly(&self.assembly)?;
        let rules = config.rule_set()?;

        let mut settings = config.compiler.clone();
        if let Some(size) = self.max_message_size {
            settings = settings.max_message_size(size);
        }
        if let Some(version) = self.flash {
            settings = settings.flash(version);
        }

        let compiler = Compiler::new(&assembly, rules, settings)?;
        let program = compiler.compile_path(&self.entry)?;
        let frames = compiler.encode(&program)?;
        let summary = Summary::of(&program, &frames);

        if let Some(path) = &self.output {
            write_frames(path, &frames)?;
            tracing::debug!(path = %path.display(), frames = frames.len(), "wrote frames");
        }

        if self.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            summary.print();
        }
        Ok(())
    }
}

fn write_frames(path: &Path, frames: &[Frame]) -> Result<()> {
    let mut out = std::io::BufWriter::new(std::fs::File::create(path)?);
    for frame in frames {
        writeln!(out, "{}", frame.to_hex())?;
    }
    out.flush()?;
    Ok(())
}
