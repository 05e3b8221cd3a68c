//! Info command - protocol constants and effective configuration.

use anyhow::Result;
use clap::Args;
use firmil_compiler::CompilerConfig;
use firmil_runtime::SessionConfig;
use firmil_types::{NATIVE_TABLE_VERSION, NativeMethod, SystemException};
use firmil_wire::frame::{DEFAULT_MAX_MESSAGE_SIZE, GROUP_TAG, SCHEDULER_DATA};
use firmil_wire::{CommandError, ExecutorCommand};
use serde::Serialize;

use crate::config::Config;

#[derive(Args)]
pub struct InfoCommand {
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct Entry {
    name: String,
    code: u16,
}

#[derive(Debug, Serialize)]
struct Info {
    scheduler_data: u8,
    group_tag: u8,
    native_table_version: u16,
    default_max_message_size: usize,
    commands: Vec<Entry>,
    native_methods: Vec<Entry>,
    command_errors: Vec<Entry>,
    system_exceptions: Vec<Entry>,
    session: SessionConfig,
    compiler: CompilerConfig,
    rules: usize,
}

impl Info {
    fn collect(config: &Config) -> Self {
        Self {
            scheduler_data: SCHEDULER_DATA,
            group_tag: GROUP_TAG,
            native_table_version: NATIVE_TABLE_VERSION,
            default_max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            commands: ExecutorCommand::REQUESTS
                .iter()
                .map(|c| Entry {
                    name: c.name().to_string(),
                    code: u16::from(c.to_byte()),
                })
                .collect(),
            native_methods: NativeMethod::ALL
                .iter()
                .map(|&m| Entry {
                    name: m.name().to_string(),
                    code: m as u16,
                })
                .collect(),
            command_errors: (0..=u8::MAX)
                .map_while(CommandError::from_byte)
                .map(|e| Entry {
                    name: e.name().to_string(),
                    code: u16::from(e as u8),
                })
                .collect(),
            system_exceptions: (0..=u8::MAX)
                .map_while(SystemException::from_byte)
                .map(|e| Entry {
                    name: format!("{e:?}"),
                    code: u16::from(e as u8),
                })
                .collect(),
            session: config.session.clone(),
            compiler: config.compiler.clone(),
            rules: config.rules.len(),
        }
    }

    fn print(&self) {
        println!("Protocol");
        println!("  scheduler data:       0x{:02X}", self.scheduler_data);
        println!("  group tag:            0x{:02X}", self.group_tag);
        println!("  native table version: {}", self.native_table_version);
        println!("  default frame size:   {}", self.default_max_message_size);
        print_table("Commands", &self.commands);
        print_table("Native methods", &self.native_methods);
        print_table("Command errors", &self.command_errors);
        print_table("System exceptions", &self.system_exceptions);
        println!();
        println!("Session");
        println!("  reply timeout:        {} ms", self.session.reply_timeout_ms);
        println!("  attempts:             {}", self.session.retries);
        println!("  retry delay:          {} ms", self.session.retry_delay_ms);
        println!("  reset before upload:  {}", self.session.reset_before_upload);
        println!("  dispose grace:        {} ms", self.session.dispose_grace_ms);
        println!("  pin settle:           {} us", self.session.pin_settle_us);
        println!("Compiler");
        println!("  max message size:     {}", self.compiler.max_message_size);
        println!("  type initializers:    {}", self.compiler.include_type_initializers);
        println!("  max methods:          {}", self.compiler.max_methods);
        if self.compiler.write_to_flash {
            println!("  flash data version:   {}", self.compiler.data_version);
        }
        println!("  rules:                {}", self.rules);
    }
}

fn print_table(title: &str, entries: &[Entry]) {
    println!();
    println!("{title}");
    for entry in entries {
        println!("  {:>4}  {}", entry.code, entry.name);
    }
}

impl InfoCommand {
    pub async fn run(&self, config: &Config) -> Result<()> {
        let info = Info::collect(config);
        if self.json {
            println!("{}", serde_json::to_string_pretty(&info)?);
        } else {
            info.print();
        }
        Ok(())
    }
}
