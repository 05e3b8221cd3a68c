//! Compiler settings

use firmil_wire::DEFAULT_MAX_MESSAGE_SIZE;
use serde::{Deserialize, Serialize};

/// Settings for one compilation
///
/// Loaded from the `[compiler]` table of `firmil.toml`; missing keys keep
/// their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Largest frame the device accepts.
    /// Default: 64
    pub max_message_size: usize,

    /// Compile the static constructors of every class the program touches.
    /// Default: true
    pub include_type_initializers: bool,

    /// Upper bound on compiled methods.
    /// Default: 1024
    pub max_methods: usize,

    /// Append flash commit commands to the upload.
    /// Default: false
    pub write_to_flash: bool,

    /// Program version recorded in the flash header.
    /// Default: 1
    pub data_version: u32,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            include_type_initializers: true,
            max_methods: 1024,
            write_to_flash: false,
            data_version: 1,
        }
    }
}

impl CompilerConfig {
    /// Create a config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum message size
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Enable or disable type initializers
    pub fn type_initializers(mut self, enabled: bool) -> Self {
        self.include_type_initializers = enabled;
        self
    }

    /// Set the method limit
    pub fn max_methods(mut self, limit: usize) -> Self {
        self.max_methods = limit;
        self
    }

    /// Commit the program to flash with the given data version
    pub fn flash(mut self, data_version: u32) -> Self {
        self.write_to_flash = true;
        self.data_version = data_version;
        self
    }
}
