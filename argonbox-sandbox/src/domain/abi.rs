//! Module ABI value objects

use serde::{Deserialize, Serialize};

use argonbox_core::config::ExportsConfig;

/// Export names through which the host reaches the primitive
///
/// Defaults match a module built from the reference Argon2 sources with
/// `argon2_hash`, `argon2_error_message`, `malloc` and `free` exported.
///
/// # Example
///
/// ```rust
/// use argonbox_sandbox::ModuleAbiBuilder;
///
/// let abi = ModuleAbiBuilder::new()
///     .hash("_argon2_hash")
///     .error_message("_argon2_error_message")
///     .build();
/// assert_eq!(abi.malloc, "malloc");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleAbi {
    /// Native hash entry point (13 x i32 -> i32)
    pub hash: String,
    /// Status code to message address (i32 -> i32)
    pub error_message: String,
    /// Allocator (i32 -> i32)
    pub malloc: String,
    /// Deallocator (i32 -> ())
    pub free: String,
    /// Exported linear memory, used when the module does not import one
    pub memory: String,
    /// Start functions tried in order; the first one exported is called once
    pub initializers: Vec<String>,
}

impl Default for ModuleAbi {
    fn default() -> Self {
        Self::from(&ExportsConfig::default())
    }
}

impl From<&ExportsConfig> for ModuleAbi {
    fn from(exports: &ExportsConfig) -> Self {
        Self {
            hash: exports.hash.clone(),
            error_message: exports.error_message.clone(),
            malloc: exports.malloc.clone(),
            free: exports.free.clone(),
            memory: exports.memory.clone(),
            initializers: vec!["_initialize".to_string(), "__wasm_call_ctors".to_string()],
        }
    }
}

/// Builder for constructing a module ABI fluently
#[derive(Debug, Default)]
pub struct ModuleAbiBuilder {
    abi: ModuleAbi,
}

impl ModuleAbiBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hash(mut self, name: impl Into<String>) -> Self {
        self.abi.hash = name.into();
        self
    }

    pub fn error_message(mut self, name: impl Into<String>) -> Self {
        self.abi.error_message = name.into();
        self
    }

    pub fn malloc(mut self, name: impl Into<String>) -> Self {
        self.abi.malloc = name.into();
        self
    }

    pub fn free(mut self, name: impl Into<String>) -> Self {
        self.abi.free = name.into();
        self
    }

    pub fn memory(mut self, name: impl Into<String>) -> Self {
        self.abi.memory = name.into();
        self
    }

    /// Replace the list of initializer exports
    pub fn initializers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.abi.initializers = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> ModuleAbi {
        self.abi
    }
}
