//! WebAssembly sandbox backend
//!
//! Runs the supplied Argon2 module under Wasmtime. Each instantiation gets its
//! own store and linear memory; only compiled modules are shared.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use wasmtime::{
    Config, Engine, ExternType, Instance, Linker, Memory, MemoryType, Module, Store, StoreLimits,
    StoreLimitsBuilder, TypedFunc, WasmParams, WasmResults,
};

use crate::domain::abi::ModuleAbi;
use crate::domain::image::BinaryImage;
use crate::domain::limits::{MAX_PAGES, MemoryLimits, WASM_PAGE_SIZE};
use crate::domain::traits::{
    NativeHashArgs, SandboxBackend, SandboxError, SandboxInstance, SandboxResult,
};

/// Parameter tuple of the native hash entry point
type HashFuncParams = (i32, i32, i32, i32, i32, i32, i32, i32, i32, i32, i32, i32, i32);

/// WASM-based sandbox using Wasmtime
pub struct WasmSandbox {
    engine: Engine,
    abi: ModuleAbi,
    /// Compiled modules keyed by image digest
    modules: Option<Mutex<HashMap<[u8; 32], Module>>>,
}

impl WasmSandbox {
    /// Create a new WASM sandbox with the default engine configuration
    pub fn new(abi: ModuleAbi) -> SandboxResult<Self> {
        Self::with_config(&Config::new(), abi)
    }

    /// Create with custom Wasmtime configuration
    pub fn with_config(config: &Config, abi: ModuleAbi) -> SandboxResult<Self> {
        let engine = Engine::new(config)
            .map_err(|e| SandboxError::NotSupported(format!("Failed to create engine: {}", e)))?;
        Ok(Self {
            engine,
            abi,
            modules: Some(Mutex::new(HashMap::new())),
        })
    }

    /// Compile the image on every call instead of caching compiled modules
    pub fn without_module_cache(mut self) -> Self {
        self.modules = None;
        self
    }

    pub fn abi(&self) -> &ModuleAbi {
        &self.abi
    }

    fn cached_module(&self, image: &BinaryImage) -> SandboxResult<Option<Module>> {
        let Some(modules) = &self.modules else {
            return Ok(None);
        };
        let modules = modules
            .lock()
            .map_err(|_| SandboxError::Platform("module cache lock poisoned".to_string()))?;
        Ok(modules.get(&image.digest()).cloned())
    }

    fn cache_module(&self, image: &BinaryImage, module: &Module) -> SandboxResult<()> {
        if let Some(modules) = &self.modules {
            modules
                .lock()
                .map_err(|_| SandboxError::Platform("module cache lock poisoned".to_string()))?
                .insert(image.digest(), module.clone());
        }
        Ok(())
    }

    /// Compile `image`, reusing a cached module when one exists
    async fn compile(&self, image: &BinaryImage) -> SandboxResult<Module> {
        if let Some(module) = self.cached_module(image)? {
            debug!(sha256 = %image.digest_hex(), "Using cached module");
            return Ok(module);
        }

        let engine = self.engine.clone();
        let bytes = image.clone();
        let module = tokio::task::spawn_blocking(move || Module::new(&engine, bytes.bytes()))
            .await
            .map_err(|e| SandboxError::Platform(format!("Compilation task failed: {}", e)))?
            .map_err(|e| SandboxError::InvalidImage(format!("{:#}", e)))?;

        info!(sha256 = %image.digest_hex(), size = image.len(), "Compiled module");
        self.cache_module(image, &module)?;
        Ok(module)
    }

    /// Create a store, link memory and imports, and instantiate `module`
    fn instantiate_module(
        &self,
        module: &Module,
        limits: Option<MemoryLimits>,
    ) -> SandboxResult<WasmInstance> {
        let mut store = Store::new(&self.engine, region_limits());
        store.limiter(|limits| limits);
        let mut linker: Linker<StoreLimits> = Linker::new(&self.engine);
        let mut imported_memory = None;

        for import in module.imports() {
            let ExternType::Memory(declared) = import.ty() else {
                continue;
            };
            let memory = Memory::new(&mut store, memory_type(&declared, limits))
                .map_err(|e| creation_failed("create memory", e))?;
            linker
                .define(&store, import.module(), import.name(), memory)
                .map_err(|e| creation_failed("link memory", e))?;
            imported_memory = Some(memory);
        }

        linker
            .define_unknown_imports_as_traps(module)
            .map_err(|e| creation_failed("link imports", e))?;

        let instance = linker
            .instantiate(&mut store, module)
            .map_err(|e| creation_failed("instantiate", e))?;

        let memory = match imported_memory {
            Some(memory) => memory,
            None => {
                let memory = instance
                    .get_memory(&mut store, &self.abi.memory)
                    .ok_or_else(|| SandboxError::MissingExport {
                        name: self.abi.memory.clone(),
                        reason: "module neither imports nor exports a memory".to_string(),
                    })?;
                if let Some(limits) = limits {
                    let current = memory.size(&store);
                    if current < limits.initial_pages {
                        memory
                            .grow(&mut store, limits.initial_pages - current)
                            .map_err(|e| creation_failed("grow memory", e))?;
                    }
                }
                memory
            }
        };

        self.run_initializer(&instance, &mut store)?;

        Ok(WasmInstance {
            malloc: typed_export(&instance, &mut store, &self.abi.malloc)?,
            free: typed_export(&instance, &mut store, &self.abi.free)?,
            hash: typed_export(&instance, &mut store, &self.abi.hash)?,
            error_message: typed_export(&instance, &mut store, &self.abi.error_message)?,
            memory,
            store,
        })
    }

    fn run_initializer(
        &self,
        instance: &Instance,
        store: &mut Store<StoreLimits>,
    ) -> SandboxResult<()> {
        for name in &self.abi.initializers {
            let Some(func) = instance.get_func(&mut *store, name) else {
                continue;
            };
            debug!(initializer = %name, "Running module initializer");
            func.typed::<(), ()>(&*store)
                .and_then(|init| init.call(&mut *store, ()))
                .map_err(|e| creation_failed("run initializer", e))?;
            break;
        }
        Ok(())
    }
}

impl std::fmt::Debug for WasmSandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmSandbox")
            .field("abi", &self.abi)
            .field("module_cache", &self.modules.is_some())
            .finish()
    }
}

/// Store limits capping every linear memory at `MAX_PAGES`
///
/// Applies to exported memories without a declared maximum, which the module
/// could otherwise grow to the full 32-bit address space.
fn region_limits() -> StoreLimits {
    StoreLimitsBuilder::new()
        .memory_size((MAX_PAGES * WASM_PAGE_SIZE) as usize)
        .build()
}

/// Memory type for an imported memory, honoring the module's own declaration
fn memory_type(declared: &MemoryType, limits: Option<MemoryLimits>) -> MemoryType {
    let Some(limits) = limits else {
        return declared.clone();
    };
    let maximum = declared
        .maximum()
        .map_or(limits.maximum_pages, |max| max.min(limits.maximum_pages));
    let minimum = limits
        .initial_pages
        .max(declared.minimum())
        .min(maximum);
    // Both bounds are at most MAX_PAGES, which fits a 32-bit page count
    MemoryType::new(minimum as u32, Some(maximum as u32))
}

fn creation_failed(stage: &str, err: wasmtime::Error) -> SandboxError {
    SandboxError::CreationFailed(format!("{}: {:#}", stage, err))
}

fn trap(err: wasmtime::Error) -> SandboxError {
    SandboxError::Trap(format!("{:#}", err))
}

fn typed_export<P, R>(
    instance: &Instance,
    store: &mut Store<StoreLimits>,
    name: &str,
) -> SandboxResult<TypedFunc<P, R>>
where
    P: WasmParams,
    R: WasmResults,
{
    instance
        .get_typed_func::<P, R>(&mut *store, name)
        .map_err(|e| SandboxError::MissingExport {
            name: name.to_string(),
            reason: format!("{:#}", e),
        })
}

#[async_trait]
impl SandboxBackend for WasmSandbox {
    fn name(&self) -> &'static str {
        "wasm"
    }

    fn is_available(&self) -> bool {
        // The engine was created in the constructor
        true
    }

    async fn instantiate(
        &self,
        image: &BinaryImage,
        limits: Option<MemoryLimits>,
    ) -> SandboxResult<Box<dyn SandboxInstance>> {
        if image.is_empty() {
            return Err(SandboxError::InvalidImage("image is empty".to_string()));
        }

        let module = self.compile(image).await?;
        let instance = self.instantiate_module(&module, limits)?;

        debug!(
            pages = instance.memory_pages(),
            explicit_region = limits.is_some(),
            "WASM sandbox instantiated"
        );
        Ok(Box::new(instance))
    }
}

/// A live Wasmtime instance with its own store and memory
pub struct WasmInstance {
    store: Store<StoreLimits>,
    memory: Memory,
    malloc: TypedFunc<i32, i32>,
    free: TypedFunc<i32, ()>,
    hash: TypedFunc<HashFuncParams, i32>,
    error_message: TypedFunc<i32, i32>,
}

impl SandboxInstance for WasmInstance {
    fn allocate(&mut self, size: u32) -> SandboxResult<u32> {
        let address = self
            .malloc
            .call(&mut self.store, size as i32)
            .map_err(trap)?;
        if address == 0 {
            warn!(size, "Module allocator returned NULL");
            return Err(SandboxError::AllocationFailed { size });
        }
        Ok(address as u32)
    }

    fn free(&mut self, address: u32) -> SandboxResult<()> {
        self.free.call(&mut self.store, address as i32).map_err(trap)
    }

    fn memory(&self) -> &[u8] {
        self.memory.data(&self.store)
    }

    fn memory_mut(&mut self) -> &mut [u8] {
        self.memory.data_mut(&mut self.store)
    }

    fn memory_pages(&self) -> u64 {
        self.memory.size(&self.store)
    }

    fn hash_native(&mut self, args: &NativeHashArgs) -> SandboxResult<i32> {
        // The primitive takes unsigned 32-bit values; the bit patterns pass through unchanged
        let params = (
            args.time_cost as i32,
            args.memory_cost_kib as i32,
            args.parallelism as i32,
            args.pwd as i32,
            args.pwd_len as i32,
            args.salt as i32,
            args.salt_len as i32,
            args.hash as i32,
            args.hash_len as i32,
            args.encoded as i32,
            args.encoded_len as i32,
            args.variant,
            args.version as i32,
        );
        self.hash.call(&mut self.store, params).map_err(trap)
    }

    fn error_message_native(&mut self, code: i32) -> SandboxResult<u32> {
        self.error_message
            .call(&mut self.store, code)
            .map(|address| address as u32)
            .map_err(trap)
    }
}
