//! Shared helpers for sandbox integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use argonbox_core::HashParams;
use argonbox_sandbox::{
    Argon2Hasher, BinaryImage, MemoryLimits, ModuleAbi, NativeHashArgs, NativeSandbox,
    SandboxBackend, SandboxError, SandboxInstance, SandboxLifecycle, SandboxResult, StaticImage,
    WasmSandbox,
};

/// Text of the stand-in Argon2 module
pub const MOCK_MODULE: &str = include_str!("../fixtures/mock_argon2.wat");

/// Outstanding native buffers across every instance of a backend
#[derive(Debug, Default)]
pub struct AllocationCounter {
    allocated: AtomicUsize,
    freed: AtomicUsize,
    free_attempts: AtomicUsize,
}

impl AllocationCounter {
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    pub fn freed(&self) -> usize {
        self.freed.load(Ordering::SeqCst)
    }

    /// Every free call, successful or not
    pub fn free_attempts(&self) -> usize {
        self.free_attempts.load(Ordering::SeqCst)
    }

    pub fn outstanding(&self) -> usize {
        self.allocated() - self.freed()
    }
}

/// Backend wrapper that counts allocations and frees
pub struct CountingBackend {
    inner: Arc<dyn SandboxBackend>,
    counter: Arc<AllocationCounter>,
    failing_free: Option<usize>,
}

impl CountingBackend {
    pub fn new(inner: Arc<dyn SandboxBackend>) -> (Self, Arc<AllocationCounter>) {
        let counter = Arc::new(AllocationCounter::default());
        (
            Self {
                inner,
                counter: Arc::clone(&counter),
                failing_free: None,
            },
            counter,
        )
    }

    /// Make the `index`-th free of every instance fail, zero-based
    pub fn with_failing_free(mut self, index: usize) -> Self {
        self.failing_free = Some(index);
        self
    }
}

#[async_trait]
impl SandboxBackend for CountingBackend {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn is_available(&self) -> bool {
        self.inner.is_available()
    }

    fn requires_image(&self) -> bool {
        self.inner.requires_image()
    }

    async fn instantiate(
        &self,
        image: &BinaryImage,
        limits: Option<MemoryLimits>,
    ) -> SandboxResult<Box<dyn SandboxInstance>> {
        let inner = self.inner.instantiate(image, limits).await?;
        Ok(Box::new(CountingInstance {
            inner,
            counter: Arc::clone(&self.counter),
            failing_free: self.failing_free,
            frees: 0,
        }))
    }
}

struct CountingInstance {
    inner: Box<dyn SandboxInstance>,
    counter: Arc<AllocationCounter>,
    failing_free: Option<usize>,
    frees: usize,
}

impl SandboxInstance for CountingInstance {
    fn allocate(&mut self, size: u32) -> SandboxResult<u32> {
        let address = self.inner.allocate(size)?;
        self.counter.allocated.fetch_add(1, Ordering::SeqCst);
        Ok(address)
    }

    fn free(&mut self, address: u32) -> SandboxResult<()> {
        self.counter.free_attempts.fetch_add(1, Ordering::SeqCst);
        let index = self.frees;
        self.frees += 1;
        if self.failing_free == Some(index) {
            return Err(SandboxError::Trap(format!("free({address}) trapped")));
        }
        self.inner.free(address)?;
        self.counter.freed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn memory(&self) -> &[u8] {
        self.inner.memory()
    }

    fn memory_mut(&mut self) -> &mut [u8] {
        self.inner.memory_mut()
    }

    fn memory_pages(&self) -> u64 {
        self.inner.memory_pages()
    }

    fn hash_native(&mut self, args: &NativeHashArgs) -> SandboxResult<i32> {
        self.inner.hash_native(args)
    }

    fn error_message_native(&mut self, code: i32) -> SandboxResult<u32> {
        self.inner.error_message_native(code)
    }

    fn live_allocations(&self) -> Option<usize> {
        self.inner.live_allocations()
    }
}

/// Hasher over the in-process backend with the stock defaults
pub fn native_hasher() -> Argon2Hasher {
    let lifecycle = SandboxLifecycle::without_image(Arc::new(NativeSandbox::new()));
    Argon2Hasher::new(lifecycle, HashParams::default())
}

/// Hasher over the in-process backend that counts native buffers
pub fn counting_native_hasher() -> (Argon2Hasher, Arc<AllocationCounter>) {
    let (backend, counter) = CountingBackend::new(Arc::new(NativeSandbox::new()));
    let lifecycle = SandboxLifecycle::without_image(Arc::new(backend));
    (Argon2Hasher::new(lifecycle, HashParams::default()), counter)
}

/// Hasher over the stand-in module that counts native buffers
pub fn counting_mock_hasher(module_text: &str) -> (Argon2Hasher, Arc<AllocationCounter>) {
    let wasm = WasmSandbox::new(ModuleAbi::default()).expect("engine");
    let (backend, counter) = CountingBackend::new(Arc::new(wasm));
    let image = StaticImage::new(module_text.as_bytes().to_vec());
    let lifecycle = SandboxLifecycle::new(Arc::new(backend), Arc::new(image));
    (Argon2Hasher::new(lifecycle, HashParams::default()), counter)
}

/// Hasher over the stand-in module whose `index`-th free fails
pub fn failing_free_mock_hasher(index: usize) -> (Argon2Hasher, Arc<AllocationCounter>) {
    let wasm = WasmSandbox::new(ModuleAbi::default()).expect("engine");
    let (backend, counter) = CountingBackend::new(Arc::new(wasm));
    let backend = backend.with_failing_free(index);
    let image = StaticImage::new(MOCK_MODULE.as_bytes().to_vec());
    let lifecycle = SandboxLifecycle::new(Arc::new(backend), Arc::new(image));
    (Argon2Hasher::new(lifecycle, HashParams::default()), counter)
}

/// Variant of the stand-in module that imports its memory from the host
pub fn imported_memory_module() -> String {
    MOCK_MODULE.replace(
        r#"(memory (export "memory") 2)"#,
        r#"(import "env" "memory" (memory 1)) (import "env" "abort" (func (param i32)))"#,
    )
}
