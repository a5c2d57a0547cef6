use std::{error, fmt};

use crate::expression::Expression;

/// Driver seam errors
#[derive(Debug, Clone)]
pub enum Error {
    UnsupportedBackend(BackendKind),
    NoSuchQueue { context: Context, id: usize },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedBackend(kind) => write!(f, "unsupported backend {kind:?}"),
            Self::NoSuchQueue { context, id } => {
                write!(f, "no queue `{id}` for context {:#x}", context.handle)
            }
        }
    }
}

impl error::Error for Error {}

/// Device API the opaque handles below belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum BackendKind {
    OpenCl = 0,
    Cuda = 1,
}

/// Opaque device-context handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Context {
    pub backend: BackendKind,
    pub handle: u64,
}

impl Context {
    #[must_use]
    pub fn new(backend: BackendKind, handle: u64) -> Self {
        Self { backend, handle }
    }
}

/// Opaque command-queue handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommandQueue {
    pub backend: BackendKind,
    pub handle: u64,
}

impl CommandQueue {
    #[must_use]
    pub fn new(backend: BackendKind, handle: u64) -> Self {
        Self { backend, handle }
    }
}

/// Opaque kernel handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Kernel {
    pub backend: BackendKind,
    pub handle: u64,
}

impl Kernel {
    #[must_use]
    pub fn new(backend: BackendKind, handle: u64) -> Self {
        Self { backend, handle }
    }
}

/// Opaque event handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Event {
    pub backend: BackendKind,
    pub handle: u64,
}

impl Event {
    #[must_use]
    pub fn new(backend: BackendKind, handle: u64) -> Self {
        Self { backend, handle }
    }
}

/// Opaque device allocation. The core never dereferences it; it only
/// threads the handle through to the driver.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Buffer {
    pub backend: BackendKind,
    pub context: Context,
    pub size: usize,
    pub handle: u64,
}

impl Buffer {
    /// Wrap a native allocation without taking ownership of it.
    #[must_use]
    pub fn from_native(context: Context, size: usize, handle: u64) -> Self {
        Self {
            backend: context.backend,
            context,
            size,
            handle,
        }
    }
}

/// Kernel launch geometry, up to three dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NDRange {
    sizes: [usize; 3],
    dims: usize,
}

impl NDRange {
    #[must_use]
    pub fn d1(x: usize) -> Self {
        Self {
            sizes: [x, 1, 1],
            dims: 1,
        }
    }

    #[must_use]
    pub fn d2(x: usize, y: usize) -> Self {
        Self {
            sizes: [x, y, 1],
            dims: 2,
        }
    }

    #[must_use]
    pub fn d3(x: usize, y: usize, z: usize) -> Self {
        Self {
            sizes: [x, y, z],
            dims: 3,
        }
    }

    #[must_use]
    pub fn dims(&self) -> usize {
        self.dims
    }

    #[must_use]
    pub fn sizes(&self) -> &[usize] {
        &self.sizes[..self.dims]
    }
}

/// Accessor into the driver layer. The core holds no process-wide backend
/// state; callers hand an implementation of this trait to whatever needs
/// queues, contexts or allocations.
pub trait Backend {
    /// Allocate `size` bytes in `context`.
    fn alloc(&self, context: &Context, size: usize) -> Result<Buffer, Error>;
    /// Wrap a native context handle.
    fn import(&self, backend: BackendKind, native: u64) -> Context;
    /// Queue `id` attached to `context`.
    fn queue(&self, context: &Context, id: usize) -> Result<CommandQueue, Error>;
    /// Launch a kernel and return its completion event.
    fn enqueue(
        &self,
        queue: &CommandQueue,
        kernel: &Kernel,
        global: NDRange,
        local: NDRange,
        deps: &[Event],
    ) -> Event;
}

#[derive(Debug, Clone)]
enum QueueSelect {
    Id(usize),
    Explicit(CommandQueue),
}

/// Where and with which dependencies a generated kernel runs. Completion
/// events of every launch made through these options are collected in
/// `events`.
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    select: QueueSelect,
    pub events: Vec<Event>,
    pub dependencies: Vec<Event>,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self::with_queue_id(0)
    }
}

impl ExecutionOptions {
    #[must_use]
    pub fn with_queue_id(id: usize) -> Self {
        Self {
            select: QueueSelect::Id(id),
            events: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_queue(queue: CommandQueue) -> Self {
        Self {
            select: QueueSelect::Explicit(queue),
            events: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// The queue launches go to, resolving an id selection through the
    /// backend accessor.
    pub fn queue(&self, backend: &dyn Backend, context: &Context) -> Result<CommandQueue, Error> {
        match &self.select {
            QueueSelect::Explicit(queue) => Ok(*queue),
            QueueSelect::Id(id) => backend.queue(context, *id),
        }
    }

    /// Launch `kernel` on the selected queue and record its event.
    pub fn enqueue(
        &mut self,
        backend: &dyn Backend,
        context: &Context,
        kernel: &Kernel,
        global: NDRange,
        local: NDRange,
    ) -> Result<Event, Error> {
        let queue = self.queue(backend, context)?;
        let event = backend.enqueue(&queue, kernel, global, local, &self.dependencies);
        self.events.push(event);
        Ok(event)
    }
}

/// Scheduler selection knobs.
#[derive(Debug, Clone, Copy)]
pub struct DispatcherOptions {
    pub tune: bool,
    pub label: i32,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            tune: false,
            label: -1,
        }
    }
}

/// Program naming and cache-bypass knobs for the compiler.
#[derive(Debug, Clone, Default)]
pub struct CompilationOptions {
    pub program_name: String,
    pub recompile: bool,
}

/// An expression bundled with everything the dispatcher needs to run it.
#[derive(Debug, Clone)]
pub struct ExecutionHandler {
    expression: Expression,
    execution: ExecutionOptions,
    dispatcher: DispatcherOptions,
    compilation: CompilationOptions,
}

impl ExecutionHandler {
    #[must_use]
    pub fn new(
        expression: Expression,
        execution: ExecutionOptions,
        dispatcher: DispatcherOptions,
        compilation: CompilationOptions,
    ) -> Self {
        Self {
            expression,
            execution,
            dispatcher,
            compilation,
        }
    }

    /// Rebind the same options to another expression.
    #[must_use]
    pub fn rebind(&self, expression: Expression) -> Self {
        Self {
            expression,
            execution: self.execution.clone(),
            dispatcher: self.dispatcher,
            compilation: self.compilation.clone(),
        }
    }

    #[must_use]
    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    #[must_use]
    pub fn execution_options(&self) -> &ExecutionOptions {
        &self.execution
    }

    pub fn execution_options_mut(&mut self) -> &mut ExecutionOptions {
        &mut self.execution
    }

    #[must_use]
    pub fn dispatcher_options(&self) -> &DispatcherOptions {
        &self.dispatcher
    }

    #[must_use]
    pub fn compilation_options(&self) -> &CompilationOptions {
        &self.compilation
    }
}

impl From<Expression> for ExecutionHandler {
    fn from(expression: Expression) -> Self {
        Self::new(
            expression,
            ExecutionOptions::default(),
            DispatcherOptions::default(),
            CompilationOptions::default(),
        )
    }
}
