//! Sandboxed processes.
//!
//! A [`Process`] is one instantiated WebAssembly module. Callers never touch
//! it directly: they take a [`Reservation`], which grants exclusive access
//! for the duration of one call, and invoke a [`Method`] under it.
//!
//! ```ignore
//! let process = Process::new(Pid::new(), bytecode)?;
//! let add = process.method("add").expect("exported");
//!
//! let mut reservation = process.reserve(&ctx, Bytes::new()).await?;
//! let sum = add.call(&mut reservation, &ctx, &[2, 3]).await?;
//! assert_eq!(sum, vec![5]);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use bytes::Bytes;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tracing::{debug, trace};
use wasmtime::{Config, Engine, ExternType, Func, Linker, Module, Store, Val, ValType};
use ww_wire::{Pid, Word};

use crate::context::{Context, ContextError};
use crate::error::{CallError, Result, RuntimeError};
use crate::host::{self, HostState};

type SharedStore = Arc<Mutex<Store<HostState>>>;

fn lock(store: &SharedStore) -> MutexGuard<'_, Store<HostState>> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A live sandboxed-execution instance.
///
/// Every process owns its own engine so that interrupting one guest never
/// disturbs another. The store is guarded twice: the async reservation lock
/// serializes callers, and the inner mutex lets the blocking pool borrow the
/// store while a call runs. Only the reservation holder and the guest it
/// started ever take the inner mutex.
pub struct Process {
    pid: Pid,
    engine: Engine,
    store: SharedStore,
    methods: BTreeMap<String, Method>,
    reservation: AsyncMutex<()>,
}

impl Process {
    /// Compile and instantiate `bytecode` (binary or text format).
    ///
    /// An exported `_initialize` function is run once. Every other exported
    /// function whose parameters and results are all `i64` becomes a method.
    pub fn new(pid: Pid, bytecode: impl AsRef<[u8]>) -> Result<Self> {
        let mut config = Config::new();
        config.epoch_interruption(true);
        let engine = Engine::new(&config).map_err(|e| RuntimeError::sandbox("engine", e))?;

        let module =
            Module::new(&engine, bytecode).map_err(|e| RuntimeError::sandbox("module", e))?;

        let mut linker = Linker::new(&engine);
        host::add_to_linker(&mut linker).map_err(|e| RuntimeError::sandbox("linker", e))?;

        let mut store = Store::new(&engine, HostState::default());
        store.set_epoch_deadline(1);

        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(|e| RuntimeError::sandbox("instantiate", e))?;

        if let Ok(init) = instance.get_typed_func::<(), ()>(&mut store, "_initialize") {
            init.call(&mut store, ())
                .map_err(|e| RuntimeError::sandbox("initialize", e))?;
        }

        let store = Arc::new(Mutex::new(store));
        let mut methods = BTreeMap::new();
        {
            let mut guard = lock(&store);
            for export in module.exports() {
                let ExternType::Func(ty) = export.ty() else {
                    continue;
                };
                let name = export.name();
                if name.starts_with('_') {
                    continue;
                }
                if !ty.params().chain(ty.results()).all(|t| matches!(t, ValType::I64)) {
                    debug!(%pid, method = name, "skipping export with non-word signature");
                    continue;
                }
                let Some(func) = instance.get_func(&mut *guard, name) else {
                    continue;
                };

                methods.insert(
                    name.to_string(),
                    Method {
                        name: name.to_string(),
                        func,
                        params: ty.params().len(),
                        results: ty.results().len(),
                        store: Arc::clone(&store),
                    },
                );
            }
        }

        debug!(%pid, methods = methods.len(), "process instantiated");
        Ok(Self {
            pid,
            engine,
            store,
            methods,
            reservation: AsyncMutex::new(()),
        })
    }

    /// Load a process from a module file.
    pub fn from_file(pid: Pid, path: impl AsRef<std::path::Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::new(pid, bytes)
    }

    /// The process identifier.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Look up an exported method.
    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }

    /// Names of all exported methods, sorted.
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// Wait for exclusive access to the process.
    ///
    /// Returns when the reservation is free or `ctx` is done, whichever
    /// happens first. On success `body` becomes the input the guest reads
    /// through `ww.read`. Waiters are queued in the order they reach the
    /// lock; nothing orders callers that have not yet reached it.
    pub async fn reserve(
        &self,
        ctx: &Context,
        body: impl Into<Bytes>,
    ) -> std::result::Result<Reservation<'_>, ContextError> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }

        let guard = tokio::select! {
            biased;
            err = ctx.done() => return Err(err),
            guard = self.reservation.lock() => guard,
        };

        lock(&self.store).data_mut().body = Some(body.into());
        trace!(pid = %self.pid, "reserved");

        Ok(Reservation {
            process: self,
            _guard: guard,
        })
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Exclusive access to a [`Process`].
///
/// Dropping the reservation releases it and clears the transient input,
/// on every exit path including unwinding.
pub struct Reservation<'a> {
    process: &'a Process,
    _guard: AsyncMutexGuard<'a, ()>,
}

impl Reservation<'_> {
    /// The reserved process.
    pub fn process(&self) -> &Process {
        self.process
    }

    /// Output written by the most recent call.
    pub fn output(&self) -> Bytes {
        Bytes::copy_from_slice(&lock(&self.process.store).data().output)
    }

    /// Take the output written by the most recent call, leaving it empty.
    pub fn take_output(&mut self) -> Bytes {
        lock(&self.process.store).data_mut().output.split().freeze()
    }

    /// Release the reservation.
    pub fn release(self) {
        drop(self)
    }
}

impl fmt::Debug for Reservation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reservation")
            .field("pid", &self.process.pid)
            .finish()
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        // An abandoned guest may still hold the store until its interrupt
        // lands. The next reservation overwrites the body anyway.
        match self.process.store.try_lock() {
            Ok(mut store) => store.data_mut().body = None,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().data_mut().body = None,
            Err(TryLockError::WouldBlock) => {}
        }
        trace!(pid = %self.process.pid, "released");
    }
}

/// A callable export of a [`Process`].
#[derive(Clone)]
pub struct Method {
    name: String,
    func: Func,
    params: usize,
    results: usize,
    store: SharedStore,
}

impl Method {
    /// The export name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of argument words.
    pub fn params(&self) -> usize {
        self.params
    }

    /// Number of result words.
    pub fn results(&self) -> usize {
        self.results
    }

    /// Run the method with `args` and return its result words.
    ///
    /// The guest runs on the blocking pool. If `ctx` finishes first the
    /// process's epoch is bumped, the guest traps at its next epoch check,
    /// and the failure is reported as the context's error. Any other trap
    /// is a [`CallError::Guest`] carrying the trap text.
    pub async fn call(
        &self,
        reservation: &mut Reservation<'_>,
        ctx: &Context,
        args: &[Word],
    ) -> std::result::Result<Vec<Word>, CallError> {
        if !Arc::ptr_eq(&self.store, &reservation.process.store) {
            return Err(CallError::ForeignMethod(self.name.clone()));
        }
        if args.len() != self.params {
            return Err(CallError::Arity {
                method: self.name.clone(),
                expected: self.params,
                got: args.len(),
            });
        }
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }

        let func = self.func;
        let guest_ctx = ctx.child();
        let params: Vec<Val> = args.iter().map(|&w| Val::I64(w as i64)).collect();
        let mut results = vec![Val::I64(0); self.results];

        // The deadline is armed before the task is queued, so an interrupt
        // that lands while it waits for a blocking thread still counts.
        {
            let mut store = lock(&self.store);
            let state = store.data_mut();
            state.output.clear();
            state.ctx = Some(guest_ctx.clone());
            store.set_epoch_deadline(1);
        }

        let store = Arc::clone(&self.store);
        let task_ctx = guest_ctx.clone();
        let mut task = tokio::task::spawn_blocking(move || {
            let mut store = lock(&store);
            let outcome = match task_ctx.err() {
                Some(_) => None,
                None => Some(func.call(&mut *store, &params, &mut results)),
            };
            store.data_mut().ctx = None;
            outcome.map(|called| called.map(|()| results))
        });

        // If this future is dropped mid-call the guest must still stop, and
        // a task still queued must not run at all.
        let mut interrupt = InterruptOnDrop {
            engine: &reservation.process.engine,
            ctx: guest_ctx,
            armed: true,
        };

        let finished = tokio::select! {
            joined = &mut task => Some(joined),
            err = ctx.done() => {
                debug!(method = %self.name, %err, "interrupting guest");
                interrupt.fire();
                None
            }
        };
        let joined = match finished {
            Some(joined) => joined,
            None => task.await,
        };
        interrupt.armed = false;

        match joined {
            Ok(Some(Ok(values))) => values
                .iter()
                .map(|v| v.i64().map(|w| w as Word))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| CallError::Guest(format!("{} returned a non-word value", self.name))),
            Ok(None) => Err(ctx.err().unwrap_or(ContextError::Cancelled).into()),
            Ok(Some(Err(err))) => match ctx.err() {
                Some(ctx_err) => Err(ctx_err.into()),
                None => Err(CallError::Guest(format!("{err:#}"))),
            },
            Err(join) if join.is_panic() => std::panic::resume_unwind(join.into_panic()),
            Err(_) => Err(ContextError::Cancelled.into()),
        }
    }
}

struct InterruptOnDrop<'a> {
    engine: &'a Engine,
    ctx: Context,
    armed: bool,
}

impl InterruptOnDrop<'_> {
    fn fire(&mut self) {
        self.engine.increment_epoch();
        self.armed = false;
    }
}

impl Drop for InterruptOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.ctx.cancel();
            self.engine.increment_epoch();
        }
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("results", &self.results)
            .finish()
    }
}
