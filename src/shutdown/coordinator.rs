use super::hook::{ShutdownHook, Signal};
use crate::Result;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Delivers termination signals to registered shutdown hooks
///
/// Hooks are kept in registration order behind a reader/writer lock:
/// registering takes the write lock, dispatching takes the read lock.
/// Dispatch is sequential, so a slow or blocking hook delays every hook
/// registered after it and the shutdown sequence as a whole. A hook must not
/// register or clear hooks itself, and a panicking hook is not contained.
///
/// The listener started by [`listen`](Self::listen) is one-shot: it handles
/// the first signal and exits. Call `listen` again to handle another one.
///
/// # Examples
///
/// ```no_run
/// use hako::shutdown::{ShutdownCoordinator, Signal, SignalHook};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let coordinator = Arc::new(ShutdownCoordinator::new());
///     coordinator.register_hook(SignalHook::new(Signal::Terminate, || {
///         println!("terminating");
///     }));
///
///     let listener = coordinator.listen()?;
///     let signal = listener.await?;
///     println!("handled {signal}");
///     Ok(())
/// }
/// ```
pub struct ShutdownCoordinator {
    hooks: RwLock<Vec<Arc<dyn ShutdownHook>>>,
    injector: mpsc::Sender<Signal>,
    injected: Mutex<mpsc::Receiver<Signal>>,
    os_signals: bool,
}

impl ShutdownCoordinator {
    /// Creates a coordinator whose listener subscribes to SIGTERM and SIGINT
    pub fn new() -> Self {
        Self::build(true)
    }

    /// Creates a coordinator that only reacts to [`notify`](Self::notify)
    pub fn without_os_signals() -> Self {
        Self::build(false)
    }

    fn build(os_signals: bool) -> Self {
        let (injector, injected) = mpsc::channel(1);
        Self {
            hooks: RwLock::new(Vec::new()),
            injector,
            injected: Mutex::new(injected),
            os_signals,
        }
    }

    /// Appends a hook; it runs once per registration
    pub fn register_hook<H>(&self, hook: H)
    where
        H: ShutdownHook + 'static,
    {
        self.register_shared(Arc::new(hook));
    }

    /// Appends an already shared hook, so one hook value can be registered repeatedly
    pub fn register_shared(&self, hook: Arc<dyn ShutdownHook>) {
        let mut hooks = self.hooks.write().unwrap_or_else(PoisonError::into_inner);
        hooks.push(hook);
    }

    /// Removes every registered hook
    pub fn clear_hooks(&self) {
        self.hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Runs every hook with `signal`, in registration order, on the calling task
    pub fn dispatch(&self, signal: Signal) {
        let hooks = self.hooks.read().unwrap_or_else(PoisonError::into_inner);
        for hook in hooks.iter() {
            hook.invoke(signal);
        }
    }

    /// Feeds `signal` to the listener as if the OS had delivered it
    ///
    /// The subscription channel holds a single pending signal; further
    /// signals sent before the listener consumes it are dropped.
    pub fn notify(&self, signal: Signal) {
        if self.injector.try_send(signal).is_err() {
            debug!(%signal, "Signal already pending, dropping");
        }
    }

    /// Arms the one-shot listener
    ///
    /// OS subscriptions are installed before this returns. The returned task
    /// waits for a single signal, dispatches it to the hooks and exits with
    /// the signal it handled. Must be called from within a Tokio runtime.
    pub fn listen(self: &Arc<Self>) -> Result<JoinHandle<Signal>> {
        let mut os = OsSignals::subscribe(self.os_signals)?;
        let this = Arc::clone(self);

        Ok(tokio::spawn(async move {
            let mut injected = this.injected.lock().await;
            let signal = tokio::select! {
                signal = os.recv() => signal,
                Some(signal) = injected.recv() => signal,
            };
            drop(injected);

            info!(%signal, hooks = this.hook_count(), "Received signal, running shutdown hooks");
            this.dispatch(signal);
            signal
        }))
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("hooks", &self.hook_count())
            .field("os_signals", &self.os_signals)
            .finish()
    }
}

/// OS signal subscriptions held by one listener incarnation
struct OsSignals {
    #[cfg(unix)]
    streams: Option<(
        tokio::signal::unix::Signal,
        tokio::signal::unix::Signal,
    )>,
    #[cfg(not(unix))]
    enabled: bool,
}

impl OsSignals {
    #[cfg(unix)]
    fn subscribe(enabled: bool) -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        let streams = if enabled {
            Some((
                signal(SignalKind::terminate())?,
                signal(SignalKind::interrupt())?,
            ))
        } else {
            None
        };
        Ok(Self { streams })
    }

    #[cfg(not(unix))]
    fn subscribe(enabled: bool) -> std::io::Result<Self> {
        Ok(Self { enabled })
    }

    #[cfg(unix)]
    async fn recv(&mut self) -> Signal {
        match &mut self.streams {
            Some((terminate, interrupt)) => tokio::select! {
                Some(()) = terminate.recv() => Signal::Terminate,
                Some(()) = interrupt.recv() => Signal::Interrupt,
                else => std::future::pending().await,
            },
            None => std::future::pending().await,
        }
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) -> Signal {
        if self.enabled && tokio::signal::ctrl_c().await.is_ok() {
            return Signal::Interrupt;
        }
        std::future::pending().await
    }
}
