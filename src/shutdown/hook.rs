use std::fmt;

/// Process signals a shutdown hook can react to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// SIGINT (Ctrl+C)
    Interrupt,
    /// SIGTERM
    Terminate,
    /// SIGKILL
    ///
    /// The OS never delivers this one to the process, so it only reaches
    /// hooks through [`ShutdownCoordinator::notify`] or
    /// [`ShutdownCoordinator::dispatch`].
    ///
    /// [`ShutdownCoordinator::notify`]: super::ShutdownCoordinator::notify
    /// [`ShutdownCoordinator::dispatch`]: super::ShutdownCoordinator::dispatch
    Kill,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Signal::Interrupt => "SIGINT",
            Signal::Terminate => "SIGTERM",
            Signal::Kill => "SIGKILL",
        };
        f.write_str(name)
    }
}

/// A callback run when the coordinator receives a signal
pub trait ShutdownHook: Send + Sync {
    fn invoke(&self, signal: Signal);
}

impl<F> ShutdownHook for F
where
    F: Fn(Signal) + Send + Sync,
{
    fn invoke(&self, signal: Signal) {
        self(signal)
    }
}

/// Hook that runs its action only for one kind of signal
///
/// Several `SignalHook`s can share one dispatch path while each reacts only
/// to its own signal.
///
/// # Examples
///
/// ```
/// use hako::shutdown::{ShutdownHook, Signal, SignalHook};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let calls = Arc::new(AtomicUsize::new(0));
/// let counter = calls.clone();
/// let hook = SignalHook::new(Signal::Terminate, move || {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
///
/// hook.invoke(Signal::Kill);
/// hook.invoke(Signal::Terminate);
/// assert_eq!(calls.load(Ordering::SeqCst), 1);
/// ```
pub struct SignalHook {
    target: Signal,
    action: Box<dyn Fn() + Send + Sync>,
}

impl SignalHook {
    pub fn new<F>(target: Signal, action: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            target,
            action: Box::new(action),
        }
    }

    /// The signal this hook reacts to
    pub fn target(&self) -> Signal {
        self.target
    }
}

impl ShutdownHook for SignalHook {
    fn invoke(&self, signal: Signal) {
        if signal == self.target {
            (self.action)()
        }
    }
}

impl fmt::Debug for SignalHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalHook")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// Shorthand for [`SignalHook::new`]
pub fn signal_hook<F>(target: Signal, action: F) -> SignalHook
where
    F: Fn() + Send + Sync + 'static,
{
    SignalHook::new(target, action)
}
