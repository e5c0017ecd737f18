/// Signal handling for graceful shutdown.
///
/// Handles SIGINT (Ctrl-C) and SIGTERM.
/// First signal: let the in-flight poll finish, then exit.
/// Second signal: kill the in-flight command and exit at once.
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{info, warn};

/// How far shutdown has progressed. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownLevel {
    Running,
    /// Stop at the next safe point.
    Graceful,
    /// Stop now, abandoning any in-flight capture.
    Immediate,
}

/// Cancellation token observed by the poll loop.
#[derive(Clone)]
pub struct Shutdown {
    rx: watch::Receiver<ShutdownLevel>,
}

/// Sending half of [`Shutdown`].
pub struct ShutdownTrigger {
    tx: watch::Sender<ShutdownLevel>,
}

pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(ShutdownLevel::Running);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    /// Move to the next shutdown level and return it.
    pub fn escalate(&self) -> ShutdownLevel {
        self.tx.send_modify(|level| {
            *level = match *level {
                ShutdownLevel::Running => ShutdownLevel::Graceful,
                ShutdownLevel::Graceful | ShutdownLevel::Immediate => ShutdownLevel::Immediate,
            }
        });
        *self.tx.borrow()
    }
}

impl Shutdown {
    pub fn level(&self) -> ShutdownLevel {
        *self.rx.borrow()
    }

    pub fn is_requested(&self) -> bool {
        self.level() >= ShutdownLevel::Graceful
    }

    /// Resolves once any shutdown has been requested.
    pub async fn requested(&self) {
        self.reached(ShutdownLevel::Graceful).await
    }

    /// Resolves once an immediate shutdown has been requested.
    pub async fn immediate(&self) {
        self.reached(ShutdownLevel::Immediate).await
    }

    async fn reached(&self, target: ShutdownLevel) {
        let mut rx = self.rx.clone();
        let closed = rx.wait_for(|level| *level >= target).await.is_err();
        if closed {
            // Trigger is gone: the level can no longer change.
            std::future::pending::<()>().await;
        }
    }
}

/// Errors installing the process signal handlers.
#[derive(Debug)]
pub enum SignalError {
    Install {
        signal: &'static str,
        source: std::io::Error,
    },
}

impl std::fmt::Display for SignalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalError::Install { signal, source } => {
                write!(f, "failed to install {} handler: {}", signal, source)
            }
        }
    }
}

impl std::error::Error for SignalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SignalError::Install { source, .. } => Some(source),
        }
    }
}

pub struct SignalHandler;

impl SignalHandler {
    /// Install SIGINT/SIGTERM handlers and return the token they drive.
    ///
    /// Must be called from within the tokio runtime.
    pub fn install() -> Result<Shutdown, SignalError> {
        let mut interrupt = signal(SignalKind::interrupt()).map_err(|e| SignalError::Install {
            signal: "SIGINT",
            source: e,
        })?;
        let mut terminate = signal(SignalKind::terminate()).map_err(|e| SignalError::Install {
            signal: "SIGTERM",
            source: e,
        })?;

        let (trigger, shutdown) = shutdown_channel();
        tokio::spawn(async move {
            loop {
                let name = tokio::select! {
                    _ = interrupt.recv() => "SIGINT",
                    _ = terminate.recv() => "SIGTERM",
                };
                match trigger.escalate() {
                    ShutdownLevel::Graceful => {
                        info!(signal = name, "shutdown requested, finishing current poll")
                    }
                    ShutdownLevel::Immediate => {
                        warn!(signal = name, "second signal, abandoning in-flight command")
                    }
                    ShutdownLevel::Running => {}
                }
            }
        });
        Ok(shutdown)
    }
}
