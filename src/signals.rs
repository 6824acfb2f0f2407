/// Signal handling for graceful shutdown.
///
/// SIGINT (Ctrl-C) and SIGTERM both raise the shared shutdown flag. The
/// session poll loop checks the flag on every tick, kills the agent, and the
/// runner stops before starting another iteration.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};

/// Cancellation flag shared between the signal listener and the run loop.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct SignalHandler {
    flag: ShutdownFlag,
}

impl SignalHandler {
    /// Register SIGINT/SIGTERM listeners on the current tokio runtime.
    pub fn install() -> std::io::Result<SignalHandler> {
        let flag = ShutdownFlag::new();
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        let listener = flag.clone();
        tokio::spawn(async move {
            loop {
                let name = tokio::select! {
                    _ = sigint.recv() => "SIGINT",
                    _ = sigterm.recv() => "SIGTERM",
                };
                if !listener.is_triggered() {
                    println!("\n\n⚠️  Interrupted! Cleaning up...");
                }
                tracing::warn!(signal = name, "shutdown requested");
                listener.trigger();
            }
        });

        Ok(SignalHandler { flag })
    }

    pub fn flag(&self) -> ShutdownFlag {
        self.flag.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_is_shared_between_clones() {
        let flag = ShutdownFlag::new();
        let other = flag.clone();
        assert!(!other.is_triggered());
        flag.trigger();
        assert!(other.is_triggered());
    }

    #[tokio::test]
    async fn test_sigterm_triggers_flag() {
        let handler = SignalHandler::install().unwrap();
        let flag = handler.flag();
        nix::sys::signal::raise(nix::sys::signal::Signal::SIGTERM).unwrap();

        for _ in 0..50 {
            if flag.is_triggered() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("SIGTERM did not raise the shutdown flag");
    }
}
