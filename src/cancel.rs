use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared "stop after the current item" request.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What a SIGINT should do given the flag's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigintAction {
    /// First interrupt: finish the current plugin, then stop.
    StopAfterCurrent,
    /// Interrupt while already stopping: leave now.
    Exit,
}

/// Exit status for an interrupted run (128 + SIGINT).
pub const INTERRUPTED_STATUS: i32 = 130;

/// Raises the flag on the first interrupt and asks for an exit on the next.
pub fn on_sigint(flag: &CancelFlag) -> SigintAction {
    if flag.is_cancelled() {
        SigintAction::Exit
    } else {
        flag.cancel();
        SigintAction::StopAfterCurrent
    }
}

/// Routes SIGINT to `flag` instead of killing the process mid-upgrade. A
/// second SIGINT exits immediately.
///
/// Must run before any other thread is spawned so every thread inherits the
/// blocked mask and only the waiter thread ever sees the signal.
#[cfg(unix)]
pub fn install_sigint(flag: CancelFlag) -> anyhow::Result<()> {
    use nix::sys::signal::{SigSet, Signal};

    let mut set = SigSet::empty();
    set.add(Signal::SIGINT);
    set.thread_block()?;

    std::thread::Builder::new()
        .name("sigint".into())
        .spawn(move || {
            loop {
                match set.wait() {
                    Ok(Signal::SIGINT) => match on_sigint(&flag) {
                        SigintAction::StopAfterCurrent => {
                            eprintln!("Stopping after the current plugin. Press Ctrl-C again to quit now.");
                            tracing::warn!("cancel requested via SIGINT");
                        }
                        SigintAction::Exit => {
                            eprintln!("Interrupted.");
                            tracing::warn!("second SIGINT, exiting");
                            std::process::exit(INTERRUPTED_STATUS);
                        }
                    },
                    Ok(_) => {}
                    Err(err) => {
                        tracing::warn!("sigwait failed: {err}");
                        return;
                    }
                }
            }
        })?;

    Ok(())
}

#[cfg(not(unix))]
pub fn install_sigint(_flag: CancelFlag) -> anyhow::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());
        flag.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_second_interrupt_exits() {
        let flag = CancelFlag::new();
        assert_eq!(on_sigint(&flag), SigintAction::StopAfterCurrent);
        assert!(flag.is_cancelled());
        assert_eq!(on_sigint(&flag), SigintAction::Exit);
    }
}
