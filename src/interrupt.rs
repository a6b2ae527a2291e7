// Interrupt handling.
// - On unix, SIGINT/SIGTERM are blocked on the main thread and received by
//   a watcher thread instead, so a signal never kills the process while an
//   API client is open.
// - With no client open the watcher restores the terminal (a masked prompt
//   may have turned echo off) and exits. Otherwise it raises a flag that the
//   main thread turns into `FxfError::Interrupted` at its next checkpoint,
//   unwinding (and closing) every open session.
// - A second signal always exits.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::FxfError;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

pub fn is_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Raises the interrupt flag. Returns whether it was already raised.
pub fn request() -> bool {
    INTERRUPTED.swap(true, Ordering::SeqCst)
}

/// Checkpoint: fails with [`FxfError::Interrupted`] once a signal arrived.
pub fn check() -> Result<(), FxfError> {
    if is_interrupted() {
        return Err(FxfError::Interrupted);
    }
    Ok(())
}

/// Installs the signal watcher. Must run before any other thread is
/// spawned so every thread inherits the blocked signal mask.
#[cfg(unix)]
pub fn install() -> std::io::Result<()> {
    use nix::sys::signal::{SigSet, Signal};
    use nix::sys::termios;

    let mut signals = SigSet::empty();
    signals.add(Signal::SIGINT);
    signals.add(Signal::SIGTERM);
    signals.thread_block().map_err(std::io::Error::from)?;

    // None when stdin is not a terminal.
    let terminal = termios::tcgetattr(std::io::stdin()).ok();

    std::thread::Builder::new()
        .name("fxf-signals".into())
        .spawn(move || watch(signals, terminal))?;
    Ok(())
}

#[cfg(not(unix))]
pub fn install() -> std::io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn watch(signals: nix::sys::signal::SigSet, terminal: Option<nix::sys::termios::Termios>) {
    loop {
        let signal = match signals.wait() {
            Ok(signal) => signal,
            Err(e) => {
                tracing::warn!(error = %e, "Stopped waiting for signals");
                return;
            }
        };

        let repeated = request();
        if repeated || crate::api::live_clients() == 0 {
            if let Some(saved) = &terminal {
                restore_terminal(std::io::stdin(), saved);
            }
            eprintln!("\nok, bye");
            std::process::exit(1);
        }
        tracing::debug!(?signal, "Interrupted, waiting for open sessions to close");
    }
}

#[cfg(unix)]
fn restore_terminal<Fd: std::os::fd::AsFd>(fd: Fd, saved: &nix::sys::termios::Termios) {
    use nix::sys::termios::{tcsetattr, SetArg};

    if let Err(e) = tcsetattr(fd, SetArg::TCSANOW, saved) {
        tracing::warn!(error = %e, "Could not restore terminal settings");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use nix::pty::openpty;
    use nix::sys::termios::{tcgetattr, tcsetattr, LocalFlags, SetArg};

    #[test]
    fn saved_terminal_settings_bring_echo_back() {
        let pty = openpty(None, None).unwrap();
        let mut echoing = tcgetattr(&pty.slave).unwrap();
        echoing.local_flags.insert(LocalFlags::ECHO);
        tcsetattr(&pty.slave, SetArg::TCSANOW, &echoing).unwrap();
        let saved = tcgetattr(&pty.slave).unwrap();

        // what a masked password read leaves behind
        let mut silent = saved.clone();
        silent.local_flags.remove(LocalFlags::ECHO);
        tcsetattr(&pty.slave, SetArg::TCSANOW, &silent).unwrap();
        assert!(!tcgetattr(&pty.slave).unwrap().local_flags.contains(LocalFlags::ECHO));

        restore_terminal(&pty.slave, &saved);

        assert!(tcgetattr(&pty.slave).unwrap().local_flags.contains(LocalFlags::ECHO));
    }
}
