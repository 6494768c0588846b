//! fault.rs
//! Process-wide fault handling: fatal signals and uncaught panics.
//!
//! A signal handler may only touch async-signal-safe state, so it records the
//! signal, writes one byte to a self-pipe and waits (bounded) for a responder
//! thread to run the emergency path. It then restores the default disposition
//! and re-raises, so the process still dies with the original signal.
//!
//! Panics are logged with a backtrace and announced on the speaker. Only one
//! `FaultGuard` may be installed at a time.

use std::{
    backtrace::Backtrace,
    io,
    panic::{self, PanicHookInfo},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{error, info, warn};

use crate::error::RuntimeError;
use crate::runtime::emergency::{Emergency, FaultCause};

pub const FATAL_SIGNALS: [libc::c_int; 4] = [libc::SIGILL, libc::SIGSEGV, libc::SIGBUS, libc::SIGABRT];

/// Extra time the handler waits beyond the grace period.
const SAFING_MARGIN: Duration = Duration::from_millis(1000);
const HANDLER_POLL_NS: libc::c_long = 10_000_000;
/// Written to the pipe to stop the responder.
const STOP_BYTE: u8 = 0;

static WAKE_FD: AtomicI32 = AtomicI32::new(-1);
static PENDING_SIGNAL: AtomicI32 = AtomicI32::new(0);
static SAFED: AtomicBool = AtomicBool::new(false);
static SAFING_WAIT_MS: AtomicU64 = AtomicU64::new(0);
static INSTALLED: AtomicBool = AtomicBool::new(false);

type PanicHook = Box<dyn Fn(&PanicHookInfo<'_>) + Sync + Send + 'static>;

pub struct FaultGuard {
    read_fd: libc::c_int,
    write_fd: libc::c_int,
    previous: Vec<(libc::c_int, libc::sighandler_t)>,
    previous_hook: Option<Arc<PanicHook>>,
    responder: Option<JoinHandle<()>>,
}

impl FaultGuard {
    /// Install signal handlers, the panic hook and the responder thread.
    pub fn install(emergency: Arc<Emergency>, grace: Duration) -> Result<Self, RuntimeError> {
        if INSTALLED.swap(true, Ordering::AcqRel) {
            return Err(RuntimeError::FaultHandling(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "fault handling already installed",
            )));
        }

        let (read_fd, write_fd) = match open_pipe() {
            Ok(fds) => fds,
            Err(e) => {
                INSTALLED.store(false, Ordering::Release);
                return Err(RuntimeError::FaultHandling(e));
            }
        };

        PENDING_SIGNAL.store(0, Ordering::Release);
        SAFED.store(false, Ordering::Release);
        SAFING_WAIT_MS.store((grace + SAFING_MARGIN).as_millis() as u64, Ordering::Release);
        WAKE_FD.store(write_fd, Ordering::Release);

        let mut guard = Self {
            read_fd,
            write_fd,
            previous: Vec::with_capacity(FATAL_SIGNALS.len()),
            previous_hook: None,
            responder: None,
        };

        let responder_emergency = Arc::clone(&emergency);
        let responder = thread::Builder::new()
            .name("fault-responder".to_string())
            .spawn(move || respond(read_fd, responder_emergency))
            .map_err(RuntimeError::FaultHandling)?;
        guard.responder = Some(responder);

        for signum in FATAL_SIGNALS {
            // SAFETY: the handler only uses atomics, write(2), nanosleep(2), signal(2) and raise(3).
            let handler = termination_handler as extern "C" fn(libc::c_int) as libc::sighandler_t;
            let previous = unsafe { libc::signal(signum, handler) };
            if previous == libc::SIG_ERR {
                return Err(RuntimeError::FaultHandling(io::Error::last_os_error()));
            }
            guard.previous.push((signum, previous));
        }

        guard.previous_hook = Some(install_panic_hook(emergency));
        info!("fault handling installed for signals {FATAL_SIGNALS:?}");
        Ok(guard)
    }
}

impl Drop for FaultGuard {
    fn drop(&mut self) {
        for (signum, previous) in self.previous.drain(..) {
            // SAFETY: restoring the disposition that was in place before install.
            unsafe {
                libc::signal(signum, previous);
            }
        }

        if let Some(previous) = self.previous_hook.take() {
            panic::set_hook(Box::new(move |info| (**previous)(info)));
        }

        WAKE_FD.store(-1, Ordering::Release);
        write_byte(self.write_fd, STOP_BYTE);
        if let Some(responder) = self.responder.take() {
            if responder.join().is_err() {
                error!("fault responder panicked");
            }
        }

        // SAFETY: both ends are owned by this guard and no longer used.
        unsafe {
            libc::close(self.write_fd);
            libc::close(self.read_fd);
        }
        INSTALLED.store(false, Ordering::Release);
    }
}

/// Wake the responder as a fatal signal would, without re-raising.
/// Returns whether safing finished within the wait.
pub fn request_safing(signum: libc::c_int) -> bool {
    notify_and_wait(signum)
}

fn notify_and_wait(signum: libc::c_int) -> bool {
    if PENDING_SIGNAL
        .compare_exchange(0, signum, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        // A fault is already being handled.
        return SAFED.load(Ordering::Acquire);
    }

    let fd = WAKE_FD.load(Ordering::Acquire);
    if fd < 0 {
        return false;
    }
    write_byte(fd, signum as u8);

    let limit_ms = SAFING_WAIT_MS.load(Ordering::Acquire);
    let pause = libc::timespec {
        tv_sec: 0,
        tv_nsec: HANDLER_POLL_NS,
    };
    let mut waited_ms = 0;
    while !SAFED.load(Ordering::Acquire) && waited_ms < limit_ms {
        // SAFETY: nanosleep is async-signal-safe; a null remainder is allowed.
        unsafe {
            libc::nanosleep(&pause, std::ptr::null_mut());
        }
        waited_ms += (HANDLER_POLL_NS / 1_000_000) as u64;
    }
    SAFED.load(Ordering::Acquire)
}

extern "C" fn termination_handler(signum: libc::c_int) {
    notify_and_wait(signum);
    // SAFETY: signal and raise are async-signal-safe.
    unsafe {
        libc::signal(signum, libc::SIG_DFL);
        libc::raise(signum);
    }
}

fn respond(read_fd: libc::c_int, emergency: Arc<Emergency>) {
    loop {
        let mut byte = 0u8;
        // SAFETY: reading one byte into a valid local buffer.
        let n = unsafe { libc::read(read_fd, (&mut byte as *mut u8).cast(), 1) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            error!("fault responder: pipe read failed: {err}");
            return;
        }
        if n == 0 || byte == STOP_BYTE {
            return;
        }

        let signum = PENDING_SIGNAL.load(Ordering::Acquire);
        emergency.engage(&FaultCause::Signal(signum));
        SAFED.store(true, Ordering::Release);
    }
}

fn install_panic_hook(emergency: Arc<Emergency>) -> Arc<PanicHook> {
    let previous: Arc<PanicHook> = Arc::new(panic::take_hook());
    let chained = Arc::clone(&previous);
    panic::set_hook(Box::new(move |info| {
        let message = panic_message(info);
        let backtrace = Backtrace::force_capture();
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".to_string());
        let thread_name = thread::current().name().unwrap_or("unnamed").to_string();
        error!("unhandled panic in thread {thread_name} at {location}: {message}\n{backtrace}");
        emergency.announce(&FaultCause::Panic(message));
        (**chained)(info);
    }));
    previous
}

fn panic_message(info: &PanicHookInfo<'_>) -> String {
    if let Some(s) = info.payload().downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = info.payload().downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn open_pipe() -> io::Result<(libc::c_int, libc::c_int)> {
    let mut fds = [0 as libc::c_int; 2];
    // SAFETY: `fds` has room for the two descriptors pipe(2) writes.
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok((fds[0], fds[1]))
}

fn write_byte(fd: libc::c_int, byte: u8) {
    // SAFETY: writing one byte from a valid local; write(2) is async-signal-safe.
    let n = unsafe { libc::write(fd, (&byte as *const u8).cast(), 1) };
    if n != 1 && byte == STOP_BYTE {
        warn!("fault handling: failed to wake responder");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blackboard::Sound;
    use crate::platform::{Platform, SimulatedPlatform};
    use serial_test::serial;

    fn emergency() -> (Arc<SimulatedPlatform>, Arc<Emergency>) {
        let platform = Arc::new(SimulatedPlatform::new(1, 1));
        let emergency = Arc::new(Emergency::new(
            Arc::clone(&platform) as Arc<dyn Platform>,
            None,
            Duration::ZERO,
        ));
        (platform, emergency)
    }

    #[test]
    #[serial]
    fn test_second_install_is_rejected() {
        let (_platform, emergency) = emergency();
        let guard = FaultGuard::install(Arc::clone(&emergency), Duration::ZERO).unwrap();
        assert!(matches!(
            FaultGuard::install(emergency, Duration::ZERO),
            Err(RuntimeError::FaultHandling(_))
        ));
        drop(guard);
    }

    #[test]
    #[serial]
    fn test_signal_path_safes_once() {
        let (platform, emergency) = emergency();
        let guard = FaultGuard::install(Arc::clone(&emergency), Duration::ZERO).unwrap();

        assert!(request_safing(libc::SIGSEGV));
        assert!(request_safing(libc::SIGSEGV));
        assert_eq!(emergency.engagements(), 1);
        assert_eq!(platform.kill_count(), 1);
        assert_eq!(platform.played_sounds(), vec![Sound::SegFault]);
        drop(guard);
    }

    #[test]
    #[serial]
    fn test_panic_is_announced() {
        let (platform, emergency) = emergency();
        let guard = FaultGuard::install(emergency, Duration::ZERO).unwrap();

        let result = thread::spawn(|| panic!("boom")).join();
        assert!(result.is_err());
        assert_eq!(platform.actuators().take_sounds(), vec![Sound::UnhandledException]);
        drop(guard);
    }
}
