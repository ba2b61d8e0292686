//! Logging setup.
//!
//! Records go either to stderr or to the system log. The syslog sink hands
//! each formatted event to `syslog(3)` with a priority derived from the
//! event's level.

use crate::config::{Config, LogTarget};
use std::ffi::CString;
use std::io;
use tracing::{Level, Metadata};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Identifier prefixed to every syslog record
const SYSLOG_IDENT: &[u8] = b"aesdsocket\0";

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
pub fn init(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match config.log_target {
        LogTarget::Stderr => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(io::stderr)
                .init();
        }
        LogTarget::Syslog => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .without_time()
                .with_level(false)
                .with_writer(Syslog::open())
                .init();
        }
    }
}

/// `MakeWriter` backed by the process-wide syslog connection.
pub struct Syslog(());

impl Syslog {
    pub fn open() -> Self {
        // SAFETY: the ident is a static NUL-terminated string, as openlog
        // keeps the pointer for the life of the process.
        unsafe {
            libc::openlog(
                SYSLOG_IDENT.as_ptr().cast(),
                libc::LOG_PID | libc::LOG_NDELAY,
                libc::LOG_USER,
            );
        }
        Syslog(())
    }
}

impl<'a> MakeWriter<'a> for Syslog {
    type Writer = SyslogRecord;

    fn make_writer(&'a self) -> Self::Writer {
        SyslogRecord::new(libc::LOG_INFO)
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        SyslogRecord::new(priority(meta.level()))
    }
}

fn priority(level: &Level) -> libc::c_int {
    match *level {
        Level::ERROR => libc::LOG_ERR,
        Level::WARN => libc::LOG_WARNING,
        Level::INFO => libc::LOG_INFO,
        _ => libc::LOG_DEBUG,
    }
}

/// One event's worth of formatted text, sent to syslog on drop.
pub struct SyslogRecord {
    priority: libc::c_int,
    line: Vec<u8>,
}

impl SyslogRecord {
    fn new(priority: libc::c_int) -> Self {
        Self {
            priority,
            line: Vec::with_capacity(128),
        }
    }

    /// Message text with the trailing newline removed and interior NULs dropped.
    fn message(&self) -> CString {
        let mut bytes: Vec<u8> = self.line.iter().copied().filter(|&b| b != 0).collect();
        while bytes.last() == Some(&b'\n') {
            bytes.pop();
        }
        // NULs were filtered out above
        CString::new(bytes).unwrap_or_default()
    }
}

impl io::Write for SyslogRecord {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.line.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for SyslogRecord {
    fn drop(&mut self) {
        if self.line.is_empty() {
            return;
        }
        let message = self.message();
        // SAFETY: format and argument are valid NUL-terminated strings
        unsafe {
            libc::syslog(self.priority, b"%s\0".as_ptr().cast(), message.as_ptr());
        }
    }
}
