//! Output redirection targets and in-process descriptor rewiring.

use anyhow::{Context, Result};
use log::{debug, warn};
use nix::unistd::{close, dup, dup2};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;

/// Permission bits for files created by a redirection (`rw-r--r--`).
const CREATE_MODE: u32 = 0o644;

/// Standard stream a redirection applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    /// Descriptor number of the stream in the process descriptor table.
    pub fn fd(self) -> RawFd {
        match self {
            Stream::Stdout => nix::libc::STDOUT_FILENO,
            Stream::Stderr => nix::libc::STDERR_FILENO,
        }
    }
}

/// Whether opening a target discards or extends its previous content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Truncate,
    Append,
}

/// A single redirection destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub path: PathBuf,
    pub mode: OpenMode,
}

impl Redirect {
    pub fn new(path: impl Into<PathBuf>, mode: OpenMode) -> Self {
        Self {
            path: path.into(),
            mode,
        }
    }

    /// Open the target for writing, creating it if absent.
    ///
    /// The returned file is close-on-exec; installing it on a standard descriptor with
    /// `dup2` yields a descriptor without that flag.
    pub fn open(&self) -> Result<File> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).mode(CREATE_MODE);
        match self.mode {
            OpenMode::Truncate => options.truncate(true),
            OpenMode::Append => options.append(true),
        };
        options
            .open(&self.path)
            .with_context(|| format!("{}", self.path.display()))
    }
}

/// Requested destinations for standard output and standard error.
///
/// `None` means the stream keeps its current destination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Redirections {
    pub stdout: Option<Redirect>,
    pub stderr: Option<Redirect>,
}

impl Redirections {
    pub fn is_empty(&self) -> bool {
        self.stdout.is_none() && self.stderr.is_none()
    }

    pub fn get(&self, stream: Stream) -> Option<&Redirect> {
        match stream {
            Stream::Stdout => self.stdout.as_ref(),
            Stream::Stderr => self.stderr.as_ref(),
        }
    }

    /// Record a redirection, replacing any earlier one for the same stream.
    pub fn set(&mut self, stream: Stream, redirect: Redirect) {
        match stream {
            Stream::Stdout => self.stdout = Some(redirect),
            Stream::Stderr => self.stderr = Some(redirect),
        }
    }

    /// Open every requested target, in stdout-then-stderr order.
    pub fn open_all(&self) -> Result<Vec<(Stream, File)>> {
        let mut files = Vec::new();
        for stream in [Stream::Stdout, Stream::Stderr] {
            if let Some(redirect) = self.get(stream) {
                files.push((stream, redirect.open()?));
            }
        }
        Ok(files)
    }
}

/// A standard descriptor and the duplicate holding its previous destination.
#[derive(Debug)]
struct SavedFd {
    original: RawFd,
    saved: RawFd,
}

/// RAII guard that points this process's standard streams at redirection targets.
///
/// Every descriptor rewired by the guard is restored, and its backing duplicate
/// closed, when the guard is dropped. If installing the second redirection fails, the
/// first one is undone before the error is returned.
#[derive(Debug)]
pub struct StdioGuard {
    saved_fds: Vec<SavedFd>,
}

impl StdioGuard {
    /// Apply `redirections` to the current process.
    pub fn install(redirections: &Redirections) -> Result<Self> {
        let mut guard = StdioGuard {
            saved_fds: Vec::new(),
        };
        if redirections.is_empty() {
            return Ok(guard);
        }

        flush_std_streams();
        for (stream, file) in redirections.open_all()? {
            guard.redirect(stream.fd(), &file)?;
        }
        Ok(guard)
    }

    fn redirect(&mut self, target: RawFd, file: &File) -> Result<()> {
        let saved = dup(target).with_context(|| format!("cannot save descriptor {target}"))?;
        self.saved_fds.push(SavedFd {
            original: target,
            saved,
        });
        dup2(file.as_raw_fd(), target)
            .with_context(|| format!("cannot redirect descriptor {target}"))?;
        debug!("descriptor {} redirected, saved as {}", target, saved);
        Ok(())
    }

    /// Restore the standard streams now instead of at the end of scope.
    pub fn restore(mut self) {
        self.undo_redirs();
    }

    fn undo_redirs(&mut self) {
        if self.saved_fds.is_empty() {
            return;
        }
        flush_std_streams();
        for SavedFd { original, saved } in self.saved_fds.drain(..).rev() {
            if let Err(errno) = dup2(saved, original) {
                warn!("failed to restore descriptor {}: {}", original, errno);
            }
            if let Err(errno) = close(saved) {
                warn!("failed to close saved descriptor {}: {}", saved, errno);
            }
            debug!("descriptor {} restored", original);
        }
    }
}

impl Drop for StdioGuard {
    fn drop(&mut self) {
        self.undo_redirs()
    }
}

/// Push out anything buffered for the standard streams before they are rewired.
pub(crate) fn flush_std_streams() {
    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();
}
