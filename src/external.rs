use crate::command::{CommandFactory, ExecutableCommand, ExitCode};
use crate::env::Environment;
use crate::interpreter::Factory;
use crate::redirect::{Redirections, Stream, flush_std_streams};
use anyhow::{Context, Result};
use log::debug;
use nix::errno::Errno;
use nix::sys::wait::{WaitStatus, waitpid};
use nix::libc::_exit;
use nix::unistd::{AccessFlags, ForkResult, Pid, access, dup2, execv, fork, write};
use std::borrow::Cow;
use std::ffi::{CStr, CString};
use std::fs::File;
use std::os::fd::AsRawFd;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// Command that is not a builtin.
pub struct ExternalCommand {
    /// Resolved location of the executable.
    path: PathBuf,
    /// Arguments as typed, `argv[0]` included.
    argv: Vec<String>,
}

impl ExternalCommand {
    pub fn new(path: PathBuf, argv: Vec<String>) -> Self {
        Self { path, argv }
    }
}

impl CommandFactory for Factory<ExternalCommand> {
    fn try_create(
        &self,
        env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        let executable = find_command_path(&env.path_table(), Path::new(name))?;
        debug!("resolved {} to {}", name, executable.display());
        let argv = std::iter::once(name)
            .chain(args.iter().copied())
            .map(String::from)
            .collect();
        Some(Box::new(ExternalCommand::new(
            executable.into_owned(),
            argv,
        )))
    }
}

impl ExecutableCommand for ExternalCommand {
    fn execute(
        self: Box<Self>,
        redirections: &Redirections,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        spawn_and_wait(&self.path, &self.argv, redirections)
    }
}

/// Run `program` as a child process and block until that child terminates.
///
/// Redirection targets are opened up front, so a bad target is reported here and no
/// child is created. In the child the targets are installed on descriptors 1 and 2
/// before the program image is replaced; the parent's descriptors are never touched.
/// If the image cannot be replaced, the child prints the reason on its standard error
/// and exits with status 1.
pub fn spawn_and_wait(
    program: &Path,
    argv: &[String],
    redirections: &Redirections,
) -> Result<ExitCode> {
    let c_program = CString::new(program.as_os_str().as_bytes())
        .with_context(|| format!("{}: path contains a NUL byte", program.display()))?;
    let c_argv = argv
        .iter()
        .map(|arg| CString::new(arg.as_bytes()))
        .collect::<Result<Vec<_>, _>>()
        .context("argument contains a NUL byte")?;
    let failure_prefix = format!("{}: ", argv.first().map_or("exec", String::as_str));
    let targets = redirections.open_all()?;

    flush_std_streams();
    // SAFETY: the child only calls dup2, execv and _exit, and everything it needs has
    // been allocated above.
    match unsafe { fork() }.context("fork failed")? {
        ForkResult::Child => exec_child(&c_program, &c_argv, &targets, &failure_prefix),
        ForkResult::Parent { child } => {
            drop(targets);
            debug!("spawned {} as pid {}", program.display(), child);
            wait_for(child)
        }
    }
}

fn exec_child(
    program: &CStr,
    argv: &[CString],
    targets: &[(Stream, File)],
    failure_prefix: &str,
) -> ! {
    for (stream, file) in targets {
        if let Err(errno) = dup2(file.as_raw_fd(), stream.fd()) {
            child_exit(failure_prefix, errno);
        }
    }
    let Err(errno) = execv(program, argv);
    child_exit(failure_prefix, errno)
}

/// Report `errno` on the child's standard error and terminate it with status 1.
fn child_exit(prefix: &str, errno: Errno) -> ! {
    // Write to descriptor 2 directly; the std handle's lock may be held by a thread
    // that does not exist in the child.
    for part in [prefix.as_bytes(), errno.desc().as_bytes(), &b"\n"[..]] {
        let _ = write(std::io::stderr(), part);
    }
    // SAFETY: terminating the forked child without running atexit handlers.
    unsafe { _exit(1) }
}

fn wait_for(child: Pid) -> Result<ExitCode> {
    loop {
        match waitpid(child, None) {
            Ok(WaitStatus::Exited(_, code)) => {
                debug!("pid {} exited with {}", child, code);
                return Ok(code);
            }
            Ok(WaitStatus::Signaled(_, signal, core_dumped)) => {
                debug!("pid {} killed by {} (core dumped: {})", child, signal, core_dumped);
                return Ok(128 + signal as i32);
            }
            Ok(status) => debug!("pid {} reported {:?}", child, status),
            Err(Errno::EINTR) => {}
            Err(errno) => return Err(errno).with_context(|| format!("waitpid {child} failed")),
        }
    }
}

/// Resolve a command name to an executable.
///
/// Behavior:
/// - Empty name: returns `None`.
/// - Name containing a `/` (absolute or relative): the path table is bypassed and the
///   name itself is returned if it is executable.
/// - Bare name: each directory of `path_table` is tried in order and the first
///   `dir/name` that is executable wins.
///
/// "Executable" means a regular file the process may execute (`access(X_OK)`).
pub fn find_command_path<'a>(path_table: &[PathBuf], name: &'a Path) -> Option<Cow<'a, Path>> {
    let raw = name.as_os_str().as_bytes();
    if raw.is_empty() {
        return None;
    }
    if raw.contains(&b'/') {
        return is_executable(name).then_some(Cow::Borrowed(name));
    }
    find_in_path(path_table, name).map(Cow::Owned)
}

fn find_in_path(path_table: &[PathBuf], cmd: &Path) -> Option<PathBuf> {
    path_table
        .iter()
        .map(|dir| dir.join(cmd))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    path.metadata().is_ok_and(|meta| meta.is_file()) && access(path, AccessFlags::X_OK).is_ok()
}
