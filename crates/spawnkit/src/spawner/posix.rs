//! `fork` + `execve` process creation.
//!
//! Everything the child needs (argument and environment vectors, the
//! canonical executable path, the working directory and the opened redirect
//! file) is prepared in the parent. Between `fork` and `execve` the child
//! only issues raw system calls: it must not allocate, lock or unwind,
//! because it runs on a copy of the parent's memory with a single thread.
//!
//! A setup failure in the child is written to a close-on-exec status pipe as
//! `[stage, errno (4 bytes, big endian)]` before `_exit(127)`. A successful
//! `execve` closes the pipe, so the parent reading EOF knows the new image
//! is running.

#![allow(unsafe_code)]

use super::{ProcessControl, ProcessSpawner, SpawnRequest};
use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use spawnkit_common::{SpawnError, SpawnResult};
use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::Read;
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::ptr;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Exit status of a child whose setup failed before `execve`.
const SETUP_FAILED_STATUS: i32 = 127;

const STATUS_REPORT_LEN: usize = 5;

const MAX_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Held from status pipe creation until `fork` returns. Where the pipe is
/// made close-on-exec by a separate `fcntl`, a concurrent spawn could
/// otherwise fork in between and leak the write end into an unrelated child,
/// leaving `read_status` blocked until that child exits.
static SPAWN_LOCK: Mutex<()> = Mutex::new(());

/// Step of child setup that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum SetupStage {
    Redirect = 1,
    WorkingDirectory = 2,
    Exec = 3,
}

impl SetupStage {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(SetupStage::Redirect),
            2 => Some(SetupStage::WorkingDirectory),
            3 => Some(SetupStage::Exec),
            _ => None,
        }
    }
}

/// Spawns processes with `fork` and `execve`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PosixSpawner;

/// Child-side inputs, fully materialized before `fork`.
struct PreparedExec {
    executable: CString,
    argv: Vec<CString>,
    envp: Option<Vec<CString>>,
    working_directory: Option<CString>,
    standard_output: Option<File>,
}

impl PreparedExec {
    fn prepare(request: &SpawnRequest<'_>) -> SpawnResult<Self> {
        let executable = request.command_line.executable();
        let canonical = std::fs::canonicalize(executable).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SpawnError::executable_not_found(executable)
            } else {
                SpawnError::spawn_failed(executable, e.to_string(), e.raw_os_error())
            }
        })?;
        let executable = path_to_cstring(&canonical)
            .ok_or_else(|| SpawnError::invalid_command_line("executable path contains a NUL byte"))?;

        let argv = request
            .command_line
            .argv()
            .into_iter()
            .map(|token| {
                CString::new(token).map_err(|_| {
                    SpawnError::invalid_command_line(format!("argument '{}' contains a NUL byte", token.escape_debug()))
                })
            })
            .collect::<SpawnResult<Vec<_>>>()?;

        let envp = request
            .environment
            .map(|env| env.to_environment_array())
            .transpose()?;

        let working_directory = request
            .working_directory
            .map(|dir| {
                path_to_cstring(dir)
                    .ok_or_else(|| SpawnError::working_directory(dir, "path contains a NUL byte", None))
            })
            .transpose()?;

        // Opened close-on-exec; the child's dup2 onto stdout is what survives execve.
        let standard_output = request
            .standard_output
            .map(|path| {
                OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .mode(0o644)
                    .open(path)
                    .map_err(|e| SpawnError::redirect_failed(path, e.to_string(), e.raw_os_error()))
            })
            .transpose()?;

        Ok(Self {
            executable,
            argv,
            envp,
            working_directory,
            standard_output,
        })
    }
}

fn path_to_cstring(path: &Path) -> Option<CString> {
    CString::new(path.as_os_str().as_bytes()).ok()
}

/// Null-terminated pointer array over `strings`. The pointers borrow from
/// `strings`, which must outlive every use of the returned vector.
fn null_terminated(strings: &[CString]) -> Vec<*const libc::c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(ptr::null()))
        .collect()
}

fn status_pipe() -> nix::Result<(OwnedFd, OwnedFd)> {
    #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
    {
        nix::unistd::pipe2(nix::fcntl::OFlag::O_CLOEXEC)
    }

    #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
    {
        let (reader, writer) = nix::unistd::pipe()?;
        for fd in [&reader, &writer] {
            Errno::result(unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC) })?;
        }
        Ok((reader, writer))
    }
}

/// Runs in the forked child. Never returns.
fn exec_child(
    prepared: &PreparedExec,
    argv: &[*const libc::c_char],
    envp: Option<&[*const libc::c_char]>,
    status: &OwnedFd,
) -> ! {
    if let Some(file) = &prepared.standard_output {
        let fd = file.as_raw_fd();
        let result = if fd == libc::STDOUT_FILENO {
            // dup2 onto itself keeps FD_CLOEXEC set; clear it instead.
            Errno::result(unsafe { libc::fcntl(fd, libc::F_SETFD, 0) })
        } else {
            Errno::result(unsafe { libc::dup2(fd, libc::STDOUT_FILENO) })
        };
        if let Err(errno) = result {
            report_and_exit(status, SetupStage::Redirect, errno);
        }
    }

    if let Some(dir) = &prepared.working_directory {
        if let Err(errno) = nix::unistd::chdir(dir.as_c_str()) {
            report_and_exit(status, SetupStage::WorkingDirectory, errno);
        }
    }

    unsafe {
        match envp {
            Some(envp) => libc::execve(prepared.executable.as_ptr(), argv.as_ptr(), envp.as_ptr()),
            None => libc::execv(prepared.executable.as_ptr(), argv.as_ptr()),
        };
    }
    report_and_exit(status, SetupStage::Exec, Errno::last())
}

fn report_and_exit(status: &OwnedFd, stage: SetupStage, errno: Errno) -> ! {
    let code = (errno as i32).to_be_bytes();
    let report: [u8; STATUS_REPORT_LEN] = [stage as u8, code[0], code[1], code[2], code[3]];
    // A failed or short write reaches the parent as a truncated report.
    unsafe {
        libc::write(status.as_raw_fd(), report.as_ptr().cast(), report.len());
        libc::_exit(SETUP_FAILED_STATUS)
    }
}

/// Reads the child's status report. `Ok(None)` means `execve` succeeded.
fn read_status(reader: OwnedFd) -> std::io::Result<Option<Vec<u8>>> {
    let mut pipe = File::from(reader);
    let mut report = Vec::with_capacity(STATUS_REPORT_LEN);
    let mut buf = [0u8; STATUS_REPORT_LEN];
    loop {
        match pipe.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                report.extend_from_slice(&buf[..n]);
                if report.len() >= STATUS_REPORT_LEN {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(if report.is_empty() { None } else { Some(report) })
}

fn setup_error(request: &SpawnRequest<'_>, report: &[u8]) -> SpawnError {
    let executable = request.command_line.executable();
    if report.len() < STATUS_REPORT_LEN {
        return SpawnError::exec_failed(executable, "child setup report was truncated", None);
    }

    let errno = Errno::from_raw(i32::from_be_bytes([report[1], report[2], report[3], report[4]]));
    let os_code = Some(errno as i32);
    match SetupStage::from_byte(report[0]) {
        Some(SetupStage::Redirect) => {
            let path = request.standard_output.unwrap_or_else(|| Path::new(""));
            SpawnError::redirect_failed(path, errno.desc(), os_code)
        }
        Some(SetupStage::WorkingDirectory) => {
            let path = request.working_directory.unwrap_or_else(|| Path::new(""));
            SpawnError::working_directory(path, errno.desc(), os_code)
        }
        Some(SetupStage::Exec) => SpawnError::exec_failed(executable, errno.desc(), os_code),
        None => SpawnError::exec_failed(executable, "unknown child setup failure", os_code),
    }
}

/// Reaps a child known to be exiting, so it doesn't linger as a zombie.
fn reap(pid: Pid) {
    loop {
        match waitpid(pid, None) {
            Err(Errno::EINTR) => continue,
            Err(e) => {
                warn!("Failed to reap child {}: {}", pid, e);
                return;
            }
            Ok(_) => return,
        }
    }
}

impl ProcessSpawner for PosixSpawner {
    type Process = PosixProcess;

    fn spawn(&self, request: &SpawnRequest<'_>) -> SpawnResult<PosixProcess> {
        let prepared = PreparedExec::prepare(request)?;
        let argv = null_terminated(&prepared.argv);
        let envp = prepared.envp.as_deref().map(null_terminated);
        debug!(
            "Prepared exec of {:?} with {} argument(s), {}",
            prepared.executable,
            prepared.argv.len() - 1,
            if envp.is_some() { "explicit environment" } else { "inherited environment" }
        );

        let executable = request.command_line.executable();
        let guard = SPAWN_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let (reader, writer) = status_pipe()
            .map_err(|e| SpawnError::spawn_failed(executable, e.desc(), Some(e as i32)))?;

        // SAFETY: the child branch only performs async-signal-safe system calls on
        // data prepared above and always ends in execve or _exit.
        let fork_result = unsafe { fork() }
            .map_err(|e| SpawnError::spawn_failed(executable, e.desc(), Some(e as i32)))?;

        match fork_result {
            ForkResult::Child => exec_child(&prepared, &argv, envp.as_deref(), &writer),
            ForkResult::Parent { child } => {
                // Released in the parent only; the child never touches the lock.
                drop(guard);
                drop(writer);
                // Closes the parent's copy of the redirect file.
                drop(prepared);

                match read_status(reader) {
                    Ok(None) => {
                        info!("Spawned process {}: {}", child, request.command_line);
                        Ok(PosixProcess::new(child))
                    }
                    Ok(Some(report)) => {
                        reap(child);
                        let err = setup_error(request, &report);
                        warn!("Child setup failed for {}: {}", request.command_line, err);
                        Err(err)
                    }
                    Err(e) => {
                        // The pipe broke; the child may or may not have exec'd.
                        warn!("Lost status pipe for child {}: {}", child, e);
                        Ok(PosixProcess::new(child))
                    }
                }
            }
        }
    }
}

/// Live child identified by its pid.
#[derive(Debug)]
pub struct PosixProcess {
    pid: Pid,
}

impl PosixProcess {
    fn new(pid: Pid) -> Self {
        Self { pid }
    }

    fn wait_failed(&self, errno: Errno) -> SpawnError {
        SpawnError::wait_failed(self.id(), errno.desc(), Some(errno as i32))
    }
}

/// Normal exit keeps its code; death by signal maps to `128 + signal`.
fn exit_code_of(status: WaitStatus) -> Option<i32> {
    match status {
        WaitStatus::Exited(_, code) => Some(code),
        WaitStatus::Signaled(_, signal, _) => Some(128 + signal as i32),
        _ => None,
    }
}

impl ProcessControl for PosixProcess {
    fn id(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    fn wait(&mut self) -> SpawnResult<i32> {
        loop {
            match waitpid(self.pid, None) {
                Ok(status) => {
                    if let Some(code) = exit_code_of(status) {
                        debug!("Process {} reaped: {:?}", self.pid, status);
                        return Ok(code);
                    }
                }
                Err(Errno::EINTR) => continue,
                Err(errno) => return Err(self.wait_failed(errno)),
            }
        }
    }

    fn try_wait(&mut self) -> SpawnResult<Option<i32>> {
        loop {
            match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => return Ok(None),
                Ok(status) => return Ok(exit_code_of(status)),
                Err(Errno::EINTR) => continue,
                Err(errno) => return Err(self.wait_failed(errno)),
            }
        }
    }

    fn wait_timeout(&mut self, timeout: Duration) -> SpawnResult<Option<i32>> {
        // Too far in the future to represent: nothing to time out on.
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.wait().map(Some);
        };
        let mut interval = Duration::from_millis(1);
        loop {
            if let Some(code) = self.try_wait()? {
                return Ok(Some(code));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            std::thread::sleep(interval.min(deadline - now));
            interval = (interval * 2).min(MAX_POLL_INTERVAL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_line::CommandLine;
    use spawnkit_common::ErrorKind;

    fn request(command_line: &CommandLine) -> SpawnRequest<'_> {
        SpawnRequest {
            command_line,
            environment: None,
            working_directory: None,
            standard_output: None,
        }
    }

    #[test]
    fn test_prepare_builds_argv() {
        let cmd = CommandLine::new("/bin/sh").args(["-c", "exit 0"]);
        let prepared = PreparedExec::prepare(&request(&cmd)).unwrap();
        let argv: Vec<&str> = prepared.argv.iter().map(|a| a.to_str().unwrap()).collect();
        assert_eq!(argv, vec!["/bin/sh", "-c", "exit 0"]);

        let ptrs = null_terminated(&prepared.argv);
        assert_eq!(ptrs.len(), 4);
        assert!(ptrs[3].is_null());
        assert!(prepared.envp.is_none());
    }

    #[test]
    fn test_prepare_rejects_interior_nul() {
        let cmd = CommandLine::new("/bin/sh").arg("bad\0arg");
        let err = PreparedExec::prepare(&request(&cmd)).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidCommandLine);
    }

    #[test]
    fn test_prepare_missing_executable() {
        let cmd = CommandLine::new("/definitely/not/here/tool");
        let err = PreparedExec::prepare(&request(&cmd)).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ExecutableNotFound);
    }

    #[test]
    fn test_setup_error_decoding() {
        let cmd = CommandLine::new("/bin/sh");
        let dir = Path::new("/missing/dir");
        let req = SpawnRequest {
            working_directory: Some(dir),
            ..request(&cmd)
        };

        let code = (Errno::ENOENT as i32).to_be_bytes();
        let report = [SetupStage::WorkingDirectory as u8, code[0], code[1], code[2], code[3]];
        let err = setup_error(&req, &report);
        assert_eq!(err.kind(), ErrorKind::WorkingDirectory);
        assert_eq!(err.raw_os_error(), Some(Errno::ENOENT as i32));

        let err = setup_error(&req, &report[..2]);
        assert_eq!(err.kind(), ErrorKind::Spawn);
    }

    #[test]
    fn test_exit_code_normalization() {
        let pid = Pid::from_raw(1);
        assert_eq!(exit_code_of(WaitStatus::Exited(pid, 7)), Some(7));
        assert_eq!(
            exit_code_of(WaitStatus::Signaled(pid, nix::sys::signal::Signal::SIGKILL, false)),
            Some(137)
        );
        assert_eq!(exit_code_of(WaitStatus::StillAlive), None);
    }
}
