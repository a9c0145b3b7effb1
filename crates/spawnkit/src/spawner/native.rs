//! `CreateProcessW` process creation.

#![allow(unsafe_code)]

use super::{ProcessControl, ProcessSpawner, SpawnRequest};
use spawnkit_common::{SpawnError, SpawnResult};
use std::ffi::c_void;
use std::fs::{File, OpenOptions};
use std::os::windows::ffi::OsStrExt;
use std::os::windows::io::AsRawHandle;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};
use windows::core::{PCWSTR, PWSTR};
use windows::Win32::Foundation::{
    CloseHandle, SetHandleInformation, HANDLE, HANDLE_FLAG_INHERIT, WAIT_FAILED, WAIT_OBJECT_0,
    WAIT_TIMEOUT,
};
use windows::Win32::System::Console::{GetStdHandle, STD_ERROR_HANDLE, STD_INPUT_HANDLE};
use windows::Win32::System::Threading::{
    CreateProcessW, GetExitCodeProcess, WaitForSingleObject, CREATE_UNICODE_ENVIRONMENT, INFINITE,
    PROCESS_CREATION_FLAGS, PROCESS_INFORMATION, STARTF_USESTDHANDLES, STARTUPINFOW,
};

/// Held while a redirect handle is inheritable, up to the point its parent
/// copy is closed. Every `CreateProcessW` with `bInheritHandles` set copies
/// all inheritable handles, so spawns from this crate must not overlap.
/// Inheriting spawns made outside this crate are not covered.
static SPAWN_LOCK: Mutex<()> = Mutex::new(());

/// Spawns processes with `CreateProcessW`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeSpawner;

fn wide(text: &str) -> Vec<u16> {
    text.encode_utf16().chain(std::iter::once(0)).collect()
}

fn wide_path(path: &Path) -> Vec<u16> {
    path.as_os_str().encode_wide().chain(std::iter::once(0)).collect()
}

fn os_code(e: &windows::core::Error) -> Option<i32> {
    Some(e.code().0)
}

/// Creates (or truncates) `path` and marks its handle inheritable.
fn create_inheritable_file(path: &Path) -> SpawnResult<File> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|e| SpawnError::redirect_failed(path, e.to_string(), e.raw_os_error()))?;

    unsafe {
        SetHandleInformation(
            HANDLE(file.as_raw_handle()),
            HANDLE_FLAG_INHERIT.0,
            HANDLE_FLAG_INHERIT,
        )
    }
    .map_err(|e| SpawnError::redirect_failed(path, e.to_string(), os_code(&e)))?;

    Ok(file)
}

fn looks_like_path(executable: &str) -> bool {
    executable.contains('\\') || executable.contains('/')
}

impl ProcessSpawner for NativeSpawner {
    type Process = NativeProcess;

    fn spawn(&self, request: &SpawnRequest<'_>) -> SpawnResult<NativeProcess> {
        let executable = request.command_line.executable();
        // Bare names are left to CreateProcessW's own search rules.
        if looks_like_path(executable) && !Path::new(executable).exists() {
            return Err(SpawnError::executable_not_found(executable));
        }
        if let Some(dir) = request.working_directory {
            if !dir.is_dir() {
                return Err(SpawnError::working_directory(dir, "not a directory", None));
            }
        }

        let mut startup_info = STARTUPINFOW {
            cb: std::mem::size_of::<STARTUPINFOW>() as u32,
            ..Default::default()
        };

        let guard = SPAWN_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        // Kept alive until after CreateProcessW, then dropped to close the
        // parent's copy; the child holds its own inherited handle.
        let output_file = request
            .standard_output
            .map(create_inheritable_file)
            .transpose()?;
        let inherit_handles = output_file.is_some();
        if let Some(file) = &output_file {
            startup_info.dwFlags |= STARTF_USESTDHANDLES;
            startup_info.hStdOutput = HANDLE(file.as_raw_handle());
            unsafe {
                startup_info.hStdInput = GetStdHandle(STD_INPUT_HANDLE).unwrap_or_default();
                startup_info.hStdError = GetStdHandle(STD_ERROR_HANDLE).unwrap_or_default();
            }
        }

        let environment_block = request
            .environment
            .map(|env| env.to_environment_block())
            .transpose()?;
        let mut creation_flags = PROCESS_CREATION_FLAGS(0);
        if environment_block.is_some() {
            creation_flags |= CREATE_UNICODE_ENVIRONMENT;
        }

        let working_directory = request.working_directory.map(wide_path);
        let current_directory = working_directory
            .as_ref()
            .map_or(PCWSTR::null(), |dir| PCWSTR(dir.as_ptr()));

        // CreateProcessW may modify the command line buffer in place.
        let command_text = request.command_line.to_quoted_string();
        let mut command_line = wide(&command_text);
        debug!(
            "CreateProcessW: {} (inherit handles: {}, explicit environment: {})",
            command_text,
            inherit_handles,
            environment_block.is_some()
        );

        let mut process_info = PROCESS_INFORMATION::default();
        let created = unsafe {
            CreateProcessW(
                PCWSTR::null(),
                PWSTR(command_line.as_mut_ptr()),
                None,
                None,
                inherit_handles,
                creation_flags,
                environment_block
                    .as_ref()
                    .map(|block| block.as_ptr() as *const c_void),
                current_directory,
                &startup_info,
                &mut process_info,
            )
        };
        drop(output_file);
        drop(guard);

        if let Err(e) = created {
            warn!("CreateProcessW failed for {}: {}", command_text, e);
            return Err(SpawnError::spawn_failed(executable, e.to_string(), os_code(&e)));
        }

        unsafe {
            let _ = CloseHandle(process_info.hThread);
        }
        info!("Spawned process {}: {}", process_info.dwProcessId, command_text);

        Ok(NativeProcess {
            handle: process_info.hProcess,
            pid: process_info.dwProcessId,
        })
    }
}

/// Owned process handle, closed on drop.
#[derive(Debug)]
pub struct NativeProcess {
    handle: HANDLE,
    pid: u32,
}

// The handle is an owned kernel object reference, usable from any thread.
unsafe impl Send for NativeProcess {}

impl NativeProcess {
    /// Waits up to `millis`; `None` on timeout.
    fn wait_millis(&mut self, millis: u32) -> SpawnResult<Option<i32>> {
        let event = unsafe { WaitForSingleObject(self.handle, millis) };
        if event == WAIT_TIMEOUT {
            return Ok(None);
        }
        if event == WAIT_FAILED || event != WAIT_OBJECT_0 {
            let e = windows::core::Error::from_win32();
            return Err(SpawnError::wait_failed(self.pid, e.to_string(), os_code(&e)));
        }

        let mut code = 0u32;
        unsafe { GetExitCodeProcess(self.handle, &mut code) }
            .map_err(|e| SpawnError::wait_failed(self.pid, e.to_string(), os_code(&e)))?;
        debug!("Process {} exited with raw code {:#x}", self.pid, code);
        // Reinterpreted, so NTSTATUS values such as 0xC0000005 come out negative.
        Ok(Some(code as i32))
    }
}

impl ProcessControl for NativeProcess {
    fn id(&self) -> u32 {
        self.pid
    }

    fn wait(&mut self) -> SpawnResult<i32> {
        self.wait_millis(INFINITE)?
            .ok_or_else(|| SpawnError::wait_failed(self.pid, "infinite wait timed out", None))
    }

    fn try_wait(&mut self) -> SpawnResult<Option<i32>> {
        self.wait_millis(0)
    }

    fn wait_timeout(&mut self, timeout: Duration) -> SpawnResult<Option<i32>> {
        // INFINITE is u32::MAX; anything at or beyond it is an unbounded wait.
        match u32::try_from(timeout.as_millis()) {
            Ok(millis) if millis < INFINITE => self.wait_millis(millis),
            _ => self.wait().map(Some),
        }
    }
}

impl Drop for NativeProcess {
    fn drop(&mut self) {
        if let Err(e) = unsafe { CloseHandle(self.handle) } {
            warn!("Failed to close handle of process {}: {}", self.pid, e);
        }
    }
}
