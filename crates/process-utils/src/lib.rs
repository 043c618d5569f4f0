//! Process and pipe helpers shared across the workspace.
//!
//! Decoder processes are spawned through [`tokio_command`] so they never flash a
//! console window on Windows, and their stdin is fed from an anonymous OS pipe
//! created with [`open_pipe`].

use std::ffi::OsStr;

mod pipe;

pub use pipe::{PipeCapacity, open_pipe, set_pipe_capacity};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

impl NoWindowExt for std::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `std::process::Command` that will not open a console window.
pub fn std_command(program: impl AsRef<OsStr>) -> std::process::Command {
    let mut cmd = std::process::Command::new(program);
    cmd.no_window();
    cmd
}

#[cfg(feature = "tokio")]
impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `tokio::process::Command` that will not open a console window.
#[cfg(feature = "tokio")]
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    cmd
}

/// Run `program -version` (or `--version`) and return the first line of its output.
///
/// Returns `None` when the program cannot be spawned, which callers use as an
/// availability probe.
pub fn probe_version(program: impl AsRef<OsStr>, flag: &str) -> Option<String> {
    let mut cmd = std_command(program);
    cmd.arg(flag);
    cmd.output().ok().and_then(|output| {
        String::from_utf8(output.stdout)
            .ok()
            .and_then(|s| s.lines().next().map(|l| l.trim().to_string()))
            .filter(|l| !l.is_empty())
    })
}
