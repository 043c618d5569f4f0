//! Anonymous OS pipes with a capacity hint.

use std::io::{self, PipeReader, PipeWriter};

/// Outcome of a pipe capacity request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeCapacity {
    /// The kernel accepted the request; the value is the capacity actually granted.
    Applied(usize),
    /// The platform has no way to resize pipes.
    Unsupported,
}

/// Create an anonymous pipe and ask the OS to size its buffer to `capacity` bytes.
///
/// The capacity is a hint: it is applied on Linux through `F_SETPIPE_SZ` and
/// silently ignored elsewhere. A rejected request is logged and the pipe is
/// returned with the platform default size.
pub fn open_pipe(capacity: usize) -> io::Result<(PipeReader, PipeWriter)> {
    let (reader, writer) = io::pipe()?;
    match set_pipe_capacity(&writer, capacity) {
        Ok(PipeCapacity::Applied(granted)) => {
            tracing::trace!(requested = capacity, granted, "pipe capacity applied");
        }
        Ok(PipeCapacity::Unsupported) => {}
        Err(e) => {
            tracing::debug!(requested = capacity, error = %e, "change pipe buffer size failed");
        }
    }
    Ok((reader, writer))
}

/// Request a pipe buffer size for the pipe behind `end`.
#[cfg(target_os = "linux")]
pub fn set_pipe_capacity<T: std::os::fd::AsRawFd>(
    end: &T,
    capacity: usize,
) -> io::Result<PipeCapacity> {
    let requested = libc::c_int::try_from(capacity)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pipe capacity too large"))?;
    // SAFETY: the descriptor is owned by `end` and stays open for the duration of the call.
    let granted = unsafe { libc::fcntl(end.as_raw_fd(), libc::F_SETPIPE_SZ, requested) };
    if granted < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(PipeCapacity::Applied(granted as usize))
}

/// Request a pipe buffer size for the pipe behind `end`.
#[cfg(not(target_os = "linux"))]
pub fn set_pipe_capacity<T>(_end: &T, _capacity: usize) -> io::Result<PipeCapacity> {
    Ok(PipeCapacity::Unsupported)
}
