//! Output sinks.
//!
//! Print opcodes write straight to fds 1 and 2 through `libc::write`,
//! bypassing Rust's buffered stdout. This keeps byte ordering identical
//! to the native backend's `write(2)` calls, so interleaved stdout and
//! stderr output from a program matches across both runtimes.

/// Write the full buffer to stdout or stderr, retrying on short writes.
pub fn write_bytes(bytes: &[u8], stderr: bool) {
    let fd = if stderr { 2 } else { 1 };
    let mut written = 0usize;
    while written < bytes.len() {
        let remaining = &bytes[written..];
        // SAFETY: the pointer/length pair describes a live slice and the
        // fd is one of the process's standard descriptors.
        let count = unsafe {
            libc::write(
                fd,
                remaining.as_ptr() as *const libc::c_void,
                remaining.len(),
            )
        };
        if count <= 0 {
            return;
        }
        written += count as usize;
    }
}

pub fn write_newline(stderr: bool) {
    write_bytes(b"\n", stderr);
}
