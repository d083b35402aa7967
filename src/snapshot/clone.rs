//! Copy-on-write file cloning
//!
//! Snapshot extraction copies segment files out of the live buffer. Where
//! the filesystem supports it the copy is a reflink (instant, no extra
//! space), with a full copy as the fallback everywhere else.

use std::fs;
use std::io;
use std::path::Path;

/// Clone `src` to `dst`, preferring a copy-on-write reflink
///
/// Returns the file size, like `fs::copy`. `dst` must not exist yet.
pub fn clone_or_copy(src: &Path, dst: &Path) -> io::Result<u64> {
    match reflink(src, dst) {
        Ok(()) => fs::metadata(dst).map(|m| m.len()),
        Err(e) => {
            tracing::debug!("Reflink {:?} -> {:?} unavailable ({}); copying", src, dst, e);
            fs::copy(src, dst)
        }
    }
}

#[cfg(target_os = "linux")]
fn reflink(src: &Path, dst: &Path) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let src_file = fs::File::open(src)?;
    let dst_file = fs::File::create(dst)?;

    let rc = unsafe { libc::ioctl(dst_file.as_raw_fd(), libc::FICLONE, src_file.as_raw_fd()) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        drop(dst_file);
        let _ = fs::remove_file(dst);
        return Err(err);
    }
    Ok(())
}

#[cfg(target_os = "macos")]
fn reflink(src: &Path, dst: &Path) -> io::Result<()> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let src_c = CString::new(src.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL"))?;
    let dst_c = CString::new(dst.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL"))?;

    let rc = unsafe { libc::clonefile(src_c.as_ptr(), dst_c.as_ptr(), 0) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn reflink(_src: &Path, _dst: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "reflink not supported on this platform",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_clone_produces_identical_content() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.mp4");
        let dst = dir.path().join("dst.mp4");
        let payload: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        fs::write(&src, &payload).unwrap();

        let len = clone_or_copy(&src, &dst).unwrap();
        assert_eq!(len, payload.len() as u64);
        assert_eq!(fs::read(&dst).unwrap(), payload);
        // Source stays intact
        assert_eq!(fs::read(&src).unwrap(), payload);
    }

    #[test]
    fn test_clone_missing_source_fails() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("absent.mp4");
        let dst = dir.path().join("dst.mp4");

        assert!(clone_or_copy(&src, &dst).is_err());
        assert!(!dst.exists());
    }
}
