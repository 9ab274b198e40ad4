//! Utility functions for disk space, marker files and staged page filenames

use std::path::Path;

/// Marker file that keeps media scanners out of a chapter directory
pub const NOMEDIA_FILE: &str = ".nomedia";

/// Extension of partially written page files
pub const TMP_FILE_EXTENSION: &str = "tmp";

/// Separator between a page stem and its split fragment number (`007__002.jpg`)
pub const SPLIT_SEPARATOR: &str = "__";

/// Zero-padded filename stem for a page, e.g. `007` for page 7 of 120
///
/// The width is the number of digits in the page count, but never less than 3,
/// so that lexical order equals reading order.
pub fn page_file_stem(index: usize, page_count: usize) -> String {
    let width = page_count.to_string().len().max(3);
    format!("{:0width$}", index, width = width)
}

/// Name of the first split fragment for a page stem (`007__001.jpg`)
pub fn first_split_fragment(stem: &str) -> String {
    format!("{stem}{SPLIT_SEPARATOR}001.jpg")
}

/// Whether a staged file name counts as a primary page image
///
/// Marker files, partial `.tmp` files and every split fragment but the first are
/// excluded, so a split page counts once.
pub fn is_primary_page_file(name: &str) -> bool {
    if name == NOMEDIA_FILE {
        return false;
    }
    if name.ends_with(&format!(".{TMP_FILE_EXTENSION}")) {
        return false;
    }
    if name.contains(SPLIT_SEPARATOR) && !name.ends_with(&format!("{SPLIT_SEPARATOR}001.jpg")) {
        return false;
    }
    true
}

/// Create an empty `.nomedia` marker in `dir` if there is none yet
pub fn create_nomedia_file(dir: &Path) -> std::io::Result<()> {
    let marker = dir.join(NOMEDIA_FILE);
    if !marker.exists() {
        std::fs::File::create(marker)?;
    }
    Ok(())
}

/// Get available disk space for a given path
///
/// Uses platform-specific APIs to query filesystem statistics:
/// - Linux/macOS: statvfs
/// - Windows: GetDiskFreeSpaceExW
pub fn get_available_space(path: &Path) -> std::io::Result<u64> {
    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        // SAFETY: c_path is a valid NUL-terminated string, stat is zero-initialised
        // and only read after statvfs reports success.
        unsafe {
            let mut stat: libc::statvfs = std::mem::zeroed();
            if libc::statvfs(c_path.as_ptr(), &mut stat) != 0 {
                return Err(std::io::Error::last_os_error());
            }

            // f_bavail is what an unprivileged process may use
            #[allow(clippy::unnecessary_cast)]
            let available_bytes = (stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64);
            Ok(available_bytes)
        }
    }

    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::fileapi::GetDiskFreeSpaceExW;

        let wide_path: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        // SAFETY: wide_path is NUL-terminated and every out pointer refers to a
        // live, aligned u64 that is only read after a successful call.
        unsafe {
            let mut free_bytes_available: u64 = 0;
            let mut _total_bytes: u64 = 0;
            let mut _total_free_bytes: u64 = 0;

            if GetDiskFreeSpaceExW(
                wide_path.as_ptr(),
                &mut free_bytes_available as *mut u64 as *mut _,
                &mut _total_bytes as *mut u64 as *mut _,
                &mut _total_free_bytes as *mut u64 as *mut _,
            ) == 0
            {
                return Err(std::io::Error::last_os_error());
            }

            Ok(free_bytes_available)
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "Disk space checking is not supported on this platform",
        ))
    }
}
