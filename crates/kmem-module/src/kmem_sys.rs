//! Raw bindings for the memory device and the kernel linker.
//!
//! Mirrors `<sys/linker.h>` for the one call we need.

use std::fs::File;
use std::path::Path;

use kmem_core::error::{KmemError, KmemResult};

/// `_PATH_KMEM`
pub const PATH_KMEM: &str = "/dev/kmem";

// ── kldsym(2) ──

cfg_if::cfg_if! {
    if #[cfg(target_os = "freebsd")] {
        use std::ffi::CString;
        use libc::{c_char, c_int, c_ulong, c_void, size_t};

        /// `KLDSYM_LOOKUP`
        pub const KLDSYM_LOOKUP: c_int = 1;

        /// `struct kld_sym_lookup`
        #[repr(C)]
        #[derive(Debug)]
        pub struct KldSymLookup {
            pub version: c_int,
            pub symname: *mut c_char,
            pub symvalue: c_ulong,
            pub symsize: size_t,
        }

        extern "C" {
            fn kldsym(fileid: c_int, cmd: c_int, data: *mut c_void) -> c_int;
        }

        /// Look `name` up in the kernel's linker symbol table.
        pub fn kldsym_lookup(name: &str) -> KmemResult<u64> {
            let not_found = || KmemError::SymbolNotFound { name: name.to_string() };
            let symname = CString::new(name).map_err(|_| not_found())?;
            let mut lookup = KldSymLookup {
                version: std::mem::size_of::<KldSymLookup>() as c_int,
                symname: symname.as_ptr() as *mut c_char,
                symvalue: 0,
                symsize: 0,
            };
            // Safety: `lookup` is a valid kld_sym_lookup and `symname`
            // outlives the call.
            let ret = unsafe {
                kldsym(0, KLDSYM_LOOKUP, &mut lookup as *mut KldSymLookup as *mut c_void)
            };
            if ret == -1 {
                log::debug!("kldsym({}): {}", name, std::io::Error::last_os_error());
                return Err(not_found());
            }
            Ok(lookup.symvalue as u64)
        }
    } else {
        /// `kldsym(2)` exists only on FreeBSD.
        pub fn kldsym_lookup(_name: &str) -> KmemResult<u64> {
            Err(KmemError::Unsupported("kldsym(2)"))
        }
    }
}

// ── Helper: open the memory device ──

/// Open `path` read-only, close-on-exec.
pub fn open_kmem(path: &Path) -> KmemResult<File> {
    use std::os::unix::fs::OpenOptionsExt;
    std::fs::OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_CLOEXEC)
        .open(path)
        .map_err(|source| KmemError::Open {
            path: path.display().to_string(),
            source,
        })
}

/// System page size
pub fn page_size() -> usize {
    // Safety: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        4096
    }
}
