//! Byte layout of the kernel structures we decode.
//!
//! These structures belong to the running kernel, not to us. The defaults
//! below describe FreeBSD 10 on amd64 (LP64, native endian). Other builds
//! can be described with an override file of `record.field = value` lines:
//!
//! ```text
//! # stable/10 with INVARIANTS
//! vnode.v_vflag   = 0xe4
//! vnode.size      = 0xe8
//! ```
//!
//! Every `size` is the length of the window mapped for one record and
//! must cover every field read from it; [`KernelLayout::validate`] checks
//! this before any memory is touched.

use std::io::BufRead;

use crate::error::{KmemError, KmemResult};

/// `struct vm_page`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLayout {
    pub size: usize,
    /// `plinks.q.tqe_next`
    pub pageq_next: usize,
    pub object: usize,
    /// `flags` (u16)
    pub flags: usize,
    /// `queue` (u8)
    pub queue: usize,
    /// `act_count` (u8)
    pub act_count: usize,
}

/// `struct vm_object`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLayout {
    pub size: usize,
    /// `type` (u8)
    pub kind: usize,
    pub handle: usize,
}

/// `struct vnode`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VnodeLayout {
    pub size: usize,
    /// `v_type` (enum, i32)
    pub v_type: usize,
    pub v_data: usize,
    pub v_mount: usize,
    /// `v_un.vu_cdev`
    pub v_un: usize,
    /// `v_cache_dst.tqh_first`
    pub v_cache_dst: usize,
    /// `v_vflag` (u32)
    pub v_vflag: usize,
}

/// `struct mount`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountLayout {
    pub size: usize,
    pub vnodecovered: usize,
}

/// `struct namecache` (private to `vfs_cache.c`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameCacheLayout {
    /// Header only; the name is read through its own window
    pub size: usize,
    pub dvp: usize,
    /// `nc_nlen` (u8)
    pub nlen: usize,
    /// Start of the inline `nc_name` bytes
    pub name: usize,
}

/// UFS `struct inode`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InodeLayout {
    pub size: usize,
    /// `i_number` (u32)
    pub number: usize,
    /// `i_nlink` (i16)
    pub nlink: usize,
}

/// `struct cdev`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdevLayout {
    pub size: usize,
    /// Inline `si_name[SPECNAMELEN + 1]`
    pub name: usize,
    pub name_len: usize,
}

/// One entry of the page queue head array
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQueueLayout {
    /// Distance between consecutive queue heads
    pub stride: usize,
    /// `pl.tqh_first`
    pub first: usize,
}

/// Layout of every kernel record the tool reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelLayout {
    pub page: PageLayout,
    pub object: ObjectLayout,
    pub vnode: VnodeLayout,
    pub mount: MountLayout,
    pub namecache: NameCacheLayout,
    pub inode: InodeLayout,
    pub cdev: CdevLayout,
    pub pagequeue: PageQueueLayout,
}

impl Default for KernelLayout {
    fn default() -> Self {
        Self::freebsd_amd64()
    }
}

impl KernelLayout {
    /// FreeBSD 10, amd64
    pub fn freebsd_amd64() -> Self {
        Self {
            page: PageLayout {
                size: 104,
                pageq_next: 0,
                object: 32,
                flags: 90,
                queue: 94,
                act_count: 99,
            },
            object: ObjectLayout {
                size: 192,
                kind: 117,
                handle: 184,
            },
            vnode: VnodeLayout {
                size: 224,
                v_type: 0,
                v_data: 24,
                v_mount: 32,
                v_un: 56,
                v_cache_dst: 96,
                v_vflag: 220,
            },
            mount: MountLayout {
                size: 80,
                vnodecovered: 72,
            },
            namecache: NameCacheLayout {
                size: 66,
                dvp: 48,
                nlen: 65,
                name: 66,
            },
            inode: InodeLayout {
                size: 160,
                number: 48,
                nlink: 142,
            },
            cdev: CdevLayout {
                size: 328,
                name: 264,
                name_len: 64,
            },
            pagequeue: PageQueueLayout {
                stride: 24,
                first: 0,
            },
        }
    }

    /// Check that every field fits in the window read for its record.
    pub fn validate(&self) -> KmemResult<()> {
        let checks: [(&str, usize, usize, usize); 19] = [
            ("page.pageq_next", self.page.pageq_next, 8, self.page.size),
            ("page.object", self.page.object, 8, self.page.size),
            ("page.flags", self.page.flags, 2, self.page.size),
            ("page.queue", self.page.queue, 1, self.page.size),
            ("page.act_count", self.page.act_count, 1, self.page.size),
            ("object.kind", self.object.kind, 1, self.object.size),
            ("object.handle", self.object.handle, 8, self.object.size),
            ("vnode.v_type", self.vnode.v_type, 4, self.vnode.size),
            ("vnode.v_data", self.vnode.v_data, 8, self.vnode.size),
            ("vnode.v_mount", self.vnode.v_mount, 8, self.vnode.size),
            ("vnode.v_un", self.vnode.v_un, 8, self.vnode.size),
            ("vnode.v_cache_dst", self.vnode.v_cache_dst, 8, self.vnode.size),
            ("vnode.v_vflag", self.vnode.v_vflag, 4, self.vnode.size),
            ("mount.vnodecovered", self.mount.vnodecovered, 8, self.mount.size),
            ("namecache.dvp", self.namecache.dvp, 8, self.namecache.size),
            ("namecache.nlen", self.namecache.nlen, 1, self.namecache.size),
            ("inode.number", self.inode.number, 4, self.inode.size),
            ("inode.nlink", self.inode.nlink, 2, self.inode.size),
            ("cdev.name", self.cdev.name, self.cdev.name_len, self.cdev.size),
        ];
        for (key, offset, width, size) in checks {
            if offset.checked_add(width).map_or(true, |end| end > size) {
                return Err(KmemError::Layout(format!(
                    "{} at {} (+{}) exceeds record size {}",
                    key, offset, width, size
                )));
            }
        }
        if self.page.size == 0 {
            return Err(KmemError::Layout("page.size must be non-zero".into()));
        }
        if self.pagequeue.first.checked_add(8).map_or(true, |end| end > self.pagequeue.stride) {
            return Err(KmemError::Layout(format!(
                "pagequeue.first at {} exceeds stride {}",
                self.pagequeue.first, self.pagequeue.stride
            )));
        }
        Ok(())
    }

    fn field_mut(&mut self, key: &str) -> Option<&mut usize> {
        let field = match key {
            "page.size" => &mut self.page.size,
            "page.pageq_next" => &mut self.page.pageq_next,
            "page.object" => &mut self.page.object,
            "page.flags" => &mut self.page.flags,
            "page.queue" => &mut self.page.queue,
            "page.act_count" => &mut self.page.act_count,
            "object.size" => &mut self.object.size,
            "object.type" | "object.kind" => &mut self.object.kind,
            "object.handle" => &mut self.object.handle,
            "vnode.size" => &mut self.vnode.size,
            "vnode.v_type" => &mut self.vnode.v_type,
            "vnode.v_data" => &mut self.vnode.v_data,
            "vnode.v_mount" => &mut self.vnode.v_mount,
            "vnode.v_un" => &mut self.vnode.v_un,
            "vnode.v_cache_dst" => &mut self.vnode.v_cache_dst,
            "vnode.v_vflag" => &mut self.vnode.v_vflag,
            "mount.size" => &mut self.mount.size,
            "mount.mnt_vnodecovered" | "mount.vnodecovered" => &mut self.mount.vnodecovered,
            "namecache.size" => &mut self.namecache.size,
            "namecache.nc_dvp" | "namecache.dvp" => &mut self.namecache.dvp,
            "namecache.nc_nlen" | "namecache.nlen" => &mut self.namecache.nlen,
            "namecache.nc_name" | "namecache.name" => &mut self.namecache.name,
            "inode.size" => &mut self.inode.size,
            "inode.i_number" | "inode.number" => &mut self.inode.number,
            "inode.i_nlink" | "inode.nlink" => &mut self.inode.nlink,
            "cdev.size" => &mut self.cdev.size,
            "cdev.si_name" | "cdev.name" => &mut self.cdev.name,
            "cdev.name_len" => &mut self.cdev.name_len,
            "pagequeue.stride" => &mut self.pagequeue.stride,
            "pagequeue.first" => &mut self.pagequeue.first,
            _ => return None,
        };
        Some(field)
    }

    /// Apply `record.field = value` overrides, then validate.
    pub fn apply_overrides<R: BufRead>(&mut self, reader: R) -> KmemResult<()> {
        for (idx, line) in reader.lines().enumerate() {
            let lineno = idx + 1;
            let line = line.map_err(|e| KmemError::Layout(format!("line {}: {}", lineno, e)))?;
            let line = match line.split_once('#') {
                Some((before, _)) => before,
                None => line.as_str(),
            }
            .trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| KmemError::Layout(format!("line {}: expected `key = value`", lineno)))?;
            let key = key.trim();
            let value = parse_offset(value.trim()).ok_or_else(|| {
                KmemError::Layout(format!("line {}: bad value `{}`", lineno, value.trim()))
            })?;
            let field = self
                .field_mut(key)
                .ok_or_else(|| KmemError::Layout(format!("line {}: unknown field `{}`", lineno, key)))?;
            *field = value;
        }
        self.validate()
    }
}

fn parse_offset(s: &str) -> Option<usize> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}
