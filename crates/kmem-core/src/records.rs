//! Kernel records decoded from windows.
//!
//! Each record is a plain owned value copied out of exactly one window
//! (two for a name-cache entry: header, then name). Nothing here keeps a
//! reference into kernel memory; following a pointer means another read.

use crate::addr::KAddr;
use crate::constants::{PG_MARKER, VV_ROOT};
use crate::error::{KmemError, KmemResult};
use crate::layout::KernelLayout;
use crate::source::{with_window, Bytes, MemorySource};

/// Backing store type of a VM object (`objtype_t`)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectKind {
    Default = 0,
    Swap = 1,
    Vnode = 2,
    Device = 3,
    Phys = 4,
    Dead = 5,
    Sg = 6,
}

impl ObjectKind {
    /// Number of kinds
    pub const COUNT: usize = 7;

    /// All kinds in typecode order
    pub const ALL: [ObjectKind; Self::COUNT] = [
        ObjectKind::Default,
        ObjectKind::Swap,
        ObjectKind::Vnode,
        ObjectKind::Device,
        ObjectKind::Phys,
        ObjectKind::Dead,
        ObjectKind::Sg,
    ];

    /// Decode a typecode read from `addr`
    pub fn from_code(addr: KAddr, code: u8) -> KmemResult<Self> {
        Self::ALL
            .get(code as usize)
            .copied()
            .ok_or(KmemError::UnknownObjectKind { addr, code })
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Kernel name of the kind
    pub fn name(self) -> &'static str {
        match self {
            ObjectKind::Default => "OBJT_DEFAULT",
            ObjectKind::Swap => "OBJT_SWAP",
            ObjectKind::Vnode => "OBJT_VNODE",
            ObjectKind::Device => "OBJT_DEVICE",
            ObjectKind::Phys => "OBJT_PHYS",
            ObjectKind::Dead => "OBJT_DEAD",
            ObjectKind::Sg => "OBJT_SG",
        }
    }
}

/// `struct vm_page`, the fields we use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRecord {
    pub next: Option<KAddr>,
    pub object: Option<KAddr>,
    pub flags: u16,
    pub queue: u8,
    pub act_count: u8,
}

impl PageRecord {
    /// Decode one page from `layout.page.size` bytes
    pub fn decode(layout: &KernelLayout, b: Bytes<'_>) -> KmemResult<Self> {
        let l = &layout.page;
        Ok(Self {
            next: b.ptr_at(l.pageq_next)?,
            object: b.ptr_at(l.object)?,
            flags: b.u16_at(l.flags)?,
            queue: b.u8_at(l.queue)?,
            act_count: b.u8_at(l.act_count)?,
        })
    }

    pub fn read<M>(mem: &M, layout: &KernelLayout, addr: KAddr) -> KmemResult<Self>
    where
        M: MemorySource + ?Sized,
    {
        with_window(mem, "vm_page", addr.get(), layout.page.size, |b| {
            Self::decode(layout, b)
        })
    }

    /// Queue scan marker
    #[inline]
    pub fn is_marker(&self) -> bool {
        self.flags & PG_MARKER != 0
    }
}

/// `struct vm_object`, classified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectRecord {
    pub addr: KAddr,
    pub kind: ObjectKind,
    /// Owning vnode; only set for file-backed objects
    pub vnode: Option<KAddr>,
}

impl ObjectRecord {
    pub fn read<M>(mem: &M, layout: &KernelLayout, addr: KAddr) -> KmemResult<Self>
    where
        M: MemorySource + ?Sized,
    {
        let l = &layout.object;
        with_window(mem, "vm_object", addr.get(), l.size, |b| {
            let kind = ObjectKind::from_code(addr, b.u8_at(l.kind)?)?;
            let vnode = match kind {
                ObjectKind::Vnode => b.ptr_at(l.handle)?,
                _ => None,
            };
            Ok(Self { addr, kind, vnode })
        })
    }
}

/// `enum vtype`, the values the path resolver distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VnodeType {
    Regular,
    Directory,
    CharDevice,
    Other(i32),
}

impl VnodeType {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            1 => VnodeType::Regular,
            2 => VnodeType::Directory,
            4 => VnodeType::CharDevice,
            other => VnodeType::Other(other),
        }
    }

    pub fn raw(self) -> i32 {
        match self {
            VnodeType::Regular => 1,
            VnodeType::Directory => 2,
            VnodeType::CharDevice => 4,
            VnodeType::Other(raw) => raw,
        }
    }
}

/// `struct vnode`, the fields we use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VnodeRecord {
    pub addr: KAddr,
    pub vtype: VnodeType,
    pub data: Option<KAddr>,
    pub mount: Option<KAddr>,
    /// `v_un`; the cdev for character devices
    pub rdev: Option<KAddr>,
    /// First name-cache entry naming this vnode
    pub cache_dst: Option<KAddr>,
    pub vflag: u32,
}

impl VnodeRecord {
    pub fn read<M>(mem: &M, layout: &KernelLayout, addr: KAddr) -> KmemResult<Self>
    where
        M: MemorySource + ?Sized,
    {
        let l = &layout.vnode;
        with_window(mem, "vnode", addr.get(), l.size, |b| {
            Ok(Self {
                addr,
                vtype: VnodeType::from_raw(b.i32_at(l.v_type)?),
                data: b.ptr_at(l.v_data)?,
                mount: b.ptr_at(l.v_mount)?,
                rdev: b.ptr_at(l.v_un)?,
                cache_dst: b.ptr_at(l.v_cache_dst)?,
                vflag: b.u32_at(l.v_vflag)?,
            })
        })
    }

    /// Root of the whole namespace or of a mounted filesystem
    #[inline]
    pub fn is_root(&self) -> bool {
        self.vflag & VV_ROOT != 0
    }
}

/// `struct mount`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountRecord {
    /// Vnode this mount covers; `None` for the root filesystem
    pub covered: Option<KAddr>,
}

impl MountRecord {
    pub fn read<M>(mem: &M, layout: &KernelLayout, addr: KAddr) -> KmemResult<Self>
    where
        M: MemorySource + ?Sized,
    {
        let l = &layout.mount;
        with_window(mem, "mount", addr.get(), l.size, |b| {
            Ok(Self {
                covered: b.ptr_at(l.vnodecovered)?,
            })
        })
    }
}

/// `struct namecache`: the link naming a vnode from its parent directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameCacheLink {
    pub parent: Option<KAddr>,
    pub name: Vec<u8>,
}

impl NameCacheLink {
    pub fn read<M>(mem: &M, layout: &KernelLayout, addr: KAddr) -> KmemResult<Self>
    where
        M: MemorySource + ?Sized,
    {
        let l = &layout.namecache;
        let (parent, nlen) = with_window(mem, "namecache", addr.get(), l.size, |b| {
            Ok((b.ptr_at(l.dvp)?, b.u8_at(l.nlen)?))
        })?;
        let name = match nlen {
            0 => Vec::new(),
            n => with_window(
                mem,
                "namecache.nc_name",
                addr.add(l.name as u64).get(),
                n as usize,
                |b| Ok(b.as_slice().to_vec()),
            )?,
        };
        Ok(Self { parent, name })
    }
}

/// UFS `struct inode`, the fields we use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InodeRecord {
    pub number: u32,
    pub nlink: i16,
}

impl InodeRecord {
    pub fn read<M>(mem: &M, layout: &KernelLayout, addr: KAddr) -> KmemResult<Self>
    where
        M: MemorySource + ?Sized,
    {
        let l = &layout.inode;
        with_window(mem, "inode", addr.get(), l.size, |b| {
            Ok(Self {
                number: b.u32_at(l.number)?,
                nlink: b.i16_at(l.nlink)?,
            })
        })
    }
}

/// The inline device name of a `struct cdev`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdevName(pub Vec<u8>);

impl CdevName {
    pub fn read<M>(mem: &M, layout: &KernelLayout, addr: KAddr) -> KmemResult<Self>
    where
        M: MemorySource + ?Sized,
    {
        let l = &layout.cdev;
        with_window(mem, "cdev", addr.get(), l.size, |b| {
            let raw = b.slice(l.name, l.name_len)?;
            let end = raw.iter().position(|&c| c == 0).unwrap_or(raw.len());
            Ok(Self(raw[..end].to_vec()))
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}
