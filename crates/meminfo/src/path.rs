//! Path reconstruction for vnodes.
//!
//! The kernel keeps no path strings. A vnode is named, if at all, by a
//! name-cache entry that points at its parent directory's vnode, which is
//! named the same way, up to the root of its filesystem. A mounted
//! filesystem's root is reached through the mount's covered vnode in the
//! parent filesystem.
//!
//! `PathResolver` walks those links parent-first so the string comes out
//! root to leaf. Vnodes the name cache has forgotten get a placeholder
//! segment instead of failing the report:
//!
//! ```text
//! /usr/lib/libc.so.7                   name cache hit all the way up
//! /var/(no cached name for inode=1234) regular file or directory, still linked
//! /tmp/(deleted inode=99)              link count zero
//! /ttyv0 (cdev)                        character device
//! ```

use kmem_core::error::{KmemError, KmemResult};
use kmem_core::{
    CdevName, InodeRecord, KAddr, KernelLayout, MemorySource, MountRecord, NameCacheLink,
    VnodeRecord, VnodeType,
};

/// Name-cache hops followed before the walk gives up on a chain
pub const MAX_PATH_DEPTH: usize = 512;

/// Fixed-capacity path string.
///
/// Appends that do not fit are cut at the last whole character that does;
/// the buffer never grows past its capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathBuffer {
    buf: String,
    capacity: usize,
    truncated: bool,
}

impl PathBuffer {
    /// Buffer for a C path of `path_max` bytes (NUL included)
    pub fn new(path_max: usize) -> Self {
        let capacity = path_max.saturating_sub(1);
        Self {
            buf: String::with_capacity(capacity),
            capacity,
            truncated: false,
        }
    }

    /// Append `s`. Returns the length it wanted to write, like `snprintf`.
    pub fn push(&mut self, s: &str) -> usize {
        let room = self.capacity - self.buf.len();
        if s.len() <= room {
            self.buf.push_str(s);
        } else {
            let mut end = room;
            while !s.is_char_boundary(end) {
                end -= 1;
            }
            self.buf.push_str(&s[..end]);
            self.truncated = true;
        }
        s.len()
    }

    /// Append `"/" + name`, with bytes that are not UTF-8 written as `\xNN`
    pub fn push_segment(&mut self, name: &[u8]) -> usize {
        self.push(&format!("/{}", escape_name(name)))
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Whether any append was cut short
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn into_string(self) -> String {
        self.buf
    }
}

/// Kernel names are raw bytes. Valid UTF-8 runs are kept as they are;
/// every other byte becomes `\xNN`, so no byte is lost or merged.
pub fn escape_name(name: &[u8]) -> String {
    let mut out = String::with_capacity(name.len());
    for chunk in name.utf8_chunks() {
        out.push_str(chunk.valid());
        for byte in chunk.invalid() {
            out.push_str(&format!("\\x{:02x}", byte));
        }
    }
    out
}

/// Rebuilds absolute paths through a memory source.
pub struct PathResolver<'a, M: ?Sized> {
    mem: &'a M,
    layout: &'a KernelLayout,
}

impl<'a, M> PathResolver<'a, M>
where
    M: MemorySource + ?Sized,
{
    pub fn new(mem: &'a M, layout: &'a KernelLayout) -> Self {
        Self { mem, layout }
    }

    /// Absolute path of `vp`, at most `path_max - 1` bytes long.
    pub fn full_path(&self, vp: KAddr, path_max: usize) -> KmemResult<PathBuffer> {
        let mut buf = PathBuffer::new(path_max);
        self.build_path(vp, &mut buf)?;
        if buf.is_empty() {
            buf.push("/");
        }
        if buf.truncated() {
            log::warn!("path of vnode {} truncated to {} bytes", vp, buf.len());
        }
        Ok(buf)
    }

    /// Append the path of `vp` to `buf`: the covered vnode's segments
    /// first, when `vp` lives on a mounted filesystem, then its own.
    pub fn build_path(&self, vp: KAddr, buf: &mut PathBuffer) -> KmemResult<()> {
        let vnode = VnodeRecord::read(self.mem, self.layout, vp)?;
        let mp = vnode.mount.ok_or(KmemError::InvalidAddress {
            what: "vnode.v_mount",
        })?;
        let mount = MountRecord::read(self.mem, self.layout, mp)?;
        if let Some(covered) = mount.covered {
            let covered = VnodeRecord::read(self.mem, self.layout, covered)?;
            self.append_component(&covered, buf, 0)?;
        }
        self.append_component(&vnode, buf, 0)
    }

    fn append_component(
        &self,
        vnode: &VnodeRecord,
        buf: &mut PathBuffer,
        depth: usize,
    ) -> KmemResult<()> {
        if vnode.is_root() {
            return Ok(());
        }
        if depth >= MAX_PATH_DEPTH {
            log::warn!("name cache chain at vnode {} deeper than {}", vnode.addr, MAX_PATH_DEPTH);
            return Ok(());
        }

        let Some(ncp) = vnode.cache_dst else {
            return self.append_placeholder(vnode, buf);
        };
        let link = NameCacheLink::read(self.mem, self.layout, ncp)?;
        let parent = link.parent.ok_or(KmemError::InvalidAddress {
            what: "namecache.nc_dvp",
        })?;
        let parent = VnodeRecord::read(self.mem, self.layout, parent)?;
        self.append_component(&parent, buf, depth + 1)?;
        buf.push_segment(&link.name);
        Ok(())
    }

    fn append_placeholder(&self, vnode: &VnodeRecord, buf: &mut PathBuffer) -> KmemResult<()> {
        match vnode.vtype {
            VnodeType::Regular | VnodeType::Directory => {
                let ip = vnode.data.ok_or(KmemError::InvalidAddress { what: "vnode.v_data" })?;
                let inode = InodeRecord::read(self.mem, self.layout, ip)?;
                let state = if inode.nlink != 0 {
                    "no cached name for"
                } else {
                    "deleted"
                };
                log::debug!("vnode {}: {} inode {}", vnode.addr, state, inode.number);
                buf.push(&format!("/({} inode={})", state, inode.number));
            }
            VnodeType::CharDevice => {
                let dev = vnode.rdev.ok_or(KmemError::InvalidAddress { what: "vnode.v_un" })?;
                let name = CdevName::read(self.mem, self.layout, dev)?;
                buf.push(&format!("/{} (cdev)", escape_name(name.as_bytes())));
            }
            VnodeType::Other(vtype) => {
                return Err(KmemError::UnknownNodeType {
                    addr: vnode.addr,
                    vtype,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{KernelBuilder, Tree, VCHR, VDIR, VLNK, VREG};
    use kmem_core::constants::MAXPATHLEN;

    fn path_of(k: &KernelBuilder, vp: KAddr) -> String {
        PathResolver::new(&k.image, &k.layout)
            .full_path(vp, MAXPATHLEN)
            .unwrap()
            .into_string()
    }

    #[test]
    fn test_buffer_push_within_capacity() {
        let mut buf = PathBuffer::new(8);
        assert_eq!(buf.push("/usr"), 4);
        assert_eq!(buf.push("/lib"), 4);
        assert_eq!(buf.as_str(), "/usr/li");
        assert!(buf.truncated());
        assert_eq!(buf.push("/x"), 2);
        assert_eq!(buf.len(), 7);
    }

    #[test]
    fn test_buffer_cuts_at_char_boundary() {
        let mut buf = PathBuffer::new(5);
        buf.push("/é");
        buf.push("é");
        assert_eq!(buf.as_str(), "/é");
        assert!(buf.truncated());
    }

    #[test]
    fn test_escape_name() {
        assert_eq!(escape_name(b"libc.so.7"), "libc.so.7");
        assert_eq!(escape_name("café".as_bytes()), "café");
        assert_eq!(escape_name(b"caf\xe9"), "caf\\xe9");
        assert_eq!(escape_name(b"\xff\xfe"), "\\xff\\xfe");
    }

    #[test]
    fn test_non_utf8_name_escaped() {
        let mut k = KernelBuilder::new();
        let t = Tree::new(&mut k);
        let f = k.vnode(VREG, false);
        k.set_mount(f, t.mount);
        k.name(f, t.root, b"caf\xe9");
        let path = path_of(&k, f);
        assert_eq!(path, "/caf\\xe9");
        assert_eq!(path.len(), 8);
    }

    #[test]
    fn test_chain_resolves_root_to_leaf() {
        let mut k = KernelBuilder::new();
        let t = Tree::new(&mut k);
        let a = t.child(&mut k, t.root, "a", VDIR);
        let b = t.child(&mut k, a, "b", VDIR);
        let c = t.child(&mut k, b, "c", VREG);
        assert_eq!(path_of(&k, c), "/a/b/c");
        assert_eq!(path_of(&k, b), "/a/b");
    }

    #[test]
    fn test_root_vnode_is_slash() {
        let mut k = KernelBuilder::new();
        let t = Tree::new(&mut k);
        assert_eq!(path_of(&k, t.root), "/");
    }

    #[test]
    fn test_mounted_filesystem_prefixed_by_covered_vnode() {
        let mut k = KernelBuilder::new();
        let t = Tree::new(&mut k);
        let mnt = t.child(&mut k, t.root, "mnt", VDIR);
        let mp = k.mount(Some(mnt));
        let froot = k.vnode(VDIR, true);
        k.set_mount(froot, mp);
        let file = k.vnode(VREG, false);
        k.set_mount(file, mp);
        k.name(file, froot, "data.bin");
        assert_eq!(path_of(&k, file), "/mnt/data.bin");
        assert_eq!(path_of(&k, froot), "/mnt");
    }

    #[test]
    fn test_uncached_linked_file_placeholder() {
        let mut k = KernelBuilder::new();
        let t = Tree::new(&mut k);
        let f = t.nameless(&mut k, VREG);
        k.inode(f, 1234, 1);
        assert_eq!(path_of(&k, f), "/(no cached name for inode=1234)");
    }

    #[test]
    fn test_deleted_file_placeholder() {
        let mut k = KernelBuilder::new();
        let t = Tree::new(&mut k);
        let d = t.nameless(&mut k, VDIR);
        k.inode(d, 99, 0);
        let path = path_of(&k, d);
        assert!(path.contains("deleted"));
        assert!(path.contains("99"));
        assert_eq!(path, "/(deleted inode=99)");
    }

    #[test]
    fn test_placeholder_under_named_parent() {
        let mut k = KernelBuilder::new();
        let t = Tree::new(&mut k);
        let tmp = t.child(&mut k, t.root, "tmp", VDIR);
        let f = t.nameless(&mut k, VREG);
        k.inode(f, 7, 0);
        let g = t.child(&mut k, tmp, "kept", VREG);
        assert_eq!(path_of(&k, f), "/(deleted inode=7)");
        assert_eq!(path_of(&k, g), "/tmp/kept");
    }

    #[test]
    fn test_cdev_placeholder() {
        let mut k = KernelBuilder::new();
        let t = Tree::new(&mut k);
        let dev = t.nameless(&mut k, VCHR);
        k.cdev(dev, "ttyv0");
        assert_eq!(path_of(&k, dev), "/ttyv0 (cdev)");
    }

    #[test]
    fn test_unknown_node_type_is_fatal() {
        let mut k = KernelBuilder::new();
        let t = Tree::new(&mut k);
        let lnk = t.nameless(&mut k, VLNK);
        let err = PathResolver::new(&k.image, &k.layout)
            .full_path(lnk, MAXPATHLEN)
            .unwrap_err();
        assert!(matches!(err, KmemError::UnknownNodeType { vtype: 5, addr } if addr == lnk));
    }

    #[test]
    fn test_long_chain_is_truncated_not_overflowed() {
        let mut k = KernelBuilder::new();
        let t = Tree::new(&mut k);
        let segment = "x".repeat(200);
        let mut vp = t.root;
        for _ in 0..12 {
            vp = t.child(&mut k, vp, &segment, VDIR);
        }
        let buf = PathResolver::new(&k.image, &k.layout)
            .full_path(vp, MAXPATHLEN)
            .unwrap();
        assert!(buf.truncated());
        assert!(buf.len() <= MAXPATHLEN);
        assert_eq!(buf.len(), MAXPATHLEN - 1);
        assert!(buf.as_str().starts_with(&format!("/{}/", segment)));
    }

    #[test]
    fn test_name_cache_cycle_is_bounded() {
        let mut k = KernelBuilder::new();
        let t = Tree::new(&mut k);
        let a = t.nameless(&mut k, VDIR);
        let b = t.nameless(&mut k, VDIR);
        k.name(a, b, "a");
        k.name(b, a, "b");
        let buf = PathResolver::new(&k.image, &k.layout)
            .full_path(a, MAXPATHLEN)
            .unwrap();
        assert!(buf.len() < MAXPATHLEN);
        assert!(buf.as_str().starts_with("/b/a/b/a"));
    }

    #[test]
    fn test_missing_mount_is_invalid_address() {
        let mut k = KernelBuilder::new();
        let vp = k.vnode(VREG, false);
        let err = PathResolver::new(&k.image, &k.layout)
            .full_path(vp, MAXPATHLEN)
            .unwrap_err();
        assert!(matches!(err, KmemError::InvalidAddress { what: "vnode.v_mount" }));
    }
}
