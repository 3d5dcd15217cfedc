//! Synthetic kernels for unit tests.

use kmem_core::symbols::{VM_PAGE_ARRAY, VM_PAGE_ARRAY_SIZE, VM_PAGE_QUEUES};
use kmem_core::{KAddr, KernelLayout};
use kmem_module::{MapFileSymbols, SparseImage};

pub const VREG: i32 = 1;
pub const VDIR: i32 = 2;
pub const VCHR: i32 = 4;
pub const VLNK: i32 = 5;

/// One page of a synthetic page array or queue
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub object: Option<KAddr>,
    pub queue: u8,
    pub act_count: u8,
    pub marker: bool,
}

impl Page {
    pub fn new(object: Option<KAddr>, queue: u8) -> Self {
        Self {
            object,
            queue,
            act_count: 0,
            marker: false,
        }
    }

    pub fn act(mut self, act_count: u8) -> Self {
        self.act_count = act_count;
        self
    }

    pub fn marker(mut self) -> Self {
        self.marker = true;
        self
    }
}

pub struct KernelBuilder {
    pub image: SparseImage,
    pub layout: KernelLayout,
    pub symbols: MapFileSymbols,
}

impl KernelBuilder {
    pub fn new() -> Self {
        Self {
            image: SparseImage::new(),
            layout: KernelLayout::default(),
            symbols: MapFileSymbols::default(),
        }
    }

    pub fn vnode(&mut self, vtype: i32, root: bool) -> KAddr {
        let l = self.layout.vnode.clone();
        let vp = self.image.alloc(l.size);
        self.image.write_i32(vp.get() + l.v_type as u64, vtype);
        if root {
            self.image.write_u32(vp.get() + l.v_vflag as u64, kmem_core::constants::VV_ROOT);
        }
        vp
    }

    pub fn mount(&mut self, covered: Option<KAddr>) -> KAddr {
        let l = self.layout.mount.clone();
        let mp = self.image.alloc(l.size);
        self.image.write_ptr(mp.get() + l.vnodecovered as u64, covered);
        mp
    }

    pub fn set_mount(&mut self, vp: KAddr, mp: KAddr) {
        let off = self.layout.vnode.v_mount as u64;
        self.image.write_ptr(vp.get() + off, Some(mp));
    }

    /// Name `vp` as `name` inside directory `parent`
    pub fn name(&mut self, vp: KAddr, parent: KAddr, name: impl AsRef<[u8]>) -> KAddr {
        let name = name.as_ref();
        let l = self.layout.namecache.clone();
        let ncp = self.image.alloc(l.name.max(l.size) + name.len() + 1);
        self.image.write_ptr(ncp.get() + l.dvp as u64, Some(parent));
        self.image.write_u8(ncp.get() + l.nlen as u64, name.len() as u8);
        self.image.write(ncp.get() + l.name as u64, name);
        let dst = self.layout.vnode.v_cache_dst as u64;
        self.image.write_ptr(vp.get() + dst, Some(ncp));
        ncp
    }

    pub fn inode(&mut self, vp: KAddr, number: u32, nlink: i16) -> KAddr {
        let l = self.layout.inode.clone();
        let ip = self.image.alloc(l.size);
        self.image.write_u32(ip.get() + l.number as u64, number);
        self.image.write_i16(ip.get() + l.nlink as u64, nlink);
        let data = self.layout.vnode.v_data as u64;
        self.image.write_ptr(vp.get() + data, Some(ip));
        ip
    }

    pub fn cdev(&mut self, vp: KAddr, name: &str) -> KAddr {
        let l = self.layout.cdev.clone();
        let dev = self.image.alloc(l.size);
        self.image.write(dev.get() + l.name as u64, name.as_bytes());
        let un = self.layout.vnode.v_un as u64;
        self.image.write_ptr(vp.get() + un, Some(dev));
        dev
    }

    pub fn object(&mut self, code: u8, handle: Option<KAddr>) -> KAddr {
        let l = self.layout.object.clone();
        let obj = self.image.alloc(l.size);
        self.image.write_u8(obj.get() + l.kind as u64, code);
        self.image.write_ptr(obj.get() + l.handle as u64, handle);
        obj
    }

    fn write_page(&mut self, addr: u64, page: &Page, next: Option<KAddr>) {
        let l = self.layout.page.clone();
        self.image.write_ptr(addr + l.pageq_next as u64, next);
        self.image.write_ptr(addr + l.object as u64, page.object);
        self.image.write_u8(addr + l.queue as u64, page.queue);
        self.image.write_u8(addr + l.act_count as u64, page.act_count);
        if page.marker {
            self.image
                .write_u16(addr + l.flags as u64, kmem_core::constants::PG_MARKER);
        }
    }

    fn symbol_cell(&mut self, name: &str, value: u64) {
        let cell = self.image.alloc(8);
        self.image.write_u64(cell.get(), value);
        self.symbols.insert(name, cell);
    }

    /// Lay out `vm_page_array` and its size cell
    pub fn page_array(&mut self, pages: &[Page]) -> Option<KAddr> {
        let size = self.layout.page.size;
        let base = if pages.is_empty() {
            None
        } else {
            let base = self.image.alloc(size * pages.len());
            for (i, page) in pages.iter().enumerate() {
                self.write_page(base.get() + (i * size) as u64, page, None);
            }
            Some(base)
        };
        self.symbol_cell(VM_PAGE_ARRAY, base.map_or(0, KAddr::get));
        self.symbol_cell(VM_PAGE_ARRAY_SIZE, pages.len() as u64);
        base
    }

    /// Lay out `vm_page_queues` with `pages` linked on queue `queue`
    pub fn page_queue(&mut self, queue: u8, pages: &[Page]) -> Vec<KAddr> {
        let size = self.layout.page.size;
        let addrs: Vec<KAddr> = pages.iter().map(|_| self.image.alloc(size)).collect();
        for (i, page) in pages.iter().enumerate() {
            let next = addrs.get(i + 1).copied();
            self.write_page(addrs[i].get(), page, next);
        }
        let q = self.layout.pagequeue.clone();
        let heads = self.image.alloc(q.stride * 3);
        let head = heads.get() + (q.stride * queue as usize + q.first) as u64;
        self.image.write_ptr(head, addrs.first().copied());
        self.symbols.insert(VM_PAGE_QUEUES, heads);
        addrs
    }

    /// Link the last page of a queue back to `to`
    pub fn link(&mut self, from: KAddr, to: KAddr) {
        let off = self.layout.page.pageq_next as u64;
        self.image.write_ptr(from.get() + off, Some(to));
    }

    pub fn array_size_symbol(&mut self, n: u64) {
        self.symbol_cell(VM_PAGE_ARRAY_SIZE, n);
    }
}

/// Root filesystem: `/` plus a chain of directories/files under it
pub struct Tree {
    pub root: KAddr,
    pub mount: KAddr,
}

impl Tree {
    pub fn new(k: &mut KernelBuilder) -> Self {
        let mount = k.mount(None);
        let root = k.vnode(VDIR, true);
        k.set_mount(root, mount);
        Self { root, mount }
    }

    /// Create `name` of `vtype` under `parent`, with a name-cache entry
    pub fn child(&self, k: &mut KernelBuilder, parent: KAddr, name: &str, vtype: i32) -> KAddr {
        let vp = k.vnode(vtype, false);
        k.set_mount(vp, self.mount);
        k.name(vp, parent, name);
        vp
    }

    /// Create a vnode with no name-cache entry
    pub fn nameless(&self, k: &mut KernelBuilder, vtype: i32) -> KAddr {
        let vp = k.vnode(vtype, false);
        k.set_mount(vp, self.mount);
        vp
    }
}
