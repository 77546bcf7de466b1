mod common;

use common::{Arena, PAGE};
use kernel_alloc::MemoryManager;
use kernel_alloc::RegionKind;
use kernel_alloc::phys_mapper::IdentityMapper;
use kernel_alloc::vmm::{IdentityWindow, KernelLayout, KernelSpace};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};
use kernel_sync::hart::ThreadHart;
use kernel_vmem::{AddressSpace, Mmu, PteFlags};
use std::cell::Cell;
use std::sync::{Arc, Barrier};
use std::thread;

const MMIO: u64 = 0x1000_0000;
const RAM: u64 = 0x8000_0000;

fn small_layout() -> KernelLayout {
    KernelLayout {
        mmio: IdentityWindow::new(MMIO, 4 * PAGE, PteFlags::KERNEL_RW),
        ram: IdentityWindow::new(RAM, 16 * PAGE, PteFlags::KERNEL_RWX),
    }
}

#[derive(Default)]
struct RecordingMmu {
    root: Cell<Option<PhysicalPage<Size4K>>>,
    flushes: Cell<usize>,
}

impl Mmu for RecordingMmu {
    unsafe fn set_root(&self, root: PhysicalPage<Size4K>) {
        self.root.set(Some(root));
    }

    fn flush_all(&self) {
        self.flushes.set(self.flushes.get() + 1);
    }
}

fn va(v: u64) -> VirtualAddress {
    VirtualAddress::new(v)
}

fn pa(v: u64) -> PhysicalAddress {
    PhysicalAddress::new(v)
}

type Memory = MemoryManager<IdentityMapper, ThreadHart>;

fn memory(arena: &mut Arena) -> Memory {
    let layout = arena.layout(8);
    unsafe { Memory::new(IdentityMapper, layout, small_layout()) }.unwrap()
}

#[test]
fn windows_are_identity_mapped() {
    let mut arena = Arena::new(16);
    let frames = arena.frames(8);

    let space = KernelSpace::init(&frames, &small_layout());
    // root + (L1, L0) per window
    assert_eq!(frames.free_count(RegionKind::Kernel), 8 - 5);
    assert_eq!(frames.free_count(RegionKind::User), 8);

    let mut walker = unsafe { space.address_space(frames.mapper()) };
    let last = RAM + 15 * PAGE;
    assert_eq!(walker.query(va(MMIO + 0x123)), Some(pa(MMIO + 0x123)));
    assert_eq!(walker.query(va(last)), Some(pa(last)));
    assert!(walker.query(va(MMIO + 4 * PAGE)).is_none());
    assert!(walker.query(va(RAM + 16 * PAGE)).is_none());

    let mmio = walker.get_entry(va(MMIO), None).unwrap().flags();
    assert!(mmio.valid() && mmio.readable() && mmio.writable() && !mmio.executable());
    let ram = walker.get_entry(va(RAM), None).unwrap().flags();
    assert!(ram.valid() && ram.readable() && ram.writable() && ram.executable());

    assert_eq!(walker.dump(), 20);
}

#[test]
fn default_layout_fits_in_kernel_region() {
    let mut arena = Arena::new(260);
    let frames = arena.frames(256);

    let space = KernelSpace::init(&frames, &KernelLayout::default());

    // 1 root, 2 L1 tables, 128 + 64 L0 tables for 256 MiB + 128 MiB.
    assert_eq!(frames.free_count(RegionKind::Kernel), 256 - 195);

    let walker = unsafe { space.address_space(frames.mapper()) };
    assert_eq!(walker.query(va(0x1000_0000)), Some(pa(0x1000_0000)));
    assert_eq!(walker.query(va(0x1fff_ffff)), Some(pa(0x1fff_ffff)));
    assert!(walker.query(va(0x2000_0000)).is_none());
    assert_eq!(walker.query(va(0x87ff_f000)), Some(pa(0x87ff_f000)));
    assert!(walker.query(va(0x8800_0000)).is_none());
    assert_eq!(walker.dump(), (0x1000_0000 + 128 * 1024 * 1024) / 4096);
}

#[test]
fn unmap_with_release_returns_frame_to_kernel_region() {
    let mut arena = Arena::new(16);
    let frames = arena.frames(8);
    let mut space = AddressSpace::new(frames.mapper(), &frames).unwrap();

    let data = frames.alloc(RegionKind::Kernel).unwrap();
    let data_page = data.page();
    let rw = PteFlags::KERNEL_RW;
    space.map_range(va(0x4000_0000), data.base(), PAGE, rw, &frames);
    let _ = data.into_page();
    let before = frames.free_count(RegionKind::Kernel);
    assert_eq!(before, 8 - 4);

    space.unmap_range(va(0x4000_0000), PAGE, Some(&frames));

    assert_eq!(frames.free_count(RegionKind::Kernel), before + 1);
    assert!(space.query(va(0x4000_0000)).is_none());
    let again = frames.alloc(RegionKind::Kernel).unwrap();
    assert_eq!(again.page(), data_page);
    frames.free(again, RegionKind::Kernel);
}

#[test]
#[should_panic(expected = "init_kernel_space")]
fn missing_root_frame_is_fatal() {
    let mut arena = Arena::new(2);
    let frames = arena.frames(1);
    let hog = kernel_vmem::FrameAlloc::alloc_frame(&frames).unwrap();
    let _ = KernelSpace::init(&frames, &small_layout());
    drop(hog);
}

#[test]
#[should_panic(expected = "out of memory")]
fn exhausted_kernel_region_is_fatal() {
    let mut arena = Arena::new(8);
    let frames = arena.frames(3);
    let _ = KernelSpace::init(&frames, &small_layout());
}

#[test]
fn memory_manager_builds_kernel_space_once() {
    let threads = 8;
    let mut arena = Arena::new(16);
    let memory = Arc::new(memory(&mut arena));
    assert!(memory.kernel_space().is_none());

    let start = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let memory = Arc::clone(&memory);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                memory.init_kernel_space().root_page()
            })
        })
        .collect();
    let roots: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(roots.iter().all(|r| *r == roots[0]));
    let root = memory.kernel_space().map(KernelSpace::root_page);
    assert_eq!(root, Some(roots[0]));
    assert_eq!(memory.frames().free_count(RegionKind::Kernel), 8 - 5);
}

#[test]
fn activation_installs_kernel_root() {
    let mut arena = Arena::new(16);
    let memory = memory(&mut arena);
    let mmu = RecordingMmu::default();

    unsafe { memory.activate_on_this_hart(&mmu) };
    unsafe { memory.activate_on_this_hart(&mmu) };

    let root = memory.kernel_space().unwrap().root_page();
    assert_eq!(mmu.root.get(), Some(root));
    assert_eq!(mmu.flushes.get(), 2);
    assert_eq!(memory.frames().free_count(RegionKind::Kernel), 8 - 5);
}
