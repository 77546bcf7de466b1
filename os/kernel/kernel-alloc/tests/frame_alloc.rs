mod common;

use common::Arena;
use kernel_alloc::phys_mapper::IdentityMapper;
use kernel_alloc::{FrameAllocator, LayoutError, RegionKind};
use kernel_sync::Hart;
use kernel_sync::hart::ThreadHart;
use kernel_vmem::{Frame, FrameAlloc};
use std::collections::HashSet;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

#[test]
fn four_page_region() {
    let mut arena = Arena::new(4);
    let frames = arena.frames(4);
    assert_eq!(frames.free_count(RegionKind::Kernel), 4);
    assert_eq!(frames.free_count(RegionKind::User), 0);

    let a = frames.alloc(RegionKind::Kernel).unwrap();
    let b = frames.alloc(RegionKind::Kernel).unwrap();
    let c = frames.alloc(RegionKind::Kernel).unwrap();
    assert_ne!(a.page(), b.page());
    assert_ne!(b.page(), c.page());
    assert_ne!(a.page(), c.page());

    // LIFO: the freed frame comes straight back.
    let b_page = b.page();
    frames.free(b, RegionKind::Kernel);
    let b2 = frames.alloc(RegionKind::Kernel).unwrap();
    assert_eq!(b2.page(), b_page);

    let d = frames.alloc(RegionKind::Kernel).unwrap();
    assert!(frames.alloc(RegionKind::Kernel).is_none());
    assert_eq!(frames.free_count(RegionKind::Kernel), 0);

    for f in [a, b2, c, d] {
        frames.free(f, RegionKind::Kernel);
    }
    assert_eq!(frames.free_count(RegionKind::Kernel), 4);
}

#[test]
fn highest_frame_is_handed_out_first() {
    let mut arena = Arena::new(3);
    let frames = arena.frames(3);
    for expected in [2, 1, 0] {
        let frame = frames.alloc(RegionKind::Kernel).unwrap();
        assert_eq!(frame.base(), arena.page(expected));
    }
}

#[test]
fn regions_are_disjoint_and_independent() {
    let mut arena = Arena::new(10);
    let frames = arena.frames(4);

    let kernel = frames.region(RegionKind::Kernel);
    let user = frames.region(RegionKind::User);
    assert_eq!((kernel.start, kernel.end), (arena.page(0), arena.page(4)));
    assert_eq!((user.start, user.end), (arena.page(4), arena.page(10)));
    assert_eq!((kernel.total, kernel.free), (4, 4));
    assert_eq!((user.total, user.free), (6, 6));

    let mut held = Vec::new();
    while let Some(f) = frames.alloc(RegionKind::Kernel) {
        assert!(f.base() >= kernel.start && f.base() < kernel.end);
        held.push(f);
    }
    assert_eq!(held.len(), 4);

    // Kernel exhaustion does not touch the user region.
    let u = frames.alloc(RegionKind::User).unwrap();
    assert!(u.base() >= user.start && u.base() < user.end);
    assert_eq!(frames.free_count(RegionKind::User), 5);

    frames.free(u, RegionKind::User);
    for f in held {
        frames.free(f, RegionKind::Kernel);
    }
    assert_eq!(frames.region(RegionKind::Kernel).free, 4);
    assert_eq!(frames.region(RegionKind::User).free, 6);
}

#[test]
fn free_count_tracks_outstanding_frames() {
    let mut arena = Arena::new(16);
    let frames = arena.frames(8);

    let mut held = Vec::new();
    for i in 1..=5 {
        held.push(frames.alloc(RegionKind::User).unwrap());
        assert_eq!(frames.free_count(RegionKind::User), 8 - i);
    }
    for (i, f) in held.drain(..).enumerate() {
        frames.free(f, RegionKind::User);
        assert_eq!(frames.free_count(RegionKind::User), 4 + i as u64);
    }
    assert_eq!(frames.free_count(RegionKind::Kernel), 8);
}

#[test]
fn page_tables_come_from_the_kernel_region() {
    let mut arena = Arena::new(6);
    let frames = arena.frames(2);

    let f = frames.alloc_frame().unwrap();
    assert!(f.base() < arena.page(2));
    assert_eq!(frames.free_count(RegionKind::Kernel), 1);
    frames.free_frame(f);
    assert_eq!(frames.free_count(RegionKind::Kernel), 2);
    assert_eq!(frames.free_count(RegionKind::User), 4);
}

#[test]
fn unaligned_begin_is_rounded_up() {
    let mut arena = Arena::new(4);
    let layout = arena.layout(2);
    let shifted = kernel_alloc::PhysLayout {
        alloc_begin: layout.alloc_begin + 8,
        ..layout
    };
    let frames = unsafe { FrameAllocator::<_, ThreadHart>::new(IdentityMapper, shifted) }.unwrap();

    let kernel = frames.region(RegionKind::Kernel);
    assert_eq!((kernel.start, kernel.end), (arena.page(1), arena.page(3)));
    assert_eq!(frames.region(RegionKind::User).total, 1);
}

#[test]
fn invalid_layouts_are_rejected() {
    let mut arena = Arena::new(2);
    let layout = arena.layout(3);
    let err = unsafe { FrameAllocator::<_, ThreadHart>::new(IdentityMapper, layout) }.err();
    assert!(matches!(err, Some(LayoutError::KernelRegionPastEnd { pages: 3, .. })));

    let layout = layout.with_kernel_pages(0);
    let err = unsafe { FrameAllocator::<_, ThreadHart>::new(IdentityMapper, layout) }.err();
    assert_eq!(err, Some(LayoutError::EmptyKernelRegion));
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "is not part of the User region")]
fn freeing_into_the_wrong_region_is_caught() {
    let mut arena = Arena::new(4);
    let frames = arena.frames(2);
    let f = frames.alloc(RegionKind::Kernel).unwrap();
    frames.free(f, RegionKind::User);
}

#[test]
fn region_lock_is_released_after_each_call() {
    let mut arena = Arena::new(2);
    let frames = arena.frames(1);
    let f = frames.alloc(RegionKind::Kernel).unwrap();
    frames.free(f, RegionKind::Kernel);
    assert!(ThreadHart::interrupts_enabled());
}

#[test]
fn concurrent_alloc_free_never_double_issues() {
    let threads = 8;
    let rounds = 500;
    let batch = 4;

    let mut arena = Arena::new(64);
    let frames = Arc::new(arena.frames(32));
    let live = Arc::new(Mutex::new(HashSet::new()));
    let start = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let frames = Arc::clone(&frames);
            let live = Arc::clone(&live);
            let start = Arc::clone(&start);
            let kind = if t % 2 == 0 { RegionKind::Kernel } else { RegionKind::User };
            thread::spawn(move || {
                start.wait();
                for _ in 0..rounds {
                    let mut held: Vec<Frame> = Vec::with_capacity(batch);
                    for _ in 0..batch {
                        if let Some(f) = frames.alloc(kind) {
                            let fresh = live.lock().unwrap().insert(f.page());
                            assert!(fresh, "frame issued twice");
                            held.push(f);
                        }
                    }
                    for f in held {
                        assert!(live.lock().unwrap().remove(&f.page()));
                        frames.free(f, kind);
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(frames.free_count(RegionKind::Kernel), 32);
    assert_eq!(frames.free_count(RegionKind::User), 32);
    assert!(live.lock().unwrap().is_empty());

    // Every frame is still reachable exactly once.
    let mut seen = HashSet::new();
    while let Some(f) = frames.alloc(RegionKind::Kernel) {
        assert!(seen.insert(f.into_page()));
    }
    while let Some(f) = frames.alloc(RegionKind::User) {
        assert!(seen.insert(f.into_page()));
    }
    assert_eq!(seen.len(), 64);
}
