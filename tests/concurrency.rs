use std::collections::HashSet;
use std::sync::Mutex;
use std::thread;

use d3d12_descriptor_pool::{
    DescriptorHeap, DescriptorHeapError, ShaderVisibleResourceHeap, SoftwareDevice,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn shared_descriptor_is_reclaimed_exactly_once() {
    init_logger();
    let heap = DescriptorHeap::<ShaderVisibleResourceHeap>::new(&SoftwareDevice::new(), 2).unwrap();

    for _ in 0..16 {
        let descriptor = heap.allocate_descriptor().unwrap();
        let id = descriptor.id();

        thread::scope(|s| {
            for _ in 0..8 {
                let local = descriptor.clone();
                s.spawn(move || {
                    for _ in 0..1000 {
                        let extra = local.clone();
                        assert!(extra.ref_count() >= 2);
                        drop(extra);
                    }
                });
            }
        });

        assert_eq!(descriptor.ref_count(), 1);
        assert!(heap.is_live(id));
        drop(descriptor);

        assert!(!heap.is_live(id));
        assert_eq!(heap.allocated(), 0);
        assert_eq!(heap.available(), 2);
    }
}

#[test]
fn concurrent_allocations_never_share_a_slot() {
    init_logger();
    const CAPACITY: usize = 64;
    let heap =
        DescriptorHeap::<ShaderVisibleResourceHeap>::new(&SoftwareDevice::new(), CAPACITY).unwrap();
    let held = Mutex::new(Vec::new());

    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for round in 0..500 {
                    match heap.allocate_descriptor() {
                        Ok(descriptor) if round % 3 == 0 => {
                            held.lock().unwrap().push(descriptor);
                        }
                        Ok(descriptor) => drop(descriptor),
                        Err(DescriptorHeapError::HeapOverflow(CAPACITY)) => {
                            held.lock().unwrap().pop();
                        }
                        Err(e) => panic!("unexpected allocation error: {e}"),
                    }
                }
            });
        }
    });

    let held = held.into_inner().unwrap();
    let handles: HashSet<_> = held.iter().map(|d| d.cpu_handle()).collect();
    assert_eq!(handles.len(), held.len());
    assert_eq!(heap.allocated(), held.len());
    assert_eq!(heap.available(), CAPACITY - held.len());

    for descriptor in &held {
        assert_eq!(heap.cpu_handle_at(descriptor.index()), Some(descriptor.cpu_handle()));
    }

    drop(held);
    assert_eq!(heap.available(), CAPACITY);
}

#[test]
fn loader_thread_releases_while_render_thread_allocates() {
    init_logger();
    let heap = DescriptorHeap::<ShaderVisibleResourceHeap>::new(&SoftwareDevice::new(), 16).unwrap();
    let (tx, rx) = std::sync::mpsc::channel();

    thread::scope(|s| {
        s.spawn(move || {
            for descriptor in rx {
                drop(descriptor);
            }
        });

        let mut sent = 0;
        while sent < 2000 {
            match heap.allocate_descriptor() {
                Ok(descriptor) => {
                    tx.send(descriptor).unwrap();
                    sent += 1;
                }
                Err(DescriptorHeapError::HeapOverflow(_)) => thread::yield_now(),
                Err(e) => panic!("unexpected allocation error: {e}"),
            }
        }
        drop(tx);
    });

    assert_eq!(heap.allocated(), 0);
    assert_eq!(heap.available(), 16);
}
