//! Uses the pool allocator as the Rust global allocator, backed by a static
//! array donated at the top of `main`. Everything the program allocates
//! (boxes, vectors, strings, thread machinery) comes out of that array.

use std::{
    hint,
    sync::atomic::{AtomicBool, Ordering},
    thread,
};

use poolalloc::{LockHooks, PoolAlloc};

#[global_allocator]
static ALLOCATOR: PoolAlloc = PoolAlloc::new();

#[repr(align(16))]
struct PoolStorage([u8; 1024 * 1024]);

static mut STORAGE: PoolStorage = PoolStorage([0; 1024 * 1024]);

static LOCKED: AtomicBool = AtomicBool::new(false);

fn acquire() {
    while LOCKED
        .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
        .is_err()
    {
        hint::spin_loop();
    }
}

fn release() {
    LOCKED.store(false, Ordering::Release);
}

fn main() {
    // Nothing may allocate before the pool is donated.
    ALLOCATOR.initialize();
    unsafe {
        ALLOCATOR.register_pool((&raw mut STORAGE.0).cast(), 1024 * 1024);
    }
    ALLOCATOR.set_lock_hooks(LockHooks::new(acquire, release));

    // Box example
    let val_box = Box::new(22);
    println!("Box Value: {}, At: {:p}", val_box, val_box);

    // Vec example
    let mut v = Vec::new();
    for i in 0..5 {
        v.push(i * 10);
        println!("Added {}; Capacity: {}; At: {:p}", v[i], v.capacity(), v.as_ptr());
    }

    // String example
    let msg = String::from("Pool Testing");
    println!("\nString '{}' - At: {:p}", msg, msg.as_ptr());

    // Merge example
    let a = Box::new([0u8; 64]);
    let b = Box::new([0u8; 64]);
    let ptr_a = a.as_ptr();

    drop(a);
    drop(b);

    let c = Box::new([0u8; 128]);
    let ptr_c = c.as_ptr();

    if ptr_a == ptr_c {
        println!("Coalesced and reused at {ptr_c:p}");
    } else {
        println!("Not reused. A was at {ptr_a:p} and C is at {ptr_c:p}");
    }

    // Thread example
    let t1 = thread::spawn(|| {
        let _ = Box::new(222);
    });

    let t2 = thread::spawn(|| {
        let _ = Box::new(222);
    });

    t1.join().unwrap();
    t2.join().unwrap();

    println!("Stats: {:?}", ALLOCATOR.stats());
}
