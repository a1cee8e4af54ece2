//! Hosted pool discovery: reserves a region from the operating system with
//! [`OsPool`] and donates it to the allocator. On a bare-metal target the
//! donation would come from a linker section instead; the allocator cannot
//! tell the difference.

use poolalloc::{OsPool, PoolAlloc, page_size};

static ALLOCATOR: PoolAlloc = PoolAlloc::new();

fn main() {
    println!("Page size: {}", page_size());

    let pool = OsPool::reserve(256 * 1024).expect("could not reserve a pool");
    println!("Reserved {} bytes at {:?}", pool.size(), pool.addr());

    ALLOCATOR.initialize();

    // The region is donated for the rest of the process lifetime.
    let (addr, size) = pool.into_raw();
    unsafe {
        ALLOCATOR.register_pool(addr, size);

        let block1 = ALLOCATOR.allocate(4);
        println!("{block1:?}");
        let block2 = ALLOCATOR.allocate(4);
        println!("{block2:?}");

        println!("Deallocating block1");
        ALLOCATOR.deallocate(block1);

        let block3 = ALLOCATOR.allocate(4);
        println!("Should be the first address again: {block3:?}");
    }

    println!("Stats: {:?}", ALLOCATOR.stats());
}
