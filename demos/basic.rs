//! Donates a static array to the allocator and runs a few allocations
//! through it, printing the addresses handed out.

use poolalloc::PoolAlloc;

static ALLOCATOR: PoolAlloc = PoolAlloc::new();

#[repr(align(16))]
struct PoolStorage([u8; 16 * 1024]);

static mut STORAGE: PoolStorage = PoolStorage([0; 16 * 1024]);

fn log_alloc(addr: *mut u8, size: usize) {
    println!("Requested {size} bytes of memory");
    println!("Received this address: {addr:?}");
}

fn main() {
    ALLOCATOR.initialize();

    unsafe {
        ALLOCATOR.register_pool((&raw mut STORAGE.0).cast(), 16 * 1024);

        let addr1 = ALLOCATOR.allocate(8);
        log_alloc(addr1, 8);

        let addr2 = ALLOCATOR.allocate(100);
        log_alloc(addr2, 100);

        let addr3 = ALLOCATOR.allocate(1024);
        log_alloc(addr3, 1024);

        println!("Stats: {:?}", ALLOCATOR.stats());

        ALLOCATOR.deallocate(addr2);

        // First-fit hands the freed middle block back before touching the
        // untouched tail of the pool.
        let addr4 = ALLOCATOR.allocate(100);
        log_alloc(addr4, 100);
        println!("Reused freed block: {}", addr4 == addr2);

        ALLOCATOR.deallocate(addr1);
        ALLOCATOR.deallocate(addr3);
        ALLOCATOR.deallocate(addr4);
    }

    println!("Stats after freeing everything: {:?}", ALLOCATOR.stats());
}
