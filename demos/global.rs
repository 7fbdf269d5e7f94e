//! This example installs a pool as the process allocator. See [`GlobalPool`]
//! for the actual trait implementation.

use poolalloc::{GlobalPool, Pool, PoolConfig};
use std::thread;

#[global_allocator]
static ALLOCATOR: GlobalPool = GlobalPool::new();

fn main() {
    // Built through the heap path, nothing is installed yet.
    let pool: &'static Pool = Box::leak(Box::new(
        Pool::new(PoolConfig::default()).expect("valid pool configuration"),
    ));
    pool.start_up().expect("first page");
    ALLOCATOR.install(pool);

    // Box example
    let val_box = Box::new(22);
    println!("Box Value: {}, At: {:p}", val_box, val_box);

    // Vec example, grows out of the pool into the heap
    let mut v = Vec::new();
    for i in 0..20 {
        v.push(i * 10);
        println!("Added {}; Capacity: {}; At: {:p}", v[i], v.capacity(), v.as_ptr());
    }

    // String example
    let msg = String::from("Heap Testing");
    println!("\nString '{}' - At: {:p}", msg, msg.as_ptr());

    let p1 = Box::new(2.22);
    let addr_p1 = format!("{:p}", p1);
    println!("P1 Allocated at: {}", addr_p1);

    drop(p1);
    println!("P1 Deallocated");

    let p2 = Box::new(2.22);
    println!("P2 at: {:p} (same chunk as P1: {})", p2, format!("{:p}", p2) == addr_p1);

    // Thread example
    let handles: Vec<_> = (0..4)
        .map(|i| thread::spawn(move || (0..1000).map(|j| Box::new(i * j)).count()))
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    print!("{}", pool.report_usage());
    println!("{:?}", pool.counters());
}
