use poolalloc::{Pool, PoolConfig};

fn log_alloc(addr: *mut u8, size: usize, pool: &Pool) {
    let from = match pool.find_owning_page(addr) {
        Some(index) => format!("page {index}"),
        None => "heap".to_string(),
    };

    println!("Requested {size} bytes of memory");
    println!("Received this address: {addr:?} ({from})");
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let pool = Pool::new(PoolConfig::new(4096, 64, 16, 4)).expect("valid pool configuration");
    pool.start_up().expect("first page");

    unsafe {
        let a1 = pool.allocate(8, 8).expect("out of memory");
        log_alloc(a1.as_ptr(), 8, &pool);

        let a2 = pool.allocate(64, 16).expect("out of memory");
        log_alloc(a2.as_ptr(), 64, &pool);

        let a3 = pool.allocate(1024, 64).expect("out of memory");
        log_alloc(a3.as_ptr(), 1024, &pool);

        let a4 = pool.reallocate(a1.as_ptr(), 32, 8).expect("out of memory");
        log_alloc(a4.as_ptr(), 32, &pool);

        print!("{}", pool.report_usage());
        println!("{:?}", pool.counters());

        pool.deallocate(a2.as_ptr());
        pool.deallocate(a3.as_ptr());
        pool.deallocate(a4.as_ptr());
    }

    pool.shut_down();
}
