//! Dining philosophers on the host port
//!
//! Five philosopher threads share five fork mutexes. A semaphore seats at
//! most four of them at once, which rules out the circular wait. A deferred
//! task reports meal counts every quarter second of simulated time.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use log::{info, warn, LevelFilter};
use wos_kernel::{priority, Kernel, KernelConfig, Mutex, OsResult, Semaphore, ThreadConfig};
use wos_lpwork::{LpWork, LpWorkConfig};
use wos_port_posix::PosixPort;

const N_PHILO: usize = 5;
const NAMES: [&str; N_PHILO] = ["philo-0", "philo-1", "philo-2", "philo-3", "philo-4"];
const RUN_MS: u32 = 2_000;
const REPORT_MS: u32 = 250;

type SimKernel = Kernel<PosixPort, 16>;

struct Table {
    forks: Vec<Mutex<'static>>,
    seats: Semaphore<'static>,
    meals: [AtomicU32; N_PHILO],
}

impl Table {
    fn new(kernel: &'static SimKernel) -> OsResult<Self> {
        Ok(Self {
            forks: (0..N_PHILO).map(|_| Mutex::new(kernel)).collect(),
            seats: Semaphore::new(kernel, (N_PHILO - 1) as u32)?,
            meals: Default::default(),
        })
    }

    fn meals(&self) -> Vec<u32> {
        self.meals.iter().map(|m| m.load(Ordering::Relaxed)).collect()
    }
}

fn think_ms(n: usize) -> u32 {
    7 + 3 * n as u32
}

fn eat_ms(n: usize) -> u32 {
    5 + n as u32
}

fn philosopher(kernel: &'static SimKernel, table: Arc<Table>, n: usize) {
    let left = &table.forks[n];
    let right = &table.forks[(n + 1) % N_PHILO];
    loop {
        kernel.sleep_ms(think_ms(n));

        if table.seats.entry(100).is_err() {
            warn!("{} found no seat", NAMES[n]);
            continue;
        }
        left.lock_indefinite();
        if right.lock(50).is_err() {
            warn!("{} gave up on fork {}", NAMES[n], (n + 1) % N_PHILO);
            let _ = left.unlock();
            let _ = table.seats.exit();
            continue;
        }

        table.meals[n].fetch_add(1, Ordering::Relaxed);
        kernel.sleep_ms(eat_ms(n));

        let _ = right.unlock();
        let _ = left.unlock();
        if let Err(err) = table.seats.exit() {
            warn!("{} left an empty table: {}", NAMES[n], err);
        }
    }
}

fn main() -> OsResult<()> {
    // Kernel and demo at info on stderr; RUST_LOG overrides.
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .init();

    let kernel: &'static SimKernel = Box::leak(Box::new(Kernel::new(
        PosixPort::new(),
        KernelConfig::builder().name("dpp").build(),
    )));
    kernel.init()?;

    let table = Arc::new(Table::new(kernel)?);
    for (n, &name) in NAMES.iter().enumerate() {
        let table = table.clone();
        kernel.add_thread(
            ThreadConfig::new(priority!(2)).with_name(name),
            move || philosopher(kernel, table, n),
        )?;
    }

    let work = LpWork::start(kernel, LpWorkConfig::default())?;
    {
        let table = table.clone();
        work.register_task(
            move || info!("t={}ms meals {:?}", kernel.now_ms(), table.meals()),
            REPORT_MS,
        )?;
    }

    kernel.sleep_ms(RUN_MS);

    let meals = table.meals();
    info!(
        "{} meals in {}ms ({} ticks)",
        meals.iter().sum::<u32>(),
        kernel.now_ms(),
        kernel.ticks()
    );
    Ok(())
}
