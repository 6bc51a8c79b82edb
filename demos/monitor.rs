//! Polls a process tree and prints per-second cycle and instruction rates
//! plus IPC, aggregated across all of its tasks.

use std::collections::BTreeSet;
use std::io::Error;
use std::process::exit;
use std::thread;
use std::time::Duration;

use perf_task_count::count::set::CounterSet;
use perf_task_count::reconcile::reconcile;
use perf_task_count::task::Tid;

const SLEEP_SECS: u64 = 5;
const BILLION: f64 = 1e9;

// Every tracked task costs two descriptors, so thread-rich targets blow
// through the default soft limit quickly.
fn raise_fd_limit() {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) } != 0 {
        eprintln!("getrlimit failed: {}", Error::last_os_error());
        return;
    }
    limit.rlim_cur = limit.rlim_max;
    if unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &limit) } != 0 {
        eprintln!("setrlimit failed: {}", Error::last_os_error());
    }
}

fn main() {
    env_logger::init();
    raise_fd_limit();

    let pid: Tid = match std::env::args().nth(1).and_then(|arg| arg.parse().ok()) {
        Some(pid) => pid,
        None => {
            eprintln!("usage: monitor <pid>");
            exit(2);
        }
    };

    let mut counters = CounterSet::new();
    let mut known = BTreeSet::new();

    loop {
        if let Err(e) = reconcile("/proc", pid, &mut counters, &mut known) {
            eprintln!("task enumeration failed: {e}");
            exit(1);
        }

        counters.reset_and_enable();
        thread::sleep(Duration::from_secs(SLEEP_SECS));
        counters.disable();
        counters.read();

        let cycles: u64 = counters.iter().map(|c| c.cycles()).sum();
        let instrs: u64 = counters.iter().map(|c| c.instrs()).sum();
        if cycles == 0 {
            continue;
        }

        let cps = cycles / SLEEP_SECS;
        let ips = instrs / SLEEP_SECS;
        println!("----------------------------------------------------");
        println!(
            "Got {cps} ({:.3} billion) cycles per second",
            cps as f64 / BILLION
        );
        println!(
            "Got {ips} ({:.3} billion) instructions per second",
            ips as f64 / BILLION
        );
        println!("IPC: {:.3}", instrs as f64 / cycles as f64);
    }
}
