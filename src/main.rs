use std::env::args;
use std::str::FromStr;
use std::string::ToString;
use std::sync::Barrier;
use std::thread;
use std::time::Instant;

use strum::IntoEnumIterator;
use strum_macros::{self, Display, EnumIter, EnumString};
use ticket_locks::{
    bind_read, bind_write, multi_lock, multi_write_lock, GuardedResource, ReadGuard, WriteGuard,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = args().skip(1);
    let selector = args.next().ok_or(format!(
        "no scenario supplied, use one of {} or see unit tests",
        Scenario::iter()
            .map(|c| c.to_string())
            .collect::<Vec<String>>()
            .join(",")
    ))?;
    let scenario = Scenario::from_str(&selector).map_err(|e| e.to_string())?;
    let config = StressConfig::from_args(args)?;

    match scenario {
        Scenario::Handoff => handoff(),
        Scenario::SharedReads => shared_reads(config.threads),
        Scenario::Transfer => transfer(config.cycles),
        Scenario::Stress => stress(&config),
    }
    Ok(())
}

#[derive(EnumIter, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
enum Scenario {
    Handoff,
    SharedReads,
    Transfer,
    Stress,
}

/// `<scenario> [threads] [cycles]`
struct StressConfig {
    threads: usize,
    cycles: usize,
}

impl StressConfig {
    const RESOURCES: usize = 3;

    fn from_args(mut args: impl Iterator<Item = String>) -> Result<Self, String> {
        let mut next = |default: usize| {
            args.next()
                .map_or(Ok(default), |a| a.parse::<usize>().map_err(|e| format!("{a}: {e}")))
        };
        let threads = next(8)?;
        let cycles = next(1000)?;
        if threads == 0 {
            return Err("need at least one thread".to_string());
        }
        Ok(Self { threads, cycles })
    }
}

/// one writer sets the value, one reader looks at it: it's either the old or the new one
fn handoff() {
    let x = GuardedResource::new(0);
    let seen = thread::scope(|s| {
        s.spawn(|| *x.write() = 5);
        s.spawn(|| *x.read()).join().unwrap()
    });
    assert!(seen == 0 || seen == 5);
    println!("reader saw {seen}, final value is {}", *x.read());
}

fn shared_reads(threads: usize) {
    let x = GuardedResource::new("shared");
    let all_in = Barrier::new(threads + 1);
    let all_counted = Barrier::new(threads + 1);
    thread::scope(|s| {
        for _ in 0..threads {
            s.spawn(|| {
                let _g = x.read();
                all_in.wait();
                all_counted.wait();
            });
        }
        all_in.wait();
        println!("{} readers inside at once", x.readers());
        all_counted.wait();
    });
}

/// two threads move money between the same accounts in opposite orders
fn transfer(cycles: usize) {
    let left = GuardedResource::new(1_000_000i64);
    let right = GuardedResource::new(1_000_000i64);
    thread::scope(|s| {
        for (from, to) in [(&left, &right), (&right, &left)] {
            s.spawn(move || {
                for _ in 0..cycles {
                    let (mut f, mut t) = (WriteGuard::empty(), WriteGuard::empty());
                    multi_write_lock((bind_write(&mut f, from), bind_write(&mut t, to)));
                    *f -= 1;
                    *t += 1;
                }
            });
        }
    });
    println!("balances: {} / {}", *left.read(), *right.read());
}

fn stress(config: &StressConfig) {
    let resources: Vec<_> = (0..StressConfig::RESOURCES)
        .map(|_| GuardedResource::new(0u64))
        .collect();
    let started = Instant::now();
    thread::scope(|s| {
        for t in 0..config.threads {
            let resources = &resources;
            s.spawn(move || {
                let w = t % StressConfig::RESOURCES;
                let r = (w + 1) % StressConfig::RESOURCES;
                for _ in 0..config.cycles {
                    let (mut gw, mut gr) = (WriteGuard::empty(), ReadGuard::empty());
                    multi_lock((
                        bind_read(&mut gr, &resources[r]),
                        bind_write(&mut gw, &resources[w]),
                    ));
                    *gw += 1;
                }
            });
        }
    });
    let total: u64 = resources.iter().map(|r| *r.read()).sum();
    info!(elapsed = ?started.elapsed(), total, "stress done");
    println!(
        "{} threads x {} cycles over {} resources in {:?}",
        config.threads,
        config.cycles,
        StressConfig::RESOURCES,
        started.elapsed()
    );
}
