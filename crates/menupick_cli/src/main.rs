//! CLI smoke entry point.
//!
//! # Responsibility
//! - Open the store from environment configuration and report its state.
//! - Optionally pick `N` random dishes: `menupick [N]`.
//! - Check storage round trips: `menupick self-test`.

use menupick_core::{core_version, open_store, StoreConfig};
use std::process::ExitCode;

fn main() -> ExitCode {
    let arg = std::env::args().nth(1);
    let self_test = arg.as_deref() == Some("self-test");
    let count = match arg.filter(|_| !self_test).map(|raw| raw.parse::<usize>()) {
        None => 0,
        Some(Ok(count)) => count,
        Some(Err(err)) => {
            eprintln!("usage: menupick [count | self-test] ({err})");
            return ExitCode::from(2);
        }
    };
    let config = match StoreConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("menupick: {err}");
            return ExitCode::from(2);
        }
    };

    let mut store = open_store(&config);
    let state = store.initialize();
    println!("menupick_core version={}", core_version());
    println!(
        "state={} backend={} items={} next_id={}",
        state,
        store.active_backend(),
        store.items().len(),
        store.next_id()
    );
    if self_test {
        return match store.self_test() {
            Ok(report) => {
                println!("{report:?}");
                if report.passed() {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::FAILURE
                }
            }
            Err(err) => {
                eprintln!("menupick: {err}");
                ExitCode::FAILURE
            }
        };
    }
    for item in store.random_select(count) {
        println!("{}\t{}", item.id, item.name);
    }
    ExitCode::SUCCESS
}
