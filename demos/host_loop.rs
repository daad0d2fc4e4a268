//! A host tick loop driving one session.
//!
//! Connects, sends a few messages from inside the callbacks, closes after
//! the last echo and exits once the session has been removed.
//!
//! Run against any echo server, e.g. the one from the rsws examples:
//! cargo run --example host_loop -- ws://127.0.0.1:9001/
//!
//! Set `RUST_LOG=rsws_bridge=debug` to see the session loop.

use std::cell::Cell;
use std::error::Error;
use std::rc::Rc;
use std::time::Duration;

use rsws_bridge::{Config, Handlers, SessionRegistry};
use tracing_subscriber::EnvFilter;

const DEFAULT_URL: &str = "ws://127.0.0.1:9001/";
const MESSAGES: usize = 3;
const TICK: Duration = Duration::from_millis(16);

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let url = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_URL.to_string());
    let registry = SessionRegistry::new(Config::default().with_name("demo"))?;
    let echoed = Rc::new(Cell::new(0));

    let handlers = Handlers::new()
        .on_connect(|session| {
            println!("{session} connected");
            for i in 0..MESSAGES {
                if let Err(e) = session.send(format!("hello #{i}")) {
                    eprintln!("send failed: {e}");
                }
            }
        })
        .on_message({
            let echoed = echoed.clone();
            move |session, text| {
                println!("{session} <- {text}");
                echoed.set(echoed.get() + 1);
                if echoed.get() == MESSAGES {
                    session.close();
                }
            }
        })
        .on_error(|session, message| eprintln!("{session} error: {message}"))
        .on_disconnect(|session, reason| println!("{session} disconnected: {reason}"));

    let session = registry.connect_with(&url, handlers)?;
    println!("{session} connecting to {url}");

    // The host's own frame loop: never blocks on the network.
    let mut ticks = 0u64;
    while !registry.is_empty() {
        registry.poll();
        ticks += 1;
        std::thread::sleep(TICK);
    }

    println!("done after {ticks} ticks, {} echoes", echoed.get());
    registry.shutdown();
    Ok(())
}
