//! RingChannel CLI demo
//!
//! Feeds stdin lines through one bounded channel: a producer session writes
//! each line, a consumer session drains and prints it. Closing stdin closes
//! the producer, and the consumer observes end of stream.
//!
//! Pool sizing comes from the environment (the module-parameter analogue):
//! `RINGCHAN_CHANNELS`, `RINGCHAN_NITEMS`, `RINGCHAN_ITEMSIZE`.

use std::env;
use std::io;

use ringchan::{Capabilities, CancelToken, ChannelPool, IoMode, PoolConfig, RingError, Session};

fn env_or(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let defaults = PoolConfig::default();
    let config = PoolConfig {
        nr_channels: env_or("RINGCHAN_CHANNELS", defaults.nr_channels),
        items_per_channel: env_or("RINGCHAN_NITEMS", defaults.items_per_channel),
        item_size: env_or("RINGCHAN_ITEMSIZE", defaults.item_size),
    };
    let pool = ChannelPool::new(config);
    println!(
        "{} channels of {} bytes each",
        pool.len(),
        pool.get(0).map_or(0, |c| c.capacity())
    );

    let producer = pool.open(0, Capabilities::Write, CancelToken::new())?;
    let consumer = pool.open(0, Capabilities::Read, CancelToken::new())?;

    let producer_task = tokio::spawn(async move {
        println!("Enter text (empty line to quit):");
        let stdin = io::stdin();
        let mut line = String::new();

        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                break;
            }
            if let Err(e) = write_all(&producer, trimmed.as_bytes()).await {
                eprintln!("Write error: {e}");
                break;
            }
        }

        if let Err(e) = producer.close() {
            eprintln!("Close error: {e}");
        }
        println!("Producer closed");
    });

    let consumer_task = tokio::spawn(async move {
        let mut buf = [0u8; 16];
        loop {
            match consumer.read(&mut buf, IoMode::Blocking).await {
                Ok(0) => {
                    println!("(consumer) EOF");
                    break;
                }
                Ok(n) => {
                    let data = String::from_utf8_lossy(&buf[..n]);
                    println!("(consumer): {data}");
                }
                Err(e) => {
                    eprintln!("(consumer) Error: {e}");
                    break;
                }
            }
        }
    });

    let _ = tokio::join!(producer_task, consumer_task);

    println!("All tasks completed");
    Ok(())
}

/// Write the whole line, retrying with the remainder after partial writes.
async fn write_all(session: &Session, mut data: &[u8]) -> Result<(), RingError> {
    while !data.is_empty() {
        let n = session.write(data, IoMode::Blocking).await?;
        data = &data[n..];
    }
    Ok(())
}
