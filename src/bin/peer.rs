//! TDMA peer entry point
//!
//! Connects to a coordinator in either interactive mode (messages typed in
//! and queued for the next active slot) or load-test mode (synthetic
//! payloads on a fixed period).

use std::process;

use tdma_link::core::{PeerConfig, PeerMode};
use tdma_link::peer::{PeerAgent, PeerEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

fn usage() -> ! {
    eprintln!("Usage: peer <server_addr> <mode>");
    eprintln!("Modes:");
    eprintln!("  1 - interactive (manual message entry)");
    eprintln!("  2 - load test (automatic messages)");
    eprintln!("Example: peer 127.0.0.1:8080 1");
    process::exit(1);
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 3 {
        usage();
    }
    let server_addr = match args[1].parse() {
        Ok(addr) => addr,
        Err(_) => usage(),
    };
    let mode = match args[2].as_str() {
        "1" => PeerMode::Interactive,
        "2" => PeerMode::Load,
        _ => usage(),
    };

    let config = PeerConfig {
        server_addr,
        ..PeerConfig::default()
    };
    let (mut agent, mut events) = match PeerAgent::connect(config).await {
        Ok(connected) => connected,
        Err(e) => {
            error!(error = %e, "connection failed");
            process::exit(1);
        }
    };

    let display = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                PeerEvent::Welcome {
                    client_id,
                    slot,
                    slot_duration,
                } => info!(
                    %client_id,
                    slot,
                    slot_ms = slot_duration.as_millis() as u64,
                    "slot assigned"
                ),
                PeerEvent::Message { from, slot, text } => {
                    if mode == PeerMode::Interactive {
                        println!("[client {}, slot {}]: {}", from, slot, text);
                    }
                }
                PeerEvent::Collision {
                    your_slot,
                    current_slot,
                } => {
                    if mode == PeerMode::Interactive {
                        println!(
                            "collision: transmitted in slot {}, but your slot is {}; message dropped",
                            current_slot, your_slot
                        );
                    }
                }
                PeerEvent::Text(text) => {
                    if mode == PeerMode::Interactive {
                        println!("{}", text);
                    }
                }
                PeerEvent::Disconnected => {
                    info!("server disconnected");
                    break;
                }
            }
        }
    });

    match mode {
        PeerMode::Load => {
            agent.start_load();
            let _ = tokio::signal::ctrl_c().await;
        }
        PeerMode::Interactive => {
            println!("Type a message to queue it, 'status' for the slot status, Ctrl-C to exit");
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                let line = tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => line,
                        _ => break,
                    },
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                if line == "status" {
                    let status = agent.status();
                    println!("your slot:    {:?}", status.my_slot);
                    println!("current slot: {:?}", status.current_slot);
                    println!("your turn:    {}", if status.my_turn { "yes" } else { "no" });
                    println!("queued:       {}", status.queue_depth);
                    println!("slot length:  {} ms", agent.slot_duration().as_millis());
                    println!("time to slot: {} ms", agent.time_to_slot().as_millis());
                    continue;
                }

                match agent.enqueue(line) {
                    Ok(()) => {
                        let status = agent.status();
                        if status.my_turn {
                            println!("message queued; your slot is active");
                        } else {
                            println!("message queued; will be sent in slot {:?}", status.my_slot);
                        }
                    }
                    Err(_) => println!("message queue full, try again shortly"),
                }
            }
        }
    }

    agent.shutdown().await;
    display.abort();
}
