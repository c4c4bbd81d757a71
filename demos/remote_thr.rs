// Sending side of the throughput benchmark.
//
// Run the receiver first, then:
//   cargo run --example remote_thr -- tcp://127.0.0.1:5555 1024 100000
use clap::Parser;
use dmxp_localthr::Transport::{Message, PushSocket};
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "remote_thr")]
#[command(about = "Push numbered fixed-size messages at a local_thr receiver")]
struct Args {
    /// Address the receiver is bound to
    connect_to: String,

    /// Size of every message in bytes
    message_size: usize,

    /// Number of messages to send
    message_count: u64,

    /// Skip this counter value to exercise the receiver's gap detection
    #[arg(long)]
    skip: Option<u32>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut socket = PushSocket::connect(&args.connect_to)?;
    println!("Producer: connected to {}", args.connect_to);

    let start = std::time::Instant::now();
    let mut counter: u32 = 0;
    for _ in 0..args.message_count {
        if Some(counter) == args.skip {
            counter = counter.wrapping_add(1);
        }
        let message = Message::with_sequence(counter, args.message_size);
        socket.send(message.as_bytes())?;
        counter = counter.wrapping_add(1);
    }
    socket.flush()?;

    report(socket.sent(), args.message_size, start);
    Ok(())
}

fn report(sent: u64, message_size: usize, start: Instant) {
    let elapsed = start.elapsed();
    println!("Producer: Sent {} messages in {:.2?}", sent, elapsed);
    println!(
        "Producer: Throughput: {:.2} messages/sec, {:.3} MB/s",
        sent as f64 / elapsed.as_secs_f64(),
        (sent as f64 * message_size as f64) / elapsed.as_secs_f64() / 1_000_000.0
    );
}
