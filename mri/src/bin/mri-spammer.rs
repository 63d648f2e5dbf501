//! Background traffic for congestion experiments.
//!
//! ```bash
//! # on h2
//! mri-spammer udp-receive -p 5000 -s 1024
//! # on h1, 1 MB/s for 30 seconds
//! mri-spammer udp-send -a 10.0.2.2 -p 5000 -r 1000000 -s 1024 -t 30
//! ```

use std::{
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use bytes::{BufMut, Bytes, BytesMut};
use clap::{Parser, Subcommand};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream, UdpSocket},
    time::Instant,
};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "mri-spammer")]
#[command(version)]
#[command(about = "Sends or sinks filler traffic over UDP or TCP", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sends datagrams at a fixed rate
    UdpSend {
        /// Address of the receiver
        #[arg(short = 'a', long)]
        host: IpAddr,
        /// Port of the receiver
        #[arg(short, long)]
        port: u16,
        /// Transmit rate, in bytes per second
        #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
        rate: u64,
        /// Size of every datagram, in bytes
        #[arg(short, long)]
        size: usize,
        /// How long to send, in seconds
        #[arg(short, long)]
        time: u64,
    },
    /// Writes to a TCP connection as fast as it drains
    TcpSend {
        /// Address of the receiver
        #[arg(short = 'a', long)]
        host: IpAddr,
        /// Port of the receiver
        #[arg(short, long)]
        port: u16,
        /// Size of every write, in bytes
        #[arg(short, long)]
        size: usize,
        /// How long to send, in seconds
        #[arg(short, long)]
        time: u64,
    },
    /// Receives datagrams until interrupted
    UdpReceive {
        /// Port to listen on
        #[arg(short, long)]
        port: u16,
        /// Size of the receive buffer, in bytes
        #[arg(short, long)]
        size: usize,
        /// Print every message received
        #[arg(short = 'm', long)]
        print: bool,
    },
    /// Accepts TCP connections one at a time and drains them until interrupted
    TcpReceive {
        /// Port to listen on
        #[arg(short, long)]
        port: u16,
        /// Size of the receive buffer, in bytes
        #[arg(short, long)]
        size: usize,
        /// Print every message received
        #[arg(short = 'm', long)]
        print: bool,
    },
}

/// Returns `size` bytes cycling through `a..=z`.
fn payload(size: usize) -> Bytes {
    let mut buf = BytesMut::with_capacity(size);
    for i in 0..size {
        buf.put_u8(b'a' + (i % 26) as u8);
    }
    buf.freeze()
}

/// Time between two datagrams of `size` bytes sent at `rate` bytes per second.
fn pace(size: usize, rate: u64) -> Duration {
    Duration::from_secs_f64(size as f64 / rate as f64)
}

/// Sends `payload` to `dest` every `interval` until `time` has elapsed. Returns the number of
/// datagrams sent.
async fn udp_send(
    socket: &UdpSocket,
    dest: SocketAddr,
    payload: &[u8],
    interval: Duration,
    time: Duration,
) -> io::Result<u64> {
    let deadline = Instant::now() + time;
    let mut sent = 0;

    while Instant::now() < deadline {
        socket.send_to(payload, dest).await?;
        sent += 1;
        tokio::time::sleep(interval).await;
    }

    Ok(sent)
}

/// Writes `payload` to `stream` back to back until `time` has elapsed, then closes the write
/// half. Returns the number of bytes written.
async fn tcp_send(mut stream: TcpStream, payload: &[u8], time: Duration) -> io::Result<u64> {
    let deadline = Instant::now() + time;
    let mut written = 0;

    while Instant::now() < deadline {
        stream.write_all(payload).await?;
        written += payload.len() as u64;
    }

    stream.shutdown().await?;
    Ok(written)
}

/// Receives one datagram into `buf`. Returns its length and sender.
async fn udp_receive(
    socket: &UdpSocket,
    buf: &mut [u8],
    print: bool,
) -> io::Result<(usize, SocketAddr)> {
    let (len, peer) = socket.recv_from(buf).await?;
    if print {
        println!("Received message from {peer}:\n{}", String::from_utf8_lossy(&buf[..len]));
    }
    Ok((len, peer))
}

/// Reads `stream` until the peer closes it. Returns the number of bytes read.
async fn tcp_drain(
    mut stream: TcpStream,
    peer: SocketAddr,
    size: usize,
    print: bool,
) -> io::Result<u64> {
    let mut buf = vec![0; size.max(1)];
    let mut read = 0;

    loop {
        let len = stream.read(&mut buf).await?;
        if len == 0 {
            return Ok(read);
        }

        read += len as u64;
        if print {
            println!("Received message from {peer}:\n{}", String::from_utf8_lossy(&buf[..len]));
        }
    }
}

fn unspecified(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)
}

async fn run(command: Command) -> io::Result<()> {
    match command {
        Command::UdpSend { host, port, rate, size, time } => {
            let socket = UdpSocket::bind(unspecified(0)).await?;
            let dest = SocketAddr::new(host, port);
            let interval = pace(size, rate);

            info!(%dest, rate, size, ?interval, "Sending datagrams");
            let sent = udp_send(&socket, dest, &payload(size), interval, Duration::from_secs(time))
                .await?;
            info!(%dest, sent, "Done sending");
        }
        Command::TcpSend { host, port, size, time } => {
            let dest = SocketAddr::new(host, port);
            let stream = TcpStream::connect(dest).await?;

            info!(%dest, size, "Sending stream");
            let written = tcp_send(stream, &payload(size), Duration::from_secs(time)).await?;
            info!(%dest, written, "Done sending");
        }
        Command::UdpReceive { port, size, print } => {
            let socket = UdpSocket::bind(unspecified(port)).await?;
            let mut buf = vec![0; size.max(1)];

            info!(port, "Receiving datagrams");
            loop {
                let (len, peer) = udp_receive(&socket, &mut buf, print).await?;
                debug!(%peer, len, "Received datagram");
            }
        }
        Command::TcpReceive { port, size, print } => {
            let listener = TcpListener::bind(unspecified(port)).await?;

            info!(port, "Accepting connections");
            loop {
                let (stream, peer) = listener.accept().await?;
                debug!(%peer, "Accepted connection");

                match tcp_drain(stream, peer, size, print).await {
                    Ok(read) => info!(%peer, read, "Connection closed"),
                    Err(e) => warn!(%peer, err = %e, "Connection failed"),
                }
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tokio::select! {
        res = run(cli.command) => res?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
    }

    Ok(())
}
