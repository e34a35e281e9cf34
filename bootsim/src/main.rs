//! Host-side stand-in for a K1921VK035 running the UART bootloader.
//!
//! Listens on TCP instead of a serial port. The first byte of a connection is the autobaud
//! training character; everything after it is the frame stream. Flash contents live in memory,
//! can be preloaded from an Intel HEX image and are dumped back out on exit.

use std::io::Read;
use std::net::{TcpListener, TcpStream};

use clap::Parser;

use uartboot::fifo::RingBuffer;
use uartboot::packet::Uart;
use uartboot::{FIFO_BYTES, Session, autobaud};

mod config;
mod device;

use device::SimDevice;
use device::flash::FlashArray;
use device::line::Line;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, value_parser)]
    config: Option<clio::Input>,

    /// Intel HEX image to preload into main flash
    #[arg(short, long, value_parser)]
    image: Option<clio::Input>,

    /// Where to write main flash (Intel HEX) when the host exits the bootloader
    #[arg(short, long, value_parser)]
    dump: Option<clio::OutputPath>,

    /// Listen address, overriding the configuration
    #[arg(short, long)]
    listen: Option<String>,
}

static RX_FIFO: RingBuffer<FIFO_BYTES> = RingBuffer::new();

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run(Args::parse()) {
        log::error!("{e}");
        std::process::exit(1);
    }
}

fn run(mut args: Args) -> Result<(), String> {
    let config = match args.config.as_mut() {
        Some(input) => config::load(input)?,
        None => config::Config::default(),
    };

    let mut flash = FlashArray::new(config.device.cfgword);
    if let Some(image) = args.image.as_mut() {
        let mut hexdata = Vec::new();
        image
            .read_to_end(&mut hexdata)
            .map_err(|e| format!("Could not read image ({e})"))?;
        for segment in device::intelhex::segments(&hexdata)? {
            flash.load(segment.address, &segment.data)?;
        }
    }
    log::info!("config word {:#010x}", flash.cfgword());

    let listen = args.listen.unwrap_or(config.link.listen);
    let listener =
        TcpListener::bind(&listen).map_err(|e| format!("Could not listen on {listen} ({e})"))?;
    log::info!("waiting for host on {listen}");

    let (mut stream, peer) = listener
        .accept()
        .map_err(|e| format!("Could not accept connection ({e})"))?;
    log::info!("host connected from {peer}");
    // Best effort; responses are small and latency-bound.
    let _ = stream.set_nodelay(true);

    let mut training = [0u8];
    stream
        .read_exact(&mut training)
        .map_err(|e| format!("No training character ({e})"))?;

    let tx = stream
        .try_clone()
        .map_err(|e| format!("Could not clone connection ({e})"))?;
    let line = Line::new(training[0], config.link.baud, config.device.clock_hz);
    let mut dev = SimDevice::new(
        flash,
        line,
        config.device.identity(),
        config.device.clock_hz,
        tx,
    );
    if let Some(path) = args.dump {
        dev.dump_to(path);
    }

    autobaud::sync(&mut dev).map_err(|e| format!("Link bring-up failed ({e:?})"))?;
    dev.tx_flush();

    std::thread::spawn(move || receive(stream));

    Session::new(dev, &RX_FIFO).run()
}

/// Feeds the frame stream into the receive buffer, the way the UART interrupt does on the chip.
fn receive(mut stream: TcpStream) {
    let mut buf = [0u8; 256];
    loop {
        let n = match stream.read(&mut buf) {
            Ok(0) => {
                log::info!("host disconnected");
                std::process::exit(0);
            }
            Ok(n) => n,
            Err(e) => {
                log::error!("host read failed ({e})");
                std::process::exit(1);
            }
        };

        for &b in &buf[..n] {
            // TCP can outrun the session; hold back instead of dropping.
            while RX_FIFO.is_full() {
                std::thread::yield_now();
            }
            RX_FIFO.push(b);
        }
    }
}
