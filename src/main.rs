mod cli;

use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tcpmon::capture::{self, engine, filter};
use tcpmon::config;
use tcpmon::connection::{self, ConnectionTable};
use tcpmon::{display, protocol};

fn main() {
    let args = cli::Cli::parse();

    let log_level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    if args.list_interfaces {
        list_interfaces();
        return;
    }

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {}", err);
            std::process::exit(1);
        }
    };

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        running_clone.store(false, Ordering::SeqCst);
        eprintln!("\nInterrupt received, stopping capture...");
    }) {
        tracing::warn!(error = %err, "could not install Ctrl-C handler");
    }

    if let Err(e) = run_capture(&config, &running) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

/// List available network interfaces and print them.
fn list_interfaces() {
    match engine::list_interfaces() {
        Ok(devices) => {
            println!("Available network interfaces:");
            println!("{:<20} {:<20} {}", "Name", "Description", "Addresses");
            println!("{}", "-".repeat(70));
            for device in &devices {
                let desc = device.desc.as_deref().unwrap_or("");
                let addrs: Vec<String> = device
                    .addresses
                    .iter()
                    .map(|a| a.addr.to_string())
                    .collect();
                println!("{:<20} {:<20} {}", device.name, desc, addrs.join(", "));
            }
            if devices.is_empty() {
                println!("  (no interfaces found, try running with sudo)");
            }
        }
        Err(e) => {
            eprintln!("error listing interfaces: {}", e);
            eprintln!("hint: try running with sudo");
        }
    }
}

#[derive(Debug, Default)]
struct RunStats {
    frames: u64,
    parse_errors: u64,
    tcp_segments: u64,
    tcp_errors: u64,
}

/// Main loop: receive frames from the capture thread, dissect, track, print.
fn run_capture(
    config: &RuntimeConfig,
    running: &Arc<AtomicBool>,
) -> Result<(), Box<dyn std::error::Error>> {
    let handle = capture::spawn(
        config.capture.clone(),
        config.output.write_pcap.clone(),
        config.channel_capacity,
        running.clone(),
    )?;

    println!("tcpmon v{}", env!("CARGO_PKG_VERSION"));
    println!("Capturing on: {}", config.capture.source_name());
    if let Some(filter) = &config.capture.filter {
        println!("Filter: {}", filter);
    }
    if config.run.count > 0 {
        println!("Capturing {} packets...", config.run.count);
    } else {
        println!("Capturing packets (Ctrl-C to stop)...");
    }
    println!();

    let mut table = ConnectionTable::new(
        config.tracking.idle_timeout_secs,
        config.tracking.max_connections,
    );
    let mut stats = RunStats::default();
    let mut last_ts = 0.0;
    let started = Instant::now();
    let time_limit = (config.run.duration_secs > 0)
        .then(|| Duration::from_secs(config.run.duration_secs));

    while running.load(Ordering::SeqCst) {
        if config.run.count > 0 && stats.frames >= config.run.count {
            break;
        }
        if let Some(limit) = time_limit {
            if started.elapsed() >= limit {
                tracing::info!(secs = config.run.duration_secs, "duration limit reached");
                break;
            }
        }

        let frame = match handle.frames.recv_timeout(Duration::from_millis(100)) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        stats.frames += 1;
        last_ts = frame.ts;

        match protocol::dissect(&frame.data) {
            Ok(packet) => {
                if let Some(err) = &packet.transport_error {
                    stats.tcp_errors += 1;
                    tracing::debug!(error = %err, "tcp parse error on packet #{}", frame.id);
                }
                let observation = table.observe(frame.ts, frame.wire_len, &packet);
                if observation.is_some() {
                    stats.tcp_segments += 1;
                }

                if config.output.json {
                    display::print_packet_json(frame.id, frame.ts, &packet);
                } else if !config.output.quiet {
                    display::print_packet_summary(frame.id, frame.ts, &packet, observation.as_ref());
                }
            }
            Err(e) => {
                stats.parse_errors += 1;
                if !config.output.quiet {
                    display::print_parse_error(frame.id, frame.ts, frame.data.len(), &e);
                }
                tracing::debug!(error = %e, "parse error on packet #{}", frame.id);
            }
        }

        table.maybe_expire(frame.ts);
    }

    running.store(false, Ordering::SeqCst);
    let capture_stats = handle.join()?;

    println!();
    println!("{}", "=".repeat(50));
    println!("Capture complete.");
    println!("  Frames processed:  {}", stats.frames);
    println!("  Parse errors:      {}", stats.parse_errors);
    println!("  TCP segments:      {}", stats.tcp_segments);
    println!("  TCP errors:        {}", stats.tcp_errors);
    println!("  Connections:       {} ({} active)", table.len(), table.active_count());
    if let Some(dropped) = capture_stats.dropped {
        println!("  Kernel drops:      {}", dropped);
    }
    println!("{}", "=".repeat(50));

    let snapshot = table.snapshot(last_ts);
    if config.output.connections {
        println!();
        display::print_connection_table(&snapshot);
    }
    if let Some(path) = &config.output.export_json {
        connection::write_connections_json(path, &snapshot)?;
        println!("  Connection export (JSON): {}", path.display());
    }
    if let Some(path) = &config.output.export_csv {
        connection::write_connections_csv(path, &snapshot)?;
        println!("  Connection export (CSV):  {}", path.display());
    }

    Ok(())
}

#[derive(Debug, Clone)]
struct RuntimeConfig {
    capture: engine::CaptureConfig,
    channel_capacity: usize,
    run: config::RunConfig,
    output: config::OutputConfig,
    tracking: config::TrackingConfig,
}

fn load_config(args: &cli::Cli) -> Result<RuntimeConfig, config::ConfigError> {
    let base = match &args.config {
        Some(path) => config::Config::load(path)?,
        None => config::Config::default(),
    };

    let mut capture = base.capture.clone();
    let mut run = base.run.clone();
    let mut output = base.output.clone();
    let mut tracking = base.tracking.clone();

    if let Some(value) = &args.interface {
        capture.interface = Some(value.clone());
        capture.read_file = None;
    }
    if let Some(value) = &args.read {
        capture.read_file = Some(value.clone());
    }
    if let Some(value) = &args.filter {
        capture.filter = Some(value.clone());
    }
    if !args.protocols.is_empty() {
        capture.protocols = args.protocols.clone();
    }
    if let Some(value) = args.port {
        capture.port = Some(value);
    }
    if let Some(value) = &args.host {
        capture.host = Some(value.clone());
    }
    if let Some(value) = args.snaplen {
        capture.snaplen = value;
    }
    if let Some(value) = args.timeout_ms {
        capture.timeout_ms = value;
    }
    if args.promiscuous {
        capture.promiscuous = true;
    }
    if args.no_promiscuous {
        capture.promiscuous = false;
    }
    if let Some(value) = args.count {
        run.count = value;
    }
    if let Some(value) = args.duration {
        run.duration_secs = value;
    }
    if args.json {
        output.json = true;
    }
    if args.quiet {
        output.quiet = true;
    }
    if args.connections {
        output.connections = true;
    }
    if let Some(value) = &args.write_pcap {
        output.write_pcap = Some(value.clone());
    }
    if let Some(value) = &args.export_json {
        output.export_json = Some(value.clone());
    }
    if let Some(value) = &args.export_csv {
        output.export_csv = Some(value.clone());
    }
    if let Some(value) = args.idle_timeout {
        tracking.idle_timeout_secs = value;
    }
    if let Some(value) = args.max_connections {
        tracking.max_connections = value;
    }

    let spec = filter::FilterSpec {
        protocols: capture.protocols.clone(),
        port: capture.port,
        host: capture.host.clone(),
    };
    let bpf = filter::resolve(capture.filter.as_deref(), &spec);
    tracing::debug!(filter = %bpf, "resolved capture filter");

    Ok(RuntimeConfig {
        capture: engine::CaptureConfig {
            interface: capture.interface,
            read_file: capture.read_file,
            promiscuous: capture.promiscuous,
            snaplen: capture.snaplen,
            timeout_ms: capture.timeout_ms,
            filter: Some(bpf),
        },
        channel_capacity: capture.channel_capacity,
        run,
        output,
        tracking,
    })
}
