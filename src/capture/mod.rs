//! Packet source: a libpcap handle driven from its own thread.
//!
//! ```text
//! capture thread (pcap handle, optional savefile)
//!   |
//!   +--[crossbeam bounded channel: OwnedFrame]--> processing loop
//! ```
//!
//! The thread stops when the shared running flag clears, when the receiver
//! is dropped, or when an offline source runs out of packets.

pub mod engine;
pub mod filter;

use crossbeam_channel::{bounded, Receiver};
use engine::{CaptureConfig, CaptureError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// An owned frame handed from the capture thread to the processing loop.
#[derive(Debug, Clone)]
pub struct OwnedFrame {
    /// Capture-wide frame index, starting at 1.
    pub id: u64,
    /// pcap timestamp as seconds since epoch.
    pub ts: f64,
    /// Wire length (from pcap header).
    pub wire_len: u64,
    /// Captured bytes (may be shorter than `wire_len` under a snaplen).
    pub data: Vec<u8>,
}

/// Totals reported by the capture thread when it exits.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaptureStats {
    pub captured: u64,
    /// Kernel drop counter, live captures only.
    pub dropped: Option<u32>,
}

/// Running capture thread plus the channel it feeds.
pub struct CaptureHandle {
    pub frames: Receiver<OwnedFrame>,
    thread: thread::JoinHandle<Result<CaptureStats, CaptureError>>,
}

impl CaptureHandle {
    /// Wait for the capture thread. Drop or drain `frames` first, or a
    /// blocked send keeps the thread alive.
    pub fn join(self) -> Result<CaptureStats, CaptureError> {
        let CaptureHandle { frames, thread } = self;
        drop(frames);
        thread
            .join()
            .map_err(|_| CaptureError::Thread("capture thread panicked".into()))?
    }
}

/// Open the source on a new thread and start streaming frames.
///
/// Open errors surface from [`CaptureHandle::join`]; the channel simply
/// closes without delivering anything.
pub fn spawn(
    config: CaptureConfig,
    savefile: Option<PathBuf>,
    channel_capacity: usize,
    running: Arc<AtomicBool>,
) -> Result<CaptureHandle, CaptureError> {
    let (tx, rx) = bounded::<OwnedFrame>(channel_capacity.max(1));

    let thread = thread::Builder::new()
        .name("tcpmon-capture".into())
        .spawn(move || -> Result<CaptureStats, CaptureError> {
            let mut cap = engine::open_capture(&config)?;
            let mut savefile = match &savefile {
                Some(path) => Some(cap.savefile(path)?),
                None => None,
            };

            let mut stats = CaptureStats::default();
            while running.load(Ordering::SeqCst) {
                let packet = match cap.next_packet() {
                    Ok(packet) => packet,
                    Err(pcap::Error::TimeoutExpired) => continue,
                    Err(pcap::Error::NoMorePackets) => {
                        tracing::info!(captured = stats.captured, "end of capture file");
                        break;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "capture error");
                        return Err(CaptureError::Pcap(e));
                    }
                };

                stats.captured += 1;
                if let Some(file) = savefile.as_mut() {
                    file.write(&packet);
                }

                let frame = OwnedFrame {
                    id: stats.captured,
                    ts: packet.header.ts.tv_sec as f64
                        + packet.header.ts.tv_usec as f64 / 1_000_000.0,
                    wire_len: packet.header.len as u64,
                    data: packet.data.to_vec(),
                };
                if tx.send(frame).is_err() {
                    tracing::debug!("frame receiver dropped, stopping capture");
                    break;
                }
            }

            if let Some(file) = savefile.as_mut() {
                file.flush()?;
            }
            stats.dropped = cap.stats().ok().map(|s| s.dropped);
            tracing::debug!(captured = stats.captured, dropped = ?stats.dropped, "capture thread exiting");
            Ok(stats)
        })
        .map_err(|e| CaptureError::Thread(e.to_string()))?;

    Ok(CaptureHandle { frames: rx, thread })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::test_frames::tcp_ipv4_frame;
    use std::path::Path;

    fn write_pcap(path: &Path, frames: &[(u32, u32, Vec<u8>)]) {
        let mut out = Vec::new();
        out.extend_from_slice(&0xa1b2c3d4u32.to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&4u16.to_le_bytes());
        out.extend_from_slice(&0i32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&65535u32.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes());
        for (sec, usec, data) in frames {
            out.extend_from_slice(&sec.to_le_bytes());
            out.extend_from_slice(&usec.to_le_bytes());
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(data);
        }
        std::fs::write(path, out).unwrap();
    }

    fn read_all(config: CaptureConfig, savefile: Option<PathBuf>) -> (Vec<OwnedFrame>, CaptureStats) {
        let running = Arc::new(AtomicBool::new(true));
        let handle = spawn(config, savefile, 16, running).unwrap();
        let frames: Vec<OwnedFrame> = handle.frames.iter().collect();
        let stats = handle.join().unwrap();
        (frames, stats)
    }

    #[test]
    fn streams_savefile_and_copies_it() {
        let dir = std::env::temp_dir();
        let input = dir.join(format!("tcpmon-capture-in-{}.pcap", std::process::id()));
        let copy = dir.join(format!("tcpmon-capture-out-{}.pcap", std::process::id()));

        let syn = tcp_ipv4_frame([10, 0, 0, 1], [10, 0, 0, 2], 40000, 80, 1, 0, 0x02, b"");
        let data = tcp_ipv4_frame([10, 0, 0, 1], [10, 0, 0, 2], 40000, 80, 2, 1, 0x18, b"GET /");
        write_pcap(&input, &[(100, 250_000, syn.clone()), (101, 0, data.clone())]);

        let config = CaptureConfig {
            read_file: Some(input.clone()),
            ..CaptureConfig::default()
        };
        let (frames, stats) = read_all(config, Some(copy.clone()));
        assert_eq!(stats.captured, 2);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].id, 1);
        assert!((frames[0].ts - 100.25).abs() < 1e-9);
        assert_eq!(frames[0].data, syn);
        assert_eq!(frames[1].wire_len, data.len() as u64);

        let replay = CaptureConfig {
            read_file: Some(copy.clone()),
            ..CaptureConfig::default()
        };
        let (again, _) = read_all(replay, None);
        assert_eq!(again.len(), 2);
        assert_eq!(again[1].data, data);

        let _ = std::fs::remove_file(&input);
        let _ = std::fs::remove_file(&copy);
    }

    #[test]
    fn open_failure_surfaces_from_join() {
        let config = CaptureConfig {
            read_file: Some(PathBuf::from("/nonexistent/tcpmon-missing.pcap")),
            ..CaptureConfig::default()
        };
        let running = Arc::new(AtomicBool::new(true));
        let handle = spawn(config, None, 4, running).unwrap();
        assert!(handle.frames.recv().is_err());
        assert!(matches!(handle.join(), Err(CaptureError::Pcap(_))));
    }
}
