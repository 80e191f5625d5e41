// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-head receive task.
//!
//! One dedicated thread per scan head owns the head's datagram socket and
//! drives the profile assembler. A single state variable controls it:
//!
//! - `Stopped`: the thread parks on a condition variable.
//! - `Running`: the thread blocks up to one second for a datagram, then
//!   classifies it by leading magic: data packets feed the assembler,
//!   status messages replace the head's snapshot, anything else is
//!   dropped.
//! - `ShuttingDown`: the thread exits; the socket closes when it drops.
//!
//! Malformed datagrams are logged and skipped; nothing on this path can
//! surface an error to the host.

use crate::assembler::Assembler;
use crate::head::HeadShared;
use crate::net;
use crate::protocol::{self, StatusMessage, DATA_MAGIC, RESPONSE_MAGIC};
use crate::queue::ProfileQueue;
use std::io;
use std::net::UdpSocket;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// The JS-50 theoretical max packet is 8k plus header; in practice the
/// max is 1456 * 4 plus header. 6k covers it.
const MAX_PACKET_SIZE: usize = 6_144;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReceiverState {
    Stopped,
    Running,
    ShuttingDown,
}

struct CtlState {
    state: ReceiverState,
    /// Bumped on every start; the task drops in-flight assembly when it
    /// observes a new generation, even if it never parked.
    generation: u64,
}

struct ReceiverCtl {
    inner: Mutex<CtlState>,
    wake: Condvar,
}

/// Handle to one head's receive task.
pub(crate) struct Receiver {
    ctl: Arc<ReceiverCtl>,
    handle: Mutex<Option<JoinHandle<()>>>,
    port: u16,
}

impl Receiver {
    /// Bind the receive socket and spawn the task in `Stopped`.
    pub fn spawn(
        serial: u32,
        shared: Arc<HeadShared>,
        queue: Arc<ProfileQueue>,
    ) -> io::Result<Self> {
        let (socket, port) = net::recv_socket()?;
        let ctl = Arc::new(ReceiverCtl {
            inner: Mutex::new(CtlState {
                state: ReceiverState::Stopped,
                generation: 0,
            }),
            wake: Condvar::new(),
        });

        let thread_ctl = Arc::clone(&ctl);
        let handle = std::thread::Builder::new()
            .name(format!("scanline-recv-{}", serial))
            .spawn(move || receive_main(&socket, &thread_ctl, &shared, &queue))?;

        log::debug!("[recv] serial={} bound port {}", serial, port);

        Ok(Self {
            ctl,
            handle: Mutex::new(Some(handle)),
            port,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn start(&self) {
        let mut ctl = self.ctl.inner.lock().unwrap_or_else(|e| e.into_inner());
        if ctl.state != ReceiverState::ShuttingDown {
            ctl.state = ReceiverState::Running;
            ctl.generation += 1;
        }
        self.ctl.wake.notify_all();
    }

    pub fn stop(&self) {
        self.transition(ReceiverState::Stopped);
    }

    /// Ask the task to exit and join it. Bounded by the socket read
    /// timeout; the task re-checks state at least once a second.
    pub fn shutdown(&self) {
        self.transition(ReceiverState::ShuttingDown);
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    fn transition(&self, next: ReceiverState) {
        let mut ctl = self.ctl.inner.lock().unwrap_or_else(|e| e.into_inner());
        if ctl.state != ReceiverState::ShuttingDown {
            ctl.state = next;
        }
        self.ctl.wake.notify_all();
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn receive_main(
    socket: &UdpSocket,
    ctl: &ReceiverCtl,
    shared: &HeadShared,
    queue: &ProfileQueue,
) {
    let mut buf = vec![0u8; MAX_PACKET_SIZE];
    let mut assembler = Assembler::new();
    let mut seen_generation = 0u64;

    loop {
        let generation = {
            let mut state = ctl.inner.lock().unwrap_or_else(|e| e.into_inner());
            loop {
                match state.state {
                    ReceiverState::ShuttingDown => {
                        log::debug!(
                            "[recv] exiting, {} complete profiles this session",
                            assembler.complete_profiles()
                        );
                        return;
                    }
                    ReceiverState::Stopped => {
                        state = ctl.wake.wait(state).unwrap_or_else(|e| e.into_inner());
                    }
                    ReceiverState::Running => break state.generation,
                }
            }
        };

        if generation != seen_generation {
            // Fresh scan run: anything half-assembled belongs to the
            // previous session.
            assembler.reset();
            seen_generation = generation;
        }

        let num_bytes = match socket.recv(&mut buf) {
            Ok(n) => n,
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(e) => {
                log::warn!("[recv] socket error: {}", e);
                std::thread::sleep(Duration::from_millis(10));
                continue;
            }
        };

        if num_bytes < protocol::data::DATAGRAM_HEADER_SIZE {
            log::warn!("[recv] short datagram ({} bytes), dropped", num_bytes);
            continue;
        }

        let datagram = &buf[..num_bytes];
        let magic = u16::from_be_bytes([datagram[0], datagram[1]]);

        if magic == DATA_MAGIC {
            shared.count_data_packet();
            match protocol::DataPacket::parse(datagram) {
                Ok(packet) => {
                    let alignment = shared.alignment_snapshot();
                    assembler.process(&packet, &alignment, queue);
                }
                Err(e) => {
                    log::warn!("[recv] bad data packet: {}, dropped", e);
                }
            }
        } else if magic == RESPONSE_MAGIC {
            match StatusMessage::deserialize(datagram) {
                Ok(status) => shared.store_status(status),
                Err(e) => {
                    log::warn!("[recv] bad status message: {}, dropped", e);
                }
            }
        } else {
            log::warn!("[recv] unknown magic 0x{:04X}, dropped", magic);
        }
    }
}
