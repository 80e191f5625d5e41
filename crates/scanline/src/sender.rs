// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Outbound command path: one send queue, one keepalive timer.
//!
//! A single socket carries every command datagram for every scan head.
//! The sender task drains a FIFO of (destination, bytes) pairs; the timer
//! task re-emits the cached scan-request vector every 500 ms while
//! scanning so heads can detect a restarted client by its request
//! sequence. A failed send is logged and the loop continues.

use crate::protocol::SCAN_SERVER_PORT;
use std::collections::VecDeque;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Cadence of scan-request re-emission.
const SCAN_REQUEST_INTERVAL: Duration = Duration::from_millis(500);
/// Timer poll period between cadence checks.
const TIMER_POLL: Duration = Duration::from_millis(100);
/// Pause after each send; bursts of back-to-back datagrams get dropped by
/// some host network stacks.
const POST_SEND_PAUSE: Duration = Duration::from_millis(1);

struct SenderShared {
    socket: UdpSocket,
    queue: Mutex<VecDeque<(Ipv4Addr, Vec<u8>)>>,
    pending: Condvar,
    /// Cached scan requests re-emitted by the timer, one per head.
    scan_requests: Mutex<Vec<(Ipv4Addr, Vec<u8>)>>,
    last_emit: Mutex<Instant>,
    running: AtomicBool,
    scanning: AtomicBool,
}

/// The shared send/timer pair. One per scan system.
pub(crate) struct ScanSender {
    shared: Arc<SenderShared>,
    sender_handle: Mutex<Option<JoinHandle<()>>>,
    timer_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ScanSender {
    pub fn spawn() -> std::io::Result<Self> {
        let shared = Arc::new(SenderShared {
            socket: crate::net::send_socket()?,
            queue: Mutex::new(VecDeque::new()),
            pending: Condvar::new(),
            scan_requests: Mutex::new(Vec::new()),
            last_emit: Mutex::new(Instant::now()),
            running: AtomicBool::new(true),
            scanning: AtomicBool::new(false),
        });

        let sender_shared = Arc::clone(&shared);
        let sender_handle = std::thread::Builder::new()
            .name("scanline-send".into())
            .spawn(move || send_main(&sender_shared))?;

        let timer_shared = Arc::clone(&shared);
        let timer_handle = std::thread::Builder::new()
            .name("scanline-timer".into())
            .spawn(move || timer_main(&timer_shared))?;

        Ok(Self {
            shared,
            sender_handle: Mutex::new(Some(sender_handle)),
            timer_handle: Mutex::new(Some(timer_handle)),
        })
    }

    /// Queue one datagram for the scan server on `ip`.
    pub fn send(&self, ip: Ipv4Addr, datagram: Vec<u8>) {
        let mut queue = lock(&self.shared.queue);
        queue.push_back((ip, datagram));
        self.shared.pending.notify_all();
    }

    /// Swap in the scan-request vector and emit it immediately; the timer
    /// keeps re-emitting it until cleared.
    pub fn enqueue_scan_requests(&self, requests: Vec<(Ipv4Addr, Vec<u8>)>) {
        {
            let mut cached = lock(&self.shared.scan_requests);
            *cached = requests.clone();
        }
        *lock(&self.shared.last_emit) = Instant::now();
        for (ip, datagram) in requests {
            self.send(ip, datagram);
        }
    }

    /// Stop the keepalive cadence. Sent requests are not recalled; heads
    /// notice the silence.
    pub fn clear_scan_requests(&self) {
        lock(&self.shared.scan_requests).clear();
    }

    /// Enable the timer cadence (asserted while the system scans).
    pub fn start(&self) {
        self.shared.scanning.store(true, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.shared.scanning.store(false, Ordering::SeqCst);
    }

    /// Drain both tasks, close the socket, join the threads.
    pub fn shutdown(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.scanning.store(false, Ordering::SeqCst);
        self.shared.pending.notify_all();

        for slot in [&self.sender_handle, &self.timer_handle] {
            let handle = lock(slot).take();
            if let Some(handle) = handle {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for ScanSender {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn send_main(shared: &SenderShared) {
    while shared.running.load(Ordering::SeqCst) {
        let next = {
            let mut queue = lock(&shared.queue);
            loop {
                if !shared.running.load(Ordering::SeqCst) {
                    return;
                }
                if let Some(message) = queue.pop_front() {
                    break message;
                }
                queue = shared
                    .pending
                    .wait_timeout(queue, Duration::from_millis(250))
                    .unwrap_or_else(|e| e.into_inner())
                    .0;
            }
        };

        let (ip, datagram) = next;
        if ip.is_unspecified() {
            continue;
        }

        let dest = SocketAddrV4::new(ip, SCAN_SERVER_PORT);
        if let Err(e) = shared.socket.send_to(&datagram, dest) {
            log::warn!("[send] sendto {} failed: {}", dest, e);
            continue;
        }

        std::thread::sleep(POST_SEND_PAUSE);
    }
}

fn timer_main(shared: &SenderShared) {
    while shared.running.load(Ordering::SeqCst) {
        if shared.scanning.load(Ordering::SeqCst) {
            let due = {
                let last_emit = lock(&shared.last_emit);
                last_emit.elapsed() >= SCAN_REQUEST_INTERVAL
            };

            if due {
                let requests = lock(&shared.scan_requests).clone();
                if !requests.is_empty() {
                    for (ip, datagram) in requests {
                        let mut queue = lock(&shared.queue);
                        queue.push_back((ip, datagram));
                        shared.pending.notify_all();
                    }
                    *lock(&shared.last_emit) = Instant::now();
                }
            }
        }

        std::thread::sleep(TIMER_POLL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::UdpSocket;
    use std::sync::OnceLock;

    /// The scan server port is fixed, so tests that bind it take turns.
    fn port_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    fn recv_with_deadline(socket: &UdpSocket, deadline: Duration) -> Option<Vec<u8>> {
        socket
            .set_read_timeout(Some(deadline))
            .expect("set timeout");
        let mut buf = [0u8; 256];
        socket.recv(&mut buf).ok().map(|n| buf[..n].to_vec())
    }

    #[test]
    fn queued_datagrams_reach_the_scan_server_port() {
        let _guard = port_lock().lock().unwrap_or_else(|e| e.into_inner());
        // A receiver standing in for the scan head command port. Skip when
        // something outside the test process already holds it.
        let Ok(server) = UdpSocket::bind(("127.0.0.1", SCAN_SERVER_PORT)) else {
            return;
        };

        let sender = ScanSender::spawn().expect("spawn");
        sender.send(Ipv4Addr::LOCALHOST, vec![1, 2, 3, 4]);

        let got = recv_with_deadline(&server, Duration::from_secs(5));
        assert_eq!(got, Some(vec![1, 2, 3, 4]));
        sender.shutdown();
    }

    #[test]
    fn scan_requests_emit_immediately_and_on_cadence() {
        let _guard = port_lock().lock().unwrap_or_else(|e| e.into_inner());
        let Ok(server) = UdpSocket::bind(("127.0.0.1", SCAN_SERVER_PORT)) else {
            return;
        };

        let sender = ScanSender::spawn().expect("spawn");
        sender.start();
        sender.enqueue_scan_requests(vec![(Ipv4Addr::LOCALHOST, vec![0xAB; 8])]);

        // First emission promptly after enqueue.
        let first = Instant::now();
        assert!(recv_with_deadline(&server, Duration::from_millis(500)).is_some());
        assert!(first.elapsed() < Duration::from_millis(500));

        // Then one roughly every 500 ms.
        let second_at = Instant::now();
        assert!(recv_with_deadline(&server, Duration::from_secs(2)).is_some());
        let gap = second_at.elapsed();
        assert!(
            gap >= Duration::from_millis(300) && gap <= Duration::from_millis(900),
            "gap {:?}",
            gap
        );

        sender.clear_scan_requests();
        sender.stop();
        sender.shutdown();
    }
}
