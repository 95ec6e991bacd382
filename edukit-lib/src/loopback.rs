//! In-memory duplex byte channel for running a transceiver against a mock
//! device without hardware. Each direction is a FIFO; bytes arrive in write
//! order and nothing aligns logical frames, just like the serial wire.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use crate::protocol::Transport;

type Fifo = Arc<Mutex<VecDeque<u8>>>;

pub struct LoopbackLink {
    rx: Fifo,
    tx: Fifo,
}

/// Two connected link ends: what one end sends, the other receives.
pub fn pair() -> (LoopbackLink, LoopbackLink) {
    let a: Fifo = Arc::new(Mutex::new(VecDeque::new()));
    let b: Fifo = Arc::new(Mutex::new(VecDeque::new()));
    (
        LoopbackLink {
            rx: a.clone(),
            tx: b.clone(),
        },
        LoopbackLink { rx: b, tx: a },
    )
}

fn lock(fifo: &Fifo) -> io::Result<std::sync::MutexGuard<'_, VecDeque<u8>>> {
    fifo.lock()
        .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "link peer panicked"))
}

impl Transport for LoopbackLink {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        lock(&self.tx)?.extend(bytes.iter().copied());
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut fifo = lock(&self.rx)?;
        let n = buf.len().min(fifo.len());
        for (slot, byte) in buf.iter_mut().zip(fifo.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}
