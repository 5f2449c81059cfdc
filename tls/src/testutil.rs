//! In-memory transports and cache doubles shared by the unit tests.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::rc::Rc;
use std::sync::Mutex;

use crate::record::Transport;
use crate::session::SessionCache;
use crate::{Blocked, Connection, TlsError};

type ByteQueue = Rc<RefCell<VecDeque<u8>>>;

/// One end of an in-memory duplex pipe. Reads report `WouldBlock` when the
/// queue is empty; a read chunk limit and a shared write budget simulate
/// slow and back-pressured transports.
pub(crate) struct PipeEnd {
    rx: ByteQueue,
    tx: ByteQueue,
    read_chunk: usize,
    write_budget: Option<Rc<Cell<usize>>>,
    corks: Rc<Cell<usize>>,
    uncorks: Rc<Cell<usize>>,
    started_corked: bool,
}

impl PipeEnd {
    /// Handle to this end's inbound queue, for injecting raw bytes.
    pub(crate) fn rx_handle(&self) -> ByteQueue {
        self.rx.clone()
    }

    /// Counters for cork and uncork calls made through this end.
    pub(crate) fn cork_counters(&self) -> (Rc<Cell<usize>>, Rc<Cell<usize>>) {
        (self.corks.clone(), self.uncorks.clone())
    }

    /// Limit total accepted write bytes to a shared budget.
    pub(crate) fn with_write_budget(mut self, budget: Rc<Cell<usize>>) -> Self {
        self.write_budget = Some(budget);
        self
    }

    /// Report the socket as corked before the connection saw it.
    pub(crate) fn with_started_corked(mut self) -> Self {
        self.started_corked = true;
        self
    }
}

impl Read for PipeEnd {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut rx = self.rx.borrow_mut();
        if rx.is_empty() {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "pipe empty"));
        }
        let n = buf.len().min(self.read_chunk).min(rx.len());
        for slot in buf.iter_mut().take(n) {
            *slot = rx.pop_front().unwrap();
        }
        Ok(n)
    }
}

impl Write for PipeEnd {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = match &self.write_budget {
            Some(budget) => {
                if budget.get() == 0 {
                    return Err(io::Error::new(io::ErrorKind::WouldBlock, "no budget"));
                }
                let n = buf.len().min(budget.get());
                budget.set(budget.get() - n);
                n
            }
            None => buf.len(),
        };
        self.tx.borrow_mut().extend(buf[..n].iter().copied());
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for PipeEnd {
    fn cork(&mut self) {
        self.corks.set(self.corks.get() + 1);
    }

    fn uncork(&mut self) {
        self.uncorks.set(self.uncorks.get() + 1);
    }

    fn was_corked(&self) -> bool {
        self.started_corked
    }
}

/// A connected pair of pipe ends.
pub(crate) fn pipe() -> (PipeEnd, PipeEnd) {
    pipe_with_chunk(usize::MAX)
}

/// A connected pair whose reads deliver at most `chunk` bytes at a time.
pub(crate) fn chunked_pipe(chunk: usize) -> (PipeEnd, PipeEnd) {
    pipe_with_chunk(chunk)
}

fn pipe_with_chunk(chunk: usize) -> (PipeEnd, PipeEnd) {
    let a: ByteQueue = Rc::new(RefCell::new(VecDeque::new()));
    let b: ByteQueue = Rc::new(RefCell::new(VecDeque::new()));
    let make = |rx: &ByteQueue, tx: &ByteQueue| PipeEnd {
        rx: rx.clone(),
        tx: tx.clone(),
        read_chunk: chunk,
        write_budget: None,
        corks: Rc::new(Cell::new(0)),
        uncorks: Rc::new(Cell::new(0)),
        started_corked: false,
    };
    (make(&a, &b), make(&b, &a))
}

/// Append raw bytes to an inbound queue.
pub(crate) fn inject(queue: &ByteQueue, bytes: &[u8]) {
    queue.borrow_mut().extend(bytes.iter().copied());
}

/// Frame `payload` as a single record of the given content type.
pub(crate) fn record(content_type: u8, payload: &[u8]) -> Vec<u8> {
    let mut bytes = vec![content_type, 0x03, 0x03];
    bytes.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

/// Alternate both peers until neither has handshake work left.
pub(crate) fn run_handshake(
    client: &mut Connection,
    server: &mut Connection,
) -> Result<(), TlsError> {
    for _ in 0..10_000 {
        let client_blocked = client.negotiate()?;
        let server_blocked = server.negotiate()?;
        if client_blocked == Blocked::NotBlocked && server_blocked == Blocked::NotBlocked {
            return Ok(());
        }
    }
    panic!("handshake did not converge");
}

/// In-memory session cache recording deletions.
#[derive(Default)]
pub(crate) struct TestCache {
    entries: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
    deletes: Mutex<Vec<Vec<u8>>>,
}

impl TestCache {
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub(crate) fn delete_count(&self) -> usize {
        self.deletes.lock().unwrap().len()
    }

    pub(crate) fn deleted(&self) -> Vec<Vec<u8>> {
        self.deletes.lock().unwrap().clone()
    }
}

impl SessionCache for TestCache {
    fn lookup(&self, session_id: &[u8]) -> Option<Vec<u8>> {
        self.entries.lock().unwrap().get(session_id).cloned()
    }

    fn store(&self, session_id: &[u8], entry: &[u8]) {
        self.entries
            .lock()
            .unwrap()
            .insert(session_id.to_vec(), entry.to_vec());
    }

    fn delete(&self, session_id: &[u8]) {
        self.entries.lock().unwrap().remove(session_id);
        self.deletes.lock().unwrap().push(session_id.to_vec());
    }
}
