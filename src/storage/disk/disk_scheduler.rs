use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::common::{PageId, Result, StrataError, PAGE_SIZE};

use super::DiskManager;

type PageBuf = Box<[u8; PAGE_SIZE]>;

/// A disk I/O request processed by the scheduler's worker thread.
/// Buffers are moved through the channel and handed back on completion.
enum DiskRequest {
    Read {
        page_id: PageId,
        buf: PageBuf,
        ack: Sender<Result<PageBuf>>,
    },
    Write {
        page_id: PageId,
        buf: PageBuf,
        ack: Sender<Result<()>>,
    },
}

/// DiskScheduler owns a background worker thread that processes disk I/O
/// requests in arrival order. Callers use the `*_sync` methods, which park
/// on a completion channel until the worker has finished the request.
pub struct DiskScheduler {
    disk_manager: Arc<DiskManager>,
    /// Wrapped in Option so Drop can disconnect the channel before joining
    request_sender: Option<Sender<DiskRequest>>,
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Creates a scheduler and spawns its worker thread.
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (sender, receiver) = bounded::<DiskRequest>(128);

        let dm = Arc::clone(&disk_manager);
        let worker_handle = thread::spawn(move || Self::run_worker(dm, receiver));

        Self {
            disk_manager,
            request_sender: Some(sender),
            worker_handle: Some(worker_handle),
        }
    }

    /// Reads `page_id` into `data`, blocking until the I/O completes.
    pub fn schedule_read_sync(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (ack, done) = bounded(1);
        self.send(DiskRequest::Read {
            page_id,
            buf: Box::new([0u8; PAGE_SIZE]),
            ack,
        })?;

        let buf = Self::recv(&done)??;
        data.copy_from_slice(&buf[..]);
        Ok(())
    }

    /// Writes `data` to `page_id`, blocking until the I/O completes.
    pub fn schedule_write_sync(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let mut buf: PageBuf = Box::new([0u8; PAGE_SIZE]);
        buf.copy_from_slice(data);

        let (ack, done) = bounded(1);
        self.send(DiskRequest::Write { page_id, buf, ack })?;
        Self::recv(&done)?
    }

    /// Returns a reference to the underlying DiskManager.
    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    fn send(&self, request: DiskRequest) -> Result<()> {
        self.request_sender
            .as_ref()
            .expect("scheduler is shut down")
            .send(request)
            .map_err(|_| StrataError::DiskScheduler("worker thread is gone".into()))
    }

    fn recv<T>(done: &Receiver<T>) -> Result<T> {
        done.recv()
            .map_err(|_| StrataError::DiskScheduler("worker dropped completion".into()))
    }

    /// Worker loop: drains the request channel until every sender is dropped.
    fn run_worker(disk_manager: Arc<DiskManager>, receiver: Receiver<DiskRequest>) {
        for request in receiver {
            match request {
                DiskRequest::Read { page_id, mut buf, ack } => {
                    let result = disk_manager.read_page(page_id, &mut buf[..]).map(|_| buf);
                    let _ = ack.send(result);
                }
                DiskRequest::Write { page_id, buf, ack } => {
                    let _ = ack.send(disk_manager.write_page(page_id, &buf[..]));
                }
            }
        }
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        // Disconnect the channel so the worker's recv loop terminates
        self.request_sender.take();
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}
