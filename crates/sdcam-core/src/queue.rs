//! Single-worker command queue.
//!
//! Every register or camera transaction issued through a [`CommandQueue`] runs
//! on one worker thread, in enqueue order, one command at a time. That worker
//! is the only owner of the transport, so multi-step camera sequences can
//! never interleave with other register traffic.

use crate::bridge::RegisterBridge;
use crate::error::{Error, Result};
use crate::trace::TraceStore;
use crate::transport::Transport;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// The bridge as seen by queued commands.
pub type DeviceBridge = RegisterBridge<Box<dyn Transport>>;

type Job = Box<dyn FnOnce(&mut DeviceBridge) -> Result<()> + Send>;

struct Command {
    label: String,
    job: Job,
}

/// Cloneable submission handle; enqueue is the only thread-safe entry point.
#[derive(Clone)]
pub struct CommandQueue {
    tx_cmd: Sender<Command>,
    trace: Arc<Mutex<TraceStore>>,
}

/// Owner of the worker thread. The worker exits once every [`CommandQueue`]
/// handle is dropped and the remaining commands have run.
pub struct CommandWorker {
    handle: JoinHandle<()>,
}

impl CommandWorker {
    pub fn join(self) {
        if self.handle.join().is_err() {
            log::error!("command worker panicked");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Pending result of a queued command.
pub struct Reply<R> {
    rx: Receiver<Result<R>>,
}

impl<R> Reply<R> {
    pub fn wait(self) -> Result<R> {
        self.rx.recv().map_err(|_| Error::ReplyDropped)?
    }

    pub fn wait_timeout(self, timeout: Duration) -> Result<R> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(Error::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(Error::ReplyDropped),
        }
    }

    /// `None` while the command has not run yet.
    pub fn try_get(&self) -> Option<Result<R>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(Error::ReplyDropped)),
        }
    }
}

impl CommandQueue {
    pub fn spawn<T: Transport + 'static>(transport: T) -> Result<(Self, CommandWorker)> {
        let (tx_cmd, rx_cmd) = unbounded::<Command>();
        let mut bridge: DeviceBridge = RegisterBridge::new(Box::new(transport));
        let trace = bridge.trace();

        let handle = thread::Builder::new()
            .name("sdcam-command".to_string())
            .spawn(move || {
                for cmd in rx_cmd.iter() {
                    log::trace!("run {}", cmd.label);
                    if let Err(e) = (cmd.job)(&mut bridge) {
                        log::error!("{} failed: {e}", cmd.label);
                    }
                }
                if let Err(e) = bridge.close() {
                    log::warn!("transport close failed: {e}");
                }
                log::debug!("command worker exiting");
            })?;

        Ok((Self { tx_cmd, trace }, CommandWorker { handle }))
    }

    /// Enqueue an arbitrary command. It runs atomically with respect to every
    /// other command; an `Err` it returns is logged by the worker.
    pub fn submit<F>(&self, label: impl Into<String>, job: F) -> Result<()>
    where
        F: FnOnce(&mut DeviceBridge) -> Result<()> + Send + 'static,
    {
        self.tx_cmd
            .send(Command { label: label.into(), job: Box::new(job) })
            .map_err(|_| Error::QueueClosed)
    }

    /// Enqueue a command whose result is delivered through the returned [`Reply`].
    pub fn call<R, F>(&self, label: impl Into<String>, job: F) -> Result<Reply<R>>
    where
        R: Send + 'static,
        F: FnOnce(&mut DeviceBridge) -> Result<R> + Send + 'static,
    {
        let label = label.into();
        let tag = label.clone();
        let (tx, rx) = bounded(1);
        self.submit(label, move |bridge| {
            let result = job(bridge);
            if let Err(e) = &result {
                log::error!("{tag} failed: {e}");
            }
            // caller may have dropped the reply
            let _ = tx.send(result);
            Ok(())
        })?;
        Ok(Reply { rx })
    }

    pub fn write_register(&self, address: u16, data: u16) -> Result<()> {
        self.submit(format!("write_register({address:#06x}, {data:#06x})"), move |bridge| {
            bridge.write_register(address, data)
        })
    }

    pub fn read_register(&self, address: u16) -> Result<Reply<u16>> {
        self.call(format!("read_register({address:#06x})"), move |bridge| {
            bridge.read_register(address)
        })
    }

    pub fn write_camera_register(&self, addr: u16, data: u16) -> Result<()> {
        self.submit(format!("write_camera_register({addr:#06x}, {data:#06x})"), move |bridge| {
            bridge.write_camera_register(addr, data)
        })
    }

    pub fn read_camera_register(&self, addr: u16) -> Result<Reply<u16>> {
        self.call(format!("read_camera_register({addr:#06x})"), move |bridge| {
            bridge.read_camera_register(addr)
        })
    }

    /// Commands waiting for the worker.
    pub fn pending(&self) -> usize {
        self.tx_cmd.len()
    }

    pub fn trace(&self) -> Arc<Mutex<TraceStore>> {
        Arc::clone(&self.trace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{SPI_CSR, SPI_DR, WRITE_FLAG};
    use crate::loopback::{LoopbackTransport, Transaction};

    #[test]
    fn write_then_read_through_queue() {
        let device = LoopbackTransport::new();
        let (queue, worker) = CommandQueue::spawn(device.clone()).unwrap();
        queue.write_register(0x41, 0x2).unwrap();
        let reply = queue.read_register(0x41).unwrap();
        assert_eq!(reply.wait().unwrap(), 0x2);
        drop(queue);
        worker.join();
    }

    #[test]
    fn commands_run_in_enqueue_order() {
        let device = LoopbackTransport::new();
        let (queue, worker) = CommandQueue::spawn(device.clone()).unwrap();
        for i in 0..50u16 {
            queue.write_register(0x0100 + i, i).unwrap();
        }
        drop(queue);
        worker.join();
        let expected: Vec<Transaction> = (0..50u16).map(|i| Transaction::Write(0x0100 + i, i)).collect();
        assert_eq!(device.transactions(), expected);
    }

    #[test]
    fn per_thread_order_is_preserved() {
        let (queue, worker) = CommandQueue::spawn(LoopbackTransport::new()).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let producers: Vec<_> = (0..4usize)
            .map(|id| {
                let queue = queue.clone();
                let seen = Arc::clone(&seen);
                thread::spawn(move || {
                    for seq in 0..100usize {
                        let seen = Arc::clone(&seen);
                        queue
                            .submit("record", move |_| {
                                seen.lock().push((id, seq));
                                Ok(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }
        drop(queue);
        worker.join();

        let seen = seen.lock();
        assert_eq!(seen.len(), 400);
        for id in 0..4 {
            let order: Vec<usize> = seen.iter().filter(|(t, _)| *t == id).map(|(_, s)| *s).collect();
            assert_eq!(order, (0..100).collect::<Vec<_>>());
        }
    }

    #[test]
    fn camera_sequences_are_not_interleaved() {
        let device = LoopbackTransport::new();
        let (queue, worker) = CommandQueue::spawn(device.clone()).unwrap();

        let noise = {
            let queue = queue.clone();
            thread::spawn(move || {
                for i in 0..200u16 {
                    queue.write_register(0x0200, i).unwrap();
                }
            })
        };
        for reg in 0..20u16 {
            queue.write_camera_register(reg, reg * 3).unwrap();
        }
        noise.join().unwrap();
        drop(queue);
        worker.join();

        let log = device.transactions();
        let mut i = 0;
        while i < log.len() {
            if log[i] == Transaction::Write(SPI_CSR, 1) {
                let Transaction::Write(SPI_DR, cmd) = log[i + 1] else {
                    panic!("command byte expected at {}", i + 1);
                };
                let reg = cmd & !WRITE_FLAG;
                assert_eq!(log[i + 2], Transaction::Write(SPI_DR, reg * 3));
                assert_eq!(log[i + 3], Transaction::Write(SPI_CSR, 0));
                i += 4;
            } else {
                assert!(matches!(log[i], Transaction::Write(0x0200, _)));
                i += 1;
            }
        }
        for reg in 0..20u16 {
            assert_eq!(device.camera_register(reg), Some(reg * 3));
        }
    }

    #[test]
    fn camera_read_reply() {
        let device = LoopbackTransport::new();
        device.set_camera_register(0x0007, 0x0042);
        let (queue, worker) = CommandQueue::spawn(device).unwrap();
        assert_eq!(queue.read_camera_register(0x0007).unwrap().wait().unwrap(), 0x0042);
        drop(queue);
        worker.join();
    }

    #[test]
    fn failed_command_does_not_stop_worker() {
        let device = LoopbackTransport::new();
        device.fail_exchange(0);
        let (queue, worker) = CommandQueue::spawn(device.clone()).unwrap();
        let first = queue.read_register(0x0001).unwrap();
        queue.write_register(0x0001, 9).unwrap();
        let second = queue.read_register(0x0001).unwrap();
        assert!(matches!(first.wait(), Err(Error::Io(_))));
        assert_eq!(second.wait().unwrap(), 9);
        drop(queue);
        worker.join();
    }

    #[test]
    fn reply_is_dropped_with_panicking_job() {
        let (queue, worker) = CommandQueue::spawn(LoopbackTransport::new()).unwrap();
        let reply: Reply<u16> = queue.call("boom", |_| panic!("boom")).unwrap();
        assert!(matches!(reply.wait(), Err(Error::ReplyDropped)));
        worker.join();
        assert!(matches!(queue.write_register(0, 0), Err(Error::QueueClosed)));
    }

    #[test]
    fn trace_is_shared_with_queue() {
        let (queue, worker) = CommandQueue::spawn(LoopbackTransport::new()).unwrap();
        queue.read_register(0x0003).unwrap().wait().unwrap();
        assert_eq!(queue.trace().lock().len(), 2);
        drop(queue);
        worker.join();
    }
}
