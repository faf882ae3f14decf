// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Runner platform: channels, kernel table, memory regions.
//!
//! The master and the runners communicate exclusively through unbounded
//! channels carrying [`Notification`] values; there is no shared mutable
//! application state. FIFO data lives in the scratch memory interface,
//! persistent-delay tokens in a second never-released store, and
//! caller-registered buffers in the external table.

use std::sync::Mutex;
use std::time::Instant;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::config::RuntimeConfig;
use crate::errors::RuntimeError;
use crate::runtime::kernel::KernelRegistry;
use crate::runtime::memory::MemoryInterface;
use crate::runtime::message::Notification;
use crate::scheduling::fifo::{Fifo, FifoAttribute, EXTERNAL_BASE, PERSISTENT_BASE};

pub struct Platform {
    pub config: RuntimeConfig,
    pub kernels: KernelRegistry,
    pub memory: MemoryInterface,
    pub persistent: MemoryInterface,
    external: Vec<Mutex<Vec<u8>>>,
    senders: Vec<UnboundedSender<Notification>>,
    master: UnboundedSender<Notification>,
    epoch: Instant,
}

impl Platform {
    /// Build the platform and the runner-side channel receivers.
    pub fn new(
        config: RuntimeConfig,
        kernels: KernelRegistry,
        external_buffers: Vec<Vec<u8>>,
    ) -> (Platform, Vec<UnboundedReceiver<Notification>>, UnboundedReceiver<Notification>) {
        let pe_count = config.pe_count();
        let mut senders = Vec::with_capacity(pe_count);
        let mut receivers = Vec::with_capacity(pe_count);
        for _ in 0..pe_count {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.push(tx);
            receivers.push(rx);
        }
        let (master_tx, master_rx) = mpsc::unbounded_channel();
        let platform = Platform {
            config,
            kernels,
            memory: MemoryInterface::new(),
            persistent: MemoryInterface::new(),
            external: external_buffers.into_iter().map(Mutex::new).collect(),
            senders,
            master: master_tx,
            epoch: Instant::now(),
        };
        (platform, receivers, master_rx)
    }

    pub fn lrt_count(&self) -> usize {
        self.senders.len()
    }

    pub fn now(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    pub fn send_to(&self, lrt: usize, notification: Notification) -> Result<(), RuntimeError> {
        self.senders
            .get(lrt)
            .ok_or(RuntimeError::RunnerUnreachable(lrt))?
            .send(notification)
            .map_err(|_| RuntimeError::RunnerUnreachable(lrt))
    }

    pub fn broadcast(&self, notification: &Notification) {
        for sender in &self.senders {
            let _ = sender.send(notification.clone());
        }
    }

    /// Broadcast to every runner except `lrt`.
    pub fn broadcast_from(&self, lrt: usize, notification: &Notification) {
        for (ix, sender) in self.senders.iter().enumerate() {
            if ix != lrt {
                let _ = sender.send(notification.clone());
            }
        }
    }

    pub fn send_master(&self, notification: Notification) {
        let _ = self.master.send(notification);
    }

    /// Copy one input FIFO's bytes, routing by address region.
    pub fn read_fifo(&self, runner: usize, fifo: &Fifo) -> Result<Vec<u8>, RuntimeError> {
        let size = fifo.size as usize;
        let offset = fifo.offset as usize;
        if fifo.virtual_address >= EXTERNAL_BASE {
            let ix = (fifo.virtual_address - EXTERNAL_BASE) as usize;
            let buffer = self
                .external
                .get(ix)
                .ok_or(RuntimeError::BufferMissing {
                    runner,
                    address: fifo.virtual_address,
                })?
                .lock()
                .expect("external lock");
            let end = (offset + size).min(buffer.len());
            let mut data = buffer.get(offset..end).unwrap_or(&[]).to_vec();
            data.resize(size, 0);
            Ok(data)
        } else if fifo.virtual_address >= PERSISTENT_BASE {
            Ok(self.persistent.read_or_create(fifo.virtual_address, offset, size))
        } else {
            self.memory
                .read(fifo.virtual_address, offset, size)
                .ok_or(RuntimeError::BufferMissing {
                    runner,
                    address: fifo.virtual_address,
                })
        }
    }

    /// Store one output FIFO's bytes, routing by address region.
    pub fn write_fifo(&self, runner: usize, fifo: &Fifo, data: &[u8]) -> Result<(), RuntimeError> {
        let offset = fifo.offset as usize;
        if fifo.virtual_address >= EXTERNAL_BASE {
            let ix = (fifo.virtual_address - EXTERNAL_BASE) as usize;
            let mut buffer = self
                .external
                .get(ix)
                .ok_or(RuntimeError::BufferMissing {
                    runner,
                    address: fifo.virtual_address,
                })?
                .lock()
                .expect("external lock");
            if buffer.len() < offset + data.len() {
                buffer.resize(offset + data.len(), 0);
            }
            buffer[offset..offset + data.len()].copy_from_slice(data);
            Ok(())
        } else if fifo.virtual_address >= PERSISTENT_BASE {
            self.persistent.read_or_create(fifo.virtual_address, 0, data.len());
            self.persistent.write(fifo.virtual_address, offset, data);
            Ok(())
        } else {
            if self.memory.write(fifo.virtual_address, offset, data) {
                Ok(())
            } else {
                Err(RuntimeError::BufferMissing {
                    runner,
                    address: fifo.virtual_address,
                })
            }
        }
    }

    /// Allocate the backing region of an owned output FIFO.
    pub fn allocate_output(&self, fifo: &Fifo) {
        if fifo.attribute == FifoAttribute::ReadWriteOwn && fifo.virtual_address < PERSISTENT_BASE {
            self.memory
                .allocate(fifo.virtual_address, fifo.size as usize, fifo.count.max(1));
        }
    }

    /// One reader done with an input FIFO.
    pub fn release_input(&self, fifo: &Fifo) {
        if fifo.virtual_address < PERSISTENT_BASE
            && matches!(
                fifo.attribute,
                FifoAttribute::ReadOnly | FifoAttribute::ReadWriteOwn
            )
        {
            self.memory.release(fifo.virtual_address);
        }
    }

    /// Copy of a registered external buffer; host-facing readback.
    pub fn external_buffer(&self, ix: usize) -> Option<Vec<u8>> {
        self.external.get(ix).map(|b| b.lock().expect("external lock").clone())
    }
}
