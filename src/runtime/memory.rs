// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Virtual-address backing store for FIFO buffers.
//!
//! Buffers are reference counted by reader releases: the producer arms
//! its direct consumer, aliasing tasks arm their own readers, and the
//! last reader frees the region. Persistent storage uses a second
//! instance whose regions are never released.

use std::collections::HashMap;
use std::sync::Mutex;

struct Buffer {
    data: Vec<u8>,
    releases_remaining: u32,
}

/// Thread-safe map from virtual addresses to byte buffers.
#[derive(Default)]
pub struct MemoryInterface {
    buffers: Mutex<HashMap<u64, Buffer>>,
}

impl MemoryInterface {
    pub fn new() -> MemoryInterface {
        MemoryInterface::default()
    }

    /// Create a zeroed region. Allocating an existing address keeps the
    /// stored data (persistent regions survive iterations this way).
    pub fn allocate(&self, address: u64, size: usize, releases: u32) {
        let mut buffers = self.buffers.lock().expect("memory lock");
        let buffer = buffers.entry(address).or_insert_with(|| Buffer {
            data: vec![0; size],
            releases_remaining: 0,
        });
        if buffer.data.len() < size {
            buffer.data.resize(size, 0);
        }
        buffer.releases_remaining = releases;
    }

    /// Copy `size` bytes out of a region.
    pub fn read(&self, address: u64, offset: usize, size: usize) -> Option<Vec<u8>> {
        let buffers = self.buffers.lock().expect("memory lock");
        let buffer = buffers.get(&address)?;
        let end = (offset + size).min(buffer.data.len());
        if offset > end {
            return None;
        }
        let mut data = buffer.data[offset..end].to_vec();
        data.resize(size, 0);
        Some(data)
    }

    /// Read a persistent-style region, creating it zeroed when absent.
    pub fn read_or_create(&self, address: u64, offset: usize, size: usize) -> Vec<u8> {
        {
            let mut buffers = self.buffers.lock().expect("memory lock");
            buffers.entry(address).or_insert_with(|| Buffer {
                data: vec![0; offset + size],
                releases_remaining: 0,
            });
        }
        self.read(address, offset, size).unwrap_or_else(|| vec![0; size])
    }

    /// Store bytes into a region.
    pub fn write(&self, address: u64, offset: usize, data: &[u8]) -> bool {
        let mut buffers = self.buffers.lock().expect("memory lock");
        match buffers.get_mut(&address) {
            Some(buffer) => {
                if buffer.data.len() < offset + data.len() {
                    buffer.data.resize(offset + data.len(), 0);
                }
                buffer.data[offset..offset + data.len()].copy_from_slice(data);
                true
            }
            None => false,
        }
    }

    /// Arm additional reader releases on an existing region. Fork and
    /// duplicate tasks call this for every aliasing reader before they
    /// release their own claim.
    pub fn add_releases(&self, address: u64, count: u32) {
        let mut buffers = self.buffers.lock().expect("memory lock");
        if let Some(buffer) = buffers.get_mut(&address) {
            buffer.releases_remaining += count;
        }
    }

    /// One reader done with the region; frees it after the last release.
    pub fn release(&self, address: u64) {
        let mut buffers = self.buffers.lock().expect("memory lock");
        if let Some(buffer) = buffers.get_mut(&address) {
            buffer.releases_remaining = buffer.releases_remaining.saturating_sub(1);
            if buffer.releases_remaining == 0 {
                buffers.remove(&address);
            }
        }
    }

    pub fn contains(&self, address: u64) -> bool {
        self.buffers.lock().expect("memory lock").contains_key(&address)
    }

    /// Drop every region; end-of-iteration cleanup for the scratch store.
    pub fn clear(&self) {
        self.buffers.lock().expect("memory lock").clear();
    }

    pub fn allocated_regions(&self) -> usize {
        self.buffers.lock().expect("memory lock").len()
    }
}
