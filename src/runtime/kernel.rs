// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Kernel registry and the builtin glue kernels.
//!
//! A kernel receives the task's resolved input parameters, a slot for its
//! output parameters, the input buffers and the output buffers. Kernels
//! are indexed densely in registration order; the builtin glue block is
//! registered first so schedule tasks can reference it without a lookup.
//!
//! Glue parameter conventions (filled by `scheduling::task`):
//! * fork:      `[in_rate, n_outputs, out_rate...]` (no copy; readers alias)
//! * join:      `[out_rate, n_inputs, in_rate...]`
//! * repeat:    `[in_rate, out_rate]`
//! * duplicate: `[n_outputs, in_rate]` (no copy; readers alias)
//! * head:      `[n_outputs, in_rate, out_rate...]`
//! * tail:      `[n_inputs, out_rate, in_rate...]`
//! * init/end:  `[persistent, delay_value, memory_address]`

use std::sync::Arc;

/// Kernel signature: `(input_params, output_params, inputs, outputs)`.
pub type Kernel =
    Arc<dyn Fn(&[i64], &mut [i64], &[Vec<u8>], &mut [Vec<u8>]) + Send + Sync + 'static>;

/// Indices of the builtin glue kernels inside a registry.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinKernels {
    pub fork: usize,
    pub join: usize,
    pub repeat: usize,
    pub duplicate: usize,
    pub head: usize,
    pub tail: usize,
    pub init: usize,
    pub end: usize,
    pub sync_send: usize,
    pub sync_receive: usize,
}

impl BuiltinKernels {
    /// Kernel index for a glue subtype.
    pub fn for_kind(&self, kind: crate::pisdf::VertexKind) -> usize {
        use crate::pisdf::VertexKind::*;
        match kind {
            Fork => self.fork,
            Join => self.join,
            Repeat => self.repeat,
            Duplicate => self.duplicate,
            Head => self.head,
            Tail => self.tail,
            Init => self.init,
            End => self.end,
            _ => usize::MAX,
        }
    }
}

/// Dense kernel table.
pub struct KernelRegistry {
    kernels: Vec<Kernel>,
    builtins: BuiltinKernels,
}

impl KernelRegistry {
    /// Registry pre-loaded with the glue kernels.
    pub fn new() -> KernelRegistry {
        let mut kernels: Vec<Kernel> = Vec::new();
        let mut push = |k: Kernel| {
            kernels.push(k);
            kernels.len() - 1
        };

        // Fork and duplicate never copy: their consumers alias the input
        // buffer through read-only FIFOs.
        let fork = push(Arc::new(|_: &[i64], _: &mut [i64], _: &[Vec<u8>], _: &mut [Vec<u8>]| {}));
        let join = push(Arc::new(
            |_params: &[i64], _out: &mut [i64], inputs: &[Vec<u8>], outputs: &mut [Vec<u8>]| {
                if let Some(output) = outputs.first_mut() {
                    let mut cursor = 0;
                    for input in inputs {
                        let end = (cursor + input.len()).min(output.len());
                        output[cursor..end].copy_from_slice(&input[..end - cursor]);
                        cursor = end;
                    }
                }
            },
        ));
        let repeat = push(Arc::new(
            |params: &[i64], _out: &mut [i64], inputs: &[Vec<u8>], outputs: &mut [Vec<u8>]| {
                let (Some(input), Some(output)) = (inputs.first(), outputs.first_mut()) else {
                    return;
                };
                let in_rate = params.first().copied().unwrap_or(0).max(1) as usize;
                let mut cursor = 0;
                while cursor < output.len() {
                    let chunk = in_rate.min(output.len() - cursor).min(input.len());
                    output[cursor..cursor + chunk].copy_from_slice(&input[..chunk]);
                    cursor += chunk.max(1);
                }
            },
        ));
        let duplicate =
            push(Arc::new(|_: &[i64], _: &mut [i64], _: &[Vec<u8>], _: &mut [Vec<u8>]| {}));
        let head = push(Arc::new(
            |_params: &[i64], _out: &mut [i64], inputs: &[Vec<u8>], outputs: &mut [Vec<u8>]| {
                // Keep the first tokens of the input stream.
                let mut cursor = 0usize;
                let flat: Vec<u8> = inputs.iter().flatten().copied().collect();
                for output in outputs.iter_mut() {
                    let end = (cursor + output.len()).min(flat.len());
                    output[..end - cursor].copy_from_slice(&flat[cursor..end]);
                    cursor = end;
                }
            },
        ));
        let tail = push(Arc::new(
            |_params: &[i64], _out: &mut [i64], inputs: &[Vec<u8>], outputs: &mut [Vec<u8>]| {
                // Keep the last tokens of the input stream.
                let flat: Vec<u8> = inputs.iter().flatten().copied().collect();
                if let Some(output) = outputs.first_mut() {
                    let keep = output.len().min(flat.len());
                    let start = flat.len() - keep;
                    output[..keep].copy_from_slice(&flat[start..]);
                }
            },
        ));
        let init = push(Arc::new(
            |params: &[i64], _out: &mut [i64], inputs: &[Vec<u8>], outputs: &mut [Vec<u8>]| {
                let persistent = params.first().copied().unwrap_or(0) != 0;
                let Some(output) = outputs.first_mut() else {
                    return;
                };
                if persistent {
                    // Tokens recovered from the stable delay storage.
                    if let Some(storage) = inputs.first() {
                        let n = output.len().min(storage.len());
                        output[..n].copy_from_slice(&storage[..n]);
                    }
                } else {
                    output.fill(0);
                }
            },
        ));
        let end = push(Arc::new(
            |params: &[i64], _out: &mut [i64], inputs: &[Vec<u8>], outputs: &mut [Vec<u8>]| {
                let persistent = params.first().copied().unwrap_or(0) != 0;
                if persistent {
                    if let (Some(input), Some(storage)) = (inputs.first(), outputs.first_mut()) {
                        let n = storage.len().min(input.len());
                        storage[..n].copy_from_slice(&input[..n]);
                    }
                }
            },
        ));
        // Synchronization stubs are pure ordering barriers.
        let sync_send =
            push(Arc::new(|_: &[i64], _: &mut [i64], _: &[Vec<u8>], _: &mut [Vec<u8>]| {}));
        let sync_receive =
            push(Arc::new(|_: &[i64], _: &mut [i64], _: &[Vec<u8>], _: &mut [Vec<u8>]| {}));

        KernelRegistry {
            kernels,
            builtins: BuiltinKernels {
                fork,
                join,
                repeat,
                duplicate,
                head,
                tail,
                init,
                end,
                sync_send,
                sync_receive,
            },
        }
    }

    /// Register a user kernel; returns its dense index.
    pub fn register<F>(&mut self, kernel: F) -> usize
    where
        F: Fn(&[i64], &mut [i64], &[Vec<u8>], &mut [Vec<u8>]) + Send + Sync + 'static,
    {
        self.kernels.push(Arc::new(kernel));
        self.kernels.len() - 1
    }

    pub fn get(&self, ix: usize) -> Option<Kernel> {
        self.kernels.get(ix).cloned()
    }

    pub fn builtins(&self) -> BuiltinKernels {
        self.builtins
    }

    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }
}

impl Default for KernelRegistry {
    fn default() -> Self {
        KernelRegistry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoke(registry: &KernelRegistry, ix: usize, params: &[i64], inputs: &[Vec<u8>], out_sizes: &[usize]) -> Vec<Vec<u8>> {
        let kernel = registry.get(ix).expect("kernel registered");
        let mut outputs: Vec<Vec<u8>> = out_sizes.iter().map(|&s| vec![0; s]).collect();
        let mut out_params = Vec::new();
        kernel(params, &mut out_params, inputs, &mut outputs);
        outputs
    }

    #[test]
    fn join_concatenates_inputs() {
        let registry = KernelRegistry::new();
        let b = registry.builtins();
        let outputs = invoke(
            &registry,
            b.join,
            &[4, 2, 2, 2],
            &[vec![1, 2], vec![3, 4]],
            &[4],
        );
        assert_eq!(outputs[0], vec![1, 2, 3, 4]);
    }

    #[test]
    fn repeat_tiles_its_input() {
        let registry = KernelRegistry::new();
        let b = registry.builtins();
        let outputs = invoke(&registry, b.repeat, &[2, 6], &[vec![7, 8]], &[6]);
        assert_eq!(outputs[0], vec![7, 8, 7, 8, 7, 8]);
    }

    #[test]
    fn head_and_tail_slice_the_stream() {
        let registry = KernelRegistry::new();
        let b = registry.builtins();
        let outputs = invoke(&registry, b.head, &[1, 4, 2], &[vec![1, 2, 3, 4]], &[2]);
        assert_eq!(outputs[0], vec![1, 2]);
        let outputs = invoke(&registry, b.tail, &[1, 2, 4], &[vec![1, 2, 3, 4]], &[2]);
        assert_eq!(outputs[0], vec![3, 4]);
    }

    #[test]
    fn init_zero_fills_without_persistence() {
        let registry = KernelRegistry::new();
        let b = registry.builtins();
        let outputs = invoke(&registry, b.init, &[0, 2, -1], &[], &[2]);
        assert_eq!(outputs[0], vec![0, 0]);
    }

    #[test]
    fn persistent_init_restores_storage() {
        let registry = KernelRegistry::new();
        let b = registry.builtins();
        let outputs = invoke(&registry, b.init, &[1, 2, 0], &[vec![9, 9]], &[2]);
        assert_eq!(outputs[0], vec![9, 9]);
    }

    #[test]
    fn user_kernels_index_after_builtins() {
        let mut registry = KernelRegistry::new();
        let base = registry.len();
        let ix = registry.register(|_, _, _, outputs| {
            if let Some(out) = outputs.first_mut() {
                out.fill(42);
            }
        });
        assert_eq!(ix, base);
        let outputs = invoke(&registry, ix, &[], &[], &[3]);
        assert_eq!(outputs[0], vec![42, 42, 42]);
    }
}
