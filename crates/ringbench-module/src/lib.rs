//! # ringbench-module — Linux implementations
//!
//! Everything that touches the kernel: the io_uring ABI, the three
//! shared ring windows, ring negotiation, the buffer arena, the targets,
//! and the producer/consumer pair that works the rings.
//!
//! ## Crate map
//!
//! | Module        | Contents                                              |
//! |---------------|-------------------------------------------------------|
//! | `uring_sys`   | ABI structs, constants, raw syscalls                  |
//! | `mmap_region` | `MmapRegion` owned memory window                      |
//! | `ring`        | `SubmissionRing`, `DescriptorTable`, `CompletionRing` |
//! | `setup`       | `UringHandle` (RingSetup), memlock limit              |
//! | `buffer_pool` | `BufferPool` slot-indexed arena                       |
//! | `target`      | `Target`, `TargetSet`                                 |
//! | `producer`    | `SubmissionProducer`                                  |
//! | `consumer`    | `CompletionConsumer`                                  |
//! | `probe`       | read-opcode probe                                     |
//! | `testing`     | anonymous rings, `FakeKernel` (feature `testing`)     |

pub mod buffer_pool;
pub mod consumer;
pub mod mmap_region;
pub mod probe;
pub mod producer;
pub mod ring;
pub mod setup;
pub mod target;
pub mod uring_sys;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use buffer_pool::BufferPool;
pub use consumer::CompletionConsumer;
pub use producer::SubmissionProducer;
pub use setup::UringHandle;
pub use target::{Target, TargetSet};
