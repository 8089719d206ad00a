//! Small components exercising `portwire-core`/`portwire-runtime` end to end,
//! mirroring the original's `tests/core/components.py` test fixtures.

pub mod components;

pub use components::{Adder, Constant, Sink, Stack, Unbind};
