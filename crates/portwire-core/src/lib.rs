//! Parameter-wiring and rendezvous core of a dataflow execution engine.
//!
//! Components declare typed [`InputPort`]s and [`OutputPort`]s; a pipeline
//! author wires them together with [`connect`]; at run time each component
//! drives its ports through the `send`/`receive` rendezvous. See
//! `SPEC_FULL.md` at the workspace root for the full design.

pub mod cell;
pub mod component;
pub mod edge;
pub mod error;
pub mod signal;
pub mod types;

mod port;

pub use edge::EdgeRef;
pub use error::CoreError;
pub use port::{connect, disconnect, Endpoint, IndexedHandle, InputPort, IntoEndpoint, OutputPort, Port};
pub use signal::Signal;
pub use types::{check_type, ScalarType, SequenceKind, Tensor, TypeDescriptor, Value};
