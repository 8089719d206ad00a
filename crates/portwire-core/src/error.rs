use thiserror::Error;

use crate::component::ComponentState;
use crate::types::TypeMismatch;

/// Errors raised by the port-wiring and rendezvous core.
///
/// The first six variants are structural: they surface synchronously at the
/// call site that triggered them and are never retried. [`CoreError::ComponentStopped`]
/// is the exception, raised only out of [`crate::port::InputPort::receive`] and
/// [`crate::port::OutputPort::send`] as the mechanism by which one component's
/// termination propagates to its neighbors.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    TypeMismatch(#[from] TypeMismatch),

    #[error("port '{0}' is not backed by a plain value cell and cannot be assigned directly")]
    ImmutableCell(String),

    #[error("value assigned to port '{0}' is itself cell-shaped")]
    IllegalValue(String),

    #[error("port '{0}' is not subscriptable")]
    UnsubscriptablePort(String),

    #[error("input slot on port '{port}' (index {index:?}) already has an incoming connection")]
    FanInExceeded { port: String, index: Option<usize> },

    #[error("index/reference-count queries are not meaningful on this indexed handle")]
    UnsupportedQuery,

    #[error("no connection between '{origin}' and '{destination}' (index {index:?})")]
    NotConnected {
        origin: String,
        destination: String,
        index: Option<usize>,
    },

    #[error("peer component '{component}' stopped in state {state:?}")]
    ComponentStopped {
        component: String,
        state: ComponentState,
    },
}
