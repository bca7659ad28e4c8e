//! Pending-transaction stream: transport, frame dispatch, reconnect policy.

pub mod backoff;
pub mod dispatcher;
pub mod supervisor;
pub mod transport;

pub use backoff::{Backoff, BackoffConfig};
pub use dispatcher::{Frame, classify, parse_frame};
pub use supervisor::{ConnectionSupervisor, StateTransition, SupervisorHandle};
pub use transport::{Connection, Transport, WsConnection, WsTransport};
