//! Realtime incident updates
//!
//! A [`RealtimeTransport`] delivers decoded [`RealtimeMessage`]s to a set of
//! [`RealtimeHandlers`]; the [`RealtimeReconciler`] is the handler set that
//! keeps a view's store in line with its filter.

pub mod messages;
pub mod reconciler;
pub mod state;
pub mod transport;

pub use messages::{ClientAction, RealtimeMessage};
pub use reconciler::{Admission, RealtimeReconciler};
pub use state::{ConnectionState, ReconnectBackoff};
pub use transport::{InMemoryTransport, RealtimeHandlers, RealtimeTransport, StateListener};
