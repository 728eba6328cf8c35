pub mod store;

pub use store::*;

use parking_lot::Mutex;
use std::sync::Arc;

/// Store handle shared between the view and the realtime callbacks.
///
/// The lock is never held across an `.await`.
pub type SharedStore = Arc<Mutex<IncidentStore>>;
