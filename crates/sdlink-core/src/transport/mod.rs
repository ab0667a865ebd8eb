//! Transport layer module.

pub mod block;
pub mod mock;
pub mod traits;

pub use block::BlockDeviceTransport;
pub use mock::MockTransport;
pub use traits::{RegisterTransport, TransportError};
