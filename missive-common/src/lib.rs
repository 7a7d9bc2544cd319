pub mod logging;
pub mod message;
pub mod record;
pub mod status;

pub use message::EmailMessage;
pub use record::{DeliveryRecord, RecordId};
pub use status::DeliveryStatus;
pub use tracing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
}
