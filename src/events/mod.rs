mod bus;
mod handlers;
mod types;

pub use bus::{EventBus, EventReceiver, DEFAULT_EVENT_CAPACITY};
pub use handlers::{console_line, ActivityLogHandler, ConsoleEventHandler};
pub use types::{EventSequence, MonitorEvent, MonitorEventPayload};
