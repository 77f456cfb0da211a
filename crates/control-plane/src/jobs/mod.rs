// Background job handlers run by the durable worker pool

pub mod notification;

pub use notification::{Delivery, NotificationError, NotificationHandler};
