// Event bus subscribers
//
// Registered on the EventBus at startup, queue first then broadcast. Each
// handles its own failures so neither can block the other.

pub mod broadcast;
pub mod notification;

pub use broadcast::BroadcastListener;
pub use notification::NotificationListener;
