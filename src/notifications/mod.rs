//! Log of recent recycle-bin notifications.
//!
//! Every lifecycle event received from the server is appended here, whether
//! or not any channel subscriber is listening. The log answers questions
//! like "was a file deleted in the last five minutes?" and notifies its own
//! listeners as records arrive.

mod log;

pub use log::{
    NotificationListener, NotificationLog, NotificationRecord, DEFAULT_CAPACITY,
    DEFAULT_RECENT_WINDOW,
};
