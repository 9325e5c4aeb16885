//! Event names exchanged with the origin server.

// Transport lifecycle signals.
pub const CONNECT: &str = "connect";
pub const CONNECT_ERROR: &str = "connect_error";
pub const DISCONNECT: &str = "disconnect";

// Outbound commands.
pub const SUBSCRIBE_PROJECT: &str = "subscribe_project";
pub const UNSUBSCRIBE_PROJECT: &str = "unsubscribe_project";
pub const JOIN_RECYCLE_BIN_UPDATES: &str = "join_recycle_bin_updates";
pub const GET_RECYCLE_BIN_SUMMARY: &str = "get_recycle_bin_summary";

// Inbound events.
pub const FOLDER_SYNC: &str = "folder_sync";
pub const RECYCLE_BIN_EVENT: &str = "recycle_bin_event";
pub const RECYCLE_BIN: &str = "recycleBin";
pub const RECYCLE_BIN_UPDATE: &str = "recycle_bin_update";
pub const RECYCLE_BIN_SUMMARY: &str = "recycle_bin_summary";
pub const RECYCLE_BIN_ERROR: &str = "recycle_bin_error";
