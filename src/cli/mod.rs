pub mod funds;
pub mod list;
pub mod search;
pub mod setup;
pub mod ui;
pub mod watch;
