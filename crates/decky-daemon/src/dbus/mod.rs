//! D-Bus interface for the Decky daemon.
//!
//! Provides the `org.decky.Daemon1` interface on the session bus.

mod interface;

pub use interface::run_dbus_server;
