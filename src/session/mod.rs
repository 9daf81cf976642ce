mod output;
mod ssh;

pub use output::{ErrorMatch, OutputChecker};
pub use ssh::SshConnector;

use std::ops::{Deref, DerefMut};

use crate::error::PushError;
use crate::models::Connection;

/// DeviceSession is one open management connection to a device.
///
/// All calls block until the device answers or the transport times out.
pub trait DeviceSession {
    /// Send one artifact as a configuration command set, returning the raw output
    fn send_config(&mut self, text: &str) -> Result<String, PushError>;

    /// Persist the running configuration, returning the raw output
    fn save_configuration(&mut self) -> Result<String, PushError>;

    /// Release the connection. Failures are logged, never raised.
    fn disconnect(&mut self);
}

/// Connector opens sessions from a device's connection parameters
pub trait Connector {
    type Session: DeviceSession;

    fn connect(&self, connection: &Connection) -> Result<Self::Session, PushError>;
}

/// SessionGuard disconnects its session exactly once: either through
/// [`SessionGuard::close`] or, on any other exit path, when dropped.
pub struct SessionGuard<S: DeviceSession> {
    session: S,
    host: String,
    open: bool,
}

impl<S: DeviceSession> SessionGuard<S> {
    pub fn new(session: S, host: &str) -> Self {
        Self {
            session,
            host: host.to_string(),
            open: true,
        }
    }

    /// Disconnect now
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.open {
            self.open = false;
            self.session.disconnect();
        }
    }
}

impl<S: DeviceSession> Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S: DeviceSession> DerefMut for SessionGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

impl<S: DeviceSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        if self.open {
            tracing::warn!("Releasing session to {} on early exit", self.host);
            self.release();
        }
    }
}
