//! Lifecycle events delivered for a single call
//!
//! A call produces any number of non-terminal events followed by at most one
//! [`End`]. Only `End` carries what the latency handler needs.

use std::error::Error;
use std::time::SystemTime;

/// One notification from the call-execution layer
#[derive(Debug)]
pub enum LifecycleEvent<'a> {
    /// The call started
    Begin(Begin),
    /// A message was received
    InPayload(InPayload),
    /// A message was sent
    OutPayload(OutPayload),
    /// The call completed, successfully or not
    End(End<'a>),
}

impl LifecycleEvent<'_> {
    /// True for the terminal variant
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleEvent::End(_))
    }
}

/// Call start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Begin {
    pub begin_time: SystemTime,
    pub is_client_stream: bool,
    pub is_server_stream: bool,
    /// Set when the transport retried the call without the application seeing it
    pub is_transparent_retry_attempt: bool,
}

impl Begin {
    /// A unary, first-attempt begin event
    pub fn at(begin_time: SystemTime) -> Self {
        Self {
            begin_time,
            is_client_stream: false,
            is_server_stream: false,
            is_transparent_retry_attempt: false,
        }
    }
}

/// Inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InPayload {
    /// Decoded payload length in bytes
    pub length: usize,
    /// Length on the wire, including framing and compression
    pub wire_length: usize,
    pub recv_time: SystemTime,
}

/// Outbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutPayload {
    /// Decoded payload length in bytes
    pub length: usize,
    /// Length on the wire, including framing and compression
    pub wire_length: usize,
    pub sent_time: SystemTime,
}

/// Call completion
///
/// The error is borrowed: the execution layer still owns it and usually has
/// to hand it back to its own caller after reporting.
#[derive(Debug, Clone, Copy)]
pub struct End<'a> {
    pub begin_time: SystemTime,
    pub end_time: SystemTime,
    pub error: Option<&'a (dyn Error + 'static)>,
}

impl<'a> End<'a> {
    /// Successful completion
    pub fn ok(begin_time: SystemTime, end_time: SystemTime) -> Self {
        Self {
            begin_time,
            end_time,
            error: None,
        }
    }

    /// Completion with an error
    pub fn failed(
        begin_time: SystemTime,
        end_time: SystemTime,
        error: &'a (dyn Error + 'static),
    ) -> Self {
        Self {
            begin_time,
            end_time,
            error: Some(error),
        }
    }

    /// `end_time - begin_time` in seconds
    ///
    /// Negative when the clock says the call ended before it began. The
    /// value is reported as-is.
    pub fn elapsed_seconds(&self) -> f64 {
        match self.end_time.duration_since(self.begin_time) {
            Ok(elapsed) => elapsed.as_secs_f64(),
            Err(e) => -e.duration().as_secs_f64(),
        }
    }
}
