//! Voice session event protocol: event type + payload + envelope.
//!
//! This crate defines the wire shape of the structured log events a voice
//! session emits to its client, and the envelope that stamps each event with a
//! session id, a sequence number and an RFC3339 timestamp. It does not depend
//! on the core crate; the session bridges its internal progress into
//! [`SessionEvent`] and serialises via [`Envelope::wrap`].

pub mod envelope;
pub mod event;

pub use envelope::Envelope;
pub use event::SessionEvent;
