//! Ports Layer
//!
//! - Driving port (inbound): `MembershipFilter`, what callers use
//! - Driven port (outbound): `BitStore`, where the bits live

pub mod inbound;
pub mod outbound;

pub use inbound::MembershipFilter;
pub use outbound::{BitStore, PayloadVisitor};
