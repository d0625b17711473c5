//! Component-tagged event reporting.
//!
//! Mirrors the serial log surface of the node: every event carries a
//! component tag, an event code and up to two 16-bit arguments. Events are
//! emitted through the `log` facade and are never raised as panics across
//! the slot FSM boundary; callers report and recover locally.

use num_enum::IntoPrimitive;

/// Module that observed the event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Component {
	SlotFsm,
	Neighbors,
	Sync,
	Beacon,
	Wire,
	Pool,
}

/// Error events. The discriminant is the code written to the serial log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive)]
#[repr(u8)]
pub enum ErrorCode {
	/// An event arrived that does not match the current FSM state.
	WrongStateInEvent = 0x01,
	/// The FSM was not in a resting state at a slot boundary.
	WrongStateInSlot = 0x02,
	/// A frame or information element could not be decoded.
	MalformedFrame = 0x03,
	/// An acknowledgment referenced a sequence number we have no record of.
	WrongDsn = 0x04,
	/// The neighbor table has no free row.
	NeighborsFull = 0x05,
	/// The packet pool has no free buffer.
	NoFreePacket = 0x06,
	/// A receive or hand-up queue rejected a packet.
	QueueFull = 0x07,
	/// The radio did not raise start-of-frame after a transmit command.
	WatchdogRadioTx = 0x08,
	/// A data frame did not complete within its maximum duration.
	WatchdogDataDuration = 0x09,
	/// An acknowledgment did not complete within its maximum duration.
	WatchdogAckDuration = 0x0a,
	/// A time correction exceeded the clipping limit.
	LargeTimeCorrection = 0x0b,
	/// A beacon advertised an implausible rank jump.
	SuspiciousRank = 0x0c,
	/// A frame with link-layer security arrived; security is not supported.
	SecurityUnsupported = 0x0d,
}

/// Informational events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive)]
#[repr(u8)]
pub enum InfoCode {
	Synchronized = 0x20,
	Desynchronized = 0x21,
	ParentChanged = 0x22,
}

/// Report an error event. Local recovery is the caller's business.
pub fn error(component: Component, code: ErrorCode, arg1: u16, arg2: u16) {
	error!("[{component:?}] {code:?} (arg1={arg1:#06x}, arg2={arg2:#06x})");
}

/// Report an informational event.
pub fn info(component: Component, code: InfoCode, arg1: u16, arg2: u16) {
	info!("[{component:?}] {code:?} (arg1={arg1:#06x}, arg2={arg2:#06x})");
}
