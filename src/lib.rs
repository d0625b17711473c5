//! A time-slotted channel-hopping (TSCH) link layer for IEEE 802.15.4e
//! mesh nodes, following the 6TiSCH profile.
//!
//! The crate implements the time-critical core of such a node: the slot
//! state machine ([`slot::LinkLayer`]) that sequences every radio and timer
//! event inside one 15 ms slot, the neighbor table with rank and parent
//! selection ([`neighbors::Neighbors`]), the per-neighbor blacklist
//! exchange piggybacked on acknowledgments, deterministic channel hopping
//! from the absolute slot number ([`asn`]), the Information Element codec
//! ([`ie`]) and Enhanced Beacon handling ([`beacon`]).
//!
//! Hardware stays outside: the radio, the 32 kHz slot timer and the node
//! identity are consumed through the traits in [`drivers`], the schedule
//! through [`schedule::Schedule`], and packet buffers through
//! [`pool::PacketStore`]. The embedding wires its interrupt handlers to the
//! four event entry points of [`slot::LinkLayer`]; everything shared
//! between foreground and interrupt context sits behind interrupt-safe
//! mutexes or per-field atomics.

#![no_std]

#[macro_use]
extern crate log;

#[cfg(test)]
extern crate std;

pub mod asn;
pub mod beacon;
pub mod config;
pub mod drivers;
pub mod ie;
pub mod neighbors;
pub mod pool;
pub mod report;
pub mod schedule;
pub mod slot;

pub use crate::slot::{LinkLayer, SlotState};

/// 16-bit link-layer short address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Hash)]
pub struct ShortId(pub u16);

impl ShortId {
	pub const BROADCAST: ShortId = ShortId(0xffff);

	pub const fn is_broadcast(self) -> bool {
		self.0 == ShortId::BROADCAST.0
	}
}
