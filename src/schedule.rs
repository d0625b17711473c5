//! The cell model and the schedule interface the slot FSM consults.
//!
//! The schedule itself lives outside this layer (6top or a static table);
//! the FSM only asks which cell a slot offset maps to. A bounded static
//! implementation ships for bring-up and tests.

use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::ShortId;
use crate::ie::{LinkDescr, SlotframeDescr, SlotframeLinkIe};

bitflags! {
	/// Option bits of a cell; also the wire form of the link options in
	/// the Slotframe-and-Link IE.
	#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
	pub struct CellOptions: u8 {
		const TX = 1 << 0;
		const RX = 1 << 1;
		const SHARED = 1 << 2;
		const TIMEKEEPING = 1 << 3;
	}
}

/// What a slot is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum CellType {
	#[default]
	Off = 0,
	Tx = 1,
	Rx = 2,
	/// Shared advertisement cell: transmit an Enhanced Beacon when one is
	/// due, listen otherwise.
	TxRx = 3,
	/// The slot belongs to the serial module; the radio stays off.
	SerialRx = 4,
}

/// One schedule entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cell {
	pub cell_type: CellType,
	pub channel_offset: u16,
	pub neighbor: ShortId,
	pub options: CellOptions,
	/// Channels the pair may use in this cell; `0xffff` leaves the choice
	/// entirely to the hopping template.
	pub channel_mask: u16,
}

impl Cell {
	pub const OFF: Cell = Cell {
		cell_type: CellType::Off,
		channel_offset: 0,
		neighbor: ShortId::BROADCAST,
		options: CellOptions::empty(),
		channel_mask: 0xffff,
	};
}

impl Default for Cell {
	fn default() -> Self {
		Self::OFF
	}
}

/// The schedule this layer executes. Implemented by the external schedule
/// database; [`StaticSchedule`] is the bring-up implementation.
pub trait Schedule {
	/// Length of the slotframe in slots.
	fn frame_length(&self) -> u16;
	/// The cell at `slot_offset`. Offsets without an entry are [`Cell::OFF`].
	fn cell(&self, slot_offset: u16) -> Cell;
	/// Summary of the local schedule for Enhanced Beacons.
	fn summary(&self) -> SlotframeLinkIe;
}

/// A fixed table of `(slot_offset, cell)` rows.
pub struct StaticSchedule<const N: usize> {
	frame_length: u16,
	rows: heapless::Vec<(u16, Cell), N>,
}

impl<const N: usize> StaticSchedule<N> {
	pub fn new(frame_length: u16) -> Self {
		Self {
			frame_length,
			rows: heapless::Vec::new(),
		}
	}

	pub fn insert(&mut self, slot_offset: u16, cell: Cell) -> Result<(), Cell> {
		debug_assert!(slot_offset < self.frame_length);
		self.rows.push((slot_offset, cell)).map_err(|(_, cell)| cell)
	}
}

impl<const N: usize> Schedule for StaticSchedule<N> {
	fn frame_length(&self) -> u16 {
		self.frame_length
	}

	fn cell(&self, slot_offset: u16) -> Cell {
		self.rows
			.iter()
			.find(|(offset, _)| *offset == slot_offset)
			.map(|(_, cell)| *cell)
			.unwrap_or(Cell::OFF)
	}

	fn summary(&self) -> SlotframeLinkIe {
		let mut slotframe = SlotframeDescr {
			handle: 0,
			size: self.frame_length,
			links: heapless::Vec::new(),
		};
		for (offset, cell) in &self.rows {
			if cell.cell_type == CellType::Off || cell.cell_type == CellType::SerialRx {
				continue;
			}
			let link = LinkDescr {
				slot_offset: *offset,
				channel_offset: cell.channel_offset,
				options: cell.options,
			};
			if slotframe.links.push(link).is_err() {
				break;
			}
		}
		let mut summary = SlotframeLinkIe::default();
		let _ = summary.slotframes.push(slotframe);
		summary
	}
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
	use super::*;

	#[test]
	fn unknown_offsets_are_off() {
		let schedule: StaticSchedule<4> = StaticSchedule::new(101);
		assert_eq!(schedule.cell(55), Cell::OFF);
		assert_eq!(schedule.frame_length(), 101);
	}

	#[test]
	fn rows_are_returned_by_offset() {
		let mut schedule: StaticSchedule<4> = StaticSchedule::new(101);
		let cell = Cell {
			cell_type: CellType::Tx,
			channel_offset: 3,
			neighbor: ShortId(0x89a5),
			options: CellOptions::TX | CellOptions::TIMEKEEPING,
			channel_mask: 0x00ff,
		};
		schedule.insert(2, cell).unwrap();
		assert_eq!(schedule.cell(2), cell);
		assert_eq!(schedule.cell(3), Cell::OFF);
	}

	#[test]
	fn summary_lists_active_links_only() {
		let mut schedule: StaticSchedule<4> = StaticSchedule::new(101);
		schedule
			.insert(
				0,
				Cell {
					cell_type: CellType::TxRx,
					channel_offset: 0,
					neighbor: ShortId::BROADCAST,
					options: CellOptions::TX | CellOptions::RX | CellOptions::SHARED,
					channel_mask: 0xffff,
				},
			)
			.unwrap();
		schedule.insert(4, Cell::OFF).unwrap();
		let summary = schedule.summary();
		assert_eq!(summary.slotframes.len(), 1);
		assert_eq!(summary.slotframes[0].size, 101);
		assert_eq!(summary.slotframes[0].links.len(), 1);
		assert_eq!(summary.slotframes[0].links[0].slot_offset, 0);
	}
}
