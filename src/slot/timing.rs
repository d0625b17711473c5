//! In-slot timing: the atomic durations of the timeslot template, the
//! hardware calibration constants, and the composed deadlines the FSM arms
//! its timer with. Everything is in 32 kHz ticks.

/// Ticks from the slot boundary to the start of a data frame.
pub const TS_TX_OFFSET: u32 = 131;
/// Half-width of the receive guard window around the expected data start.
pub const TS_LONG_GT: u32 = 43;
/// Half-width of the guard window around the expected acknowledgment.
pub const TS_SHORT_GT: u32 = 16;
/// Ticks from the end of a data frame to the start of its acknowledgment.
pub const TS_TX_ACK_DELAY: u32 = 151;
/// Length of one slot (15 ms).
pub const TS_SLOT_DURATION: u32 = 491;

// Hardware calibration.
pub const DELAY_TX: u32 = 12;
pub const DELAY_RX: u32 = 0;
pub const MAX_TX_DATA_PREPARE: u32 = 66;
pub const MAX_RX_ACK_PREPARE: u32 = 20;
pub const MAX_RX_DATA_PREPARE: u32 = 33;
pub const MAX_TX_ACK_PREPARE: u32 = 30;

// Watchdogs.
pub const WD_RADIO_TX: u32 = 33;
pub const WD_DATA_DURATION: u32 = 164;
pub const WD_ACK_DURATION: u32 = 98;

// Transmit side, relative to the slot boundary.

/// When to start preparing the radio for the data frame.
pub const fn tx_prepare_at() -> u32 {
	TS_TX_OFFSET - DELAY_TX - MAX_TX_DATA_PREPARE
}

/// When to fire the transmit command so the frame starts at `TS_TX_OFFSET`.
pub const fn tx_go_at() -> u32 {
	TS_TX_OFFSET - DELAY_TX
}

/// Latest tick at which the radio must have raised start-of-frame.
pub const fn tx_sfd_deadline() -> u32 {
	tx_go_at() + WD_RADIO_TX
}

/// Latest tick for the end of a data frame that started at `sfd`.
pub const fn frame_end_deadline(sfd: u32) -> u32 {
	sfd + WD_DATA_DURATION
}

// Acknowledgment reception, relative to the end of the transmitted data.

pub const fn ack_rx_prepare_at(data_end: u32) -> u32 {
	data_end + TS_TX_ACK_DELAY - TS_SHORT_GT - DELAY_RX - MAX_RX_ACK_PREPARE
}

pub const fn ack_rx_listen_at(data_end: u32) -> u32 {
	data_end + TS_TX_ACK_DELAY - TS_SHORT_GT - DELAY_RX
}

/// After this tick without a start-of-frame the slot counts as not
/// acknowledged.
pub const fn ack_rx_deadline(data_end: u32) -> u32 {
	data_end + TS_TX_ACK_DELAY + TS_SHORT_GT
}

/// Latest tick for the end of an acknowledgment that started at `sfd`.
pub const fn ack_end_deadline(sfd: u32) -> u32 {
	sfd + WD_ACK_DURATION
}

// Receive side, relative to the slot boundary.

pub const fn rx_prepare_at() -> u32 {
	TS_TX_OFFSET - TS_LONG_GT - DELAY_RX - MAX_RX_DATA_PREPARE
}

pub const fn rx_listen_at() -> u32 {
	TS_TX_OFFSET - TS_LONG_GT - DELAY_RX
}

/// End of the receive guard window; nothing is coming in this slot.
pub const fn rx_guard_end() -> u32 {
	TS_TX_OFFSET + TS_LONG_GT
}

// Acknowledgment transmission, relative to the end of the received data.

pub const fn ack_tx_prepare_at(data_end: u32) -> u32 {
	data_end + TS_TX_ACK_DELAY - DELAY_TX - MAX_TX_ACK_PREPARE
}

pub const fn ack_tx_go_at(data_end: u32) -> u32 {
	data_end + TS_TX_ACK_DELAY - DELAY_TX
}

pub const fn ack_tx_sfd_deadline(data_end: u32) -> u32 {
	ack_tx_go_at(data_end) + WD_RADIO_TX
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
	use super::*;

	#[test]
	fn deadlines_are_ordered_within_a_slot() {
		assert!(tx_prepare_at() < tx_go_at());
		assert!(tx_go_at() < tx_sfd_deadline());
		assert!(rx_prepare_at() < rx_listen_at());
		assert!(rx_listen_at() < rx_guard_end());
		assert!(rx_guard_end() < TS_SLOT_DURATION);

		let data_end = TS_TX_OFFSET + WD_DATA_DURATION;
		assert!(ack_rx_prepare_at(data_end) < ack_rx_listen_at(data_end));
		assert!(ack_rx_listen_at(data_end) < ack_rx_deadline(data_end));
		assert!(ack_tx_prepare_at(data_end) < ack_tx_go_at(data_end));
	}

	#[test]
	fn listen_window_brackets_the_expected_start() {
		assert_eq!(rx_listen_at() + DELAY_RX + TS_LONG_GT, TS_TX_OFFSET);
		assert_eq!(rx_guard_end() - TS_TX_OFFSET, TS_LONG_GT);
	}
}
