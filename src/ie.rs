//! Wire formats: frame headers and Information Elements.
//!
//! Everything on the wire is little-endian and byte-exact; offsets are
//! computed explicitly and never depend on host struct layout. Three
//! descriptor shapes exist:
//!
//! - Header IE: `length[6:0] | elementID[14:7] | type=0` at bit 15,
//! - Payload IE: `length[10:0] | groupID[14:11] | type=1` at bit 15,
//! - MLME sub-IE, short `length[7:0] | subID[14:8] | 0` and long
//!   `length[10:0] | subID[14:11] | 1`.
//!
//! Unknown elements are skipped by decoders; truncation is an error.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;

use crate::ShortId;
use crate::asn::Asn;
use crate::config::{MAX_LINKS_PER_SLOTFRAME, MAX_SLOTFRAMES};
use crate::schedule::CellOptions;

/// Errors raised while reading or writing a frame.
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameError {
	#[error("buffer too short for the encoded structure")]
	Truncated,
	#[error("descriptor or element content is malformed")]
	Malformed,
	#[error("output buffer capacity exceeded")]
	Overflow,
}

pub type Result<T> = core::result::Result<T, FrameError>;

/// MAC frame types (frame control bits 0..=2).
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum FrameType {
	Beacon = 0,
	Data = 1,
	Ack = 2,
	MacCommand = 3,
}

/// Header IE element carrying the signed ACK/NACK time correction.
pub const ELEMENT_TIME_CORRECTION: u8 = 0x1e;
/// Header Termination 1: payload IEs follow.
pub const ELEMENT_HEADER_TERMINATION_1: u8 = 0x7e;
/// Header Termination 2: the MAC payload follows directly.
pub const ELEMENT_HEADER_TERMINATION_2: u8 = 0x7f;

/// Payload IE group of the MLME container.
pub const GROUP_MLME: u8 = 0x01;

/// MLME sub-IE identifiers.
pub const SUB_SYNC: u8 = 0x1a;
pub const SUB_SLOTFRAME_LINK: u8 = 0x1b;
pub const SUB_TIMESLOT: u8 = 0x1c;
pub const SUB_CHANNEL_HOPPING: u8 = 0x09;

// Frame control field bit positions.
const FCF_SECURITY: u16 = 1 << 3;
const FCF_ACK_REQUEST: u16 = 1 << 5;
const FCF_PAN_COMPRESSION: u16 = 1 << 6;
const FCF_SEQ_SUPPRESSION: u16 = 1 << 8;
const FCF_IE_PRESENT: u16 = 1 << 9;
const FCF_DST_SHORT: u16 = 0b10 << 10;
const FCF_VERSION_2015: u16 = 0b10 << 12;
const FCF_SRC_SHORT: u16 = 0b10 << 14;

fn read_u16(buf: &[u8], offset: usize) -> Result<u16> {
	let bytes = buf
		.get(offset..offset + 2)
		.ok_or(FrameError::Truncated)?;
	Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn write_u16(buf: &mut [u8], offset: usize, value: u16) -> Result<()> {
	let bytes = buf
		.get_mut(offset..offset + 2)
		.ok_or(FrameError::Overflow)?;
	bytes.copy_from_slice(&value.to_le_bytes());
	Ok(())
}

fn write_bytes(buf: &mut [u8], offset: usize, src: &[u8]) -> Result<()> {
	let bytes = buf
		.get_mut(offset..offset + src.len())
		.ok_or(FrameError::Overflow)?;
	bytes.copy_from_slice(src);
	Ok(())
}

/// Decoded MAC header of an incoming frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParsedHeader {
	pub frame_type: FrameType,
	pub security: bool,
	pub ack_request: bool,
	pub ie_present: bool,
	pub seq: u8,
	pub dst: Option<ShortId>,
	pub src: Option<ShortId>,
	/// Offset of the first byte after the addressing fields.
	pub payload_offset: usize,
}

/// Parse a MAC header with short (or absent) addressing.
pub fn parse_header(frame: &[u8]) -> Result<ParsedHeader> {
	let fcf = read_u16(frame, 0)?;
	let frame_type =
		FrameType::try_from((fcf & 0x7) as u8).map_err(|_| FrameError::Malformed)?;
	let mut offset = 2;

	let seq = if fcf & FCF_SEQ_SUPPRESSION == 0 {
		let seq = *frame.get(offset).ok_or(FrameError::Truncated)?;
		offset += 1;
		seq
	} else {
		0
	};

	let dst_mode = (fcf >> 10) & 0x3;
	let src_mode = (fcf >> 14) & 0x3;
	let pan_compression = fcf & FCF_PAN_COMPRESSION != 0;

	let dst = match dst_mode {
		0 => None,
		2 => {
			offset += 2; // destination PAN
			let dst = ShortId(read_u16(frame, offset)?);
			offset += 2;
			Some(dst)
		}
		_ => return Err(FrameError::Malformed),
	};
	let src = match src_mode {
		0 => None,
		2 => {
			if !pan_compression {
				offset += 2; // source PAN
			}
			let src = ShortId(read_u16(frame, offset)?);
			offset += 2;
			Some(src)
		}
		_ => return Err(FrameError::Malformed),
	};

	Ok(ParsedHeader {
		frame_type,
		security: fcf & FCF_SECURITY != 0,
		ack_request: fcf & FCF_ACK_REQUEST != 0,
		ie_present: fcf & FCF_IE_PRESENT != 0,
		seq,
		dst,
		src,
		payload_offset: offset,
	})
}

/// Write a data frame header with PAN-compressed short addressing.
/// Returns the offset of the first payload byte.
pub fn write_data_header(
	buf: &mut [u8],
	seq: u8,
	pan_id: u16,
	dst: ShortId,
	src: ShortId,
	ack_request: bool,
) -> Result<usize> {
	let mut fcf = u16::from(u8::from(FrameType::Data))
		| FCF_PAN_COMPRESSION
		| FCF_DST_SHORT
		| FCF_VERSION_2015
		| FCF_SRC_SHORT;
	if ack_request {
		fcf |= FCF_ACK_REQUEST;
	}
	write_u16(buf, 0, fcf)?;
	write_bytes(buf, 2, &[seq])?;
	write_u16(buf, 3, pan_id)?;
	write_u16(buf, 5, dst.0)?;
	write_u16(buf, 7, src.0)?;
	Ok(9)
}

/// Write an acknowledgment header (no addressing, IE list follows).
pub fn write_ack_header(buf: &mut [u8], seq: u8) -> Result<usize> {
	let fcf = u16::from(u8::from(FrameType::Ack)) | FCF_IE_PRESENT | FCF_VERSION_2015;
	write_u16(buf, 0, fcf)?;
	write_bytes(buf, 2, &[seq])?;
	Ok(3)
}

/// Write an Enhanced Beacon header (broadcast destination, IE list follows).
pub fn write_beacon_header(buf: &mut [u8], seq: u8, pan_id: u16, src: ShortId) -> Result<usize> {
	let fcf = u16::from(u8::from(FrameType::Beacon))
		| FCF_PAN_COMPRESSION
		| FCF_IE_PRESENT
		| FCF_DST_SHORT
		| FCF_VERSION_2015
		| FCF_SRC_SHORT;
	write_u16(buf, 0, fcf)?;
	write_bytes(buf, 2, &[seq])?;
	write_u16(buf, 3, pan_id)?;
	write_u16(buf, 5, ShortId::BROADCAST.0)?;
	write_u16(buf, 7, src.0)?;
	Ok(9)
}

/// One element of the header IE list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeaderIe<'a> {
	pub element_id: u8,
	pub content: &'a [u8],
}

/// Iterator over the header IE list of a frame. Stops at a termination
/// element or at the end of the buffer.
pub struct HeaderIes<'a> {
	buf: &'a [u8],
	offset: usize,
	done: bool,
}

impl<'a> HeaderIes<'a> {
	pub fn new(buf: &'a [u8]) -> Self {
		Self {
			buf,
			offset: 0,
			done: false,
		}
	}

	/// Offset of the first byte after the consumed elements.
	pub fn offset(&self) -> usize {
		self.offset
	}
}

impl<'a> Iterator for HeaderIes<'a> {
	type Item = HeaderIe<'a>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.done {
			return None;
		}
		let descriptor = read_u16(self.buf, self.offset).ok()?;
		if descriptor & 0x8000 != 0 {
			// Payload IE descriptor reached without a termination element.
			self.done = true;
			return None;
		}
		let length = (descriptor & 0x7f) as usize;
		let element_id = ((descriptor >> 7) & 0xff) as u8;
		let content = self.buf.get(self.offset + 2..self.offset + 2 + length)?;
		self.offset += 2 + length;
		if element_id == ELEMENT_HEADER_TERMINATION_1
			|| element_id == ELEMENT_HEADER_TERMINATION_2
		{
			self.done = true;
			return None;
		}
		Some(HeaderIe {
			element_id,
			content,
		})
	}
}

fn write_header_ie(buf: &mut [u8], offset: usize, element_id: u8, content: &[u8]) -> Result<usize> {
	if content.len() > 0x7f {
		return Err(FrameError::Overflow);
	}
	let descriptor = content.len() as u16 | (u16::from(element_id) << 7);
	write_u16(buf, offset, descriptor)?;
	write_bytes(buf, offset + 2, content)?;
	Ok(offset + 2 + content.len())
}

/// Time correction carried in acknowledgments (element 0x1E): the signed
/// correction in 32 kHz ticks, optionally followed by the sender's channel
/// blacklist for the acknowledged DSN.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeCorrectionIe {
	pub correction: i16,
	pub blacklist: Option<u16>,
}

impl TimeCorrectionIe {
	pub fn parse(content: &[u8]) -> Result<Self> {
		match content.len() {
			2 => Ok(Self {
				correction: i16::from_le_bytes([content[0], content[1]]),
				blacklist: None,
			}),
			4 => Ok(Self {
				correction: i16::from_le_bytes([content[0], content[1]]),
				blacklist: Some(u16::from_le_bytes([content[2], content[3]])),
			}),
			_ => Err(FrameError::Malformed),
		}
	}

	pub fn write(&self, buf: &mut [u8], offset: usize) -> Result<usize> {
		let mut content = [0u8; 4];
		content[..2].copy_from_slice(&self.correction.to_le_bytes());
		let len = match self.blacklist {
			Some(mask) => {
				content[2..].copy_from_slice(&mask.to_le_bytes());
				4
			}
			None => 2,
		};
		write_header_ie(buf, offset, ELEMENT_TIME_CORRECTION, &content[..len])
	}
}

/// Scan the header IE list of an acknowledgment for the time correction.
pub fn find_time_correction(ies: &[u8]) -> Option<TimeCorrectionIe> {
	HeaderIes::new(ies)
		.find(|ie| ie.element_id == ELEMENT_TIME_CORRECTION)
		.and_then(|ie| TimeCorrectionIe::parse(ie.content).ok())
}

/// Synchronization sub-IE: the sender's ASN and join priority.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncIe {
	pub asn: Asn,
	pub join_priority: u8,
}

impl SyncIe {
	fn parse(content: &[u8]) -> Result<Self> {
		if content.len() != 6 {
			return Err(FrameError::Malformed);
		}
		let mut asn = [0u8; 5];
		asn.copy_from_slice(&content[..5]);
		Ok(Self {
			asn: Asn::from_bytes(asn),
			join_priority: content[5],
		})
	}

	fn content(&self) -> [u8; 6] {
		let mut content = [0u8; 6];
		content[..5].copy_from_slice(&self.asn.to_bytes());
		content[5] = self.join_priority;
		content
	}
}

/// One link of a slotframe summary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkDescr {
	pub slot_offset: u16,
	pub channel_offset: u16,
	pub options: CellOptions,
}

/// One slotframe of the Slotframe-and-Link sub-IE.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct SlotframeDescr {
	pub handle: u8,
	pub size: u16,
	pub links: heapless::Vec<LinkDescr, MAX_LINKS_PER_SLOTFRAME>,
}

/// Slotframe-and-Link sub-IE: the local schedule summary advertised in EBs.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct SlotframeLinkIe {
	pub slotframes: heapless::Vec<SlotframeDescr, MAX_SLOTFRAMES>,
}

impl SlotframeLinkIe {
	fn parse(content: &[u8]) -> Result<Self> {
		let mut ie = Self::default();
		let num_slotframes = *content.first().ok_or(FrameError::Truncated)?;
		let mut offset = 1;
		for _ in 0..num_slotframes {
			let handle = *content.get(offset).ok_or(FrameError::Truncated)?;
			let size = read_u16(content, offset + 1)?;
			let num_links = *content.get(offset + 3).ok_or(FrameError::Truncated)?;
			offset += 4;
			let mut slotframe = SlotframeDescr {
				handle,
				size,
				links: heapless::Vec::new(),
			};
			for _ in 0..num_links {
				let link = LinkDescr {
					slot_offset: read_u16(content, offset)?,
					channel_offset: read_u16(content, offset + 2)?,
					options: CellOptions::from_bits_truncate(
						*content.get(offset + 4).ok_or(FrameError::Truncated)?,
					),
				};
				offset += 5;
				slotframe.links.push(link).map_err(|_| FrameError::Overflow)?;
			}
			ie.slotframes
				.push(slotframe)
				.map_err(|_| FrameError::Overflow)?;
		}
		Ok(ie)
	}

	fn write_content(&self, buf: &mut [u8], offset: usize) -> Result<usize> {
		write_bytes(buf, offset, &[self.slotframes.len() as u8])?;
		let mut offset = offset + 1;
		for slotframe in &self.slotframes {
			write_bytes(buf, offset, &[slotframe.handle])?;
			write_u16(buf, offset + 1, slotframe.size)?;
			write_bytes(buf, offset + 3, &[slotframe.links.len() as u8])?;
			offset += 4;
			for link in &slotframe.links {
				write_u16(buf, offset, link.slot_offset)?;
				write_u16(buf, offset + 2, link.channel_offset)?;
				write_bytes(buf, offset + 4, &[link.options.bits()])?;
				offset += 5;
			}
		}
		Ok(offset)
	}
}

/// Timeslot sub-IE: a template ID alone when the default template is in
/// use, otherwise the ID plus the twelve atomic durations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeslotIe {
	pub template_id: u8,
	pub durations: Option<[u16; 12]>,
}

impl TimeslotIe {
	fn parse(content: &[u8]) -> Result<Self> {
		match content.len() {
			1 => Ok(Self {
				template_id: content[0],
				durations: None,
			}),
			25 => {
				let mut durations = [0u16; 12];
				for (i, d) in durations.iter_mut().enumerate() {
					*d = read_u16(content, 1 + 2 * i)?;
				}
				Ok(Self {
					template_id: content[0],
					durations: Some(durations),
				})
			}
			_ => Err(FrameError::Malformed),
		}
	}

	fn write_content(&self, buf: &mut [u8], offset: usize) -> Result<usize> {
		write_bytes(buf, offset, &[self.template_id])?;
		match self.durations {
			None => Ok(offset + 1),
			Some(durations) => {
				for (i, d) in durations.iter().enumerate() {
					write_u16(buf, offset + 1 + 2 * i, *d)?;
				}
				Ok(offset + 25)
			}
		}
	}
}

/// Channel-Hopping sub-IE (long form): the hopping sequence ID.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelHoppingIe {
	pub sequence_id: u8,
}

impl ChannelHoppingIe {
	fn parse(content: &[u8]) -> Result<Self> {
		match content.first() {
			Some(&sequence_id) => Ok(Self { sequence_id }),
			None => Err(FrameError::Malformed),
		}
	}
}

fn write_short_sub_ie(buf: &mut [u8], offset: usize, sub_id: u8, content_len: usize) -> Result<()> {
	if content_len > 0xff {
		return Err(FrameError::Overflow);
	}
	write_u16(buf, offset, content_len as u16 | (u16::from(sub_id) << 8))
}

fn write_long_sub_ie(buf: &mut [u8], offset: usize, sub_id: u8, content_len: usize) -> Result<()> {
	if content_len > 0x7ff {
		return Err(FrameError::Overflow);
	}
	write_u16(
		buf,
		offset,
		content_len as u16 | (u16::from(sub_id) << 11) | 0x8000,
	)
}

/// The IE payload of an Enhanced Beacon: a Header Termination 1 followed by
/// an MLME payload IE wrapping the four TSCH sub-IEs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnhancedBeaconIes {
	pub sync: SyncIe,
	pub slotframe_link: SlotframeLinkIe,
	pub timeslot: TimeslotIe,
	pub channel_hopping: ChannelHoppingIe,
}

impl EnhancedBeaconIes {
	/// Encode at `offset`; returns the offset after the last byte written.
	pub fn encode(&self, buf: &mut [u8], offset: usize) -> Result<usize> {
		let offset = write_header_ie(buf, offset, ELEMENT_HEADER_TERMINATION_1, &[])?;

		// MLME payload IE descriptor is patched once the content length is
		// known.
		let descriptor_at = offset;
		let mut cursor = offset + 2;

		write_short_sub_ie(buf, cursor, SUB_SYNC, 6)?;
		write_bytes(buf, cursor + 2, &self.sync.content())?;
		cursor += 8;

		let start = cursor + 2;
		let end = self.slotframe_link.write_content(buf, start)?;
		write_short_sub_ie(buf, cursor, SUB_SLOTFRAME_LINK, end - start)?;
		cursor = end;

		let start = cursor + 2;
		let end = self.timeslot.write_content(buf, start)?;
		write_short_sub_ie(buf, cursor, SUB_TIMESLOT, end - start)?;
		cursor = end;

		write_long_sub_ie(buf, cursor, SUB_CHANNEL_HOPPING, 1)?;
		write_bytes(buf, cursor + 2, &[self.channel_hopping.sequence_id])?;
		cursor += 3;

		let content_len = cursor - descriptor_at - 2;
		if content_len > 0x7ff {
			return Err(FrameError::Overflow);
		}
		write_u16(
			buf,
			descriptor_at,
			content_len as u16 | (u16::from(GROUP_MLME) << 11) | 0x8000,
		)?;
		Ok(cursor)
	}

	/// Decode from the IE section of a beacon frame (header IE list first).
	pub fn decode(ies: &[u8]) -> Result<Self> {
		let mut header_ies = HeaderIes::new(ies);
		for ie in header_ies.by_ref() {
			debug!("skipping header IE {:#04x} in beacon", ie.element_id);
		}
		let mut offset = header_ies.offset();

		let mut sync = None;
		let mut slotframe_link = SlotframeLinkIe::default();
		let mut timeslot = TimeslotIe {
			template_id: 0,
			durations: None,
		};
		let mut channel_hopping = ChannelHoppingIe { sequence_id: 0 };

		while offset + 2 <= ies.len() {
			let descriptor = read_u16(ies, offset)?;
			if descriptor & 0x8000 == 0 {
				return Err(FrameError::Malformed);
			}
			let length = (descriptor & 0x7ff) as usize;
			let group = ((descriptor >> 11) & 0xf) as u8;
			let content = ies
				.get(offset + 2..offset + 2 + length)
				.ok_or(FrameError::Truncated)?;
			offset += 2 + length;
			if group != GROUP_MLME {
				debug!("skipping payload IE group {group:#04x} in beacon");
				continue;
			}
			Self::decode_mlme(
				content,
				&mut sync,
				&mut slotframe_link,
				&mut timeslot,
				&mut channel_hopping,
			)?;
		}

		Ok(Self {
			sync: sync.ok_or(FrameError::Malformed)?,
			slotframe_link,
			timeslot,
			channel_hopping,
		})
	}

	fn decode_mlme(
		content: &[u8],
		sync: &mut Option<SyncIe>,
		slotframe_link: &mut SlotframeLinkIe,
		timeslot: &mut TimeslotIe,
		channel_hopping: &mut ChannelHoppingIe,
	) -> Result<()> {
		let mut offset = 0;
		while offset + 2 <= content.len() {
			let descriptor = read_u16(content, offset)?;
			let (length, sub_id, long) = if descriptor & 0x8000 == 0 {
				(
					(descriptor & 0xff) as usize,
					((descriptor >> 8) & 0x7f) as u8,
					false,
				)
			} else {
				(
					(descriptor & 0x7ff) as usize,
					((descriptor >> 11) & 0xf) as u8,
					true,
				)
			};
			let body = content
				.get(offset + 2..offset + 2 + length)
				.ok_or(FrameError::Truncated)?;
			offset += 2 + length;
			match (sub_id, long) {
				(SUB_SYNC, false) => *sync = Some(SyncIe::parse(body)?),
				(SUB_SLOTFRAME_LINK, false) => *slotframe_link = SlotframeLinkIe::parse(body)?,
				(SUB_TIMESLOT, false) => *timeslot = TimeslotIe::parse(body)?,
				(SUB_CHANNEL_HOPPING, true) => {
					*channel_hopping = ChannelHoppingIe::parse(body)?;
				}
				_ => debug!("skipping MLME sub-IE {sub_id:#04x} (long={long})"),
			}
		}
		Ok(())
	}
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
	use super::*;

	fn sample_beacon_ies() -> EnhancedBeaconIes {
		let mut slotframe = SlotframeDescr {
			handle: 0,
			size: 101,
			links: heapless::Vec::new(),
		};
		slotframe
			.links
			.push(LinkDescr {
				slot_offset: 0,
				channel_offset: 0,
				options: CellOptions::TX | CellOptions::RX | CellOptions::SHARED,
			})
			.unwrap();
		slotframe
			.links
			.push(LinkDescr {
				slot_offset: 5,
				channel_offset: 3,
				options: CellOptions::RX,
			})
			.unwrap();
		let mut slotframe_link = SlotframeLinkIe::default();
		slotframe_link.slotframes.push(slotframe).unwrap();
		EnhancedBeaconIes {
			sync: SyncIe {
				asn: Asn::new(0x01_2345_6789),
				join_priority: 2,
			},
			slotframe_link,
			timeslot: TimeslotIe {
				template_id: 0,
				durations: None,
			},
			channel_hopping: ChannelHoppingIe { sequence_id: 0 },
		}
	}

	#[test]
	fn data_header_roundtrip() {
		let mut buf = [0u8; 32];
		let len = write_data_header(&mut buf, 0x42, 0x6154, ShortId(0x89a5), ShortId(0x5a53), true)
			.unwrap();
		assert_eq!(len, 9);
		let header = parse_header(&buf[..len]).unwrap();
		assert_eq!(header.frame_type, FrameType::Data);
		assert!(header.ack_request);
		assert!(!header.security);
		assert_eq!(header.seq, 0x42);
		assert_eq!(header.dst, Some(ShortId(0x89a5)));
		assert_eq!(header.src, Some(ShortId(0x5a53)));
		assert_eq!(header.payload_offset, 9);
	}

	#[test]
	fn ack_header_roundtrip() {
		let mut buf = [0u8; 8];
		let len = write_ack_header(&mut buf, 7).unwrap();
		let header = parse_header(&buf[..len]).unwrap();
		assert_eq!(header.frame_type, FrameType::Ack);
		assert!(header.ie_present);
		assert_eq!(header.seq, 7);
		assert_eq!(header.dst, None);
		assert_eq!(header.payload_offset, 3);
	}

	#[test]
	fn time_correction_descriptor_is_byte_exact() {
		let mut buf = [0u8; 8];
		let ie = TimeCorrectionIe {
			correction: -3,
			blacklist: None,
		};
		let end = ie.write(&mut buf, 0).unwrap();
		assert_eq!(end, 4);
		// length 2, element 0x1e, type 0: 0x0f02 little-endian.
		assert_eq!(&buf[..4], &[0x02, 0x0f, 0xfd, 0xff]);
	}

	#[test]
	fn time_correction_with_blacklist_roundtrip() {
		let mut buf = [0u8; 16];
		let ie = TimeCorrectionIe {
			correction: -150,
			blacklist: Some(0x00ab),
		};
		let end = ie.write(&mut buf, 0).unwrap();
		assert_eq!(find_time_correction(&buf[..end]), Some(ie));
	}

	#[test]
	fn time_correction_without_blacklist_roundtrip() {
		let mut buf = [0u8; 16];
		let ie = TimeCorrectionIe {
			correction: 16,
			blacklist: None,
		};
		let end = ie.write(&mut buf, 0).unwrap();
		assert_eq!(find_time_correction(&buf[..end]), Some(ie));
	}

	#[test]
	fn time_correction_odd_length_is_malformed() {
		assert_eq!(
			TimeCorrectionIe::parse(&[1, 2, 3]),
			Err(FrameError::Malformed)
		);
	}

	#[test]
	fn beacon_ies_roundtrip() {
		let ies = sample_beacon_ies();
		let mut buf = [0u8; 128];
		let end = ies.encode(&mut buf, 0).unwrap();
		assert_eq!(EnhancedBeaconIes::decode(&buf[..end]).unwrap(), ies);
	}

	#[test]
	fn beacon_sync_ie_bytes_are_little_endian() {
		let ies = sample_beacon_ies();
		let mut buf = [0u8; 128];
		ies.encode(&mut buf, 0).unwrap();
		// HT1 (2 bytes), MLME descriptor (2 bytes), sync sub-IE descriptor:
		// length 6, sub 0x1a, short form.
		assert_eq!(&buf[..2], &[0x00, 0x3f]);
		assert_eq!(&buf[4..6], &[0x06, 0x1a]);
		// ASN, little-endian, then the join priority.
		assert_eq!(&buf[6..12], &[0x89, 0x67, 0x45, 0x23, 0x01, 0x02]);
	}

	#[test]
	fn beacon_decode_skips_unknown_sub_ies() {
		let ies = sample_beacon_ies();
		let mut buf = [0u8; 128];
		let end = ies.encode(&mut buf, 0).unwrap();
		// Append an unknown short sub-IE (id 0x33, 1 byte) inside the MLME
		// container and patch the payload descriptor length.
		buf[end] = 0x01;
		buf[end + 1] = 0x33;
		buf[end + 2] = 0xaa;
		let descriptor = u16::from_le_bytes([buf[2], buf[3]]);
		let patched = (descriptor & !0x7ff) | ((descriptor & 0x7ff) + 3);
		buf[2..4].copy_from_slice(&patched.to_le_bytes());
		assert_eq!(EnhancedBeaconIes::decode(&buf[..end + 3]).unwrap(), ies);
	}

	#[test]
	fn beacon_decode_requires_sync_ie() {
		// HT1 followed by an MLME container holding only a timeslot sub-IE.
		let mut buf = [0u8; 16];
		let mut offset = write_header_ie(&mut buf, 0, ELEMENT_HEADER_TERMINATION_1, &[]).unwrap();
		write_u16(&mut buf, offset, 3 | (u16::from(GROUP_MLME) << 11) | 0x8000).unwrap();
		offset += 2;
		write_short_sub_ie(&mut buf, offset, SUB_TIMESLOT, 1).unwrap();
		buf[offset + 2] = 0;
		assert_eq!(
			EnhancedBeaconIes::decode(&buf[..offset + 3]),
			Err(FrameError::Malformed)
		);
	}

	#[test]
	fn truncated_header_is_an_error() {
		assert_eq!(parse_header(&[0x41]), Err(FrameError::Truncated));
	}

	#[test]
	fn timeslot_full_template_roundtrip() {
		let ie = TimeslotIe {
			template_id: 1,
			durations: Some([131, 43, 16, 151, 491, 12, 0, 66, 20, 33, 30, 98]),
		};
		let mut buf = [0u8; 32];
		let end = ie.write_content(&mut buf, 0).unwrap();
		assert_eq!(end, 25);
		assert_eq!(TimeslotIe::parse(&buf[..end]).unwrap(), ie);
	}
}
