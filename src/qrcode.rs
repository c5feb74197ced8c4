#![forbid(unsafe_code)]
//! QR code encoding into caller-supplied buffers.
//!
//! This module turns a byte payload into a QR Code Model 2 symbol without allocating. It only
//! supports the low error correction level and the checkerboard mask (pattern 0), which keeps the
//! encoder small enough to run from contexts where allocation or blocking is not allowed, such as
//! a panic or fault handler.
//!
//! Binary data that must survive being pasted into a URL can be packed with the dense numeric
//! segment: every 13 bits of input become 4 decimal digits, and every 3 digits are stored in
//! 10 bits of the symbol. That wastes about 2.5% compared to raw bytes, instead of the 25% a
//! base64 encoding would cost.
use core::cmp;
use core::fmt;

use log::{debug, warn};
use thiserror::Error;

/// Largest error correction block, in codewords.
const MAX_EC_SIZE: usize = 30;
/// Largest data block (group 2 of version 37/38), in codewords.
const MAX_BLK_SIZE: usize = 123;

const MODE_STOP: u16 = 0;
const MODE_NUMERIC: u16 = 1;
const MODE_BINARY: u16 = 4;

/// Pad codewords, alternated until the data capacity is reached.
const PADDING: [u8; 2] = [0xEC, 0x11];

/// Format information for low error correction and mask 0, BCH-encoded and masked.
pub const FORMAT_INFO_L_MASK0: u16 = 0x77C4;

/// Encodes a payload into a QR code written to `image`.
///
/// If `url` is given, it is encoded as a binary segment and `data` is appended to it as a dense
/// numeric segment, so that a decoder can read the symbol as a single URL. Without `url`, `data`
/// is encoded as one binary segment.
///
/// The symbol is written as a 1-bit-per-module bitmap: rows are stored top to bottom, each row
/// starting on a byte boundary, and the leftmost module of a byte is its most significant bit.
/// `tmp` is scratch space; its contents afterwards are unspecified.
///
/// # Arguments
///
/// * `url` - Optional prefix, encoded as a binary segment.
/// * `data` - The payload.
/// * `version` - The QR version to use, 1 to 40.
/// * `image` - Output buffer, at least [`Version::image_len`] bytes (4071 for version 40).
/// * `tmp` - Work buffer, at least [`Version::work_len`] bytes (3706 for version 40).
///
/// # Returns
///
/// The width of the symbol in modules, or 0 if the version is invalid, the data does not fit or
/// a buffer is too small. Nothing is written to either buffer in those cases.
///
/// # Example
///
/// ```rust
/// use panicqr::qrcode::{generate, Version};
///
/// let mut image = vec![0u8; Version::MAX.image_len()];
/// let mut tmp = vec![0u8; Version::MAX.work_len()];
///
/// let width = generate(None, b"kernel panic", 2, &mut image, &mut tmp);
/// assert_eq!(width, 25);
/// ```
pub fn generate(url: Option<&str>, data: &[u8], version: u8, image: &mut [u8], tmp: &mut [u8]) -> u8 {
    report(try_generate(url, data, version, image, tmp), data.len())
}

/// Encodes the first `data_len` bytes of `data` into a QR code written back over `data`.
///
/// This is the same as [`generate`], except that the payload buffer doubles as the image
/// buffer. The payload is fully copied into `tmp` before the image is drawn, and every size
/// check happens before either buffer is touched.
///
/// # Returns
///
/// The width of the symbol in modules, or 0 on failure (including `data_len > data.len()`).
///
/// # Example
///
/// ```rust
/// use panicqr::qrcode::{generate_in_place, max_data_size, Version};
///
/// let url = "https://example.com/panic?z=";
/// let mut data = vec![0u8; Version::MAX.image_len()];
/// let mut tmp = vec![0u8; Version::MAX.work_len()];
/// let len = max_data_size(10, url.len());
///
/// let width = generate_in_place(Some(url), &mut data, len - 2, 10, &mut tmp);
/// assert_eq!(width, 57);
/// ```
pub fn generate_in_place(url: Option<&str>, data: &mut [u8], data_len: usize, version: u8, tmp: &mut [u8]) -> u8 {
    report(try_generate_in_place(url, data, data_len, version, tmp), data_len)
}

/// Returns the payload size, in bytes, that [`generate`] accepts for `version`.
///
/// With `url_len == 0` the payload is a single binary segment, and this is the exact limit:
/// [`generate`] refuses anything longer, even where the 8-bit length field of versions 1 to 9
/// would leave room for one more byte.
///
/// Otherwise the payload is a dense numeric segment following a binary segment of `url_len`
/// bytes. That value is an estimate reserving 5 bytes for the two segment headers and the
/// terminator, and 2.5% for the numeric packing. It can overshoot by one byte: a payload of
/// `max_data_size(version, url_len) - 1` bytes always fits, one more byte may not.
///
/// # Returns
///
/// The maximum payload size, or 0 if the version is invalid or the URL leaves no room.
pub fn max_data_size(version: u8, url_len: usize) -> usize {
    let Some(version) = Version::new(version) else {
        return 0;
    };
    let max_data = version.max_data();

    if url_len > 0 {
        // Binary segment 4 + 16 bits, numeric segment 4 + 12 bits, stop 4 bits => 5 bytes.
        if url_len.saturating_add(5) >= max_data {
            return 0;
        }
        (max_data - url_len - 5) * 39 / 40
    } else {
        // Mode 4 bits, length 16 bits, stop 4 bits => 3 bytes.
        max_data - 3
    }
}

/// Returns the smallest version that can hold `data` (and the optional `url` prefix), laid out
/// the way [`generate`] lays them out.
pub fn fit_version(url: Option<&str>, data: &[u8]) -> Option<Version> {
    match url {
        Some(url) => Version::from_segments(&[Segment::Binary(url.as_bytes()), Segment::Numeric(data)]),
        None => (Version::MIN.value()..=Version::MAX.value())
            .filter_map(Version::new)
            .find(|&version| check_plain_payload(data, version).is_ok()),
    }
}

fn report(result: Result<u8, QrError>, data_len: usize) -> u8 {
    match result {
        Ok(width) => {
            debug!("qrcode: encoded {} bytes into a {}x{} symbol", data_len, width, width);
            width
        }
        Err(err) => {
            warn!("qrcode: {}", err);
            0
        }
    }
}

fn try_generate(url: Option<&str>, data: &[u8], version: u8, image: &mut [u8], tmp: &mut [u8]) -> Result<u8, QrError> {
    let version = Version::new(version).ok_or(QrError::InvalidVersion(version))?;
    check_buffer(BufferKind::Image, version.image_len(), image.len())?;

    let em = encode_segments(url, data, version, tmp)?;
    let mut qr = QrImage::new(version, image);
    qr.draw_all(&em);
    Ok(qr.width)
}

fn try_generate_in_place(
    url: Option<&str>,
    data: &mut [u8],
    data_len: usize,
    version: u8,
    tmp: &mut [u8]
) -> Result<u8, QrError> {
    let version = Version::new(version).ok_or(QrError::InvalidVersion(version))?;
    check_buffer(BufferKind::Image, data_len, data.len())?;
    check_buffer(BufferKind::Image, version.image_len(), data.len())?;

    let em = encode_segments(url, &data[..data_len], version, tmp)?;
    let mut qr = QrImage::new(version, data);
    qr.draw_all(&em);
    Ok(qr.width)
}

fn encode_segments<'t>(
    url: Option<&str>,
    data: &[u8],
    version: Version,
    tmp: &'t mut [u8]
) -> Result<EncodedMsg<'t>, QrError> {
    match url {
        Some(url) => EncodedMsg::new(&[Segment::Binary(url.as_bytes()), Segment::Numeric(data)], version, tmp),
        None => {
            check_plain_payload(data, version)?;
            EncodedMsg::new(&[Segment::Binary(data)], version, tmp)
        }
    }
}

/// A payload without prefix is limited to `max_data_size(version, 0)` bytes at every version,
/// as if the length field were always 16 bits wide.
fn check_plain_payload(data: &[u8], version: Version) -> Result<(), QrError> {
    if data.len() > max_data_size(version.value(), 0) {
        return Err(QrError::PayloadTooLarge {
            required_bits: (data.len() + 3) * 8,
            capacity_bits: version.max_data() * 8,
        });
    }
    Ok(())
}

fn check_buffer(buffer: BufferKind, required: usize, actual: usize) -> Result<(), QrError> {
    if actual < required {
        return Err(QrError::BufferTooSmall { buffer, required, actual });
    }
    Ok(())
}

/// Why an encoding was refused. Only the log sees the details; the public functions return 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub(crate) enum QrError {
    #[error("invalid version {0}, expected 1 to 40")]
    InvalidVersion(u8),
    #[error("data needs {required_bits} bits, but the version holds {capacity_bits} bits")]
    PayloadTooLarge {
        required_bits: usize,
        capacity_bits: usize,
    },
    #[error("{buffer} buffer is {actual} bytes, {required} bytes required")]
    BufferTooSmall {
        buffer: BufferKind,
        required: usize,
        actual: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BufferKind {
    Image,
    Work,
}

impl fmt::Display for BufferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferKind::Image => write!(f, "image"),
            BufferKind::Work => write!(f, "work"),
        }
    }
}

/// A QR code version (1–40), with the low error correction parameters of that version.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Version(u8);

impl Version {
    /// The minimum version number supported in the QR Code Model 2 standard.
    pub const MIN: Version = Version(1);

    /// The maximum version number supported in the QR Code Model 2 standard.
    pub const MAX: Version = Version(40);

    /// Creates a version object from the given number, or `None` outside [1, 40].
    pub const fn new(ver: u8) -> Option<Self> {
        if Version::MIN.0 <= ver && ver <= Version::MAX.0 {
            Some(Self(ver))
        } else {
            None
        }
    }

    /// Returns the value, which is in the range [1, 40].
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Width and height of the symbol in modules.
    pub const fn width(self) -> u8 {
        self.0 * 4 + 17
    }

    /// Bytes per bitmap row.
    pub const fn stride(self) -> usize {
        (self.width() as usize + 7) / 8
    }

    /// Minimum image buffer length for this version.
    pub const fn image_len(self) -> usize {
        self.stride() * self.width() as usize
    }

    /// Minimum work buffer length for this version: data plus error correction codewords.
    pub const fn work_len(self) -> usize {
        self.max_data() + self.ec_size() * (self.g1_blocks() + self.g2_blocks())
    }

    /// Number of data codewords.
    pub const fn max_data(self) -> usize {
        self.g1_blk_size() * self.g1_blocks() + self.g2_blk_size() * self.g2_blocks()
    }

    /// Number of error correction codewords per block.
    pub const fn ec_size(self) -> usize {
        self.param().poly.len()
    }

    pub const fn g1_blocks(self) -> usize {
        self.param().g1_blocks as usize
    }

    pub const fn g2_blocks(self) -> usize {
        self.param().g2_blocks as usize
    }

    pub const fn g1_blk_size(self) -> usize {
        self.param().g1_blk_size as usize
    }

    /// Group 2 blocks always hold one more codeword than group 1 blocks.
    pub const fn g2_blk_size(self) -> usize {
        self.g1_blk_size() + 1
    }

    /// Ascending centre coordinates of the alignment patterns, empty for version 1.
    pub const fn alignment_pattern(self) -> &'static [u8] {
        ALIGNMENT_PATTERNS[self.0 as usize - 1]
    }

    /// Generator polynomial, as the logarithms of its coefficients without the leading one.
    pub const fn poly(self) -> &'static [u8] {
        self.param().poly
    }

    /// The 18-bit version information code, present from version 7 on.
    pub const fn version_info(self) -> Option<u32> {
        if self.0 >= 7 {
            Some(VERSION_INFORMATION[self.0 as usize - 7])
        } else {
            None
        }
    }

    /// Returns the smallest version whose capacity holds the segments and the terminator.
    ///
    /// This is a bit-exact fit. [`fit_version`] without a prefix also applies the byte limit of
    /// [`max_data_size`].
    pub fn from_segments(segments: &[Segment<'_>]) -> Option<Self> {
        (Version::MIN.0..=Version::MAX.0)
            .map(Version)
            .find(|&version| Segment::required_bits(segments, version).is_some())
    }

    const fn param(self) -> VersionParameter {
        VPARAM[self.0 as usize - 1]
    }
}

/// One chunk of input, borrowed from the caller.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Segment<'a> {
    /// Raw bytes, 8 bits per character.
    Binary(&'a [u8]),
    /// Bytes read 13 bits at a time and stored as decimal digits.
    Numeric(&'a [u8]),
}

impl<'a> Segment<'a> {
    fn get_header(&self) -> (u16, usize) {
        match self {
            Segment::Binary(_) => (MODE_BINARY, 4),
            Segment::Numeric(_) => (MODE_NUMERIC, 4),
        }
    }

    fn length_bits_count(&self, version: Version) -> usize {
        let ver = version.value();
        match self {
            Segment::Binary(_) => match ver {
                1..=9 => 8,
                _ => 16,
            },
            Segment::Numeric(_) => match ver {
                1..=9 => 10,
                10..=26 => 12,
                _ => 14,
            },
        }
    }

    /// Number of characters stored in the length field: bytes for binary, digits for numeric.
    pub fn character_count(&self) -> usize {
        match self {
            Segment::Binary(data) => data.len(),
            Segment::Numeric(data) => {
                let data_bits = data.len() * 8;
                // 4 decimal digits per 13 bits, plus the digits of the last partial window.
                4 * (data_bits / 13) + DIGITS_FOR_BITS[data_bits % 13]
            }
        }
    }

    fn get_length_field(&self, version: Version) -> (u16, usize) {
        let len_bits = self.length_bits_count(version);
        ((self.character_count() & ((1 << len_bits) - 1)) as u16, len_bits)
    }

    /// Bits taken by this segment: mode, length field and payload.
    pub fn total_size_bits(&self, version: Version) -> usize {
        let data_size = match self {
            Segment::Binary(data) => data.len() * 8,
            Segment::Numeric(_) => {
                let digits = self.character_count();
                10 * (digits / 3) + NUM_CHARS_BITS[digits % 3]
            }
        };
        4 + self.length_bits_count(version) + data_size
    }

    fn fits_length_field(&self, version: Version) -> bool {
        self.character_count() >> self.length_bits_count(version) == 0
    }

    /// Bits needed for all segments plus the terminator, if they fit in `version`.
    fn required_bits(segments: &[Segment<'_>], version: Version) -> Option<usize> {
        let bits = Segment::total_bits(segments, version);
        let fits = bits <= version.max_data() * 8 && segments.iter().all(|s| s.fits_length_field(version));
        fits.then_some(bits)
    }

    fn total_bits(segments: &[Segment<'_>], version: Version) -> usize {
        segments.iter().map(|s| s.total_size_bits(version)).sum::<usize>() + 4
    }

    fn iter(&self) -> SegmentIterator<'_> {
        SegmentIterator {
            segment: self,
            offset: 0,
            carry: 0,
            carry_len: 0,
        }
    }
}

/// Yields the payload bits of a segment as `(value, bit count)` pairs.
///
/// Binary segments yield one byte at a time. Numeric segments yield groups of 3 decimal digits
/// in 10 bits, and one last group of 1 or 2 digits in 4 or 7 bits. Digits that do not complete a
/// group are carried over to the next 13-bit window.
struct SegmentIterator<'a> {
    segment: &'a Segment<'a>,
    offset: usize,
    carry: u16,
    carry_len: usize,
}

impl Iterator for SegmentIterator<'_> {
    type Item = (u16, usize);

    fn next(&mut self) -> Option<Self::Item> {
        match self.segment {
            Segment::Binary(data) => {
                let byte = *data.get(self.offset)?;
                self.offset += 1;
                Some((u16::from(byte), 8))
            }
            Segment::Numeric(data) => {
                if self.carry_len == 3 {
                    let out = (self.carry, NUM_CHARS_BITS[3]);
                    self.carry = 0;
                    self.carry_len = 0;
                    return Some(out);
                }
                match get_next_13b(data, self.offset) {
                    Some((number, size)) => {
                        self.offset += size;
                        let new_chars = DIGITS_FOR_BITS[size];
                        if self.carry_len + new_chars > 3 {
                            let remaining = self.carry_len + new_chars - 3;
                            let out = self.carry * POW10[new_chars - remaining] + number / POW10[remaining];
                            self.carry = number % POW10[remaining];
                            self.carry_len = remaining;
                            Some((out, NUM_CHARS_BITS[3]))
                        } else {
                            let out = self.carry * POW10[new_chars] + number;
                            let size = NUM_CHARS_BITS[self.carry_len + new_chars];
                            self.carry = 0;
                            self.carry_len = 0;
                            Some((out, size))
                        }
                    }
                    None if self.carry_len > 0 => {
                        let out = (self.carry, NUM_CHARS_BITS[self.carry_len]);
                        self.carry = 0;
                        self.carry_len = 0;
                        Some(out)
                    }
                    None => None,
                }
            }
        }
    }
}

/// Reads the next 13 bits (fewer at the end of `data`) starting at bit `offset`.
///
/// Returns the value and the number of bits read, or `None` once `offset` reaches the end.
fn get_next_13b(data: &[u8], offset: usize) -> Option<(u16, usize)> {
    if offset >= data.len() * 8 {
        return None;
    }
    let size = cmp::min(13, data.len() * 8 - offset);
    let byte_off = offset / 8;
    let bit_off = offset % 8;
    // At most 20: bit_off <= 7 and size <= 13.
    let b = bit_off + size;

    let first_byte = u16::from((data[byte_off] << bit_off) >> bit_off);

    let number = match b {
        0..=8 => first_byte >> (8 - b),
        9..=16 => (first_byte << (b - 8)) + u16::from(data[byte_off + 1] >> (16 - b)),
        _ => {
            (first_byte << (b - 8))
                + (u16::from(data[byte_off + 1]) << (b - 16))
                + u16::from(data[byte_off + 2] >> (24 - b))
        }
    };
    Some((number, size))
}

/// The encoded data and error correction codewords, laid out in the work buffer as group 1
/// data blocks, group 2 data blocks, then one error correction block per data block.
struct EncodedMsg<'a> {
    data: &'a mut [u8],
    ec_size: usize,
    g1_blocks: usize,
    g2_blocks: usize,
    g1_blk_size: usize,
    g2_blk_size: usize,
    poly: &'static [u8],
    version: Version,
}

impl<'a> EncodedMsg<'a> {
    /// Checks that the segments fit `version` and `data` is large enough, then encodes them and
    /// computes the error correction. `data` is not written if a check fails.
    fn new(segments: &[Segment<'_>], version: Version, data: &'a mut [u8]) -> Result<Self, QrError> {
        let required_bits = Segment::total_bits(segments, version);
        let capacity_bits = version.max_data() * 8;
        if Segment::required_bits(segments, version).is_none() {
            return Err(QrError::PayloadTooLarge { required_bits, capacity_bits });
        }
        let required = version.work_len();
        check_buffer(BufferKind::Work, required, data.len())?;

        let data = &mut data[..required];
        data.fill(0);
        let mut em = EncodedMsg {
            data,
            ec_size: version.ec_size(),
            g1_blocks: version.g1_blocks(),
            g2_blocks: version.g2_blocks(),
            g1_blk_size: version.g1_blk_size(),
            g2_blk_size: version.g2_blk_size(),
            poly: version.poly(),
            version,
        };
        em.encode(segments);
        Ok(em)
    }

    /// Writes `len_bits` (1 to 16) bits of `number` at bit `offset`, most significant first.
    ///
    /// A partially filled first byte is OR-ed into; the following bytes are overwritten.
    fn push(&mut self, offset: &mut usize, bits: (u16, usize)) {
        let (number, len_bits) = bits;
        let byte_off = *offset / 8;
        let bit_off = *offset % 8;
        let b = bit_off + len_bits;

        match (bit_off, b) {
            (0, 0..=8) => {
                self.data[byte_off] = (number << (8 - b)) as u8;
            }
            (0, _) => {
                self.data[byte_off] = (number >> (b - 8)) as u8;
                self.data[byte_off + 1] = (number << (16 - b)) as u8;
            }
            (_, 0..=8) => {
                self.data[byte_off] |= (number << (8 - b)) as u8;
            }
            (_, 9..=16) => {
                self.data[byte_off] |= (number >> (b - 8)) as u8;
                self.data[byte_off + 1] = (number << (16 - b)) as u8;
            }
            _ => {
                self.data[byte_off] |= (number >> (b - 8)) as u8;
                self.data[byte_off + 1] = (number >> (b - 16)) as u8;
                self.data[byte_off + 2] = (number << (24 - b)) as u8;
            }
        }
        *offset += len_bits;
    }

    fn add_segments(&mut self, segments: &[Segment<'_>]) {
        let mut offset: usize = 0;

        for s in segments {
            self.push(&mut offset, s.get_header());
            self.push(&mut offset, s.get_length_field(self.version));
            for bits in s.iter() {
                self.push(&mut offset, bits);
            }
        }
        self.push(&mut offset, (MODE_STOP, 4));

        let pad_offset = offset % 8;
        if pad_offset > 0 {
            self.push(&mut offset, (0, 8 - pad_offset));
        }

        // Pad with alternating bytes, always starting with 0xEC.
        let pad_offset = offset / 8;
        let max_data = self.version.max_data();
        for i in pad_offset..max_data {
            self.data[i] = PADDING[(i & 1) ^ (pad_offset & 1)];
        }
    }

    fn error_code_for_block(&mut self, offset: usize, size: usize, ec_offset: usize) {
        let mut tmp: [u8; MAX_BLK_SIZE + MAX_EC_SIZE] = [0; MAX_BLK_SIZE + MAX_EC_SIZE];

        tmp[..size].copy_from_slice(&self.data[offset..offset + size]);
        for i in 0..size {
            let lead_coeff = tmp[i] as usize;
            if lead_coeff == 0 {
                continue;
            }
            let log_lead_coeff = usize::from(LOG_TABLE[lead_coeff]);
            for (u, &v) in tmp[i + 1..].iter_mut().zip(self.poly.iter()) {
                *u ^= EXP_TABLE[(usize::from(v) + log_lead_coeff) % 255];
            }
        }
        self.data[ec_offset..ec_offset + self.ec_size].copy_from_slice(&tmp[size..size + self.ec_size]);
    }

    fn compute_error_code(&mut self) {
        let mut offset = 0;
        let mut ec_offset = self.g1_blocks * self.g1_blk_size + self.g2_blocks * self.g2_blk_size;

        for _ in 0..self.g1_blocks {
            self.error_code_for_block(offset, self.g1_blk_size, ec_offset);
            offset += self.g1_blk_size;
            ec_offset += self.ec_size;
        }
        for _ in 0..self.g2_blocks {
            self.error_code_for_block(offset, self.g2_blk_size, ec_offset);
            offset += self.g2_blk_size;
            ec_offset += self.ec_size;
        }
    }

    fn encode(&mut self, segments: &[Segment<'_>]) {
        self.add_segments(segments);
        self.compute_error_code();
    }

    fn iter(&self) -> EncodedMsgIterator<'_> {
        EncodedMsgIterator { em: self, offset: 0 }
    }
}

/// Yields the codewords in placement order: data blocks interleaved column by column, then the
/// error correction blocks interleaved the same way.
struct EncodedMsgIterator<'a> {
    em: &'a EncodedMsg<'a>,
    offset: usize,
}

impl Iterator for EncodedMsgIterator<'_> {
    type Item = u8;

    fn next(&mut self) -> Option<Self::Item> {
        let em = self.em;
        let blocks = em.g1_blocks + em.g2_blocks;
        let g1_end = em.g1_blocks * em.g1_blk_size;
        let g2_end = g1_end + em.g2_blocks * em.g2_blk_size;
        let ec_end = g2_end + em.ec_size * blocks;

        if self.offset >= ec_end {
            return None;
        }

        let offset = if self.offset < em.g1_blk_size * blocks {
            // group 1 and group 2 blocks have the same size here
            let blk = self.offset % blocks;
            let blk_off = self.offset / blocks;
            if blk < em.g1_blocks {
                blk * em.g1_blk_size + blk_off
            } else {
                g1_end + em.g2_blk_size * (blk - em.g1_blocks) + blk_off
            }
        } else if self.offset < g2_end {
            // last byte of each group 2 block
            let blk2 = self.offset - blocks * em.g1_blk_size;
            g1_end + em.g2_blk_size * blk2 + em.g2_blk_size - 1
        } else {
            let ec_offset = self.offset - g2_end;
            let blk = ec_offset % blocks;
            let blk_off = ec_offset / blocks;
            g2_end + blk * em.ec_size + blk_off
        };
        self.offset += 1;
        Some(em.data[offset])
    }
}

/// The symbol bitmap, drawn into the caller's image buffer.
///
/// A set bit is a foreground module. The fixed patterns are drawn by setting their light parts,
/// so a symbol painted light on a dark background reads as a standard QR code.
struct QrImage<'a> {
    data: &'a mut [u8],
    width: u8,
    stride: u8,
    version: Version,
}

impl<'a> QrImage<'a> {
    /// `data` must hold at least `version.image_len()` bytes; they are cleared.
    fn new(version: Version, data: &'a mut [u8]) -> Self {
        let width = version.width();
        let stride = version.stride() as u8;
        let data = &mut data[..version.image_len()];
        data.fill(0);

        QrImage {
            data,
            width,
            stride,
            version,
        }
    }

    fn set(&mut self, x: u8, y: u8) {
        if x < self.width && y < self.width {
            let offset = usize::from(y) * usize::from(self.stride) + usize::from(x / 8);
            self.data[offset] |= 0x80 >> (x % 8);
        }
    }

    fn xor(&mut self, x: u8, y: u8) {
        if x < self.width && y < self.width {
            let offset = usize::from(y) * usize::from(self.stride) + usize::from(x / 8);
            self.data[offset] ^= 0x80 >> (x % 8);
        }
    }

    /// Outline of a square with its top left corner at (x, y), `size` modules apart.
    fn draw_square(&mut self, x: u8, y: u8, size: u8) {
        for k in 0..size + 1 {
            self.set(x + k, y);
            self.set(x + k, y + size);
        }
        for k in 1..size {
            self.set(x, y + k);
            self.set(x + size, y + k);
        }
    }

    /// The 8x8 corner footprint of a finder pattern and its separator.
    fn is_finder(&self, x: u8, y: u8) -> bool {
        let end = self.width - 8;
        (x < 8 && y < 8) || (x < 8 && y >= end) || (x >= end && y < 8)
    }

    fn draw_finders(&mut self) {
        self.draw_square(1, 1, 4);
        self.draw_square(self.width - 6, 1, 4);
        self.draw_square(1, self.width - 6, 4);
        for k in 0..8 {
            self.set(k, 7);
            self.set(self.width - k - 1, 7);
            self.set(k, self.width - 8);
        }
        for k in 0..7 {
            self.set(7, k);
            self.set(self.width - 8, k);
            self.set(7, self.width - 1 - k);
        }
    }

    fn is_alignment(&self, x: u8, y: u8) -> bool {
        let positions = self.version.alignment_pattern();
        positions.iter().any(|&ax| {
            positions.iter().any(|&ay| {
                !self.is_finder(ax, ay)
                    && (ax - 2..=ax + 2).contains(&x)
                    && (ay - 2..=ay + 2).contains(&y)
            })
        })
    }

    fn draw_alignments(&mut self) {
        let positions = self.version.alignment_pattern();
        for &x in positions {
            for &y in positions {
                if !self.is_finder(x, y) {
                    self.draw_square(x - 1, y - 1, 2);
                }
            }
        }
    }

    /// Row 6 and column 6, outside the finder and alignment patterns they cross.
    fn is_timing(&self, x: u8, y: u8) -> bool {
        (x == 6 || y == 6) && !self.is_finder(x, y) && !self.is_alignment(x, y)
    }

    fn draw_timing_patterns(&mut self) {
        let end = self.width - 8;

        for i in (9..end).step_by(2) {
            self.set(i, 6);
            self.set(6, i);
        }
    }

    /// The format strips next to the finders, including the always-dark module, minus the
    /// timing modules they cross.
    fn is_format_info(&self, x: u8, y: u8) -> bool {
        let end = self.width - 8;
        let strip = (x <= 8 && y == 8) || (y <= 8 && x == 8) || (x == 8 && y >= end) || (x >= end && y == 8);
        strip && x != 6 && y != 6
    }

    fn draw_format_info(&mut self) {
        let info = FORMAT_INFO_L_MASK0;

        let mut skip = 0;
        for k in 0..7 {
            if k == 6 {
                skip = 1;
            }
            if info & (1 << (14 - k)) == 0 {
                self.set(k + skip, 8);
                self.set(8, self.width - 1 - k);
            }
        }

        let mut skip = 0;
        for k in 0..8 {
            if k == 2 {
                skip = 1;
            }
            if info & (1 << (7 - k)) == 0 {
                self.set(8, 8 - skip - k);
                self.set(self.width - 8 + k, 8);
            }
        }
    }

    fn is_version_info(&self, x: u8, y: u8) -> bool {
        if self.version.version_info().is_none() {
            return false;
        }
        let pos = self.width - 11;
        (x >= pos && x < pos + 3 && y < 6) || (y >= pos && y < pos + 3 && x < 6)
    }

    fn draw_version_info(&mut self) {
        let Some(vinfo) = self.version.version_info() else {
            return;
        };
        let pos = self.width - 11;

        for x in 0..3 {
            for y in 0..6 {
                if vinfo & (1 << (x + y * 3)) == 0 {
                    self.set(x + pos, y);
                    self.set(y, x + pos);
                }
            }
        }
    }

    fn is_reserved(&self, x: u8, y: u8) -> bool {
        self.is_finder(x, y)
            || self.is_alignment(x, y)
            || self.is_timing(x, y)
            || self.is_format_info(x, y)
            || self.is_version_info(x, y)
    }

    /// Bottom left module, where the data placement ends.
    fn is_last(&self, x: u8, y: u8) -> bool {
        x == 0 && y == self.width - 1
    }

    /// Next module of the zig-zag: two columns wide, going up then down, right to left,
    /// jumping over the vertical timing column.
    fn next(&self, x: u8, y: u8) -> (u8, u8) {
        let x_adj = if x <= 6 { x + 1 } else { x };
        let column_type = (self.width - x_adj) % 4;

        match column_type {
            2 if y > 0 => (x + 1, y - 1),
            0 if y < self.width - 1 => (x + 1, y + 1),
            _ if x == 7 => (x - 2, y),
            _ => (x - 1, y),
        }
    }

    fn next_available(&self, x: u8, y: u8) -> (u8, u8) {
        let (mut x, mut y) = self.next(x, y);
        while self.is_reserved(x, y) && !self.is_last(x, y) {
            (x, y) = self.next(x, y);
        }
        (x, y)
    }

    fn draw_data(&mut self, data: impl Iterator<Item = u8>) {
        let (mut x, mut y) = (self.width - 1, self.width - 1);

        'bytes: for byte in data {
            for s in 0..8 {
                if self.is_last(x, y) {
                    break 'bytes;
                }
                if byte & (0x80 >> s) == 0 {
                    self.set(x, y);
                }
                (x, y) = self.next_available(x, y);
            }
        }
        // Remainder bits (0, 3, 4 or 7 depending on the version) are zeros.
        while !self.is_last(x, y) {
            if !self.is_reserved(x, y) {
                self.set(x, y);
            }
            (x, y) = self.next(x, y);
        }
    }

    /// Checkerboard mask (pattern 0).
    fn apply_mask(&mut self) {
        for x in 0..self.width {
            for y in 0..self.width {
                if (x ^ y) % 2 == 0 && !self.is_reserved(x, y) {
                    self.xor(x, y);
                }
            }
        }
    }

    fn draw_all(&mut self, em: &EncodedMsg<'_>) {
        self.draw_finders();
        self.draw_alignments();
        self.draw_timing_patterns();
        self.draw_version_info();
        self.draw_data(em.iter());
        self.draw_format_info();
        self.apply_mask();
    }
}

#[derive(Clone, Copy)]
struct VersionParameter {
    poly: &'static [u8],
    g1_blocks: u8,
    g2_blocks: u8,
    g1_blk_size: u8,
}

const fn vp(poly: &'static [u8], g1_blocks: u8, g2_blocks: u8, g1_blk_size: u8) -> VersionParameter {
    VersionParameter {
        poly,
        g1_blocks,
        g2_blocks,
        g1_blk_size,
    }
}

// Generator polynomials for the low error correction level, as logarithms.
const P7: [u8; 7] = [87, 229, 146, 149, 238, 102, 21];
const P10: [u8; 10] = [251, 67, 46, 61, 118, 70, 64, 94, 32, 45];
const P15: [u8; 15] = [8, 183, 61, 91, 202, 37, 51, 58, 58, 237, 140, 124, 5, 99, 105];
const P18: [u8; 18] = [
    215, 234, 158, 94, 184, 97, 118, 170, 79, 187, 152, 148, 252, 179, 5, 98, 96, 153,
];
const P20: [u8; 20] = [
    17, 60, 79, 50, 61, 163, 26, 187, 202, 180, 221, 225, 83, 239, 156, 164, 212, 212, 188, 190,
];
const P22: [u8; 22] = [
    210, 171, 247, 242, 93, 230, 14, 109, 221, 53, 200, 74, 8, 172, 98, 80, 219, 134, 160, 105,
    165, 231,
];
const P24: [u8; 24] = [
    229, 121, 135, 48, 211, 117, 251, 126, 159, 180, 169, 152, 192, 226, 228, 218, 111, 0, 117,
    232, 87, 96, 227, 21,
];
const P26: [u8; 26] = [
    173, 125, 158, 2, 103, 182, 118, 17, 145, 201, 111, 28, 165, 53, 161, 21, 245, 142, 13, 102,
    48, 227, 153, 145, 218, 70,
];
const P28: [u8; 28] = [
    168, 223, 200, 104, 224, 234, 108, 180, 110, 190, 195, 147, 205, 27, 232, 201, 21, 43, 245, 87,
    42, 195, 212, 119, 242, 37, 9, 123,
];
const P30: [u8; 30] = [
    41, 173, 145, 152, 216, 31, 179, 182, 50, 48, 110, 86, 239, 96, 222, 125, 42, 173, 226, 193,
    224, 130, 156, 37, 251, 216, 238, 40, 192, 180,
];

const VPARAM: [VersionParameter; 40] = [
    vp(&P7, 1, 0, 19),    // V1
    vp(&P10, 1, 0, 34),   // V2
    vp(&P15, 1, 0, 55),   // V3
    vp(&P20, 1, 0, 80),   // V4
    vp(&P26, 1, 0, 108),  // V5
    vp(&P18, 2, 0, 68),   // V6
    vp(&P20, 2, 0, 78),   // V7
    vp(&P24, 2, 0, 97),   // V8
    vp(&P30, 2, 0, 116),  // V9
    vp(&P18, 2, 2, 68),   // V10
    vp(&P20, 4, 0, 81),   // V11
    vp(&P24, 2, 2, 92),   // V12
    vp(&P26, 4, 0, 107),  // V13
    vp(&P30, 3, 1, 115),  // V14
    vp(&P22, 5, 1, 87),   // V15
    vp(&P24, 5, 1, 98),   // V16
    vp(&P28, 1, 5, 107),  // V17
    vp(&P30, 5, 1, 120),  // V18
    vp(&P28, 3, 4, 113),  // V19
    vp(&P28, 3, 5, 107),  // V20
    vp(&P28, 4, 4, 116),  // V21
    vp(&P28, 2, 7, 111),  // V22
    vp(&P30, 4, 5, 121),  // V23
    vp(&P30, 6, 4, 117),  // V24
    vp(&P26, 8, 4, 106),  // V25
    vp(&P28, 10, 2, 114), // V26
    vp(&P30, 8, 4, 122),  // V27
    vp(&P30, 3, 10, 117), // V28
    vp(&P30, 7, 7, 116),  // V29
    vp(&P30, 5, 10, 115), // V30
    vp(&P30, 13, 3, 115), // V31
    vp(&P30, 17, 0, 115), // V32
    vp(&P30, 17, 1, 115), // V33
    vp(&P30, 13, 6, 115), // V34
    vp(&P30, 12, 7, 121), // V35
    vp(&P30, 6, 14, 121), // V36
    vp(&P30, 17, 4, 122), // V37
    vp(&P30, 4, 18, 122), // V38
    vp(&P30, 20, 4, 117), // V39
    vp(&P30, 19, 6, 118), // V40
];

const ALIGNMENT_PATTERNS: [&[u8]; 40] = [
    &[],
    &[6, 18],
    &[6, 22],
    &[6, 26],
    &[6, 30],
    &[6, 34],
    &[6, 22, 38],
    &[6, 24, 42],
    &[6, 26, 46],
    &[6, 28, 50],
    &[6, 30, 54],
    &[6, 32, 58],
    &[6, 34, 62],
    &[6, 26, 46, 66],
    &[6, 26, 48, 70],
    &[6, 26, 50, 74],
    &[6, 30, 54, 78],
    &[6, 30, 56, 82],
    &[6, 30, 58, 86],
    &[6, 34, 62, 90],
    &[6, 28, 50, 72, 94],
    &[6, 26, 50, 74, 98],
    &[6, 30, 54, 78, 102],
    &[6, 28, 54, 80, 106],
    &[6, 32, 58, 84, 110],
    &[6, 30, 58, 86, 114],
    &[6, 34, 62, 90, 118],
    &[6, 26, 50, 74, 98, 122],
    &[6, 30, 54, 78, 102, 126],
    &[6, 26, 52, 78, 104, 130],
    &[6, 30, 56, 82, 108, 134],
    &[6, 34, 60, 86, 112, 138],
    &[6, 30, 58, 86, 114, 142],
    &[6, 34, 62, 90, 118, 146],
    &[6, 30, 54, 78, 102, 126, 150],
    &[6, 24, 50, 76, 102, 128, 154],
    &[6, 28, 54, 80, 106, 132, 158],
    &[6, 32, 58, 84, 110, 136, 162],
    &[6, 26, 54, 82, 110, 138, 166],
    &[6, 30, 58, 86, 114, 142, 170],
];

// Version information for versions 7 to 40.
const VERSION_INFORMATION: [u32; 34] = [
    0x07C94, 0x085BC, 0x09A99, 0x0A4D3, 0x0BBF6, 0x0C762, 0x0D847, 0x0E60D, 0x0F928, 0x10B78,
    0x1145D, 0x12A17, 0x13532, 0x149A6, 0x15683, 0x168C9, 0x177EC, 0x18EC4, 0x191E1, 0x1AFAB,
    0x1B08E, 0x1CC1A, 0x1D33F, 0x1ED75, 0x1F250, 0x209D5, 0x216F0, 0x228BA, 0x2379F, 0x24B0B,
    0x2542E, 0x26A64, 0x27541, 0x28C69,
];

// Powers of the generator 2 in GF(256), modulo x^8 + x^4 + x^3 + x^2 + 1.
static EXP_TABLE: [u8; 256] = [
    1, 2, 4, 8, 16, 32, 64, 128, 29, 58, 116, 232, 205, 135, 19, 38, 76, 152, 45, 90, 180, 117,
    234, 201, 143, 3, 6, 12, 24, 48, 96, 192, 157, 39, 78, 156, 37, 74, 148, 53, 106, 212, 181,
    119, 238, 193, 159, 35, 70, 140, 5, 10, 20, 40, 80, 160, 93, 186, 105, 210, 185, 111, 222, 161,
    95, 190, 97, 194, 153, 47, 94, 188, 101, 202, 137, 15, 30, 60, 120, 240, 253, 231, 211, 187,
    107, 214, 177, 127, 254, 225, 223, 163, 91, 182, 113, 226, 217, 175, 67, 134, 17, 34, 68, 136,
    13, 26, 52, 104, 208, 189, 103, 206, 129, 31, 62, 124, 248, 237, 199, 147, 59, 118, 236, 197,
    151, 51, 102, 204, 133, 23, 46, 92, 184, 109, 218, 169, 79, 158, 33, 66, 132, 21, 42, 84, 168,
    77, 154, 41, 82, 164, 85, 170, 73, 146, 57, 114, 228, 213, 183, 115, 230, 209, 191, 99, 198,
    145, 63, 126, 252, 229, 215, 179, 123, 246, 241, 255, 227, 219, 171, 75, 150, 49, 98, 196, 149,
    55, 110, 220, 165, 87, 174, 65, 130, 25, 50, 100, 200, 141, 7, 14, 28, 56, 112, 224, 221, 167,
    83, 166, 81, 162, 89, 178, 121, 242, 249, 239, 195, 155, 43, 86, 172, 69, 138, 9, 18, 36, 72,
    144, 61, 122, 244, 245, 247, 243, 251, 235, 203, 139, 11, 22, 44, 88, 176, 125, 250, 233, 207,
    131, 27, 54, 108, 216, 173, 71, 142, 1,
];

// Logarithms in GF(256). Entry 0 is a placeholder, log(0) is never looked up.
static LOG_TABLE: [u8; 256] = [
    175, 0, 1, 25, 2, 50, 26, 198, 3, 223, 51, 238, 27, 104, 199, 75, 4, 100, 224, 14, 52, 141,
    239, 129, 28, 193, 105, 248, 200, 8, 76, 113, 5, 138, 101, 47, 225, 36, 15, 33, 53, 147, 142,
    218, 240, 18, 130, 69, 29, 181, 194, 125, 106, 39, 249, 185, 201, 154, 9, 120, 77, 228, 114,
    166, 6, 191, 139, 98, 102, 221, 48, 253, 226, 152, 37, 179, 16, 145, 34, 136, 54, 208, 148,
    206, 143, 150, 219, 189, 241, 210, 19, 92, 131, 56, 70, 64, 30, 66, 182, 163, 195, 72, 126,
    110, 107, 58, 40, 84, 250, 133, 186, 61, 202, 94, 155, 159, 10, 21, 121, 43, 78, 212, 229, 172,
    115, 243, 167, 87, 7, 112, 192, 247, 140, 128, 99, 13, 103, 74, 222, 237, 49, 197, 254, 24,
    227, 165, 153, 119, 38, 184, 180, 124, 17, 68, 146, 217, 35, 32, 137, 46, 55, 63, 209, 91, 149,
    188, 207, 205, 144, 135, 151, 178, 220, 252, 190, 97, 242, 86, 211, 171, 20, 42, 93, 158, 132,
    60, 57, 83, 71, 109, 65, 162, 31, 45, 67, 216, 183, 123, 164, 118, 196, 23, 73, 236, 127, 12,
    111, 246, 108, 161, 59, 82, 41, 157, 85, 170, 251, 96, 134, 177, 187, 204, 62, 90, 203, 89, 95,
    176, 156, 169, 160, 81, 11, 245, 22, 235, 122, 117, 44, 215, 79, 174, 213, 233, 230, 231, 173,
    232, 116, 214, 244, 234, 168, 80, 88, 175,
];

/// Bits used by a group of 0, 1, 2 or 3 decimal digits in numeric mode.
const NUM_CHARS_BITS: [usize; 4] = [0, 4, 7, 10];
const POW10: [u16; 4] = [1, 10, 100, 1000];
/// Decimal digits needed to write any value of 0 to 13 bits.
const DIGITS_FOR_BITS: [usize; 14] = [0, 1, 1, 1, 2, 2, 2, 3, 3, 3, 4, 4, 4, 4];
