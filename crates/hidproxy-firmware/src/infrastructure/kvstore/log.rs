//! Append-only, power-loss-safe key/value log over a [`BlockDevice`].
//!
//! # Layout
//!
//! The region is split into two equal areas.  Exactly one is active; the
//! other is the compaction target.
//!
//! ```text
//! area:   [area header 16][record][record]...[0xFF 0xFF ...]
//! header: magic u32 | version u16 | 0xFFFF | generation u32 | crc32 u32
//! record: magic u16 | flags u8 | key_len u8 | value_len u16 | 0xFFFF
//!         | seq u32 | crc32 u32 | key | value
//! ```
//!
//! All integers are little-endian.  A record's CRC covers its first twelve
//! header bytes, the key and the value.  The active area is the one with a
//! valid header and the highest generation.
//!
//! # Crash safety
//!
//! A record is only visible once its CRC matches, so a `set` interrupted by a
//! power cut leaves the previous value in force.  Compaction copies the live
//! records into the erased spare area and writes that area's header last; until
//! the header lands, the old area is still the active one on the next boot.
//!
//! A record header that does not parse marks the rest of the area as
//! unusable: the area becomes read-only and the next write compacts first.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::block_device::{BlockDevice, DeviceError, ERASED};

pub const MAX_KEY_LEN: usize = 32;
pub const MAX_VALUE_LEN: usize = 4096;

const AREA_MAGIC: u32 = 0x5650_4B48; // "HKPV"
const AREA_VERSION: u16 = 1;
const AREA_HEADER_LEN: usize = 16;

const RECORD_MAGIC: u16 = 0x4B52; // "RK"
const RECORD_HEADER_LEN: usize = 16;
const FLAG_VALUE: u8 = 0x00;
const FLAG_TOMBSTONE: u8 = 0x01;

/// Error type for KV store operations.
#[derive(Debug, Error)]
pub enum KvError {
    /// No live record exists for the key.
    #[error("key not found")]
    NotFound,

    #[error("invalid key {0:?}: keys are 1..=32 printable ASCII bytes")]
    InvalidKey(String),

    #[error("value of {len} bytes exceeds the {max}-byte limit")]
    ValueTooLarge { len: usize, max: usize },

    /// Compaction could not free enough room.
    #[error("out of space: need {needed} bytes, {available} available after compaction")]
    OutOfSpace { needed: usize, available: usize },

    /// A stored record failed its checksum when read back.
    #[error("record for {key:?} failed its checksum")]
    Corrupt { key: String },

    #[error("region of {size} bytes cannot hold two areas of {block_size}-byte blocks")]
    BadGeometry { size: usize, block_size: usize },

    #[error("storage I/O failed: {0}")]
    Io(#[from] DeviceError),
}

/// Where the newest record for a key lives.
#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    offset: usize,
    value_len: usize,
    seq: u32,
}

#[derive(Debug, Clone, Copy)]
struct AreaHeader {
    generation: u32,
}

impl AreaHeader {
    fn encode(&self) -> [u8; AREA_HEADER_LEN] {
        let mut out = [ERASED; AREA_HEADER_LEN];
        out[0..4].copy_from_slice(&AREA_MAGIC.to_le_bytes());
        out[4..6].copy_from_slice(&AREA_VERSION.to_le_bytes());
        out[8..12].copy_from_slice(&self.generation.to_le_bytes());
        let crc = crc32fast::hash(&out[..12]);
        out[12..16].copy_from_slice(&crc.to_le_bytes());
        out
    }

    fn decode(bytes: &[u8; AREA_HEADER_LEN]) -> Option<Self> {
        let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        let crc = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
        if magic != AREA_MAGIC || version != AREA_VERSION || crc != crc32fast::hash(&bytes[..12]) {
            return None;
        }
        Some(Self {
            generation: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct RecordHeader {
    flags: u8,
    key_len: usize,
    value_len: usize,
    seq: u32,
    crc: u32,
}

impl RecordHeader {
    fn encode_prefix(flags: u8, key_len: usize, value_len: usize, seq: u32) -> [u8; 12] {
        let mut out = [ERASED; 12];
        out[0..2].copy_from_slice(&RECORD_MAGIC.to_le_bytes());
        out[2] = flags;
        out[3] = key_len as u8;
        out[4..6].copy_from_slice(&(value_len as u16).to_le_bytes());
        out[8..12].copy_from_slice(&seq.to_le_bytes());
        out
    }

    /// Parses a header whose fields are plausible.  The CRC is checked later
    /// against the body.
    fn decode(bytes: &[u8; RECORD_HEADER_LEN]) -> Option<Self> {
        let magic = u16::from_le_bytes([bytes[0], bytes[1]]);
        let flags = bytes[2];
        let key_len = bytes[3] as usize;
        let value_len = u16::from_le_bytes([bytes[4], bytes[5]]) as usize;
        if magic != RECORD_MAGIC
            || !matches!(flags, FLAG_VALUE | FLAG_TOMBSTONE)
            || key_len == 0
            || key_len > MAX_KEY_LEN
            || value_len > MAX_VALUE_LEN
        {
            return None;
        }
        Some(Self {
            flags,
            key_len,
            value_len,
            seq: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            crc: u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
        })
    }

    fn total_len(&self) -> usize {
        RECORD_HEADER_LEN + self.key_len + self.value_len
    }
}

fn record_crc(prefix: &[u8], key: &[u8], value: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(prefix);
    hasher.update(key);
    hasher.update(value);
    hasher.finalize()
}

fn encode_record(flags: u8, key: &str, value: &[u8], seq: u32) -> Vec<u8> {
    let prefix = RecordHeader::encode_prefix(flags, key.len(), value.len(), seq);
    let crc = record_crc(&prefix, key.as_bytes(), value);
    let mut out = Vec::with_capacity(RECORD_HEADER_LEN + key.len() + value.len());
    out.extend_from_slice(&prefix);
    out.extend_from_slice(&crc.to_le_bytes());
    out.extend_from_slice(key.as_bytes());
    out.extend_from_slice(value);
    out
}

/// Checks the key rules: 1..=32 bytes of printable, non-space ASCII.
pub fn validate_key(key: &str) -> Result<(), KvError> {
    if key.is_empty() || key.len() > MAX_KEY_LEN || !key.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(KvError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Occupancy figures for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogStats {
    pub area_size: usize,
    pub used: usize,
    pub live_bytes: usize,
    pub keys: usize,
    pub generation: u32,
    pub read_only: bool,
}

/// The log-structured store.
pub struct LogStore {
    device: Box<dyn BlockDevice>,
    area_size: usize,
    active: usize,
    generation: u32,
    /// Next append offset within the active area; `None` once the tail is
    /// unusable.
    write_offset: Option<usize>,
    next_seq: u32,
    index: BTreeMap<String, IndexEntry>,
    live_bytes: usize,
}

impl std::fmt::Debug for LogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStore")
            .field("area_size", &self.area_size)
            .field("active", &self.active)
            .field("generation", &self.generation)
            .field("write_offset", &self.write_offset)
            .field("keys", &self.index.len())
            .finish()
    }
}

impl LogStore {
    /// Mounts the store, formatting the device if neither area is valid.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::BadGeometry`] if the device cannot be split into two
    /// block-aligned areas, or [`KvError::Io`] on device failure.
    pub fn mount(device: Box<dyn BlockDevice>) -> Result<Self, KvError> {
        let size = device.size();
        let block_size = device.block_size();
        if block_size == 0 || size % (2 * block_size) != 0 || size / 2 < AREA_HEADER_LEN * 2 {
            return Err(KvError::BadGeometry { size, block_size });
        }

        let mut store = Self {
            device,
            area_size: size / 2,
            active: 0,
            generation: 0,
            write_offset: None,
            next_seq: 0,
            index: BTreeMap::new(),
            live_bytes: 0,
        };

        let headers = [store.read_area_header(0)?, store.read_area_header(1)?];
        let chosen = match headers {
            [Some(a), Some(b)] => Some(if b.generation > a.generation { (1, b) } else { (0, a) }),
            [Some(a), None] => Some((0, a)),
            [None, Some(b)] => Some((1, b)),
            [None, None] => None,
        };

        match chosen {
            Some((area, header)) => {
                store.active = area;
                store.generation = header.generation;
                store.scan()?;
                info!(
                    area,
                    generation = header.generation,
                    keys = store.index.len(),
                    "kvstore mounted"
                );
            }
            None => {
                info!("kvstore has no valid area; formatting");
                store.format_area(0, 1)?;
                store.active = 0;
                store.generation = 1;
                store.write_offset = Some(AREA_HEADER_LEN);
            }
        }
        Ok(store)
    }

    fn area_start(&self, area: usize) -> usize {
        area * self.area_size
    }

    fn read_area_header(&self, area: usize) -> Result<Option<AreaHeader>, KvError> {
        let mut buf = [0u8; AREA_HEADER_LEN];
        self.device.read(self.area_start(area), &mut buf)?;
        Ok(AreaHeader::decode(&buf))
    }

    fn format_area(&mut self, area: usize, generation: u32) -> Result<(), KvError> {
        self.erase_area(area)?;
        let header = AreaHeader { generation }.encode();
        self.device.program(self.area_start(area), &header)?;
        Ok(())
    }

    fn erase_area(&mut self, area: usize) -> Result<(), KvError> {
        let block_size = self.device.block_size();
        let first = self.area_start(area) / block_size;
        for block in first..first + self.area_size / block_size {
            self.device.erase(block)?;
        }
        Ok(())
    }

    /// Rebuilds the index from the active area.
    fn scan(&mut self) -> Result<(), KvError> {
        let base = self.area_start(self.active);
        let mut offset = AREA_HEADER_LEN;
        let mut max_seq: Option<u32> = None;
        self.index.clear();
        self.write_offset = None;

        while offset + RECORD_HEADER_LEN <= self.area_size {
            let mut raw = [0u8; RECORD_HEADER_LEN];
            self.device.read(base + offset, &mut raw)?;
            if raw.iter().all(|&b| b == ERASED) {
                self.write_offset = Some(offset);
                break;
            }
            let header = match RecordHeader::decode(&raw) {
                Some(h) if offset + h.total_len() <= self.area_size => h,
                _ => {
                    warn!(offset, "kvstore: unreadable record header; area is read-only until compaction");
                    break;
                }
            };

            let mut body = vec![0u8; header.key_len + header.value_len];
            self.device.read(base + offset + RECORD_HEADER_LEN, &mut body)?;
            let (key, value) = body.split_at(header.key_len);
            if record_crc(&raw[..12], key, value) != header.crc {
                warn!(offset, seq = header.seq, "kvstore: discarding record with bad checksum");
                offset += header.total_len();
                continue;
            }

            max_seq = Some(max_seq.map_or(header.seq, |m| m.max(header.seq)));
            match String::from_utf8(key.to_vec()) {
                Ok(name) if header.flags == FLAG_TOMBSTONE => {
                    self.index.remove(&name);
                }
                Ok(name) => {
                    self.index.insert(
                        name,
                        IndexEntry {
                            offset: offset + RECORD_HEADER_LEN + header.key_len,
                            value_len: header.value_len,
                            seq: header.seq,
                        },
                    );
                }
                Err(_) => warn!(offset, "kvstore: skipping record with non-ASCII key"),
            }
            offset += header.total_len();
        }

        // An area filled to the last byte is full, not damaged.
        if self.write_offset.is_none() && offset + RECORD_HEADER_LEN > self.area_size {
            self.write_offset = Some(offset.min(self.area_size));
        }
        self.next_seq = max_seq.map_or(0, |s| s.wrapping_add(1));
        self.live_bytes = self.compute_live_bytes();
        Ok(())
    }

    fn compute_live_bytes(&self) -> usize {
        self.index
            .iter()
            .map(|(k, e)| RECORD_HEADER_LEN + k.len() + e.value_len)
            .sum()
    }

    fn free_bytes(&self) -> usize {
        self.write_offset
            .map_or(0, |offset| self.area_size.saturating_sub(offset))
    }

    /// Returns the value stored at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::NotFound`] if absent and [`KvError::Corrupt`] if the
    /// record no longer matches its checksum.
    pub fn get(&self, key: &str) -> Result<Vec<u8>, KvError> {
        let entry = self.index.get(key).ok_or(KvError::NotFound)?;
        let base = self.area_start(self.active);
        let header_at = entry.offset - key.len() - RECORD_HEADER_LEN;

        let mut raw = [0u8; RECORD_HEADER_LEN];
        self.device.read(base + header_at, &mut raw)?;
        let mut value = vec![0u8; entry.value_len];
        self.device.read(base + entry.offset, &mut value)?;

        let crc = u32::from_le_bytes([raw[12], raw[13], raw[14], raw[15]]);
        if record_crc(&raw[..12], key.as_bytes(), &value) != crc {
            warn!(key, "kvstore: checksum mismatch on read");
            return Err(KvError::Corrupt {
                key: key.to_string(),
            });
        }
        Ok(value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Stores `value` at `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::InvalidKey`], [`KvError::ValueTooLarge`],
    /// [`KvError::OutOfSpace`] or [`KvError::Io`].
    pub fn set(&mut self, key: &str, value: &[u8]) -> Result<(), KvError> {
        validate_key(key)?;
        if value.len() > MAX_VALUE_LEN {
            return Err(KvError::ValueTooLarge {
                len: value.len(),
                max: MAX_VALUE_LEN,
            });
        }
        let offset = self.reserve(key, RECORD_HEADER_LEN + key.len() + value.len())?;
        let seq = self.append(offset, FLAG_VALUE, key, value)?;

        let old = self.index.insert(
            key.to_string(),
            IndexEntry {
                offset: offset + RECORD_HEADER_LEN + key.len(),
                value_len: value.len(),
                seq,
            },
        );
        self.live_bytes += RECORD_HEADER_LEN + key.len() + value.len();
        if let Some(old) = old {
            self.live_bytes -= RECORD_HEADER_LEN + key.len() + old.value_len;
        }
        debug!(key, len = value.len(), seq, "kvstore set");
        Ok(())
    }

    /// Removes `key`.  Returns whether a live value existed; deleting an
    /// absent key writes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::OutOfSpace`] or [`KvError::Io`] if the tombstone
    /// cannot be written.
    pub fn delete(&mut self, key: &str) -> Result<bool, KvError> {
        if !self.index.contains_key(key) {
            return Ok(false);
        }
        let offset = self.reserve(key, RECORD_HEADER_LEN + key.len())?;
        // Compaction may have run; the key is still live either way.
        self.append(offset, FLAG_TOMBSTONE, key, &[])?;
        if let Some(old) = self.index.remove(key) {
            self.live_bytes -= RECORD_HEADER_LEN + key.len() + old.value_len;
        }
        debug!(key, "kvstore delete");
        Ok(true)
    }

    /// Keys starting with `prefix`, in key order.  The result is a snapshot,
    /// so callers may delete while walking it.
    pub fn find(&self, prefix: &str) -> Vec<String> {
        self.index
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Finds room for a record of `len` bytes, compacting when needed.
    fn reserve(&mut self, key: &str, len: usize) -> Result<usize, KvError> {
        if self.free_bytes() >= len {
            return self.write_offset.ok_or(KvError::OutOfSpace {
                needed: len,
                available: 0,
            });
        }

        // After compaction only live records remain.  The record being
        // replaced is still counted as live, which is conservative.
        self.compact()?;
        let available = self.free_bytes();
        match self.write_offset {
            Some(offset) if available >= len => Ok(offset),
            _ => {
                warn!(key, needed = len, available, "kvstore out of space");
                Err(KvError::OutOfSpace {
                    needed: len,
                    available,
                })
            }
        }
    }

    fn append(&mut self, offset: usize, flags: u8, key: &str, value: &[u8]) -> Result<u32, KvError> {
        let seq = self.next_seq;
        let record = encode_record(flags, key, value, seq);
        let base = self.area_start(self.active);
        // Whatever happens, the bytes at `offset` are no longer erased.
        self.write_offset = Some(offset + record.len());
        self.next_seq = seq.wrapping_add(1);
        self.device.program(base + offset, &record)?;
        Ok(seq)
    }

    /// Copies every live record into the spare area and switches to it.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::Io`] on device failure.  The previous area stays
    /// active until the new header has been written.
    pub fn compact(&mut self) -> Result<(), KvError> {
        let target = 1 - self.active;
        let target_base = self.area_start(target);
        let generation = self.generation.wrapping_add(1);
        self.erase_area(target)?;

        let mut entries: Vec<(String, IndexEntry)> =
            self.index.iter().map(|(k, e)| (k.clone(), *e)).collect();
        entries.sort_by_key(|(_, e)| e.seq);

        let mut offset = AREA_HEADER_LEN;
        let mut new_index = BTreeMap::new();
        for (key, entry) in entries {
            let value = match self.get(&key) {
                Ok(v) => v,
                Err(KvError::Corrupt { .. }) => {
                    warn!(key, "kvstore: dropping corrupt record during compaction");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let record = encode_record(FLAG_VALUE, &key, &value, entry.seq);
            self.device.program(target_base + offset, &record)?;
            new_index.insert(
                key.clone(),
                IndexEntry {
                    offset: offset + RECORD_HEADER_LEN + key.len(),
                    value_len: value.len(),
                    seq: entry.seq,
                },
            );
            offset += record.len();
        }

        let header = AreaHeader { generation }.encode();
        self.device.program(target_base, &header)?;

        info!(
            from = self.active,
            to = target,
            generation,
            used = offset,
            "kvstore compacted"
        );
        self.active = target;
        self.generation = generation;
        self.write_offset = Some(offset);
        self.index = new_index;
        self.live_bytes = self.compute_live_bytes();
        Ok(())
    }

    pub fn stats(&self) -> LogStats {
        LogStats {
            area_size: self.area_size,
            used: self.write_offset.unwrap_or(self.area_size),
            live_bytes: self.live_bytes,
            keys: self.index.len(),
            generation: self.generation,
            read_only: self.write_offset.is_none(),
        }
    }

    /// Releases the device, e.g. to simulate a reboot in tests.
    pub fn into_device(self) -> Box<dyn BlockDevice> {
        self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::kvstore::block_device::RamDevice;

    const SIZE: usize = 8 * 1024;
    const BLOCK: usize = 1024;

    fn fresh() -> LogStore {
        LogStore::mount(Box::new(RamDevice::new(SIZE, BLOCK))).unwrap()
    }

    #[test]
    fn test_set_then_get_returns_value() {
        // Arrange
        let mut store = fresh();

        // Act
        store.set("auth.password_hash", &[7; 32]).unwrap();

        // Assert
        assert_eq!(store.get("auth.password_hash").unwrap(), vec![7; 32]);
    }

    #[test]
    fn test_set_twice_keeps_latest() {
        let mut store = fresh();
        store.set("k", b"one").unwrap();
        store.set("k", b"two").unwrap();
        assert_eq!(store.get("k").unwrap(), b"two");
        assert_eq!(store.stats().keys, 1);
    }

    #[test]
    fn test_delete_is_idempotent() {
        // Arrange
        let mut store = fresh();
        store.set("k", b"v").unwrap();

        // Act
        let first = store.delete("k").unwrap();
        let used_after_first = store.stats().used;
        let second = store.delete("k").unwrap();

        // Assert
        assert!(first);
        assert!(!second);
        assert_eq!(store.stats().used, used_after_first, "second delete writes nothing");
        assert!(matches!(store.get("k"), Err(KvError::NotFound)));
    }

    #[test]
    fn test_find_yields_prefix_matches_only() {
        let mut store = fresh();
        for key in ["keydef.0x04", "keydef.0x3A", "wifi.ssid", "keydef"] {
            store.set(key, b"x").unwrap();
        }
        let found = store.find("keydef.");
        assert_eq!(found, vec!["keydef.0x04", "keydef.0x3A"]);
    }

    #[test]
    fn test_invalid_keys_are_rejected() {
        let mut store = fresh();
        assert!(matches!(store.set("", b"x"), Err(KvError::InvalidKey(_))));
        assert!(matches!(store.set("has space", b"x"), Err(KvError::InvalidKey(_))));
        assert!(matches!(store.set(&"k".repeat(33), b"x"), Err(KvError::InvalidKey(_))));
        assert!(store.set(&"k".repeat(32), b"x").is_ok());
    }

    #[test]
    fn test_oversized_value_is_rejected() {
        let mut store = fresh();
        assert!(matches!(
            store.set("k", &vec![0; MAX_VALUE_LEN + 1]),
            Err(KvError::ValueTooLarge { .. })
        ));
    }

    #[test]
    fn test_values_survive_remount() {
        // Arrange
        let mut store = fresh();
        store.set("a", b"1").unwrap();
        store.set("b", b"2").unwrap();
        store.delete("a").unwrap();

        // Act
        let store = LogStore::mount(store.into_device()).unwrap();

        // Assert
        assert!(matches!(store.get("a"), Err(KvError::NotFound)));
        assert_eq!(store.get("b").unwrap(), b"2");
    }

    #[test]
    fn test_rewrites_trigger_compaction_instead_of_running_out() {
        // Arrange
        let mut store = fresh();
        let value = vec![0xAB; 500];

        // Act: far more bytes than one 4 KiB area holds.
        for i in 0..50u8 {
            store.set("keydef.0x04", &value).unwrap();
            store.set("counter", &[i]).unwrap();
        }

        // Assert
        assert!(store.stats().generation > 1);
        assert_eq!(store.get("keydef.0x04").unwrap(), value);
        assert_eq!(store.get("counter").unwrap(), vec![49]);
    }

    #[test]
    fn test_out_of_space_when_live_data_fills_area() {
        let mut store = fresh();
        let mut result = Ok(());
        for i in 0..20 {
            result = store.set(&format!("k{i}"), &[0; 600]);
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(KvError::OutOfSpace { .. })));
        assert_eq!(store.get("k0").unwrap().len(), 600);
    }

    #[test]
    fn test_bad_geometry_is_rejected() {
        let dev = RamDevice::new(3000, 1024);
        assert!(matches!(
            LogStore::mount(Box::new(dev)),
            Err(KvError::BadGeometry { .. })
        ));
    }
}
