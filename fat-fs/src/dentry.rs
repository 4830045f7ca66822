//! Disk layout layer: the flat directory and its fixed-width entries.
//!
//! Each entry is a 19-byte wire record: 8 name bytes and 3 extension bytes,
//! both space padded (and truncated on the way in), followed by a 32-bit
//! size and a 32-bit start block, little endian. The run of live records in
//! the directory block ends at the first record whose size field is zero;
//! that terminator is a scanning convention, not a live file, which also
//! means a zero-byte file does not survive a reload.

use crate::{DataBlock, BLOCK_SZ};

/// Width of one directory record on the wire.
pub const DENTRY_SZ: usize = 19;
const NAME_LEN: usize = 8;
const EXT_LEN: usize = 3;
const SIZE_OFF: usize = NAME_LEN + EXT_LEN;
const START_OFF: usize = SIZE_OFF + 4;

/// Pad-or-truncate `s` into exactly `N` bytes, space filled.
fn pack_padded<const N: usize>(s: &str) -> [u8; N] {
    let mut out = [0x20u8; N];
    for (slot, byte) in out.iter_mut().zip(s.bytes()) {
        *slot = byte;
    }
    out
}

/// Trim the trailing space padding back off a fixed-width field.
fn unpack_padded(field: &[u8]) -> String {
    let end = field
        .iter()
        .rposition(|&b| b != 0x20)
        .map_or(0, |i| i + 1);
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// One file: name, extension, size in bytes and the first block of its
/// chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    name: String,
    ext: String,
    size: u32,
    start_block: u32,
}

impl DirEntry {
    /// Build an entry from a `name.ext` style file name, splitting at the
    /// last dot. Both parts are clipped to their wire width up front so the
    /// in-memory entry always matches what a reload would produce.
    pub fn new(filename: &str, size: u32, start_block: u32) -> Self {
        let (name, ext) = match filename.rsplit_once('.') {
            Some((name, ext)) => (name, ext),
            None => (filename, ""),
        };
        Self {
            name: unpack_padded(&pack_padded::<NAME_LEN>(name)),
            ext: unpack_padded(&pack_padded::<EXT_LEN>(ext)),
            size,
            start_block,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ext(&self) -> &str {
        &self.ext
    }

    /// `name.ext`, or just the name when there is no extension.
    pub fn fullname(&self) -> String {
        if self.ext.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.name, self.ext)
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn set_size(&mut self, size: u32) {
        self.size = size;
    }

    pub fn start_block(&self) -> u32 {
        self.start_block
    }

    /// Encode into one wire record. `buf` must be at least [`DENTRY_SZ`]
    /// bytes.
    pub fn encode(&self, buf: &mut [u8]) {
        buf[..NAME_LEN].copy_from_slice(&pack_padded::<NAME_LEN>(&self.name));
        buf[NAME_LEN..SIZE_OFF].copy_from_slice(&pack_padded::<EXT_LEN>(&self.ext));
        buf[SIZE_OFF..START_OFF].copy_from_slice(&self.size.to_le_bytes());
        buf[START_OFF..DENTRY_SZ].copy_from_slice(&self.start_block.to_le_bytes());
    }

    /// Decode one wire record. Returns `None` for the zero-size terminator.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        let size = u32::from_le_bytes([buf[SIZE_OFF], buf[SIZE_OFF + 1], buf[SIZE_OFF + 2], buf[SIZE_OFF + 3]]);
        if size == 0 {
            return None;
        }
        Some(Self {
            name: unpack_padded(&buf[..NAME_LEN]),
            ext: unpack_padded(&buf[NAME_LEN..SIZE_OFF]),
            size,
            start_block: u32::from_le_bytes([
                buf[START_OFF],
                buf[START_OFF + 1],
                buf[START_OFF + 2],
                buf[START_OFF + 3],
            ]),
        })
    }
}

/// The in-memory directory: live entries in insertion order, mirrored to the
/// directory block by the engine after every mutation.
#[derive(Debug, Default)]
pub struct Directory {
    entries: Vec<DirEntry>,
}

impl Directory {
    /// Most entries one directory block can hold; the partial record slot at
    /// the end of the block acts as an implicit terminator once it is full.
    pub const MAX_ENTRIES: usize = BLOCK_SZ / DENTRY_SZ;

    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the directory block: sequential records up to the terminator
    /// or until fewer bytes than a full record remain.
    pub fn decode(block: &DataBlock) -> Self {
        let mut entries = Vec::new();
        for record in block.chunks_exact(DENTRY_SZ) {
            match DirEntry::decode(record) {
                Some(entry) => entries.push(entry),
                None => break,
            }
        }
        Self { entries }
    }

    /// Encode all live entries back-to-back. The block is zero-filled first
    /// so the slot after the last entry always reads as a terminator, even
    /// after the directory shrinks.
    pub fn encode(&self, block: &mut DataBlock) {
        block.fill(0);
        for (entry, record) in self.entries.iter().zip(block.chunks_exact_mut(DENTRY_SZ)) {
            entry.encode(record);
        }
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= Self::MAX_ENTRIES
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact match on the trimmed full name.
    pub fn find(&self, filename: &str) -> Option<&DirEntry> {
        self.entries.iter().find(|e| e.fullname() == filename)
    }

    pub fn find_mut(&mut self, filename: &str) -> Option<&mut DirEntry> {
        self.entries.iter_mut().find(|e| e.fullname() == filename)
    }

    pub fn add(&mut self, entry: DirEntry) {
        self.entries.push(entry);
    }

    /// Remove by full name, returning the removed entry.
    pub fn remove(&mut self, filename: &str) -> Option<DirEntry> {
        let idx = self.entries.iter().position(|e| e.fullname() == filename)?;
        Some(self.entries.remove(idx))
    }

    pub fn iter(&self) -> impl Iterator<Item = &DirEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_wire_round_trip() {
        let entry = DirEntry::new("report.txt", 1234, 7);
        let mut record = [0u8; DENTRY_SZ];
        entry.encode(&mut record);
        let back = DirEntry::decode(&record).unwrap();
        assert_eq!(back.name(), "report");
        assert_eq!(back.ext(), "txt");
        assert_eq!(back.size(), 1234);
        assert_eq!(back.start_block(), 7);
        assert_eq!(back, entry);
    }

    #[test]
    fn name_and_ext_are_clipped_to_wire_width() {
        let entry = DirEntry::new("averylongname.text", 1, 2);
        assert_eq!(entry.name(), "averylon");
        assert_eq!(entry.ext(), "tex");
        assert_eq!(entry.fullname(), "averylon.tex");
    }

    #[test]
    fn name_without_extension() {
        let entry = DirEntry::new("README", 10, 3);
        assert_eq!(entry.name(), "README");
        assert_eq!(entry.ext(), "");
        assert_eq!(entry.fullname(), "README");
        let mut record = [0u8; DENTRY_SZ];
        entry.encode(&mut record);
        assert_eq!(DirEntry::decode(&record).unwrap().fullname(), "README");
    }

    #[test]
    fn zero_size_record_is_the_terminator() {
        assert!(DirEntry::decode(&[0u8; DENTRY_SZ]).is_none());
    }

    #[test]
    fn directory_block_round_trip() {
        let mut dir = Directory::new();
        dir.add(DirEntry::new("a.txt", 2, 2));
        dir.add(DirEntry::new("b.dat", 900, 3));
        let mut block = [0u8; BLOCK_SZ];
        dir.encode(&mut block);
        let back = Directory::decode(&block);
        assert_eq!(back.len(), 2);
        assert_eq!(back.find("a.txt").unwrap().start_block(), 2);
        assert_eq!(back.find("b.dat").unwrap().size(), 900);
    }

    #[test]
    fn shrinking_leaves_no_stale_entries_behind() {
        let mut dir = Directory::new();
        dir.add(DirEntry::new("a.txt", 2, 2));
        dir.add(DirEntry::new("b.txt", 2, 3));
        let mut block = [0u8; BLOCK_SZ];
        dir.encode(&mut block);
        dir.remove("a.txt").unwrap();
        dir.encode(&mut block);
        let back = Directory::decode(&block);
        assert_eq!(back.len(), 1);
        assert!(back.find("a.txt").is_none());
        assert!(back.find("b.txt").is_some());
    }

    #[test]
    fn stops_when_no_full_record_remains() {
        // a block packed with the maximum number of live entries relies on
        // the 18 trailing bytes as an implicit terminator
        let mut dir = Directory::new();
        for i in 0..Directory::MAX_ENTRIES {
            dir.add(DirEntry::new(&format!("f{}.bin", i), 1, (2 + i) as u32));
        }
        assert!(dir.is_full());
        let mut block = [0u8; BLOCK_SZ];
        dir.encode(&mut block);
        assert_eq!(Directory::decode(&block).len(), Directory::MAX_ENTRIES);
    }
}
