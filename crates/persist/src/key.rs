use pregen_common::CellCoord;

/// Tag byte appended to a chunk index to address one of its records.
///
/// Only the version markers are needed to test whether a chunk has been
/// written; the engine stores the rest of the chunk under other tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChunkDataKey {
    /// Version record written by current engine releases.
    NewVersion = 0x2c,
    /// Version record written by legacy engine releases.
    OldVersion = 0x76,
}

impl ChunkDataKey {
    /// Tags to probe, most recent format first.
    pub const VERSION_TAGS: [Self; 2] = [Self::NewVersion, Self::OldVersion];

    pub fn tag(self) -> u8 {
        self as u8
    }
}

/// Engine chunk index: little-endian x followed by little-endian z.
pub fn chunk_index(coord: CellCoord) -> [u8; 8] {
    let mut index = [0u8; 8];
    index[..4].copy_from_slice(&coord.x.to_le_bytes());
    index[4..].copy_from_slice(&coord.z.to_le_bytes());
    index
}

/// Composite lookup key: chunk index followed by the record tag.
pub fn chunk_key(coord: CellCoord, tag: ChunkDataKey) -> Vec<u8> {
    let mut key = Vec::with_capacity(9);
    key.extend_from_slice(&chunk_index(coord));
    key.push(tag.tag());
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_is_little_endian_pair() {
        assert_eq!(chunk_index(CellCoord::new(1, 2)), [1, 0, 0, 0, 2, 0, 0, 0]);
        assert_eq!(
            chunk_index(CellCoord::new(-1, 256)),
            [0xff, 0xff, 0xff, 0xff, 0, 1, 0, 0]
        );
    }

    #[test]
    fn key_appends_version_tag() {
        let coord = CellCoord::new(3, -4);
        let new = chunk_key(coord, ChunkDataKey::NewVersion);
        let old = chunk_key(coord, ChunkDataKey::OldVersion);
        assert_eq!(new.len(), 9);
        assert_eq!(new[..8], old[..8]);
        assert_eq!(new[8], 0x2c);
        assert_eq!(old[8], 0x76);
    }

    #[test]
    fn probe_order_prefers_current_format() {
        assert_eq!(ChunkDataKey::VERSION_TAGS[0], ChunkDataKey::NewVersion);
    }
}
