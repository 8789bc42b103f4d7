//! Room summary decoding.
//!
//! `@R` answers with ten bitfields, `stat0` to `stat9`. Bit `b` of `statN`
//! set means room `1 + 8N + b` has a device allocated, covering rooms 1-80.

use lwlink_core::{JsonEvent, ROOM_STAT_FIELDS};

/// Highest room number the Link supports.
pub const MAX_ROOMS: u8 = 80;

/// Rooms marked in use by the bitfields, ascending.
pub fn rooms_from_stats(stats: &[u8; ROOM_STAT_FIELDS]) -> Vec<u8> {
    let mut rooms = Vec::with_capacity(usize::from(MAX_ROOMS));
    for (n, bits) in (0u8..).zip(stats.iter()) {
        for b in 0..8u8 {
            if bits & (1 << b) != 0 {
                rooms.push(1 + n * 8 + b);
            }
        }
    }
    rooms
}

/// Rooms marked in use by a room summary event.
pub fn rooms_in_use(summary: &JsonEvent) -> Vec<u8> {
    rooms_from_stats(&summary.room_stats())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat0_full_is_rooms_one_to_eight() {
        let stats = [255, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(rooms_from_stats(&stats), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn empty_summary_has_no_rooms() {
        assert!(rooms_from_stats(&[0; ROOM_STAT_FIELDS]).is_empty());
    }

    #[test]
    fn bits_map_across_fields() {
        // stat1 bit 0 -> room 9, stat1 bit 2 -> room 11, stat9 bit 7 -> room 80.
        let stats = [0, 0b101, 0, 0, 0, 0, 0, 0, 0, 0b1000_0000];
        assert_eq!(rooms_from_stats(&stats), vec![9, 11, 80]);
    }

    #[test]
    fn all_bits_cover_every_room() {
        let rooms = rooms_from_stats(&[255; ROOM_STAT_FIELDS]);
        assert_eq!(rooms.len(), usize::from(MAX_ROOMS));
        assert_eq!(rooms.first(), Some(&1));
        assert_eq!(rooms.last(), Some(&MAX_ROOMS));
    }

    #[test]
    fn from_event() {
        let summary = {
            let mut event = JsonEvent::default();
            event.pkt = "room".into();
            event.function = "summary".into();
            event.stat0 = 255;
            event.stat1 = 7;
            event
        };
        assert_eq!(
            rooms_in_use(&summary),
            vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]
        );
    }
}
