//! Fixed structure of the Quran text.
//!
//! The verse-count table is a verified constant. Some audio CDNs address
//! verses by their global number (1..=6236), so an error in any entry would
//! shift every URL built for later surahs. The tests pin the total and a set
//! of boundaries.

pub const SURAH_COUNT: u16 = 114;
pub const TOTAL_VERSES: u16 = 6236;

/// Number of verses in each surah, indexed by `surah - 1`.
pub const SURAH_VERSE_COUNTS: [u16; SURAH_COUNT as usize] = [
    7, 286, 200, 176, 120, 165, 206, 75, 129, 109,
    123, 111, 43, 52, 99, 128, 111, 110, 98, 135,
    112, 78, 118, 64, 77, 227, 93, 88, 69, 60,
    34, 30, 73, 54, 45, 83, 182, 88, 75, 85,
    54, 53, 89, 59, 37, 35, 38, 29, 18, 45,
    60, 49, 62, 55, 78, 96, 29, 22, 24, 13,
    14, 11, 11, 18, 12, 12, 30, 52, 52, 44,
    28, 28, 20, 56, 40, 31, 50, 40, 46, 42,
    29, 19, 36, 25, 22, 17, 19, 26, 30, 20,
    15, 21, 11, 8, 8, 19, 5, 8, 8, 11,
    11, 8, 3, 9, 5, 4, 7, 3, 6, 3,
    5, 4, 5, 6,
];

/// Global numbers preceding each surah: `VERSES_BEFORE[s - 1] + ayah` is the
/// global number of `s:ayah`.
const VERSES_BEFORE: [u16; SURAH_COUNT as usize] = {
    let mut table = [0u16; SURAH_COUNT as usize];
    let mut i = 1;
    while i < SURAH_COUNT as usize {
        table[i] = table[i - 1] + SURAH_VERSE_COUNTS[i - 1];
        i += 1;
    }
    table
};

/// Verse count of `surah`, or `None` outside 1..=114.
pub fn verse_count(surah: u16) -> Option<u16> {
    if surah == 0 || surah > SURAH_COUNT {
        return None;
    }
    Some(SURAH_VERSE_COUNTS[surah as usize - 1])
}

pub fn is_valid_verse(surah: u16, ayah: u16) -> bool {
    matches!(verse_count(surah), Some(count) if ayah >= 1 && ayah <= count)
}

/// Global number of `surah:ayah`. Callers validate first.
pub(crate) fn global_number_unchecked(surah: u16, ayah: u16) -> u16 {
    VERSES_BEFORE[surah as usize - 1] + ayah
}

/// Inverse of [`global_number_unchecked`]. `None` outside 1..=6236.
pub(crate) fn split_global(global: u32) -> Option<(u16, u16)> {
    if global == 0 || global > TOTAL_VERSES as u32 {
        return None;
    }
    let global = global as u16;
    // Last surah whose first global number is <= global.
    let index = VERSES_BEFORE.partition_point(|&before| before < global) - 1;
    Some((index as u16 + 1, global - VERSES_BEFORE[index]))
}
