/// The vSAN block size.  Writes whose length is not a multiple of this are turned into
/// read-modify-write sequences.

pub const BLOCK_SIZE: u64 = 4096;

pub fn is_unaligned(length: u64) -> bool {
    length % BLOCK_SIZE != 0
}

#[test]
fn test_is_unaligned() {
    assert!(!is_unaligned(4096));
    assert!(is_unaligned(4097));
    assert!(!is_unaligned(0));
    assert!(is_unaligned(512));
    assert!(!is_unaligned(1024 * 1024));
    assert!(is_unaligned(u64::MAX));
}
