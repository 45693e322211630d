use std::io::{Read, Seek, SeekFrom};

use proptest::collection::vec;
use proptest::prelude::*;

use xzseek::{
    compress, decompress, CompressOptions, Compressor, DecompressOptions, SeekableXzReader,
};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn any_bytes_roundtrip(data in vec(any::<u8>(), 0..4096)) {
        let packed = compress(&data, &CompressOptions::new().preset(0)).unwrap();
        let plain = decompress(&packed, &DecompressOptions::new()).unwrap();
        prop_assert_eq!(plain, data);
    }

    #[test]
    fn chunked_feeding_is_equivalent_to_one_shot(
        data in vec(any::<u8>(), 1..4096),
        chunk in 1usize..512,
    ) {
        let mut comp = Compressor::new(&CompressOptions::new().preset(0)).unwrap();
        let mut packed = Vec::new();
        for piece in data.chunks(chunk) {
            packed.extend(comp.compress(piece).unwrap());
        }
        packed.extend(comp.flush().unwrap());

        let plain = decompress(&packed, &DecompressOptions::new()).unwrap();
        prop_assert_eq!(plain, data);
    }

    #[test]
    fn seeking_never_changes_content(
        parts in vec(vec(any::<u8>(), 1..2048), 1..4),
        seeks in vec(any::<u16>(), 1..8),
    ) {
        let mut plain = Vec::new();
        let mut packed = Vec::new();
        for part in &parts {
            plain.extend_from_slice(part);
            packed.extend(compress(part, &CompressOptions::new().preset(0)).unwrap());
        }

        let mut reader = SeekableXzReader::new(std::io::Cursor::new(packed)).unwrap();
        prop_assert_eq!(reader.uncompressed_size(), plain.len() as u64);
        for &s in &seeks {
            let target = u64::from(s) % (plain.len() as u64 + 1);
            reader.seek(SeekFrom::Start(target)).unwrap();
            let want = (plain.len() as u64 - target).min(40) as usize;
            let mut got = vec![0u8; want];
            reader.read_exact(&mut got).unwrap();
            prop_assert_eq!(&got[..], &plain[target as usize..target as usize + want]);
        }
    }
}
