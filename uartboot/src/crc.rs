//! CRC-16/CCITT (polynomial 0x1021) as used on the wire.
//!
//! The register is fed bit-serially without augmentation, so after a message it holds the
//! plain remainder of the message polynomial. Feeding two more zero bytes gives the familiar
//! CRC-16/XMODEM value of the message.
//!
//! Multi-byte helpers feed the low byte first, matching wire order.

const POLY: u32 = 0x1021;

pub const fn update(crc: u16, data: u8) -> u16 {
    let mut crc = crc as u32;
    let mut input = data as u32 | 0x100;

    loop {
        crc <<= 1;
        input <<= 1;
        if input & 0x100 != 0 {
            crc += 1;
        }
        if crc & 0x1_0000 != 0 {
            crc ^= 0x1_0000 | POLY;
        }
        if input & 0x1_0000 != 0 {
            break;
        }
    }

    crc as u16
}

pub const fn update_u16(crc: u16, data: u16) -> u16 {
    let [b0, b1] = data.to_le_bytes();
    update(update(crc, b0), b1)
}

pub const fn update_u32(crc: u16, data: u32) -> u16 {
    let [b0, b1, b2, b3] = data.to_le_bytes();
    update(update(update(update(crc, b0), b1), b2), b3)
}

pub fn update_slice(crc: u16, data: &[u8]) -> u16 {
    data.iter().fold(crc, |crc, b| update(crc, *b))
}

#[cfg(test)]
mod tests {
    use super::*;

    const XMODEM: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_XMODEM);

    fn remainder_then_xmodem(data: &[u8]) -> u16 {
        update_slice(update_slice(0, data), &[0, 0])
    }

    #[test]
    fn zero_register_stays_zero_on_zero_data() {
        assert_eq!(update(0, 0), 0);
        assert_eq!(update_u32(0, 0), 0);
    }

    #[test]
    fn single_byte_is_plain_remainder() {
        // Below the degree of the polynomial the remainder is the data itself.
        assert_eq!(update(0, 0x35), 0x0035);
        assert_eq!(update(0x0035, 0xca), 0x35ca);
    }

    #[test]
    fn augmented_register_matches_xmodem() {
        assert_eq!(remainder_then_xmodem(b"123456789"), 0x31c3);
        assert_eq!(
            remainder_then_xmodem(b"123456789"),
            XMODEM.checksum(b"123456789")
        );

        let header = [0x35, 0xca, 0x00, 0x00];
        assert_eq!(remainder_then_xmodem(&header), XMODEM.checksum(&header));

        let page: std::vec::Vec<u8> = (0..1024u32).map(|i| (i * 7 + 3) as u8).collect();
        assert_eq!(remainder_then_xmodem(&page), XMODEM.checksum(&page));
    }

    #[test]
    fn word_helpers_feed_little_endian_bytes() {
        let mut seed: u32 = 0x1234_5678;
        let mut acc: u16 = 0xffff;
        for _ in 0..4096 {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);

            let bytes = seed.to_le_bytes();
            assert_eq!(update_u32(acc, seed), update_slice(acc, &bytes));

            let half = (seed >> 7) as u16;
            assert_eq!(update_u16(acc, half), update_slice(acc, &half.to_le_bytes()));

            acc = update_u32(acc, seed);
        }
    }
}
