//! Intel HEX images: loading them into flash and dumping flash back out

use ihex::Record;

const RECORD_BYTES: usize = 16;

#[derive(Debug)]
pub struct Segment {
    pub address: usize,
    pub data: Vec<u8>,
}

/// Parses an image into contiguous segments.
pub fn segments(hexdata: &[u8]) -> Result<Vec<Segment>, String> {
    let hexstr =
        core::str::from_utf8(hexdata).map_err(|e| format!("Invalid UTF-8 string ({e:?})"))?;

    let mut segments = Vec::<Segment>::new();
    let mut address_base = 0_usize;
    let mut segment_buf = Vec::<u8>::new();
    let mut segment_start = 0_usize;

    for rec in ihex::Reader::new(hexstr) {
        match rec.map_err(|e| format!("Invalid record: {e}"))? {
            Record::Data { offset, mut value } => {
                let addr = address_base + offset as usize;

                if addr != segment_start + segment_buf.len() {
                    if !segment_buf.is_empty() {
                        segments.push(Segment {
                            address: segment_start,
                            data: std::mem::take(&mut segment_buf),
                        });
                    }
                    segment_start = addr;
                }
                segment_buf.append(&mut value);
            }
            Record::EndOfFile => {
                if !segment_buf.is_empty() {
                    segments.push(Segment {
                        address: segment_start,
                        data: segment_buf,
                    });
                }
                return Ok(segments);
            }
            Record::ExtendedSegmentAddress(esa) => {
                address_base = (esa as usize) << 4;
            }
            Record::ExtendedLinearAddress(ela) => {
                address_base = (ela as usize) << 16;
            }
            _ => (),
        }
    }
    Err(String::from("Unexpected end of file"))
}

/// Renders `data`, located at `base`, as an image. Records that would hold only erased bytes
/// are left out.
pub fn dump(base: usize, data: &[u8]) -> Result<String, String> {
    let mut records = Vec::<Record>::new();
    let mut upper = None;

    for (i, chunk) in data.chunks(RECORD_BYTES).enumerate() {
        if chunk.iter().all(|b| *b == 0xff) {
            continue;
        }

        let addr = base + i * RECORD_BYTES;
        let ela = (addr >> 16) as u16;
        if upper != Some(ela) {
            records.push(Record::ExtendedLinearAddress(ela));
            upper = Some(ela);
        }
        records.push(Record::Data {
            offset: addr as u16,
            value: chunk.to_vec(),
        });
    }
    records.push(Record::EndOfFile);

    ihex::create_object_file_representation(&records)
        .map_err(|e| format!("Could not write image ({e:?})"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_adjacent_records() {
        let hex = ":0400000001020304F2\n\
                   :020004000506EF\n\
                   :02002000AABB79\n\
                   :00000001FF\n";
        let segs = segments(hex.as_bytes()).unwrap();

        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].address, 0);
        assert_eq!(segs[0].data, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(segs[1].address, 0x20);
        assert_eq!(segs[1].data, vec![0xaa, 0xbb]);
    }

    #[test]
    fn missing_end_of_file() {
        let hex = ":0400000001020304F2\n";
        assert!(segments(hex.as_bytes()).is_err());
    }

    #[test]
    fn dump_skips_erased_records() {
        let mut flash = vec![0xff; 0x20000];
        flash[0x10..0x14].copy_from_slice(&[1, 2, 3, 4]);
        flash[0x1_0000] = 0x42;

        let hex = dump(0, &flash).unwrap();
        let segs = segments(hex.as_bytes()).unwrap();

        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].address, 0x10);
        assert_eq!(&segs[0].data[..5], &[1, 2, 3, 4, 0xff]);
        assert_eq!(segs[0].data.len(), RECORD_BYTES);
        assert_eq!(segs[1].address, 0x1_0000);
        assert_eq!(segs[1].data[0], 0x42);
    }
}
