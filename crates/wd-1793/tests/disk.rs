//! Sector transfers against synthetic MFM_DISK images.

use emu_core::Tickable;
use wd_1793::mfm::{HEADER_LEN, SIGNATURE, TRACK_LEN};
use wd_1793::{
    CRC_SEED, Operation, STATUS_HEAD_LOADED, STATUS_RECORD_NOT_FOUND, STATUS_RECORD_TYPE,
    STATUS_SEEK_ERROR, Wd1793, crc16_update,
};

const SECTORS_PER_TRACK: u8 = 17;

/// Formats every track with 17 256-byte sectors. Payload bytes encode
/// side, track, sector and position so misplaced reads show up.
fn format_image(sides: u32, tracks: u32) -> Vec<u8> {
    let mut raw = vec![0x4E; HEADER_LEN + (sides * tracks) as usize * TRACK_LEN];
    raw[..HEADER_LEN].fill(0);
    raw[..8].copy_from_slice(SIGNATURE);
    raw[8..12].copy_from_slice(&sides.to_le_bytes());
    raw[12..16].copy_from_slice(&tracks.to_le_bytes());
    raw[16..20].copy_from_slice(&1u32.to_le_bytes());

    for side in 0..sides {
        for track in 0..tracks {
            let mut pos = HEADER_LEN + ((side * tracks + track) as usize) * TRACK_LEN + 40;
            for sector in 1..=SECTORS_PER_TRACK {
                raw[pos..pos + 12].fill(0x00);
                pos += 12;
                raw[pos..pos + 7]
                    .copy_from_slice(&[0xFE, track as u8, side as u8, sector, 1, 0x12, 0x34]);
                pos += 7 + 22;
                raw[pos] = 0xFB;
                pos += 1;
                for i in 0..256 {
                    raw[pos + i] = payload_byte(side as u8, track as u8, sector, i);
                }
                pos += 256;
                raw[pos..pos + 2].copy_from_slice(&[0xC3, 0x3C]);
                pos += 2 + 24;
            }
        }
    }
    raw
}

fn payload_byte(side: u8, track: u8, sector: u8, index: usize) -> u8 {
    (index as u8).wrapping_mul(7) ^ sector.wrapping_mul(31) ^ track.wrapping_mul(3) ^ (side << 7)
}

fn fdc_with(raw: Vec<u8>) -> Wd1793 {
    let mut fdc = Wd1793::new();
    fdc.insert_disk("test.dsk", raw).expect("valid image");
    fdc
}

fn seek(fdc: &mut Wd1793, track: u8) -> u8 {
    fdc.write(3, track);
    fdc.write(0, 0x18);
    fdc.tick_n(20);
    assert!(fdc.intrq());
    fdc.read(0)
}

/// Run a read command, servicing DRQ like a disk ROM would. Returns the
/// bytes read and the status seen after INTRQ.
fn read_transfer(fdc: &mut Wd1793, command: u8) -> (Vec<u8>, u8) {
    fdc.write(0, command);
    let mut bytes = Vec::new();
    for _ in 0..1_000_000 {
        if fdc.drq() {
            bytes.push(fdc.read(3));
        } else if fdc.intrq() {
            return (bytes, fdc.read(0));
        }
        fdc.tick();
    }
    panic!("transfer did not complete");
}

fn write_transfer(fdc: &mut Wd1793, command: u8, data: &[u8]) -> u8 {
    fdc.write(0, command);
    let mut source = data.iter();
    for _ in 0..1_000_000 {
        if fdc.drq() {
            let value = source.next().copied().expect("controller asked for too many bytes");
            fdc.write(3, value);
        } else if fdc.intrq() {
            assert!(source.next().is_none(), "controller stopped early");
            return fdc.read(0);
        }
        fdc.tick();
    }
    panic!("transfer did not complete");
}

#[test]
fn sector_reads_return_image_bytes_then_idle() {
    let raw = format_image(2, 40);
    let mut fdc = fdc_with(raw.clone());
    let d = fdc.disk().expect("disk")
        .sectors(0, 0)
        .iter()
        .find(|s| s.id == 1)
        .expect("sector 1")
        .data_offset;

    fdc.write(2, 1);
    fdc.write(0, 0x80);
    let bytes: Vec<u8> = (0..256).map(|_| fdc.read(3)).collect();
    assert_eq!(bytes, raw[d..d + 256]);

    assert_eq!(fdc.operation(), Operation::Idle);
    assert_eq!(fdc.read(3), raw[d + 255], "data register holds the last byte");
}

#[test]
fn read_sector_with_drq_handshake() {
    let mut fdc = fdc_with(format_image(2, 40));
    assert_eq!(seek(&mut fdc, 5) & STATUS_SEEK_ERROR, 0);
    fdc.write(2, 9);

    let (bytes, status) = read_transfer(&mut fdc, 0x80);
    let expected: Vec<u8> = (0..256).map(|i| payload_byte(0, 5, 9, i)).collect();
    assert_eq!(bytes, expected);
    assert_eq!(status, 0);
}

#[test]
fn side_select_reads_second_side() {
    let mut fdc = fdc_with(format_image(2, 40));
    fdc.set_side(1);
    fdc.write(2, 3);
    let (bytes, _) = read_transfer(&mut fdc, 0x80);
    assert_eq!(bytes[10], payload_byte(1, 0, 3, 10));
}

#[test]
fn deleted_sector_reports_record_type() {
    let mut raw = format_image(1, 2);
    let mut fdc = fdc_with(raw.clone());
    let mark = fdc.disk().expect("disk").sectors(0, 0)[1].data_offset - 1;
    raw[mark] = 0xF8;
    let mut fdc_deleted = fdc_with(raw);

    fdc.write(2, 2);
    fdc_deleted.write(2, 2);
    let (normal, normal_status) = read_transfer(&mut fdc, 0x80);
    let (deleted, deleted_status) = read_transfer(&mut fdc_deleted, 0x80);
    assert_eq!(normal, deleted);
    assert_eq!(normal_status & STATUS_RECORD_TYPE, 0);
    assert_eq!(deleted_status & STATUS_RECORD_TYPE, STATUS_RECORD_TYPE);
}

#[test]
fn missing_sector_fails_without_data_requests() {
    let mut fdc = fdc_with(format_image(1, 40));
    fdc.write(2, 42);
    fdc.write(0, 0x80);

    assert!(fdc.intrq());
    assert!(!fdc.drq());
    assert_eq!(fdc.status(), STATUS_RECORD_NOT_FOUND);
    for _ in 0..2000 {
        fdc.tick();
        assert!(!fdc.drq());
    }
}

#[test]
fn multi_sector_read_runs_to_end_of_track() {
    let mut fdc = fdc_with(format_image(1, 40));
    fdc.write(2, 16);
    let (bytes, status) = read_transfer(&mut fdc, 0x90);

    assert_eq!(bytes.len(), 512);
    assert_eq!(bytes[0], payload_byte(0, 0, 16, 0));
    assert_eq!(bytes[256], payload_byte(0, 0, 17, 0));
    assert_eq!(status, 0);
    assert_eq!(fdc.read(2), 18);
}

#[test]
fn written_sector_reads_back() {
    let mut fdc = fdc_with(format_image(1, 40));
    seek(&mut fdc, 3);
    let data: Vec<u8> = (0..=255).rev().collect();

    fdc.write(2, 4);
    write_transfer(&mut fdc, 0xA0, &data);

    fdc.write(2, 4);
    let (bytes, _) = read_transfer(&mut fdc, 0x80);
    assert_eq!(bytes, data);

    let disk = fdc.disk().expect("disk");
    let sector = disk.sectors(0, 3)[3];
    assert_eq!(sector.id, 4);
    let crc = data.iter().fold(CRC_SEED, |crc, &b| crc16_update(crc, b));
    let end = sector.data_offset + 256;
    assert_eq!(disk.raw()[sector.data_offset - 1], 0xFB);
    assert_eq!(disk.raw()[end], (crc >> 8) as u8);
    assert_eq!(disk.raw()[end + 1], crc as u8);
}

#[test]
fn writing_over_deleted_sector_restores_normal_mark() {
    let mut raw = format_image(1, 1);
    let offset = fdc_with(raw.clone()).disk().expect("disk").sectors(0, 0)[0].data_offset;
    raw[offset - 1] = 0xF8;
    let mut fdc = fdc_with(raw);

    fdc.write(2, 1);
    write_transfer(&mut fdc, 0xA0, &[0x55; 256]);
    fdc.write(2, 1);
    let (_, status) = read_transfer(&mut fdc, 0x80);
    assert_eq!(status & STATUS_RECORD_TYPE, 0);
}

#[test]
fn seek_past_last_track_clamps() {
    let mut fdc = fdc_with(format_image(1, 40));
    let status = seek(&mut fdc, 50);
    assert_eq!(status, STATUS_HEAD_LOADED | STATUS_SEEK_ERROR);
    assert_eq!(fdc.read(1), 39);
    assert_eq!(fdc.current_track(), 39);
}

#[test]
fn disk_image_exposes_writes_for_host() {
    let mut fdc = fdc_with(format_image(1, 1));
    fdc.write(2, 2);
    write_transfer(&mut fdc, 0xA0, &[0xAA; 256]);
    let disk = fdc.eject_disk().expect("disk");
    let offset = disk.sectors(0, 0)[1].data_offset;
    assert!(disk.raw()[offset..offset + 256].iter().all(|&b| b == 0xAA));
}
