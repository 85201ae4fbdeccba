//! End-to-end tests over image tapes: write a tape with the archive writer,
//! read it back with the scanner, and compare.

use std::io::Cursor;

use tempfile::TempDir;

use dumptar_format::archive::{
    DumpDate, DumpKind, DumpScanner, DumpWriter, FileLabel, VolumeHeader,
};
use dumptar_format::{ImageStyle, ItsName, PhysicalFormat, TapeOpen};

fn header() -> VolumeHeader {
    VolumeHeader {
        tape: 1,
        reel: 0,
        created: "830615".to_string(),
        kind: DumpKind::Random,
    }
}

fn file_label(ufd: &str, fn1: &str, fn2: &str) -> FileLabel {
    FileLabel {
        name: ItsName::new(ufd, fn1, fn2),
        is_link: false,
        creation: Some(DumpDate {
            year: 83,
            month: 6,
            day: 15,
            hour: 12,
            minute: 30,
            second: 0,
        }),
        reference: None,
    }
}

fn write_tape(path: &str, style: ImageStyle, format: PhysicalFormat, big: &[u8]) {
    let session = TapeOpen::new()
        .create(true)
        .writable(true)
        .style(style)
        .open(Some(path))
        .unwrap();
    let mut writer = DumpWriter::create(session, format, &header()).unwrap();

    writer
        .append_file(
            &file_label("SYSENG", "NOTE", "TXT"),
            &mut Cursor::new(b"Moon is made of green cheese.".to_vec()),
        )
        .unwrap();
    writer
        .append_file(&file_label("SYSENG", "BIG", "TXT"), &mut Cursor::new(big))
        .unwrap();

    let link = FileLabel {
        name: ItsName::new("SYS", "ATSIGN", "TCP"),
        is_link: true,
        creation: None,
        reference: None,
    };
    writer
        .append_link(&link, &ItsName::new("SYSENG", "NOTE", "TXT"))
        .unwrap();

    writer.finish().unwrap().close().unwrap();
}

fn check_tape(path: &str, style: ImageStyle, format: PhysicalFormat, big: &[u8]) {
    let session = TapeOpen::new().style(style).open(Some(path)).unwrap();
    let mut scanner = DumpScanner::open(session, format).unwrap();
    assert_eq!(scanner.header(), &header());

    let entry = scanner.next_entry().unwrap().unwrap();
    assert_eq!(entry.name, ItsName::new("SYSENG", "NOTE", "TXT"));
    assert!(!entry.is_link);
    assert_eq!(
        entry.creation,
        Some(DumpDate {
            year: 83,
            month: 6,
            day: 15,
            hour: 12,
            minute: 30,
            second: 0,
        })
    );
    assert_eq!(entry.reference, None);
    let mut contents = Vec::new();
    scanner.extract_to(&mut contents).unwrap();
    assert_eq!(contents, b"Moon is made of green cheese.".to_vec());

    let entry = scanner.next_entry().unwrap().unwrap();
    assert_eq!(entry.name, ItsName::new("SYSENG", "BIG", "TXT"));
    let mut contents = Vec::new();
    scanner.extract_to(&mut contents).unwrap();
    assert_eq!(contents, big);

    let entry = scanner.next_entry().unwrap().unwrap();
    assert_eq!(entry.name, ItsName::new("SYS", "ATSIGN", "TCP"));
    assert!(entry.is_link);
    let target = scanner.read_link().unwrap();
    assert_eq!(target, ItsName::new("SYSENG", "NOTE", "TXT"));

    assert!(scanner.next_entry().unwrap().is_none());
}

/// Long enough to span several tape records.
fn big_contents() -> Vec<u8> {
    b"All work and no play makes Jack a dull boy.\n".repeat(300)
}

#[test]
fn simh_core_dump_round_trip() {
    let dir = TempDir::new().unwrap();
    let tape = dir.path().join("backup.tap");
    let tape = tape.to_str().unwrap();
    let big = big_contents();

    write_tape(tape, ImageStyle::Simh, PhysicalFormat::CoreDump, &big);
    check_tape(tape, ImageStyle::Simh, PhysicalFormat::CoreDump, &big);
}

#[test]
fn e11_seven_track_round_trip() {
    let dir = TempDir::new().unwrap();
    let tape = dir.path().join("backup.e11");
    let tape = tape.to_str().unwrap();
    let big = big_contents();

    write_tape(tape, ImageStyle::E11, PhysicalFormat::SevenTrack, &big);
    check_tape(tape, ImageStyle::E11, PhysicalFormat::SevenTrack, &big);
}

#[test]
fn entries_can_be_skipped_without_extraction() {
    let dir = TempDir::new().unwrap();
    let tape = dir.path().join("skip.tap");
    let tape = tape.to_str().unwrap();
    let big = big_contents();

    write_tape(tape, ImageStyle::Simh, PhysicalFormat::CoreDump, &big);

    let session = TapeOpen::new().open(Some(tape)).unwrap();
    let mut scanner = DumpScanner::open(session, PhysicalFormat::CoreDump).unwrap();
    let mut names = Vec::new();
    while let Some(entry) = scanner.next_entry().unwrap() {
        names.push(entry.name.to_string());
    }
    assert_eq!(
        names,
        vec!["SYSENG;NOTE TXT", "SYSENG;BIG TXT", "SYS;ATSIGN TCP"]
    );
}

#[test]
fn append_extends_an_existing_tape() {
    let dir = TempDir::new().unwrap();
    let tape = dir.path().join("append.tap");
    let tape = tape.to_str().unwrap();
    let big = big_contents();

    write_tape(tape, ImageStyle::Simh, PhysicalFormat::CoreDump, &big);

    {
        let session = TapeOpen::new().writable(true).open(Some(tape)).unwrap();
        let mut writer = DumpWriter::append(session, PhysicalFormat::CoreDump).unwrap();
        writer
            .append_file(
                &file_label("USERS", "LATE", "FILE"),
                &mut Cursor::new(b"appended after the fact".to_vec()),
            )
            .unwrap();
        writer.finish().unwrap().close().unwrap();
    }

    let session = TapeOpen::new().open(Some(tape)).unwrap();
    let mut scanner = DumpScanner::open(session, PhysicalFormat::CoreDump).unwrap();
    let mut last = None;
    while let Some(entry) = scanner.next_entry().unwrap() {
        last = Some(entry);
    }
    let last = last.unwrap();
    assert_eq!(last.name, ItsName::new("USERS", "LATE", "FILE"));
}
