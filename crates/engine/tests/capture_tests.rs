//! Copy-before-write capture tests
//!
//! Drives the pre-write / post-write hook pair against a real backing
//! file and inspects the journal and block files it produces.

mod common;

use blocksnap_store::{blocks, journal};
use common::*;
use tempfile::TempDir;

#[test]
fn test_first_write_captures_pre_write_contents() {
    let tmp = TempDir::new().unwrap();
    let svc = service(&tmp);
    let device = make_device(&tmp, "dev.img", 16);

    svc.activate(&device, SECRET).unwrap();
    mount_and_open(&svc, &device);
    let dir = svc
        .find_device(&device)
        .unwrap()
        .capture_state()
        .unwrap()
        .dir
        .clone();

    // Overwrite block 5 twice in the same session.
    let pending = svc.notify_write_begin(&device, 5 * BS as u64, BS as u64);
    write_at(&device, 5 * BS as u64, &[0xAA; BS as usize]);
    svc.notify_write_end(pending, true, false);

    let pending = svc.notify_write_begin(&device, 5 * BS as u64, BS as u64);
    write_at(&device, 5 * BS as u64, &[0xBB; BS as usize]);
    svc.notify_write_end(pending, true, false);

    drain_device(&svc, &device);

    // Block 5 appears exactly once, and the block file holds the
    // pre-first-write contents (the fixture fills block 5 with 5s).
    let contents = journal::read(&dir).unwrap();
    assert_eq!(contents.blocks, vec![5]);
    let saved = blocks::read_block(&dir, 5).unwrap();
    assert_eq!(saved.len(), BS as usize);
    assert!(saved.iter().all(|&b| b == 5));
    svc.shutdown();
}

#[test]
fn test_multi_block_write_captures_each_block() {
    let tmp = TempDir::new().unwrap();
    let svc = service(&tmp);
    let device = make_device(&tmp, "dev.img", 16);

    svc.activate(&device, SECRET).unwrap();
    mount_and_open(&svc, &device);
    let dir = svc
        .find_device(&device)
        .unwrap()
        .capture_state()
        .unwrap()
        .dir
        .clone();

    // A write spanning blocks 2..=4.
    let offset = 2 * BS as u64 + 10;
    let len = 2 * BS as u64;
    let pending = svc.notify_write_begin(&device, offset, len);
    write_at(&device, offset, &vec![0xCC; len as usize]);
    svc.notify_write_end(pending, true, false);
    drain_device(&svc, &device);

    let contents = journal::read(&dir).unwrap();
    assert_eq!(contents.blocks, vec![2, 3, 4]);
    for block in [2u64, 3, 4] {
        let saved = blocks::read_block(&dir, block).unwrap();
        assert!(saved.iter().all(|&b| b == block as u8));
    }
    svc.shutdown();
}

#[test]
fn test_failed_write_captures_nothing() {
    let tmp = TempDir::new().unwrap();
    let svc = service(&tmp);
    let device = make_device(&tmp, "dev.img", 16);

    svc.activate(&device, SECRET).unwrap();
    mount_and_open(&svc, &device);
    let dir = svc
        .find_device(&device)
        .unwrap()
        .capture_state()
        .unwrap()
        .dir
        .clone();

    let pending = svc.notify_write_begin(&device, 0, BS as u64);
    // The write never happened.
    svc.notify_write_end(pending, false, false);
    drain_device(&svc, &device);

    assert!(journal::read(&dir).unwrap().blocks.is_empty());

    // The block is still capturable by a later successful write.
    let pending = svc.notify_write_begin(&device, 0, BS as u64);
    write_at(&device, 0, &[0xDD; BS as usize]);
    svc.notify_write_end(pending, true, false);
    drain_device(&svc, &device);
    assert_eq!(journal::read(&dir).unwrap().blocks, vec![0]);
    svc.shutdown();
}

#[test]
fn test_pure_append_is_not_captured() {
    let tmp = TempDir::new().unwrap();
    let svc = service(&tmp);
    let device = make_device(&tmp, "dev.img", 4);

    svc.activate(&device, SECRET).unwrap();
    mount_and_open(&svc, &device);
    let dir = svc
        .find_device(&device)
        .unwrap()
        .capture_state()
        .unwrap()
        .dir
        .clone();

    // Write entirely beyond the current end of file.
    let offset = 4 * BS as u64;
    let pending = svc.notify_write_begin(&device, offset, BS as u64);
    assert_eq!(pending.len(), 1);
    assert!(pending[0].is_append_only());
    write_at(&device, offset, &[0xEE; BS as usize]);
    svc.notify_write_end(pending, true, true);
    drain_device(&svc, &device);

    assert!(journal::read(&dir).unwrap().blocks.is_empty());
    svc.shutdown();
}

#[test]
fn test_write_without_open_session_is_skipped() {
    let tmp = TempDir::new().unwrap();
    let svc = service(&tmp);
    let device = make_device(&tmp, "dev.img", 16);

    // Registered but never mounted: no capture state to consult.
    svc.activate(&device, SECRET).unwrap();
    let pending = svc.notify_write_begin(&device, 0, BS as u64);
    assert!(pending.is_empty());
    svc.shutdown();
}

#[test]
fn test_capture_after_unmount_is_empty() {
    let tmp = TempDir::new().unwrap();
    let svc = service(&tmp);
    let device = make_device(&tmp, "dev.img", 16);

    svc.activate(&device, SECRET).unwrap();
    mount_and_open(&svc, &device);
    svc.notify_unmount(&device).unwrap();
    drain_device(&svc, &device);

    assert!(svc.notify_write_begin(&device, 0, BS as u64).is_empty());
    svc.shutdown();
}
