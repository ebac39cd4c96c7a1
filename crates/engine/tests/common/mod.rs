//! Shared fixtures for engine integration tests

// Each test binary pulls in the subset of helpers it needs.
#![allow(dead_code)]

use std::fs;
use std::io::{Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};

use blocksnap_core::{CredentialVerifier, Result};
use blocksnap_engine::{Config, SnapshotService};
use tempfile::TempDir;

/// Secret installed by [`service`]
pub const SECRET: &str = "hunter2abc1";

/// Block size used by all integration fixtures
pub const BS: u32 = 64;

/// Plain-comparison verifier; production implementations hash.
#[derive(Default)]
pub struct StaticVerifier {
    secret: Mutex<Option<String>>,
}

impl CredentialVerifier for StaticVerifier {
    fn set_secret(&self, secret: &str) -> Result<()> {
        *self.secret.lock().unwrap() = Some(secret.to_string());
        Ok(())
    }

    fn verify(&self, secret: &str) -> bool {
        self.secret.lock().unwrap().as_deref() == Some(secret)
    }
}

/// Service rooted in the temp dir, with [`SECRET`] installed.
pub fn service(tmp: &TempDir) -> SnapshotService {
    let svc = SnapshotService::new(
        Config {
            snapshot_root: tmp.path().join("snaps"),
            queue_depth: 256,
            block_size: Some(BS),
        },
        Arc::new(StaticVerifier::default()),
    )
    .unwrap();
    svc.set_credential(SECRET).unwrap();
    svc
}

/// Create a backing file of `blocks` blocks, each filled with its own
/// block number, and return its absolute path.
pub fn make_device(tmp: &TempDir, name: &str, blocks: usize) -> String {
    let path = tmp.path().join(name);
    let mut data = vec![0u8; blocks * BS as usize];
    for (i, byte) in data.iter_mut().enumerate() {
        *byte = (i / BS as usize) as u8;
    }
    fs::write(&path, data).unwrap();
    path.to_str().unwrap().to_string()
}

/// Overwrite `data` at `offset` in the backing file.
pub fn write_at(path: &str, offset: u64, data: &[u8]) {
    let mut file = fs::OpenOptions::new().write(true).open(path).unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(data).unwrap();
}

/// Wait until the device's queue has executed everything submitted so
/// far (deferred session open, captures, session close).
pub fn drain_device(svc: &SnapshotService, device: &str) {
    if let Some(dev) = svc.find_device(device) {
        dev.queue().drain();
    }
}

/// Mount and wait for the session to open.
pub fn mount_and_open(svc: &SnapshotService, device: &str) {
    svc.notify_mount(device).unwrap();
    drain_device(svc, device);
    assert!(svc
        .find_device(device)
        .unwrap()
        .capture_state()
        .is_some());
}
