use std::sync::Arc;

use anyhow::Result;
use osd_initiator_rs::{
    client::{device::OsdDevice, loopback::LoopbackTarget},
    control_block::cdb::ReqOptions,
    models::common::ObjId,
    security::capability::{Capability, SecurityMethod},
    state_machine::{completed::CompletedRequest, encoded::EncodedRequest},
};

pub const KEY: [u8; 20] = [
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d,
    0x0e, 0x0f, 0x10, 0x11, 0x12, 0x13,
];

pub const PARTITION: u64 = 0x10000;

pub fn cap(obj: &ObjId) -> [u8; 80] {
    *Capability::new(SecurityMethod::CapKey, obj).as_bytes()
}

pub fn device(target: &LoopbackTarget) -> OsdDevice {
    OsdDevice::new(Arc::new(target.clone()))
}

/// Keyed target with one partition.
pub fn keyed_target() -> LoopbackTarget {
    let target = LoopbackTarget::with_key(KEY);
    target.add_partition(PARTITION);
    target
}

/// Finalize with the test key and execute synchronously.
pub fn run(req: EncodedRequest) -> Result<CompletedRequest> {
    Ok(req
        .finalize(ReqOptions::empty(), &cap(&ObjId::ROOT), Some(&KEY[..]))?
        .execute()?)
}

/// Run, require GOOD, release.
pub fn run_ok(req: EncodedRequest) -> Result<()> {
    run(req)?.check()?.release()?;
    Ok(())
}

pub fn create_objects(dev: &OsdDevice, partition: u64, ids: &[u64]) -> Result<()> {
    for &id in ids {
        run_ok(dev.start_request().create_object(&ObjId::new(partition, id)))?;
    }
    Ok(())
}
