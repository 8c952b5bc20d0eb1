use anyhow::{Result, bail};
use bytes::{Bytes, BytesMut};
use osd_initiator_rs::{
    client::loopback::LoopbackTarget,
    control_block::{cdb::ReqOptions, service_action::ServiceAction},
    error::OsdError,
    models::{common::ObjId, sense_data::ErrorPriority},
    security::{SecurityMode, capability::SecurityMethod},
    state_machine::common::RequestState,
};

use super::common::{
    KEY, PARTITION, cap, create_objects, device, keyed_target, run, run_ok,
};

#[test]
fn test_create_object_signed() -> Result<()> {
    let target = LoopbackTarget::with_key(KEY);
    target.add_partition(1);
    let dev = device(&target);
    let obj = ObjId::new(1, 100);

    let finalized = dev
        .start_request()
        .create_object(&obj)
        .finalize(ReqOptions::empty(), &cap(&obj), Some(&KEY[..]))?;
    assert_eq!(finalized.security_mode(), SecurityMode::CapKey);
    assert_eq!(finalized.state(), RequestState::Finalized);
    assert_eq!(finalized.cdb().service_action(), Some(ServiceAction::Create));
    assert_eq!(finalized.cdb().capability[2], SecurityMethod::CapKey as u8);
    assert_ne!(finalized.cdb().integrity_check_value, [0; 20]);

    let done = finalized.execute()?;
    done.result()?;
    assert!(done.sense_bytes().is_empty());
    assert!(!done.decode_sense().available);
    assert_eq!(done.priority(), ErrorPriority::NoError);
    assert!(target.contains(&obj));

    let released = done.release()?;
    assert!(released.data_in.is_none());
    assert_eq!(
        released.history,
        vec![
            RequestState::Built,
            RequestState::Finalized,
            RequestState::Executing,
            RequestState::Completed,
            RequestState::Released,
        ]
    );
    Ok(())
}

#[test]
fn test_nosec_without_key() -> Result<()> {
    let target = LoopbackTarget::new();
    let dev = device(&target);

    let finalized = dev
        .start_request()
        .create_partition(PARTITION)
        .finalize(ReqOptions::empty(), &cap(&ObjId::ROOT), None)?;
    assert_eq!(finalized.security_mode(), SecurityMode::NoSec);
    assert_eq!(finalized.cdb().capability[2], SecurityMethod::NoSec as u8);
    assert_eq!(finalized.cdb().integrity_check_value, [0; 20]);

    finalized.execute()?.check()?;
    assert!(target.contains(&ObjId::partition(PARTITION)));
    Ok(())
}

#[test]
fn test_wrong_key_is_bad_credentials() -> Result<()> {
    let target = keyed_target();
    let dev = device(&target);
    let obj = ObjId::new(PARTITION, 0x10000);

    let done = dev
        .start_request()
        .create_object(&obj)
        .finalize(ReqOptions::empty(), &cap(&obj), Some(&[0xEE; 20][..]))?
        .execute()?;
    assert!(matches!(done.result(), Err(OsdError::Target { .. })));
    assert_eq!(done.priority(), ErrorPriority::BadCredentials);
    assert!(!target.contains(&obj));

    let unsigned = dev
        .start_request()
        .create_object(&obj)
        .finalize(ReqOptions::empty(), &cap(&obj), None)?
        .execute()?;
    assert_eq!(unsigned.priority(), ErrorPriority::BadCredentials);
    Ok(())
}

#[test]
fn test_bad_credentials_fail_before_submission() -> Result<()> {
    let target = keyed_target();
    let dev = device(&target);
    let obj = ObjId::new(PARTITION, 0x10000);

    let short_cap = dev
        .start_request()
        .create_object(&obj)
        .finalize(ReqOptions::empty(), &[0u8; 79], Some(&KEY[..]))
        .map_err(OsdError::from);
    assert!(matches!(short_cap, Err(OsdError::SigningFailure(_))));

    let short_key = dev
        .start_request()
        .create_object(&obj)
        .finalize(ReqOptions::empty(), &cap(&obj), Some(&KEY[..16]))
        .map_err(OsdError::from);
    assert!(matches!(short_key, Err(OsdError::SigningFailure(_))));

    assert_eq!(target.command_count(), 0);
    Ok(())
}

#[test]
fn test_failed_finalize_returns_the_request() -> Result<()> {
    let target = keyed_target();
    let dev = device(&target);
    let obj = ObjId::new(PARTITION, 0x10000);
    create_objects(&dev, PARTITION, &[obj.id])?;
    run_ok(dev.start_request().write(&obj, Bytes::from_static(b"payload"), 0))?;

    let mut buf = BytesMut::zeroed(7);
    buf[0] = 0xAA;
    let rejected = dev
        .start_request()
        .read(&obj, buf, 0)
        .finalize(ReqOptions::empty(), &cap(&obj), Some(&KEY[..19]));
    let Err(rejected) = rejected else {
        bail!("a 19-byte key must be rejected");
    };
    assert!(matches!(rejected.error(), OsdError::SigningFailure(_)));

    // the same request finalizes once the key is right
    let (_, req) = rejected.into_parts();
    assert_eq!(req.state(), RequestState::Built);
    let done = req
        .finalize(ReqOptions::empty(), &cap(&obj), Some(&KEY[..]))?
        .execute()?
        .check()?;
    assert_eq!(done.data_in(), b"payload");

    // or is dropped and the caller's buffer comes back untouched
    let mut buf = BytesMut::zeroed(16);
    buf[0] = 0xBB;
    let rejected = dev
        .start_request()
        .read(&obj, buf, 0)
        .finalize(ReqOptions::empty(), &[0u8; 10], None);
    let Err(rejected) = rejected else {
        bail!("a short capability must be rejected");
    };
    let released = rejected.into_request().release();
    let buf = released.data_in.unwrap_or_default();
    assert_eq!(buf.len(), 16);
    assert_eq!(buf[0], 0xBB);
    assert_eq!(released.history, vec![RequestState::Built]);
    assert_eq!(target.command_count(), 3);
    Ok(())
}

#[test]
fn test_options_and_defaults() -> Result<()> {
    let target = keyed_target();
    let dev = device(&target);
    let obj = ObjId::new(PARTITION, 0x10000);

    let req = dev
        .start_request()
        .with_retries(5)
        .with_timeout(std::time::Duration::from_secs(3));
    assert_eq!(req.retries(), 5);
    assert_eq!(req.timeout().as_secs(), 3);
    assert_eq!(
        dev.start_request().timeout(),
        dev.default_timeout(),
        "with_* must not leak into the device"
    );

    let opts = ReqOptions::FUA | ReqOptions::DPO | ReqOptions::BYPASS_TIMESTAMPS;
    let finalized = req
        .create_object(&obj)
        .finalize(opts, &cap(&obj), Some(&KEY[..]))?;
    assert_eq!(finalized.cdb().req_options(), opts);
    finalized.execute()?.check()?;
    Ok(())
}

#[test]
fn test_partition_lifecycle() -> Result<()> {
    let target = LoopbackTarget::with_key(KEY);
    let dev = device(&target);

    run_ok(dev.start_request().format(1 << 30))?;
    assert_eq!(target.capacity(), 1 << 30);

    run_ok(dev.start_request().create_partition(PARTITION))?;
    let again = run(dev.start_request().create_partition(PARTITION))?;
    assert!(again.result().is_err());

    let obj = ObjId::new(PARTITION, 0x10001);
    run_ok(dev.start_request().create_object(&obj))?;

    let busy = run(dev.start_request().remove_partition(PARTITION))?;
    let Err(OsdError::Target { sense, .. }) = busy.result() else {
        anyhow::bail!("removing a non-empty partition must fail");
    };
    assert_eq!(sense.additional_code(), 0x2C0A);

    run_ok(dev.start_request().remove_object(&obj))?;
    run_ok(dev.start_request().remove_partition(PARTITION))?;
    assert!(!target.contains(&ObjId::partition(PARTITION)));
    Ok(())
}

#[test]
fn test_flush_variants() -> Result<()> {
    use osd_initiator_rs::control_block::cdb::FlushScope;

    let target = keyed_target();
    let dev = device(&target);
    let obj = ObjId::new(PARTITION, 0x10000);
    run_ok(dev.start_request().create_object(&obj))?;

    run_ok(dev.start_request().flush_object(&obj, FlushScope::RANGE, 0, 512))?;
    run_ok(dev.start_request().flush_partition(PARTITION, FlushScope::All))?;
    run_ok(dev.start_request().flush_obsd(FlushScope::AttributesOnly))?;

    let missing = run(
        dev.start_request()
            .flush_collection(&ObjId::new(PARTITION, 0x20000), FlushScope::All),
    )?;
    assert_eq!(missing.priority(), ErrorPriority::NotFound);
    Ok(())
}
