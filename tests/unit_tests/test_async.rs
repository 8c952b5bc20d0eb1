use std::{thread, time::Duration};

use anyhow::{Result, bail};
use bytes::{Bytes, BytesMut};
use osd_initiator_rs::{
    control_block::cdb::ReqOptions,
    error::OsdError,
    models::{common::ObjId, sense_data::ErrorPriority},
    state_machine::{common::RequestState, execute::PendingRequest},
};

use super::common::{KEY, PARTITION, cap, create_objects, device, keyed_target};

fn poll_until_done(pending: &mut PendingRequest) -> Result<()> {
    for _ in 0..500 {
        if let Some(done) = pending.try_complete()? {
            done.check()?;
            return Ok(());
        }
        thread::sleep(Duration::from_millis(2));
    }
    bail!("completion never arrived")
}

#[tokio::test]
async fn test_async_write_then_read() -> Result<()> {
    let target = keyed_target();
    let dev = device(&target);
    let obj = ObjId::new(PARTITION, 0x10000);
    create_objects(&dev, PARTITION, &[obj.id])?;

    let data = Bytes::from(vec![0xA5u8; 2048]);
    let pending = dev
        .start_request()
        .write(&obj, data.clone(), 0)
        .finalize(ReqOptions::empty(), &cap(&obj), Some(&KEY[..]))?
        .execute_async()?;
    pending.wait().await?.check()?;

    let pending = dev
        .start_request()
        .read(&obj, BytesMut::zeroed(2048), 0)
        .finalize(ReqOptions::empty(), &cap(&obj), Some(&KEY[..]))?
        .execute_async()?;
    let done = pending.wait().await?;
    done.result()?;
    assert_eq!(done.data_in(), &data[..]);
    Ok(())
}

#[test]
fn test_wait_blocking_from_another_thread() -> Result<()> {
    let target = keyed_target();
    let dev = device(&target);
    let obj = ObjId::new(PARTITION, 0x10000);

    let pending = dev
        .start_request()
        .create_object(&obj)
        .finalize(ReqOptions::empty(), &cap(&obj), Some(&KEY[..]))?
        .execute_async()?;
    let handle = thread::spawn(move || pending.wait_blocking());
    let Ok(done) = handle.join() else {
        bail!("waiter panicked");
    };
    let done = done?;
    done.result()?;
    assert!(target.contains(&obj));
    assert_eq!(done.history().last(), Some(&RequestState::Completed));
    Ok(())
}

#[tokio::test]
async fn test_wait_blocking_inside_runtime_rejected() -> Result<()> {
    let target = keyed_target();
    let dev = device(&target);
    let obj = ObjId::new(PARTITION, 0x10000);
    target.hold_completions(true);

    let pending = dev
        .start_request()
        .create_object(&obj)
        .finalize(ReqOptions::empty(), &cap(&obj), Some(&KEY[..]))?
        .execute_async()?;
    assert!(matches!(
        pending.wait_blocking(),
        Err(OsdError::InvalidSequence(_))
    ));
    assert_eq!(target.release_held(), 1);
    Ok(())
}

#[test]
fn test_try_complete_twice() -> Result<()> {
    let target = keyed_target();
    let dev = device(&target);
    let obj = ObjId::new(PARTITION, 0x10000);

    let mut pending = dev
        .start_request()
        .create_object(&obj)
        .finalize(ReqOptions::empty(), &cap(&obj), Some(&KEY[..]))?
        .execute_async()?;
    poll_until_done(&mut pending)?;
    assert!(matches!(
        pending.try_complete(),
        Err(OsdError::InvalidSequence(_))
    ));
    assert!(matches!(pending.release(), Err(OsdError::InvalidSequence(_))));
    Ok(())
}

#[test]
fn test_release_in_flight() -> Result<()> {
    let target = keyed_target();
    let dev = device(&target);
    let obj = ObjId::new(PARTITION, 0x10000);
    target.hold_completions(true);

    let mut pending = dev
        .start_request()
        .create_object(&obj)
        .finalize(ReqOptions::empty(), &cap(&obj), Some(&KEY[..]))?
        .execute_async()?;
    assert!(matches!(pending.try_complete(), Ok(None)));
    assert!(matches!(pending.release(), Err(OsdError::InvalidSequence(_))));

    // the failed release changed nothing
    assert_eq!(target.release_held(), 1);
    let done = pending.wait_blocking()?;
    done.result()?;
    let released = done.release()?;
    assert_eq!(released.history.last(), Some(&RequestState::Released));
    Ok(())
}

#[test]
fn test_transport_failure_is_recorded() -> Result<()> {
    let target = keyed_target();
    let dev = device(&target);
    let obj = ObjId::new(PARTITION, 0x10000);
    target.set_offline(true);

    let done = dev
        .start_request()
        .create_object(&obj)
        .finalize(ReqOptions::empty(), &cap(&obj), Some(&KEY[..]))?
        .execute()?;
    assert!(matches!(done.result(), Err(OsdError::Transport(_))));
    assert_eq!(done.status(), None);
    assert_eq!(done.priority(), ErrorPriority::Unreachable);

    let pending = dev
        .start_request()
        .create_object(&obj)
        .finalize(ReqOptions::empty(), &cap(&obj), Some(&KEY[..]))?
        .execute_async()?;
    let done = pending.wait_blocking()?;
    assert!(matches!(done.check(), Err(OsdError::Transport(_))));
    assert_eq!(target.command_count(), 0);
    Ok(())
}
