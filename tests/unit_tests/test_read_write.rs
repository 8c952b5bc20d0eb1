use anyhow::{Result, bail};
use bytes::{Bytes, BytesMut};
use osd_initiator_rs::{
    error::OsdError,
    models::{
        attr::{ATTR_OI_LOGICAL_LENGTH, ATTR_PAGE_OBJECT_INFO, AttrCursor, OsdAttr},
        common::ObjId,
        sense_data::ErrorPriority,
    },
};

use super::common::{PARTITION, create_objects, device, keyed_target, run, run_ok};

fn pattern(len: usize) -> Bytes {
    (0..len).map(|i| (i * 7 % 251) as u8).collect::<Vec<_>>().into()
}

#[test]
fn test_write_then_read_back() -> Result<()> {
    let target = keyed_target();
    let dev = device(&target);
    let obj = ObjId::new(PARTITION, 0x10000);
    create_objects(&dev, PARTITION, &[obj.id])?;

    let data = pattern(4096);
    let write = dev.start_request().write(&obj, data.clone(), 0);
    let done = run(write)?;
    done.result()?;
    assert!(done.data_in().is_empty());
    done.release()?;

    let done = run(dev.start_request().read(&obj, BytesMut::zeroed(4096), 0))?;
    done.result()?;
    assert_eq!(done.data_in(), &data[..]);

    let released = done.release()?;
    let Some(buf) = released.data_in else {
        bail!("read buffer must be handed back");
    };
    assert_eq!(&buf[..], &data[..]);
    Ok(())
}

#[test]
fn test_partial_write_and_offset_read() -> Result<()> {
    let target = keyed_target();
    let dev = device(&target);
    let obj = ObjId::new(PARTITION, 0x10000);
    create_objects(&dev, PARTITION, &[obj.id])?;

    run_ok(dev.start_request().write(&obj, pattern(1024), 0))?;
    run_ok(
        dev.start_request()
            .write(&obj, Bytes::from_static(b"OSD!"), 512),
    )?;

    let done = run(dev.start_request().read(&obj, BytesMut::zeroed(8), 510))?;
    done.result()?;
    let expected = pattern(1024);
    assert_eq!(&done.data_in()[..2], &expected[510..512]);
    assert_eq!(&done.data_in()[2..6], b"OSD!");
    assert_eq!(&done.data_in()[6..], &expected[516..518]);
    Ok(())
}

#[test]
fn test_read_past_end_zero_fills() -> Result<()> {
    let target = keyed_target();
    let dev = device(&target);
    let obj = ObjId::new(PARTITION, 0x10000);
    create_objects(&dev, PARTITION, &[obj.id])?;
    run_ok(dev.start_request().write(&obj, pattern(100), 0))?;

    let done = run(dev.start_request().read(&obj, BytesMut::zeroed(200), 0))?;
    assert!(matches!(done.result(), Err(OsdError::Target { .. })));
    assert_eq!(done.priority(), ErrorPriority::ClearPages);
    assert_eq!(&done.data_in()[..100], &pattern(100)[..]);
    assert!(done.data_in()[100..].iter().all(|&b| b == 0));
    Ok(())
}

#[test]
fn test_read_missing_object() -> Result<()> {
    let target = keyed_target();
    let dev = device(&target);
    let obj = ObjId::new(PARTITION, 0x10042);

    let done = run(dev.start_request().read(&obj, BytesMut::zeroed(16), 0))?;
    assert_eq!(done.priority(), ErrorPriority::NotFound);
    assert_eq!(done.decode_sense().obj, Some(obj));
    // the caller buffer comes back even on failure
    assert!(done.release()?.data_in.is_some());
    Ok(())
}

#[test]
fn test_read_with_logical_length() -> Result<()> {
    let target = keyed_target();
    let dev = device(&target);
    let obj = ObjId::new(PARTITION, 0x10000);
    create_objects(&dev, PARTITION, &[obj.id])?;
    run_ok(dev.start_request().write(&obj, pattern(3000), 0))?;

    // 1000 is not an encodable offset, so the retrieved list is padded to 1024
    let mut req = dev.start_request().read(&obj, BytesMut::zeroed(1000), 0);
    req.add_get_attr_list(&[OsdAttr::request(
        ATTR_PAGE_OBJECT_INFO,
        ATTR_OI_LOGICAL_LENGTH,
        8,
    )])?;
    let done = run(req)?;
    done.result()?;
    assert_eq!(done.data_in(), &pattern(3000)[..1000]);

    let mut cursor = AttrCursor::new();
    let attrs = done.decode_get_attr_list(&mut cursor, 8)?;
    assert_eq!(attrs.len(), 1);
    assert_eq!(attrs[0].as_u64(), Some(3000));
    assert!(cursor.is_done());
    Ok(())
}
