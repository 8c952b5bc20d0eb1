use std::sync::Arc;

use anyhow::{Result, bail};
use bytes::{Bytes, BytesMut};
use osd_initiator_rs::{
    cfg::config::DeviceConfig,
    client::device::OsdDevice,
    error::OsdError,
    models::{
        attr::{ATTR_OI_LOGICAL_LENGTH, ATTR_PAGE_OBJECT_INFO, AttrCursor, OsdAttr},
        common::ObjId,
    },
    state_machine::common::AttributesMode,
};

use super::common::{PARTITION, create_objects, device, keyed_target, run, run_ok};

const USER_PAGE: u32 = 0x10000;

fn object_with_attrs() -> Result<(osd_initiator_rs::client::loopback::LoopbackTarget, ObjId)> {
    let target = keyed_target();
    let dev = device(&target);
    let obj = ObjId::new(PARTITION, 0x10000);
    create_objects(&dev, PARTITION, &[obj.id])?;

    let mut req = dev.start_request().set_attributes(&obj);
    req.add_set_attr_list(&[OsdAttr::new(USER_PAGE, 1, Bytes::from_static(b"alpha"))])?;
    req.add_set_attr_list(&[
        OsdAttr::new(USER_PAGE, 2, Bytes::from_static(b"bravo-charlie")),
        OsdAttr::new(USER_PAGE, 3, 42u64.to_be_bytes().to_vec()),
    ])?;
    assert_eq!(req.attributes_mode(), AttributesMode::List);
    run_ok(req)?;
    Ok((target, obj))
}

#[test]
fn test_set_then_get_list() -> Result<()> {
    let (target, obj) = object_with_attrs()?;
    assert_eq!(
        target.attr(&obj, USER_PAGE, 1),
        Some(Bytes::from_static(b"alpha"))
    );

    let dev = device(&target);
    let mut req = dev.start_request().get_attributes(&obj);
    req.add_get_attr_list(&[
        OsdAttr::request(USER_PAGE, 1, 8),
        OsdAttr::request(USER_PAGE, 2, 16),
    ])?;
    req.add_get_attr_list(&[
        OsdAttr::request(USER_PAGE, 3, 8),
        OsdAttr::request(USER_PAGE, 9, 8),
    ])?;
    let done = run(req)?;
    done.result()?;

    // two at a time, the cursor carries the position
    let mut cursor = AttrCursor::new();
    let first = done.decode_get_attr_list(&mut cursor, 2)?;
    assert_eq!(first.len(), 2);
    assert_eq!(&first[0].val[..], b"alpha");
    assert_eq!(&first[1].val[..], b"bravo-charlie");
    assert!(!cursor.is_done());

    let second = done.decode_get_attr_list(&mut cursor, 2)?;
    assert_eq!(second.len(), 2);
    assert_eq!(second[0].as_u64(), Some(42));
    assert_eq!(second[1].key(), (USER_PAGE, 9));
    assert!(!second[1].is_defined());
    assert!(cursor.is_done());
    assert!(done.decode_get_attr_list(&mut cursor, 2)?.is_empty());
    Ok(())
}

#[test]
fn test_empty_value_removes_attribute() -> Result<()> {
    let (target, obj) = object_with_attrs()?;
    let dev = device(&target);

    let mut req = dev.start_request().set_attributes(&obj);
    req.add_set_attr_list(&[OsdAttr::new(USER_PAGE, 1, Bytes::new())])?;
    run_ok(req)?;
    assert_eq!(target.attr(&obj, USER_PAGE, 1), None);
    Ok(())
}

#[test]
fn test_get_page() -> Result<()> {
    let (target, obj) = object_with_attrs()?;
    let dev = device(&target);

    let mut req = dev.start_request().get_attributes(&obj);
    req.add_get_attr_page(USER_PAGE, BytesMut::zeroed(64), None)?;
    assert_eq!(req.attributes_mode(), AttributesMode::Page);
    let done = run(req)?;
    done.result()?;

    let page = done.attr_page()?;
    assert_eq!(page.page_id, USER_PAGE);
    let mut expected = b"alphabravo-charlie".to_vec();
    expected.extend_from_slice(&42u64.to_be_bytes());
    assert_eq!(page.data, &expected[..]);
    assert!(!page.is_truncated());

    let released = done.release()?;
    assert_eq!(released.attr_page.map(|b| b.len()), Some(64));
    Ok(())
}

#[test]
fn test_get_page_truncated_and_set_one() -> Result<()> {
    let (target, obj) = object_with_attrs()?;
    let dev = device(&target);

    let mut req = dev.start_request().get_attributes(&obj);
    req.add_get_attr_page(
        ATTR_PAGE_OBJECT_INFO,
        BytesMut::zeroed(12),
        Some(&OsdAttr::new(USER_PAGE, 5, Bytes::from_static(b"xyz"))),
    )?;
    let done = run(req)?;
    done.result()?;

    let page = done.attr_page()?;
    assert_eq!(page.page_id, ATTR_PAGE_OBJECT_INFO);
    assert_eq!(page.page_len, 8);
    assert_eq!(page.data.len(), 4);
    assert!(page.is_truncated());
    assert_eq!(target.attr(&obj, USER_PAGE, 5), Some(Bytes::from_static(b"xyz")));
    assert_eq!(
        target.attr(&obj, ATTR_PAGE_OBJECT_INFO, ATTR_OI_LOGICAL_LENGTH),
        Some(Bytes::copy_from_slice(&0u64.to_be_bytes()))
    );
    Ok(())
}

#[test]
fn test_mode_conflict_leaves_request_usable() -> Result<()> {
    let (target, obj) = object_with_attrs()?;
    let dev = device(&target);

    let mut req = dev.start_request().get_attributes(&obj);
    req.add_get_attr_list(&[OsdAttr::request(USER_PAGE, 1, 8)])?;
    let conflict = req.add_get_attr_page(USER_PAGE, BytesMut::zeroed(32), None);
    let Err(OsdError::ModeConflict { active, requested }) = conflict else {
        bail!("page after list must conflict");
    };
    assert_eq!(active, AttributesMode::List);
    assert_eq!(requested, AttributesMode::Page);

    let done = run(req)?;
    done.result()?;
    assert!(matches!(done.attr_page(), Err(OsdError::InvalidSequence(_))));
    let attrs = done.decode_get_attr_list(&mut AttrCursor::new(), 4)?;
    assert_eq!(&attrs[0].val[..], b"alpha");

    let mut paged = dev.start_request().get_attributes(&obj);
    paged.add_get_attr_page(USER_PAGE, BytesMut::zeroed(32), None)?;
    assert!(matches!(
        paged.add_set_attr_list(&[OsdAttr::new(USER_PAGE, 1, Bytes::from_static(b"x"))]),
        Err(OsdError::ModeConflict { .. })
    ));
    assert!(matches!(
        paged.add_get_attr_page(USER_PAGE, BytesMut::zeroed(32), None),
        Err(OsdError::InvalidSequence(_))
    ));
    Ok(())
}

#[test]
fn test_attribute_allocation_limit() -> Result<()> {
    let target = keyed_target();
    let cfg = DeviceConfig {
        max_attr_segment_bytes: 64,
        ..DeviceConfig::default()
    };
    let dev = OsdDevice::init(Arc::new(target.clone()), &cfg);
    assert_eq!(dev.alloc_policy().max_attr_segment_bytes, 64);
    let obj = ObjId::new(PARTITION, 0x10000);

    let mut req = dev.start_request().get_attributes(&obj);
    req.add_get_attr_list(&[OsdAttr::request(USER_PAGE, 1, 16)])?;
    let too_big = req.add_get_attr_list(&[OsdAttr::request(USER_PAGE, 2, 40)]);
    assert!(matches!(too_big, Err(OsdError::AllocationFailure(_))));

    // the rejected call left no trace: only one element is requested
    let finalized = req.finalize(
        Default::default(),
        &super::common::cap(&obj),
        Some(&super::common::KEY[..]),
    )?;
    let params = finalized.cdb().attr_params.list();
    assert_eq!(params.get_desc_bytes, 4 + 8);
    assert_eq!(params.get_alloc_length, 4 + 32);
    Ok(())
}

#[test]
fn test_retrieved_list_bounded_by_list_header() -> Result<()> {
    let target = keyed_target();
    let cfg = DeviceConfig {
        max_attr_segment_bytes: 1 << 20,
        ..DeviceConfig::default()
    };
    let dev = OsdDevice::init(Arc::new(target.clone()), &cfg);
    let obj = ObjId::new(PARTITION, 0x10000);
    create_objects(&dev, PARTITION, &[obj.id])?;

    let big: Vec<OsdAttr> = (1..=10)
        .map(|id| OsdAttr::new(USER_PAGE, id, vec![id as u8; 8000]))
        .collect();
    for chunk in big.chunks(4) {
        let mut req = dev.start_request().set_attributes(&obj);
        req.add_set_attr_list(chunk)?;
        run_ok(req)?;
    }

    // ten 8016-byte elements do not fit a 16-bit list length
    let wanted: Vec<OsdAttr> = (1..=10)
        .map(|id| OsdAttr::request(USER_PAGE, id, 8000))
        .collect();
    let mut req = dev.start_request().get_attributes(&obj);
    let all = req.add_get_attr_list(&wanted);
    assert!(matches!(all, Err(OsdError::AllocationFailure(_))));

    // eight do, and all of them come back
    req.add_get_attr_list(&wanted[..8])?;
    assert!(matches!(
        req.add_get_attr_list(&wanted[8..]),
        Err(OsdError::AllocationFailure(_))
    ));
    let done = run(req)?;
    done.result()?;
    let attrs = done.decode_get_attr_list(&mut AttrCursor::new(), 16)?;
    assert_eq!(attrs.len(), 8);
    assert!(attrs.iter().all(|a| a.val.len() == 8000));
    Ok(())
}
