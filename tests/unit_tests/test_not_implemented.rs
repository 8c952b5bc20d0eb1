use anyhow::Result;
use bytes::Bytes;
use osd_initiator_rs::{
    control_block::{cdb::ReqOptions, service_action::ServiceAction},
    error::OsdError,
    models::{attr::OsdAttr, common::ObjId},
    state_machine::{encoded::EncodedRequest, request::OsdRequest},
};

use super::common::{KEY, PARTITION, cap, device, keyed_target};

type Encode = fn(OsdRequest, &ObjId) -> EncodedRequest;

#[test]
fn test_query_fails_before_submission() -> Result<()> {
    let target = keyed_target();
    let dev = device(&target);
    let obj = ObjId::new(PARTITION, 0x10000);

    let req = dev.start_request().query(&obj);
    assert_eq!(req.service_action(), Some(ServiceAction::Query));
    let res = req
        .finalize(ReqOptions::empty(), &cap(&obj), Some(&KEY[..]))
        .map_err(OsdError::from);
    assert!(matches!(res, Err(OsdError::NotImplemented("QUERY"))));
    assert_eq!(target.command_count(), 0);
    Ok(())
}

#[test]
fn test_every_placeholder_is_rejected() -> Result<()> {
    let target = keyed_target();
    let dev = device(&target);
    let obj = ObjId::new(PARTITION, 0x10000);

    let placeholders: [(Encode, ServiceAction); 13] = [
        (|r, o| r.set_master_seed_xchg(o), ServiceAction::SetMasterKey),
        (|r, o| r.set_master_key(o), ServiceAction::SetMasterKey),
        (|r, o| r.perform_scsi_command(o), ServiceAction::PerformScsiCommand),
        (|r, o| r.task_management(o), ServiceAction::PerformTaskManagement),
        (|r, o| r.set_partition_key(o.partition), ServiceAction::SetKey),
        (|r, o| r.create_collection(o), ServiceAction::CreateCollection),
        (|r, o| r.remove_collection(o), ServiceAction::RemoveCollection),
        (|r, o| r.query(o), ServiceAction::Query),
        (|r, o| r.get_member_attrs(o), ServiceAction::GetMemberAttributes),
        (|r, o| r.set_member_attrs(o), ServiceAction::SetMemberAttributes),
        (|r, o| r.append(o), ServiceAction::Append),
        (|r, o| r.create_write(o), ServiceAction::CreateAndWrite),
        (|r, o| r.clear(o), ServiceAction::Clear),
    ];

    for (encode, action) in placeholders {
        let req = encode(dev.start_request(), &obj);
        assert_eq!(req.service_action(), Some(action));
        let res = req
            .finalize(ReqOptions::empty(), &cap(&obj), None)
            .map_err(OsdError::from);
        assert!(
            matches!(res, Err(OsdError::NotImplemented(name)) if name == action.name()),
            "{action} must not finalize"
        );
    }

    let punch = dev.start_request().punch(&obj);
    assert!(matches!(
        punch
            .finalize(ReqOptions::empty(), &cap(&obj), None)
            .map_err(OsdError::from),
        Err(OsdError::NotImplemented(_))
    ));
    assert_eq!(target.command_count(), 0);
    Ok(())
}

#[test]
fn test_attribute_calls_on_placeholder() -> Result<()> {
    let target = keyed_target();
    let dev = device(&target);
    let obj = ObjId::new(PARTITION, 0x10000);

    let mut req = dev.start_request().append(&obj);
    let res = req.add_set_attr_list(&[OsdAttr::new(0x10000, 1, Bytes::from_static(b"v"))]);
    assert!(matches!(res, Err(OsdError::NotImplemented(_))));
    Ok(())
}
