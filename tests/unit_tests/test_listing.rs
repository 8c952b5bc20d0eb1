use anyhow::{Context, Result};
use bytes::BytesMut;
use osd_initiator_rs::{
    error::OsdError,
    models::{
        common::ObjId,
        object_list::{ListContinuation, ObjectIdList},
        sense_data::ErrorPriority,
    },
};

use super::common::{PARTITION, create_objects, device, keyed_target, run};

const IDS: [u64; 5] = [0x10001, 0x10002, 0x10003, 0x10004, 0x10005];

/// Page through a listing with a two-entry buffer until it is done.
fn list_in_rounds(
    mut list: impl FnMut(&ListContinuation, BytesMut) -> Result<ObjectIdList>,
) -> Result<Vec<ObjectIdList>> {
    let mut rounds = Vec::new();
    let mut cont = ListContinuation::start();
    loop {
        let page = list(&cont, BytesMut::zeroed(ObjectIdList::buffer_for(2)))?;
        let next = page.next_continuation();
        rounds.push(page);
        match next {
            Some(n) => cont = n,
            None => return Ok(rounds),
        }
        assert!(rounds.len() < 8, "listing does not terminate");
    }
}

#[test]
fn test_list_objects_in_rounds() -> Result<()> {
    let target = keyed_target();
    let dev = device(&target);
    create_objects(&dev, PARTITION, &IDS)?;

    let rounds = list_in_rounds(|cont, buf| {
        let req = dev
            .start_request()
            .list_partition_objects(PARTITION, cont, buf)?;
        Ok(run(req)?.check()?.object_list()?)
    })?;

    assert_eq!(rounds.len(), 3);
    assert_eq!(rounds[0].ids, IDS[..2]);
    assert_eq!(rounds[1].ids, IDS[2..4]);
    assert_eq!(rounds[2].ids, IDS[4..]);
    assert!(!rounds[0].partitions);

    assert!(!rounds[0].is_done());
    let first = rounds[0].next_continuation().context("more ids remain")?;
    assert_eq!(first.initial_id, 0x10002);
    assert_ne!(first.list_identifier, 0);
    assert_eq!(rounds[1].continuation_id, 0x10004);
    assert_eq!(rounds[1].list_identifier, first.list_identifier);

    assert!(rounds[2].is_done());
    assert_eq!(rounds[2].list_identifier, first.list_identifier);
    assert_eq!(rounds[2].next_continuation(), None);
    Ok(())
}

#[test]
fn test_list_collection_members_in_rounds() -> Result<()> {
    let target = keyed_target();
    let dev = device(&target);
    create_objects(&dev, PARTITION, &IDS)?;
    let coll = ObjId::new(PARTITION, 0x20000);
    assert!(target.add_collection(coll));
    for &id in &IDS[1..] {
        assert!(target.add_to_collection(coll, id));
    }
    assert!(!target.add_to_collection(coll, 0x30000), "no such object");

    let rounds = list_in_rounds(|cont, buf| {
        let req = dev.start_request().list_collection_objects(&coll, cont, buf)?;
        Ok(run(req)?.check()?.object_list()?)
    })?;
    assert_eq!(rounds.len(), 2);
    assert_eq!(rounds[0].ids, IDS[1..3]);
    assert_eq!(rounds[1].ids, IDS[3..]);
    assert!(rounds[1].is_done());

    // removing a member drops it from the collection
    run(dev
        .start_request()
        .remove_object(&ObjId::new(PARTITION, IDS[2])))?
    .check()?;
    let req = dev.start_request().list_collection_objects(
        &coll,
        &ListContinuation::start(),
        BytesMut::zeroed(ObjectIdList::buffer_for(8)),
    )?;
    let members = run(req)?.check()?.object_list()?;
    assert_eq!(members.ids, vec![IDS[1], IDS[3], IDS[4]]);

    // an unknown collection is not found
    let req = dev.start_request().list_collection_objects(
        &ObjId::new(PARTITION, 0x20001),
        &ListContinuation::start(),
        BytesMut::zeroed(ObjectIdList::buffer_for(8)),
    )?;
    assert_eq!(run(req)?.priority(), ErrorPriority::NotFound);
    Ok(())
}

#[test]
fn test_relisting_is_idempotent() -> Result<()> {
    let target = keyed_target();
    let dev = device(&target);
    create_objects(&dev, PARTITION, &IDS)?;

    let cont = ListContinuation {
        initial_id: 0x10001,
        list_identifier: 7,
    };
    let list = |cont: &ListContinuation| -> Result<ObjectIdList> {
        let req = dev.start_request().list_partition_objects(
            PARTITION,
            cont,
            BytesMut::zeroed(ObjectIdList::buffer_for(3)),
        )?;
        Ok(run(req)?.check()?.object_list()?)
    };
    let a = list(&cont)?;
    let b = list(&cont)?;
    assert_eq!(a, b);
    assert_eq!(a.ids, IDS[1..4]);
    assert_eq!(a.list_identifier, 7);
    Ok(())
}

#[test]
fn test_list_partitions_and_collections() -> Result<()> {
    let target = keyed_target();
    target.add_partition(PARTITION + 1);
    let dev = device(&target);

    let req = dev.start_request().list_dev_partitions(
        &ListContinuation::start(),
        BytesMut::zeroed(ObjectIdList::buffer_for(8)),
    )?;
    let parts = run(req)?.check()?.object_list()?;
    assert!(parts.partitions);
    assert_eq!(parts.ids, vec![PARTITION, PARTITION + 1]);
    assert!(parts.is_done());

    let req = dev.start_request().list_partition_collections(
        PARTITION,
        &ListContinuation::start(),
        BytesMut::zeroed(ObjectIdList::buffer_for(8)),
    )?;
    let colls = run(req)?.check()?.object_list()?;
    assert!(colls.ids.is_empty());
    assert!(colls.is_done());

    assert!(target.add_collection(ObjId::new(PARTITION, 0x20002)));
    assert!(target.add_collection(ObjId::new(PARTITION, 0x20001)));
    assert!(target.add_collection(ObjId::new(PARTITION + 1, 0x20003)));
    let req = dev.start_request().list_partition_collections(
        PARTITION,
        &ListContinuation::start(),
        BytesMut::zeroed(ObjectIdList::buffer_for(8)),
    )?;
    let colls = run(req)?.check()?.object_list()?;
    assert_eq!(colls.ids, vec![0x20001, 0x20002]);
    assert!(colls.is_done());
    Ok(())
}

#[test]
fn test_list_buffer_must_hold_one_id() -> Result<()> {
    let target = keyed_target();
    let dev = device(&target);

    let small = dev.start_request().list_partition_objects(
        PARTITION,
        &ListContinuation::start(),
        BytesMut::zeroed(ObjectIdList::buffer_for(1) - 1),
    );
    assert!(matches!(small, Err(OsdError::AllocationFailure(_))));

    let coll = dev.start_request().list_collection_objects(
        &ObjId::new(PARTITION, 0x20000),
        &ListContinuation::start(),
        BytesMut::zeroed(4),
    );
    assert!(matches!(coll, Err(OsdError::AllocationFailure(_))));
    assert_eq!(target.command_count(), 0);
    Ok(())
}

#[test]
fn test_object_list_on_plain_request() -> Result<()> {
    let target = keyed_target();
    let dev = device(&target);
    create_objects(&dev, PARTITION, &IDS[..1])?;

    let done = run(dev.start_request().read(
        &ObjId::new(PARTITION, IDS[0]),
        BytesMut::zeroed(0),
        0,
    ))?;
    assert!(matches!(
        done.object_list(),
        Err(OsdError::InvalidSequence(_))
    ));
    Ok(())
}
