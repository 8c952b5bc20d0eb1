// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! In-memory OSD target.
//!
//! Executes finalized commands against a [`DashMap`] of objects keyed by
//! [`ObjId`]: the root object, partitions (`id == 0`) and user objects.
//! CREATE COLLECTION is reserved on the initiator side, so collections and
//! their members are set up directly with [`LoopbackTarget::add_collection`]
//! and [`LoopbackTarget::add_to_collection`].

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    },
};

use bytes::Bytes;
use dashmap::{DashMap, mapref::entry::Entry};
use tracing::{debug, info, warn};

use crate::{
    client::transport::{
        Completion, CompletionNotifier, CompletionResult, OsdCommand, OsdTransport,
    },
    control_block::{
        cdb::{CDB_FMT_LIST, CDB_FMT_PAGE, OsdCdb},
        offset::decode_offset,
        service_action::ServiceAction,
    },
    error::TransportError,
    models::{
        attr::{
            ATTR_OI_LOGICAL_LENGTH, ATTR_PAGE_OBJECT_INFO, OsdAttr, decode_attr_list_all,
            decode_get_attr_list, encode_attr_page, encode_retrieved_attr_list,
        },
        common::{OSD_CRYPTO_KEYID_SIZE, ObjId},
        object_list::ObjectIdList,
        sense_data::{
            OsdSenseInfo, SENSE_DESC_CURRENT, additional_code, field_offset, sense_key,
        },
    },
    security::{
        capability::{Capability, SecurityMethod},
        signer::{expected_integrity, verify_request},
    },
};

/// CDB byte of the service action field.
const SERVICE_ACTION_FIELD: u16 = 8;
/// CDB bytes of the offset words inside the attribute parameters.
const LIST_GET_DESC_OFFSET_FIELD: u16 = 56;
const LIST_RETRIEVED_OFFSET_FIELD: u16 = 64;
const LIST_SET_OFFSET_FIELD: u16 = 72;
const PAGE_RETRIEVED_OFFSET_FIELD: u16 = 60;
const PAGE_SET_OFFSET_FIELD: u16 = 76;

/// Largest object (and data-in) the target will materialize.
pub const MAX_OBJECT_BYTES: usize = 64 << 20;

type AttrMap = BTreeMap<(u32, u32), Bytes>;

#[derive(Debug, Default)]
struct StoredObject {
    data: Vec<u8>,
    attrs: AttrMap,
}

impl StoredObject {
    fn logical_length(&self) -> Bytes {
        Bytes::copy_from_slice(&(self.data.len() as u64).to_be_bytes())
    }

    fn attr(&self, page: u32, id: u32) -> Option<Bytes> {
        if (page, id) == (ATTR_PAGE_OBJECT_INFO, ATTR_OI_LOGICAL_LENGTH) {
            return Some(self.logical_length());
        }
        self.attrs.get(&(page, id)).cloned()
    }

    /// Values of `page` concatenated in attribute id order.
    fn page(&self, page: u32) -> Vec<u8> {
        let mut values: BTreeMap<u32, Bytes> = self
            .attrs
            .range((page, 0)..=(page, u32::MAX))
            .map(|(&(_, id), v)| (id, v.clone()))
            .collect();
        if page == ATTR_PAGE_OBJECT_INFO {
            values.insert(ATTR_OI_LOGICAL_LENGTH, self.logical_length());
        }
        values.values().flat_map(|v| v.iter().copied()).collect()
    }

    fn store(&mut self, attr: OsdAttr) {
        if attr.is_defined() && !attr.val.is_empty() {
            self.attrs.insert(attr.key(), attr.val);
        } else {
            self.attrs.remove(&attr.key());
        }
    }
}

/// CHECK CONDITION raised while executing a command.
#[derive(Debug)]
struct Failure {
    key: u8,
    code: u16,
    obj: ObjId,
    field: Option<u16>,
    data: Vec<u8>,
}

impl Failure {
    fn new(key: u8, code: u16, obj: ObjId) -> Self {
        Self {
            key,
            code,
            obj,
            field: None,
            data: Vec::new(),
        }
    }

    /// INVALID FIELD IN CDB pointing at CDB byte `field`.
    fn cdb_field(obj: ObjId, field: u16) -> Self {
        Self {
            field: Some(field),
            ..Self::new(
                sense_key::ILLEGAL_REQUEST,
                additional_code::INVALID_FIELD_IN_CDB,
                obj,
            )
        }
    }

    fn parameter_list(obj: ObjId) -> Self {
        Self::new(
            sense_key::ILLEGAL_REQUEST,
            additional_code::INVALID_FIELD_IN_PARAMETER_LIST,
            obj,
        )
    }

    fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    fn into_completion(self) -> Completion {
        let [asc, ascq] = self.code.to_be_bytes();
        let sense = OsdSenseInfo {
            available: true,
            response_code: SENSE_DESC_CURRENT,
            key: self.key,
            asc,
            ascq,
            obj: Some(self.obj),
            field_pointer: self.field,
            ..Default::default()
        };
        Completion::check_condition(sense.encode(), self.data)
    }
}

type Outcome<T> = Result<T, Failure>;

#[derive(Debug, Default)]
struct TargetState {
    objects: DashMap<ObjId, StoredObject>,
    /// Collection id to member object ids, within one partition.
    collections: DashMap<ObjId, BTreeSet<u64>>,
    key: Option<[u8; OSD_CRYPTO_KEYID_SIZE]>,
    capacity: AtomicU64,
    offline: AtomicBool,
    hold: AtomicBool,
    held: Mutex<Vec<(OsdCommand, CompletionNotifier)>>,
    commands: AtomicU64,
    next_list_id: AtomicU32,
}

/// Cloneable handle on a shared in-memory target.
#[derive(Debug, Clone)]
pub struct LoopbackTarget {
    state: Arc<TargetState>,
}

impl Default for LoopbackTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackTarget {
    /// Target accepting unsigned and signed commands alike.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Target that verifies every CDB against `key` and rejects NOSEC.
    pub fn with_key(key: [u8; OSD_CRYPTO_KEYID_SIZE]) -> Self {
        Self::build(Some(key))
    }

    fn build(key: Option<[u8; OSD_CRYPTO_KEYID_SIZE]>) -> Self {
        let state = TargetState {
            key,
            next_list_id: AtomicU32::new(1),
            ..Default::default()
        };
        state.objects.insert(ObjId::ROOT, StoredObject::default());
        Self {
            state: Arc::new(state),
        }
    }

    /// Create a partition directly, bypassing the command path.
    pub fn add_partition(&self, partition: u64) {
        self.state
            .objects
            .entry(ObjId::partition(partition))
            .or_default();
    }

    /// Create collection `coll` directly. Its partition must exist.
    pub fn add_collection(&self, coll: ObjId) -> bool {
        if coll.id == 0
            || self.state.objects.contains_key(&coll)
            || !self.contains(&ObjId::partition(coll.partition))
        {
            return false;
        }
        self.state.collections.entry(coll).or_default();
        true
    }

    /// Make object `member` of the collection's partition a member of `coll`.
    pub fn add_to_collection(&self, coll: ObjId, member: u64) -> bool {
        if !self.contains(&ObjId::new(coll.partition, member)) {
            return false;
        }
        match self.state.collections.get_mut(&coll) {
            Some(mut members) => {
                members.insert(member);
                true
            },
            None => false,
        }
    }

    /// While offline every submission fails in transport.
    pub fn set_offline(&self, offline: bool) {
        self.state.offline.store(offline, Ordering::SeqCst);
    }

    /// Park async submissions until [`Self::release_held`].
    pub fn hold_completions(&self, hold: bool) {
        self.state.hold.store(hold, Ordering::SeqCst);
    }

    /// Complete every parked submission, each from its own thread.
    pub fn release_held(&self) -> usize {
        let held = std::mem::take(
            &mut *self
                .state
                .held
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let n = held.len();
        for (cmd, notifier) in held {
            self.complete_later(cmd, notifier);
        }
        n
    }

    /// Commands executed so far.
    pub fn command_count(&self) -> u64 {
        self.state.commands.load(Ordering::SeqCst)
    }

    pub fn capacity(&self) -> u64 {
        self.state.capacity.load(Ordering::SeqCst)
    }

    pub fn contains(&self, obj: &ObjId) -> bool {
        self.state.objects.contains_key(obj)
    }

    /// Stored bytes of `obj`.
    pub fn object_data(&self, obj: &ObjId) -> Option<Vec<u8>> {
        self.state.objects.get(obj).map(|o| o.data.clone())
    }

    pub fn attr(&self, obj: &ObjId, page: u32, id: u32) -> Option<Bytes> {
        self.state.objects.get(obj).and_then(|o| o.attr(page, id))
    }

    fn offline_error(&self) -> Option<TransportError> {
        self.state
            .offline
            .load(Ordering::SeqCst)
            .then(|| TransportError::new("loopback target is offline"))
    }

    fn complete_later(&self, cmd: OsdCommand, notifier: CompletionNotifier) {
        let state = Arc::clone(&self.state);
        std::thread::spawn(move || {
            let completion = state.process(&cmd);
            notifier.complete(Ok(completion));
        });
    }
}

impl OsdTransport for LoopbackTarget {
    fn submit_blocking(&self, cmd: &OsdCommand) -> CompletionResult {
        if let Some(e) = self.offline_error() {
            return Err(e);
        }
        Ok(self.state.process(cmd))
    }

    fn submit_async(
        &self,
        cmd: OsdCommand,
        notifier: CompletionNotifier,
    ) -> Result<(), TransportError> {
        if let Some(e) = self.offline_error() {
            return Err(e);
        }
        if self.state.hold.load(Ordering::SeqCst) {
            debug!(action = ?cmd.cdb.service_action(), "completion parked");
            self.state
                .held
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((cmd, notifier));
            return Ok(());
        }
        self.complete_later(cmd, notifier);
        Ok(())
    }
}

/// Slice `len` bytes of data-out at the encoded offset `raw`.
fn data_out_at(data: &[u8], raw: u32, len: usize, obj: ObjId, field: u16) -> Outcome<&[u8]> {
    decode_offset(raw)
        .and_then(|at| usize::try_from(at).ok())
        .and_then(|at| data.get(at..at.checked_add(len)?))
        .ok_or_else(|| Failure::cdb_field(obj, field))
}

/// Place `bytes` at the encoded data-in offset `raw`, after the user data.
fn place_at(user: &mut Vec<u8>, raw: u32, bytes: &[u8], obj: ObjId, field: u16) -> Outcome<()> {
    let at = decode_offset(raw)
        .and_then(|at| usize::try_from(at).ok())
        .filter(|&at| at >= user.len() && at + bytes.len() <= MAX_OBJECT_BYTES)
        .ok_or_else(|| Failure::cdb_field(obj, field))?;
    user.resize(at, 0);
    user.extend_from_slice(bytes);
    Ok(())
}

fn cdb_usize(v: u64, obj: ObjId, field: u16) -> Outcome<usize> {
    usize::try_from(v).map_err(|_| Failure::cdb_field(obj, field))
}

impl TargetState {
    fn process(&self, cmd: &OsdCommand) -> Completion {
        self.commands.fetch_add(1, Ordering::SeqCst);
        let cdb = &cmd.cdb;
        let data_out = cmd.data_out_bytes();

        let outcome = self
            .verify(cdb)
            .and_then(|()| self.dispatch(cdb, &data_out))
            .and_then(|user| self.attributes(cdb, &data_out, user));

        match outcome {
            Ok(mut data_in) => {
                data_in.truncate(cmd.data_in_len);
                debug!(
                    action = ?cdb.service_action(),
                    obj = %cdb.obj(),
                    data_in = data_in.len(),
                    "loopback: GOOD"
                );
                Completion::good(data_in)
            },
            Err(mut failure) => {
                failure.data.truncate(cmd.data_in_len);
                debug!(
                    action = ?cdb.service_action(),
                    obj = %failure.obj,
                    key = failure.key,
                    code = format_args!("{:#06x}", failure.code),
                    field = ?failure.field,
                    "loopback: CHECK CONDITION"
                );
                failure.into_completion()
            },
        }
    }

    fn verify(&self, cdb: &OsdCdb) -> Outcome<()> {
        let Some(key) = &self.key else {
            return Ok(());
        };
        let obj = cdb.obj();
        let method = Capability::from_slice(&cdb.capability)
            .ok()
            .and_then(|cap| cap.security_method());
        if method.is_none_or(|m| m == SecurityMethod::NoSec) {
            warn!(%obj, "loopback: unsigned command rejected");
            return Err(Failure::cdb_field(obj, field_offset::SECURITY_METHOD));
        }
        let (out, inn) = expected_integrity(cdb);
        match verify_request(cdb, key, &out, &inn) {
            Ok(true) => Ok(()),
            _ => {
                warn!(%obj, "loopback: integrity check value mismatch");
                Err(Failure::cdb_field(obj, field_offset::INTEGRITY_CHECK_VALUE))
            },
        }
    }

    fn require(&self, obj: ObjId, field: u16) -> Outcome<()> {
        if self.objects.contains_key(&obj) {
            Ok(())
        } else {
            Err(Failure::cdb_field(obj, field))
        }
    }

    fn require_partition(&self, obj: ObjId) -> Outcome<()> {
        if obj.partition == 0 {
            return Err(Failure::cdb_field(obj, field_offset::PARTITION_ID));
        }
        self.require(ObjId::partition(obj.partition), field_offset::PARTITION_ID)
    }

    fn require_user_object(&self, obj: ObjId) -> Outcome<()> {
        self.require_partition(obj)?;
        if obj.id == 0 {
            return Err(Failure::cdb_field(obj, field_offset::OBJECT_ID));
        }
        self.require(obj, field_offset::OBJECT_ID)
    }

    fn dispatch(&self, cdb: &OsdCdb, data_out: &[u8]) -> Outcome<Vec<u8>> {
        let obj = cdb.obj();
        let Some(action) = cdb.service_action() else {
            return Err(Failure::cdb_field(obj, SERVICE_ACTION_FIELD));
        };

        match action {
            ServiceAction::FormatOsd => {
                self.objects.clear();
                self.collections.clear();
                self.objects.insert(ObjId::ROOT, StoredObject::default());
                self.capacity.store(cdb.length.get(), Ordering::SeqCst);
                info!(capacity = cdb.length.get(), "loopback: formatted");
                Ok(Vec::new())
            },
            ServiceAction::CreatePartition => {
                if obj.partition == 0 {
                    return Err(Failure::cdb_field(obj, field_offset::PARTITION_ID));
                }
                self.insert_new(ObjId::partition(obj.partition), field_offset::PARTITION_ID)
            },
            ServiceAction::RemovePartition => {
                self.require_partition(obj)?;
                let busy = self
                    .objects
                    .iter()
                    .any(|e| e.key().partition == obj.partition && e.key().id != 0)
                    || self.collections.iter().any(|e| e.key().partition == obj.partition);
                if busy {
                    return Err(Failure::new(
                        sense_key::ILLEGAL_REQUEST,
                        additional_code::PARTITION_OR_COLLECTION_NOT_EMPTY,
                        obj,
                    ));
                }
                self.objects.remove(&ObjId::partition(obj.partition));
                Ok(Vec::new())
            },
            ServiceAction::Create => {
                self.require_partition(obj)?;
                if obj.id == 0 || self.collections.contains_key(&obj) {
                    return Err(Failure::cdb_field(obj, field_offset::OBJECT_ID));
                }
                self.insert_new(obj, field_offset::OBJECT_ID)
            },
            ServiceAction::Remove => {
                self.require_user_object(obj)?;
                self.objects.remove(&obj);
                for mut members in self.collections.iter_mut() {
                    if members.key().partition == obj.partition {
                        members.remove(&obj.id);
                    }
                }
                Ok(Vec::new())
            },
            ServiceAction::Write => self.write(cdb, data_out),
            ServiceAction::Read => self.read(cdb),
            ServiceAction::Flush | ServiceAction::GetAttributes | ServiceAction::SetAttributes
                if obj.id != 0 =>
            {
                self.require_user_object(obj).map(|()| Vec::new())
            },
            ServiceAction::GetAttributes | ServiceAction::SetAttributes => {
                let field = if obj.partition == 0 {
                    field_offset::OBJECT_ID
                } else {
                    field_offset::PARTITION_ID
                };
                self.require(obj, field).map(|()| Vec::new())
            },
            ServiceAction::Flush => Err(Failure::cdb_field(obj, field_offset::OBJECT_ID)),
            ServiceAction::FlushPartition => self.require_partition(obj).map(|()| Vec::new()),
            ServiceAction::FlushCollection => {
                self.require_collection(obj).map(|()| Vec::new())
            },
            ServiceAction::FlushOsd => Ok(Vec::new()),
            ServiceAction::List => self.list(cdb),
            ServiceAction::ListCollection => self.list_collection(cdb),
            other => {
                warn!(action = %other, "loopback: unsupported service action");
                Err(Failure::cdb_field(obj, SERVICE_ACTION_FIELD))
            },
        }
    }

    fn insert_new(&self, obj: ObjId, field: u16) -> Outcome<Vec<u8>> {
        match self.objects.entry(obj) {
            Entry::Occupied(_) => Err(Failure::cdb_field(obj, field)),
            Entry::Vacant(v) => {
                v.insert(StoredObject::default());
                Ok(Vec::new())
            },
        }
    }

    fn write(&self, cdb: &OsdCdb, data_out: &[u8]) -> Outcome<Vec<u8>> {
        let obj = cdb.obj();
        self.require_user_object(obj)?;
        let offset = cdb_usize(cdb.start_address.get(), obj, field_offset::STARTING_BYTE)?;
        let len = cdb_usize(cdb.length.get(), obj, field_offset::STARTING_BYTE)?;
        let payload = data_out.get(..len).ok_or_else(|| Failure::parameter_list(obj))?;
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= MAX_OBJECT_BYTES)
            .ok_or_else(|| {
                warn!(%obj, offset, len, "loopback: write beyond the object size limit");
                Failure::cdb_field(obj, field_offset::STARTING_BYTE)
            })?;

        let mut entry = self
            .objects
            .get_mut(&obj)
            .ok_or_else(|| Failure::cdb_field(obj, field_offset::OBJECT_ID))?;
        if entry.data.len() < end {
            entry.data.resize(end, 0);
        }
        entry.data[offset..end].copy_from_slice(payload);
        Ok(Vec::new())
    }

    fn read(&self, cdb: &OsdCdb) -> Outcome<Vec<u8>> {
        let obj = cdb.obj();
        self.require_user_object(obj)?;
        let offset = cdb_usize(cdb.start_address.get(), obj, field_offset::STARTING_BYTE)?;
        let len = cdb_usize(cdb.length.get(), obj, field_offset::STARTING_BYTE)?;
        if len > MAX_OBJECT_BYTES {
            return Err(Failure::cdb_field(obj, field_offset::STARTING_BYTE));
        }

        let entry = self
            .objects
            .get(&obj)
            .ok_or_else(|| Failure::cdb_field(obj, field_offset::OBJECT_ID))?;
        let mut out = vec![0u8; len];
        let stored = entry.data.get(offset..).unwrap_or_default();
        let avail = stored.len().min(len);
        out[..avail].copy_from_slice(&stored[..avail]);

        if avail < len {
            return Err(Failure::new(
                sense_key::RECOVERED_ERROR,
                additional_code::READ_PAST_END_OF_USER_OBJECT,
                obj,
            )
            .with_data(out));
        }
        Ok(out)
    }

    fn require_collection(&self, obj: ObjId) -> Outcome<()> {
        self.require_partition(obj)?;
        if obj.id == 0 || !self.collections.contains_key(&obj) {
            return Err(Failure::cdb_field(obj, field_offset::OBJECT_ID));
        }
        Ok(())
    }

    fn list(&self, cdb: &OsdCdb) -> Outcome<Vec<u8>> {
        let obj = cdb.obj();
        let partitions = obj.partition == 0;
        if !partitions {
            self.require_partition(obj)?;
        }
        let ids = self
            .objects
            .iter()
            .map(|e| *e.key())
            .filter_map(|k| match partitions {
                true if k.partition != 0 && k.id == 0 => Some(k.partition),
                false if k.partition == obj.partition && k.id != 0 => Some(k.id),
                _ => None,
            })
            .collect();
        self.list_page(cdb, ids, partitions)
    }

    /// Collections of a partition (`id == 0`) or the members of one.
    fn list_collection(&self, cdb: &OsdCdb) -> Outcome<Vec<u8>> {
        let obj = cdb.obj();
        let ids = if obj.id == 0 {
            self.require_partition(obj)?;
            self.collections
                .iter()
                .map(|e| *e.key())
                .filter(|k| k.partition == obj.partition)
                .map(|k| k.id)
                .collect()
        } else {
            self.require_collection(obj)?;
            self.collections
                .get(&obj)
                .map(|members| members.iter().copied().collect())
                .unwrap_or_default()
        };
        self.list_page(cdb, ids, false)
    }

    /// One page of `ids`: those past the initial id, sorted, as many as the
    /// allocation length holds.
    fn list_page(&self, cdb: &OsdCdb, mut ids: Vec<u64>, partitions: bool) -> Outcome<Vec<u8>> {
        let obj = cdb.obj();
        let alloc = cdb_usize(cdb.length.get(), obj, field_offset::STARTING_BYTE)?;
        let initial = cdb.start_address.get();

        ids.retain(|&id| id > initial);
        ids.sort_unstable();

        let fits = ObjectIdList::capacity_of(alloc);
        let more = ids.len() > fits;
        ids.truncate(fits);

        let mut list_identifier = cdb.list_identifier.get();
        if more && list_identifier == 0 {
            list_identifier = self.next_list_id.fetch_add(1, Ordering::SeqCst);
        }
        let continuation_id = match ids.last() {
            Some(&last) if more => last,
            _ => 0,
        };
        debug!(%obj, returned = ids.len(), more, "loopback: list");

        Ok(ObjectIdList {
            ids,
            continuation_id,
            list_identifier,
            list_changed: false,
            partitions,
        }
        .to_bytes())
    }

    /// Apply the attribute part of a command. Sets run before gets.
    fn attributes(&self, cdb: &OsdCdb, data_out: &[u8], mut user: Vec<u8>) -> Outcome<Vec<u8>> {
        let obj = cdb.obj();
        match cdb.cdb_format() {
            CDB_FMT_LIST => {
                let p = cdb.attr_params.list();
                if p.set_bytes > 0 {
                    let raw = data_out_at(
                        data_out,
                        p.set_offset,
                        p.set_bytes as usize,
                        obj,
                        LIST_SET_OFFSET_FIELD,
                    )?;
                    let attrs = decode_attr_list_all(raw).map_err(|e| {
                        warn!(%obj, "loopback: bad set-attribute list: {e}");
                        Failure::parameter_list(obj)
                    })?;
                    self.with_object(obj, |o| attrs.into_iter().for_each(|a| o.store(a)))?;
                }
                if p.get_desc_bytes > 0 {
                    let raw = data_out_at(
                        data_out,
                        p.get_desc_offset,
                        p.get_desc_bytes as usize,
                        obj,
                        LIST_GET_DESC_OFFSET_FIELD,
                    )?;
                    let ids = decode_get_attr_list(raw).map_err(|e| {
                        warn!(%obj, "loopback: bad get-attribute list: {e}");
                        Failure::parameter_list(obj)
                    })?;
                    let found = self.with_object(obj, |o| {
                        ids.iter()
                            .map(|&(page, id)| match o.attr(page, id) {
                                Some(val) => OsdAttr::new(page, id, val),
                                None => OsdAttr::undefined(page, id),
                            })
                            .collect::<Vec<_>>()
                    })?;
                    let list = encode_retrieved_attr_list(&found, p.get_alloc_length as usize);
                    place_at(
                        &mut user,
                        p.retrieved_offset,
                        &list,
                        obj,
                        LIST_RETRIEVED_OFFSET_FIELD,
                    )?;
                }
            },
            CDB_FMT_PAGE => {
                let p = cdb.attr_params.page();
                if p.set_length > 0 {
                    let raw = data_out_at(
                        data_out,
                        p.set_offset,
                        p.set_length as usize,
                        obj,
                        PAGE_SET_OFFSET_FIELD,
                    )?;
                    let attr = OsdAttr::new(p.set_page, p.set_id, Bytes::copy_from_slice(raw));
                    self.with_object(obj, |o| o.store(attr))?;
                }
                if p.get_alloc_length > 0 {
                    let mut page =
                        encode_attr_page(p.get_page, &self.with_object(obj, |o| o.page(p.get_page))?);
                    page.truncate(p.get_alloc_length as usize);
                    place_at(
                        &mut user,
                        p.retrieved_offset,
                        &page,
                        obj,
                        PAGE_RETRIEVED_OFFSET_FIELD,
                    )?;
                }
            },
            _ => {},
        }
        Ok(user)
    }

    fn with_object<T>(&self, obj: ObjId, f: impl FnOnce(&mut StoredObject) -> T) -> Outcome<T> {
        let field = if obj.id == 0 {
            field_offset::PARTITION_ID
        } else {
            field_offset::OBJECT_ID
        };
        let mut entry = self
            .objects
            .get_mut(&obj)
            .ok_or_else(|| Failure::cdb_field(obj, field))?;
        Ok(f(&mut entry))
    }
}
