// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

/// OSDv1 service actions (`0x8880 | n`), carried in CDB bytes 8..10.
///
/// Actions that have no wire encoding in this initiator keep their code
/// reserved; [`ServiceAction::is_implemented`] reports which ones may be
/// finalized.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceAction {
    FormatOsd = 0x8881,
    Create = 0x8882,
    List = 0x8883,
    Punch = 0x8884,
    Read = 0x8885,
    Write = 0x8886,
    Append = 0x8887,
    Flush = 0x8888,
    Clear = 0x8889,
    Remove = 0x888A,
    CreatePartition = 0x888B,
    RemovePartition = 0x888C,
    GetAttributes = 0x888E,
    SetAttributes = 0x888F,
    CreateAndWrite = 0x8892,
    CreateCollection = 0x8895,
    RemoveCollection = 0x8896,
    ListCollection = 0x8897,
    SetKey = 0x8898,
    SetMasterKey = 0x8899,
    FlushCollection = 0x889A,
    FlushPartition = 0x889B,
    FlushOsd = 0x889C,
    Query = 0x88A0,
    GetMemberAttributes = 0x88A2,
    SetMemberAttributes = 0x88A3,
    PerformScsiCommand = 0x8F7E,
    PerformTaskManagement = 0x8F7F,
}

impl ServiceAction {
    pub fn from_u16(v: u16) -> Option<Self> {
        use ServiceAction::*;
        Some(match v {
            0x8881 => FormatOsd,
            0x8882 => Create,
            0x8883 => List,
            0x8884 => Punch,
            0x8885 => Read,
            0x8886 => Write,
            0x8887 => Append,
            0x8888 => Flush,
            0x8889 => Clear,
            0x888A => Remove,
            0x888B => CreatePartition,
            0x888C => RemovePartition,
            0x888E => GetAttributes,
            0x888F => SetAttributes,
            0x8892 => CreateAndWrite,
            0x8895 => CreateCollection,
            0x8896 => RemoveCollection,
            0x8897 => ListCollection,
            0x8898 => SetKey,
            0x8899 => SetMasterKey,
            0x889A => FlushCollection,
            0x889B => FlushPartition,
            0x889C => FlushOsd,
            0x88A0 => Query,
            0x88A2 => GetMemberAttributes,
            0x88A3 => SetMemberAttributes,
            0x8F7E => PerformScsiCommand,
            0x8F7F => PerformTaskManagement,
            _ => return None,
        })
    }

    #[inline]
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn name(self) -> &'static str {
        use ServiceAction::*;
        match self {
            FormatOsd => "FORMAT OSD",
            Create => "CREATE",
            List => "LIST",
            Punch => "PUNCH",
            Read => "READ",
            Write => "WRITE",
            Append => "APPEND",
            Flush => "FLUSH",
            Clear => "CLEAR",
            Remove => "REMOVE",
            CreatePartition => "CREATE PARTITION",
            RemovePartition => "REMOVE PARTITION",
            GetAttributes => "GET ATTRIBUTES",
            SetAttributes => "SET ATTRIBUTES",
            CreateAndWrite => "CREATE AND WRITE",
            CreateCollection => "CREATE COLLECTION",
            RemoveCollection => "REMOVE COLLECTION",
            ListCollection => "LIST COLLECTION",
            SetKey => "SET KEY",
            SetMasterKey => "SET MASTER KEY",
            FlushCollection => "FLUSH COLLECTION",
            FlushPartition => "FLUSH PARTITION",
            FlushOsd => "FLUSH OSD",
            Query => "QUERY",
            GetMemberAttributes => "GET MEMBER ATTRIBUTES",
            SetMemberAttributes => "SET MEMBER ATTRIBUTES",
            PerformScsiCommand => "PERFORM SCSI COMMAND",
            PerformTaskManagement => "PERFORM TASK MANAGEMENT FUNCTION",
        }
    }

    /// Whether this initiator can finalize a request carrying the action.
    pub fn is_implemented(self) -> bool {
        use ServiceAction::*;
        matches!(
            self,
            FormatOsd
                | Create
                | List
                | Read
                | Write
                | Flush
                | Remove
                | CreatePartition
                | RemovePartition
                | GetAttributes
                | SetAttributes
                | ListCollection
                | FlushCollection
                | FlushPartition
                | FlushOsd
        )
    }
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#06x})", self.name(), self.code())
    }
}
