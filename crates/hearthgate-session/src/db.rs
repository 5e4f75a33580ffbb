//! Requests sent to the database service and the responses it sends back.
//!
//! Every request carries the issuing session's [`ClientKey`]; every
//! response echoes it in its header. Where in the header depends on the
//! response kind (see [`KeyPlacement`]), and [`DbResponse::new`] is the
//! one place that rule is applied on the way out. For the way back in,
//! see [`DbCorrelator`](crate::DbCorrelator).

use hearthgate_protocol::DecodedMessage;
use serde::{Deserialize, Serialize};

use crate::{ClientKey, LoadFlag};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// The persistent character row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterRecord {
    pub char_id: u32,
    pub name: String,
    pub account: String,
    pub job: u8,
    pub level: u16,
    pub gold: u32,
    pub hp: u16,
    pub mp: u16,
    pub map: String,
    pub x: u16,
    pub y: u16,
    /// `true` until the character has entered the world once.
    pub first_login: bool,
}

/// One item instance in a bag, equipment slot, bank, or pet bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    /// Unique id of this instance.
    pub make_index: u32,
    /// Id into the item definition table.
    pub item_index: u16,
    pub name: String,
    pub dura: u16,
    pub dura_max: u16,
}

/// A learned spell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MagicRecord {
    pub magic_id: u16,
    pub level: u8,
    pub train: u32,
}

/// Progress on one quest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: u32,
    pub step: u16,
}

/// Guild and friend list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityInfo {
    pub guild: Option<String>,
    pub friends: Vec<String>,
}

/// Why the database could not answer a query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum DbFailure {
    #[error("not found")]
    NotFound,

    #[error("malformed row: {0}")]
    Malformed(String),

    #[error("database error: {0}")]
    Backend(String),
}

/// Which item store a [`DbRequest::QueryItems`] reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Container {
    Bag,
    Equipment,
    Bank,
}

impl Container {
    /// The readiness flag this container's response sets.
    pub fn load_flag(self) -> LoadFlag {
        match self {
            Self::Bag => LoadFlag::Bag,
            Self::Equipment => LoadFlag::Equipment,
            Self::Bank => LoadFlag::Bank,
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// A query or write submitted to the
/// [`DatabaseService`](crate::DatabaseService).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DbRequest {
    GetCharacterRecord {
        account: String,
        server: String,
        char_name: String,
        client_key: ClientKey,
    },
    QueryItems {
        client_key: ClientKey,
        container: Container,
    },
    QueryMagic {
        client_key: ClientKey,
    },
    QueryTaskInfo {
        client_key: ClientKey,
    },
    QueryUpgradeItem {
        client_key: ClientKey,
    },
    QueryPetBank {
        client_key: ClientKey,
    },
    QueryCommunity {
        client_key: ClientKey,
    },
    /// Persist the character after world entry. `bag` is the full bag
    /// including anything granted on first login.
    SaveCharacter {
        client_key: ClientKey,
        record: CharacterRecord,
        bag: Vec<ItemRecord>,
    },
}

impl DbRequest {
    /// The key of the session that issued this request.
    pub fn client_key(&self) -> ClientKey {
        match self {
            Self::GetCharacterRecord { client_key, .. }
            | Self::QueryItems { client_key, .. }
            | Self::QueryMagic { client_key }
            | Self::QueryTaskInfo { client_key }
            | Self::QueryUpgradeItem { client_key }
            | Self::QueryPetBank { client_key }
            | Self::QueryCommunity { client_key }
            | Self::SaveCharacter { client_key, .. } => *client_key,
        }
    }

    /// The seven readiness loads plus the community query, in the order
    /// they are issued after the notice is confirmed.
    pub fn login_batch(client_key: ClientKey) -> Vec<DbRequest> {
        vec![
            Self::QueryItems { client_key, container: Container::Bag },
            Self::QueryItems { client_key, container: Container::Equipment },
            Self::QueryMagic { client_key },
            Self::QueryTaskInfo { client_key },
            Self::QueryUpgradeItem { client_key },
            Self::QueryPetBank { client_key },
            Self::QueryItems { client_key, container: Container::Bank },
            Self::QueryCommunity { client_key },
        ]
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Where a response kind carries the client key in its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPlacement {
    /// The whole `u32` correlation field.
    Correlation,
    /// Low word in `params[0]`, high word in `params[1]`.
    PackedParams,
}

/// Typed content of a database response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DbBody {
    CharacterRecord(Result<CharacterRecord, DbFailure>),
    Items {
        container: Container,
        result: Result<Vec<ItemRecord>, DbFailure>,
    },
    Magic(Result<Vec<MagicRecord>, DbFailure>),
    TaskInfo(Result<Vec<TaskRecord>, DbFailure>),
    UpgradeItems(Result<Vec<ItemRecord>, DbFailure>),
    PetBank(Result<Vec<ItemRecord>, DbFailure>),
    Community(Result<CommunityInfo, DbFailure>),
    Saved(Result<(), DbFailure>),
}

impl DbBody {
    /// Header slot this kind uses for the client key.
    pub fn key_placement(&self) -> KeyPlacement {
        match self {
            Self::CharacterRecord(_) | Self::Items { .. } | Self::Saved(_) => {
                KeyPlacement::Correlation
            }
            Self::Magic(_)
            | Self::TaskInfo(_)
            | Self::UpgradeItems(_)
            | Self::PetBank(_)
            | Self::Community(_) => KeyPlacement::PackedParams,
        }
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CharacterRecord(_) => "character_record",
            Self::Items { container: Container::Bag, .. } => "bag",
            Self::Items { container: Container::Equipment, .. } => "equipment",
            Self::Items { container: Container::Bank, .. } => "bank",
            Self::Magic(_) => "magic",
            Self::TaskInfo(_) => "task_info",
            Self::UpgradeItems(_) => "upgrade_item",
            Self::PetBank(_) => "pet_bank",
            Self::Community(_) => "community",
            Self::Saved(_) => "saved",
        }
    }
}

/// A response from the database link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbResponse {
    /// The header as it came off the link. Only the key-carrying fields
    /// are meaningful here.
    pub header: DecodedMessage,
    pub body: DbBody,
}

impl DbResponse {
    /// Builds a response for `client_key`, placing the key where this
    /// body's kind carries it.
    pub fn new(client_key: ClientKey, body: DbBody) -> Self {
        let raw = client_key.get();
        let header = match body.key_placement() {
            KeyPlacement::Correlation => DecodedMessage::default().with_correlation(raw),
            KeyPlacement::PackedParams => {
                let (low, high) = split_key(raw);
                DecodedMessage::default().with_params(low, high, 0)
            }
        };
        Self { header, body }
    }

    /// The raw key found in the header, read by this body's placement.
    pub fn embedded_key(&self) -> u32 {
        match self.body.key_placement() {
            KeyPlacement::Correlation => self.header.correlation,
            KeyPlacement::PackedParams => {
                join_key(self.header.params[0], self.header.params[1])
            }
        }
    }
}

fn split_key(raw: u32) -> (u16, u16) {
    ((raw & 0xFFFF) as u16, (raw >> 16) as u16)
}

fn join_key(low: u16, high: u16) -> u32 {
    u32::from(low) | (u32::from(high) << 16)
}
