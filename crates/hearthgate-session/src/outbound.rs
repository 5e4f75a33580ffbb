//! Server → client messages the session sends on its own behalf.

use hearthgate_protocol::DecodedMessage;
use hearthgate_protocol::command::server;

use crate::{Abilities, SpawnPoint, StatusSnapshot};

pub(crate) fn notice(text: &str) -> DecodedMessage {
    DecodedMessage::new(server::SEND_NOTICE).with_text(text)
}

pub(crate) fn sys_message(text: &str) -> DecodedMessage {
    DecodedMessage::new(server::SYS_MESSAGE).with_text(text)
}

pub(crate) fn disconnect() -> DecodedMessage {
    DecodedMessage::new(server::DISCONNECT)
}

pub(crate) fn pong(ping: &DecodedMessage) -> DecodedMessage {
    DecodedMessage::new(server::PONG).with_correlation(ping.correlation)
}

/// World entry: character id, position, and map name.
pub(crate) fn logon(char_id: u32, spawn: &SpawnPoint) -> DecodedMessage {
    DecodedMessage::new(server::LOGON)
        .with_correlation(char_id)
        .with_params(spawn.x, spawn.y, u16::from(spawn.direction))
        .with_text(&spawn.map)
}

/// Level in `params[0]`; the remaining stats as little-endian `u16`s in
/// the payload.
pub(crate) fn ability(a: &Abilities) -> DecodedMessage {
    let fields = [a.ac, a.mac, a.dc, a.mc, a.sc, a.hp, a.max_hp, a.mp, a.max_mp];
    let payload: Vec<u8> = fields.iter().flat_map(|v| v.to_le_bytes()).collect();
    DecodedMessage::new(server::ABILITY)
        .with_params(a.level, 0, 0)
        .with_payload(payload)
}

pub(crate) fn feature(char_id: u32, status: &StatusSnapshot) -> DecodedMessage {
    DecodedMessage::new(server::FEATURE_CHANGED)
        .with_correlation(char_id)
        .with_payload(status.feature.to_le_bytes())
}

pub(crate) fn weight(status: &StatusSnapshot) -> DecodedMessage {
    DecodedMessage::new(server::WEIGHT_CHANGED).with_params(
        status.weight,
        status.wear_weight,
        status.max_weight,
    )
}
