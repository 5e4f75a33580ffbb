//! Command codes carried in [`DecodedMessage::command`](crate::DecodedMessage).
//!
//! Client and server share one `u16` space but never reuse a value
//! across directions, so a code alone identifies a message in logs.

/// Client → server commands.
pub mod client {
    /// Drop an item from the bag onto the floor.
    pub const DROP_ITEM: u16 = 1000;
    /// Pick up what lies under the player.
    pub const PICK_UP: u16 = 1001;
    /// Equip an item from the bag.
    pub const TAKE_ON_ITEM: u16 = 1003;
    /// Move an equipped item back into the bag.
    pub const TAKE_OFF_ITEM: u16 = 1004;
    /// Use (eat, drink, read) a bag item.
    pub const EAT_ITEM: u16 = 1006;
    /// Leave the game and close the connection.
    pub const QUIT: u16 = 1009;
    /// "I have read the notice": the first dialog after login.
    pub const CONFIRM_NOTICE: u16 = 1018;
    /// Respawn after death.
    pub const RESPAWN: u16 = 1090;
    /// Liveness probe; answered with [`super::server::PONG`].
    pub const PING: u16 = 1100;
    /// Ask for the full bag contents again.
    pub const QUERY_BAG: u16 = 81;

    /// Turn in place.
    pub const TURN: u16 = 3010;
    /// Walk one tile.
    pub const WALK: u16 = 3011;
    /// Run two tiles.
    pub const RUN: u16 = 3013;
    /// Melee attack.
    pub const HIT: u16 = 3014;
    /// Cast a spell.
    pub const SPELL: u16 = 3017;
    /// Chat line (payload is the text).
    pub const SAY: u16 = 3030;
}

/// Server → client commands.
pub mod server {
    /// World entry confirmation.
    pub const LOGON: u16 = 50;
    /// Derived combat stats.
    pub const ABILITY: u16 = 52;
    /// Appearance/feature update.
    pub const FEATURE_CHANGED: u16 = 41;
    /// User-visible system text (payload is the text).
    pub const SYS_MESSAGE: u16 = 100;
    /// Carried weight update.
    pub const WEIGHT_CHANGED: u16 = 622;
    /// The notice dialog the client must confirm.
    pub const SEND_NOTICE: u16 = 658;
    /// Answer to [`super::client::PING`].
    pub const PONG: u16 = 1101;
    /// The command code is not one the server handles.
    pub const UNKNOWN_COMMAND: u16 = 1102;
    /// The command exists but is not allowed right now.
    pub const COMMAND_REJECTED: u16 = 1103;
    /// Sent right before the server closes the connection.
    pub const DISCONNECT: u16 = 1104;
}

/// Human-readable name of a command code, for logs.
pub fn name(code: u16) -> Option<&'static str> {
    use client::*;
    use server::*;

    Some(match code {
        DROP_ITEM => "DROP_ITEM",
        PICK_UP => "PICK_UP",
        TAKE_ON_ITEM => "TAKE_ON_ITEM",
        TAKE_OFF_ITEM => "TAKE_OFF_ITEM",
        EAT_ITEM => "EAT_ITEM",
        QUIT => "QUIT",
        CONFIRM_NOTICE => "CONFIRM_NOTICE",
        RESPAWN => "RESPAWN",
        PING => "PING",
        QUERY_BAG => "QUERY_BAG",
        TURN => "TURN",
        WALK => "WALK",
        RUN => "RUN",
        HIT => "HIT",
        SPELL => "SPELL",
        SAY => "SAY",
        LOGON => "LOGON",
        ABILITY => "ABILITY",
        FEATURE_CHANGED => "FEATURE_CHANGED",
        SYS_MESSAGE => "SYS_MESSAGE",
        WEIGHT_CHANGED => "WEIGHT_CHANGED",
        SEND_NOTICE => "SEND_NOTICE",
        PONG => "PONG",
        UNKNOWN_COMMAND => "UNKNOWN_COMMAND",
        COMMAND_REJECTED => "COMMAND_REJECTED",
        DISCONNECT => "DISCONNECT",
        _ => return None,
    })
}
