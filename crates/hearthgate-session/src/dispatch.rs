//! Routing in-game commands to gameplay.
//!
//! Each known command code maps to a small handler that pulls the
//! action's arguments out of the message header and payload. The table
//! is fixed at compile time; [`CommandDispatcher`] indexes it once.

use std::collections::HashMap;

use hearthgate_protocol::command::{client, server};
use hearthgate_protocol::DecodedMessage;
use tracing::{debug, warn};

use crate::{ClientKey, Gameplay, PlayerAction};

/// What a handler asks the dispatcher to do.
enum Route {
    Action(PlayerAction),
    Ping,
    Quit,
}

type Handler = fn(&DecodedMessage) -> Route;

struct CommandEntry {
    name: &'static str,
    /// Dispatched even while the player is dead.
    allowed_while_dead: bool,
    handler: Handler,
}

const fn entry(name: &'static str, allowed_while_dead: bool, handler: Handler) -> CommandEntry {
    CommandEntry { name, allowed_while_dead, handler }
}

static COMMANDS: &[(u16, CommandEntry)] = &[
    (client::TURN, entry("turn", false, |m| {
        Route::Action(PlayerAction::Turn { direction: m.params[2] as u8 })
    })),
    (client::WALK, entry("walk", false, |m| {
        let (x, y, direction) = position(m);
        Route::Action(PlayerAction::Walk { x, y, direction })
    })),
    (client::RUN, entry("run", false, |m| {
        let (x, y, direction) = position(m);
        Route::Action(PlayerAction::Run { x, y, direction })
    })),
    (client::HIT, entry("hit", false, |m| {
        let (x, y, direction) = position(m);
        Route::Action(PlayerAction::Hit { x, y, direction })
    })),
    (client::SPELL, entry("spell", false, |m| {
        Route::Action(PlayerAction::Spell {
            x: m.params[0],
            y: m.params[1],
            magic_id: m.params[2],
            target: m.correlation,
        })
    })),
    (client::SAY, entry("say", true, |m| {
        Route::Action(PlayerAction::Say { text: m.text().into_owned() })
    })),
    (client::PICK_UP, entry("pick_up", false, |m| {
        Route::Action(PlayerAction::PickUp { x: m.params[0], y: m.params[1] })
    })),
    (client::DROP_ITEM, entry("drop_item", false, |m| {
        Route::Action(PlayerAction::DropItem {
            make_index: m.correlation,
            name: m.text().into_owned(),
        })
    })),
    (client::TAKE_ON_ITEM, entry("take_on_item", false, |m| {
        Route::Action(PlayerAction::TakeOnItem { make_index: m.correlation, slot: m.params[0] })
    })),
    (client::TAKE_OFF_ITEM, entry("take_off_item", true, |m| {
        Route::Action(PlayerAction::TakeOffItem { make_index: m.correlation, slot: m.params[0] })
    })),
    (client::EAT_ITEM, entry("eat_item", false, |m| {
        Route::Action(PlayerAction::EatItem { make_index: m.correlation })
    })),
    (client::QUERY_BAG, entry("query_bag", false, |_| Route::Action(PlayerAction::QueryBag))),
    (client::RESPAWN, entry("respawn", true, |_| Route::Action(PlayerAction::Respawn))),
    // Keepalive, answered even while dead.
    (client::PING, entry("ping", true, |_| Route::Ping)),
    (client::QUIT, entry("quit", true, |_| Route::Quit)),
];

/// `(x, y, direction)` from params 1..=3.
fn position(m: &DecodedMessage) -> (u16, u16, u8) {
    (m.params[0], m.params[1], m.params[2] as u8)
}

/// Result of dispatching one command.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Dispatched {
    /// Messages for the acting client.
    pub replies: Vec<DecodedMessage>,
    /// The client asked to leave.
    pub quit: bool,
}

/// Command code → handler lookup for verified sessions.
pub struct CommandDispatcher {
    table: HashMap<u16, &'static CommandEntry>,
}

impl CommandDispatcher {
    pub fn new() -> Self {
        let table = COMMANDS.iter().map(|(code, entry)| (*code, entry)).collect();
        Self { table }
    }

    /// Returns `true` if `code` has a handler.
    pub fn handles(&self, code: u16) -> bool {
        self.table.contains_key(&code)
    }

    /// Dispatches `msg` for the player on session `key`.
    ///
    /// Unknown codes get `UNKNOWN_COMMAND`; anything off the allow-list
    /// while the player is dead gets `COMMAND_REJECTED`. Both echo the
    /// offending code in `params[0]`.
    pub fn dispatch(&self, msg: &DecodedMessage, key: ClientKey, gameplay: &dyn Gameplay) -> Dispatched {
        let Some(entry) = self.table.get(&msg.command) else {
            warn!(client_key = %key, command = msg.command, "Unknown command");
            return Dispatched {
                replies: vec![DecodedMessage::new(server::UNKNOWN_COMMAND).with_params(msg.command, 0, 0)],
                quit: false,
            };
        };

        if !entry.allowed_while_dead && !gameplay.is_interactive(key) {
            debug!(client_key = %key, command = entry.name, "Command rejected while dead");
            return Dispatched {
                replies: vec![DecodedMessage::new(server::COMMAND_REJECTED).with_params(msg.command, 0, 0)],
                quit: false,
            };
        }

        match (entry.handler)(msg) {
            Route::Ping => Dispatched {
                replies: vec![DecodedMessage::new(server::PONG).with_correlation(msg.correlation)],
                quit: false,
            },
            Route::Quit => {
                debug!(client_key = %key, "Client quit");
                Dispatched { replies: Vec::new(), quit: true }
            }
            Route::Action(action) => Dispatched {
                replies: gameplay.perform(key, action),
                quit: false,
            },
        }
    }
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ScriptedGameplay;

    fn key() -> ClientKey {
        ClientKey::from_raw(1).unwrap()
    }

    #[test]
    fn test_dispatch_walk_reaches_gameplay() {
        let gameplay = ScriptedGameplay::new();
        let msg = DecodedMessage::new(client::WALK).with_params(10, 20, 3);
        let out = CommandDispatcher::new().dispatch(&msg, key(), &gameplay);
        assert!(!out.quit);
        assert_eq!(
            gameplay.actions(),
            vec![(key(), PlayerAction::Walk { x: 10, y: 20, direction: 3 })]
        );
    }

    #[test]
    fn test_dispatch_say_carries_payload_text() {
        let gameplay = ScriptedGameplay::new();
        let msg = DecodedMessage::new(client::SAY).with_text("hello");
        CommandDispatcher::new().dispatch(&msg, key(), &gameplay);
        assert_eq!(
            gameplay.actions(),
            vec![(key(), PlayerAction::Say { text: "hello".into() })]
        );
    }

    #[test]
    fn test_dispatch_unknown_code_replies_unknown_command() {
        let gameplay = ScriptedGameplay::new();
        let out = CommandDispatcher::new().dispatch(&DecodedMessage::new(4242), key(), &gameplay);
        assert_eq!(
            out.replies,
            vec![DecodedMessage::new(server::UNKNOWN_COMMAND).with_params(4242, 0, 0)]
        );
        assert!(gameplay.actions().is_empty());
    }

    #[test]
    fn test_dispatch_ping_echoes_correlation() {
        let gameplay = ScriptedGameplay::new();
        let msg = DecodedMessage::new(client::PING).with_correlation(77);
        let out = CommandDispatcher::new().dispatch(&msg, key(), &gameplay);
        assert_eq!(out.replies, vec![DecodedMessage::new(server::PONG).with_correlation(77)]);
    }

    #[test]
    fn test_dispatch_quit_sets_quit() {
        let gameplay = ScriptedGameplay::new();
        let out = CommandDispatcher::new().dispatch(&DecodedMessage::new(client::QUIT), key(), &gameplay);
        assert!(out.quit);
    }

    #[test]
    fn test_dispatch_dead_player_only_allow_list() {
        let gameplay = ScriptedGameplay::new();
        gameplay.set_interactive(key(), false);
        let dispatcher = CommandDispatcher::new();

        let allowed = [client::RESPAWN, client::SAY, client::TAKE_OFF_ITEM, client::QUIT, client::PING];
        for code in allowed {
            let out = dispatcher.dispatch(&DecodedMessage::new(code), key(), &gameplay);
            assert!(
                out.replies.iter().all(|m| m.command != server::COMMAND_REJECTED),
                "{code} should be allowed while dead"
            );
        }

        for (code, _) in COMMANDS.iter().filter(|(c, _)| !allowed.contains(c)) {
            let out = dispatcher.dispatch(&DecodedMessage::new(*code), key(), &gameplay);
            assert_eq!(
                out.replies,
                vec![DecodedMessage::new(server::COMMAND_REJECTED).with_params(*code, 0, 0)],
                "{code} should be rejected while dead"
            );
        }
        assert_eq!(gameplay.actions().len(), 3);
    }

    #[test]
    fn test_dispatch_dead_player_still_gets_pong() {
        let gameplay = ScriptedGameplay::new();
        gameplay.set_interactive(key(), false);
        let msg = DecodedMessage::new(client::PING).with_correlation(9);

        let out = CommandDispatcher::new().dispatch(&msg, key(), &gameplay);

        assert_eq!(out.replies, vec![DecodedMessage::new(server::PONG).with_correlation(9)]);
    }

    #[test]
    fn test_table_has_no_duplicate_codes() {
        assert_eq!(CommandDispatcher::new().table.len(), COMMANDS.len());
        assert!(!CommandDispatcher::new().handles(client::CONFIRM_NOTICE));
    }
}
