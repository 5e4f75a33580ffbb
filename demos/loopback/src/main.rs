use std::sync::Arc;

use hearthgate::prelude::*;
use hearthgate_session::ItemRecord;
use tracing::info;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Seed data
// ---------------------------------------------------------------------------

/// Characters the in-memory database starts with, and the login ticket
/// the gateway has pending for each.
fn seed_characters() -> Vec<(u32, StoredCharacter)> {
    let potion = ItemRecord {
        make_index: 1,
        item_index: 3,
        name: "Potion".into(),
        dura: 1,
        dura_max: 1,
    };

    let veteran = StoredCharacter {
        record: CharacterRecord {
            char_id: 1,
            name: "Aldric".into(),
            account: "alice".into(),
            job: 0,
            level: 22,
            gold: 1_450,
            hp: 180,
            mp: 40,
            map: "3".into(),
            x: 330,
            y: 330,
            first_login: false,
        },
        bag: vec![potion],
        ..StoredCharacter::default()
    };

    let newcomer = StoredCharacter {
        record: CharacterRecord {
            char_id: 2,
            name: "Brisa".into(),
            account: "bob".into(),
            job: 1,
            first_login: true,
            ..CharacterRecord::default()
        },
        ..StoredCharacter::default()
    };

    vec![(1001, veteran), (1002, newcomer)]
}

fn build_services(gateway: Arc<MemoryGateway>, database: Arc<MemoryDatabase>) -> Services {
    Services {
        gateway,
        database,
        world: Arc::new(StaticWorld::default()),
        gameplay: Arc::new(ScriptedGameplay::new()),
        registry: Arc::new(PlayerRegistry::new()),
    }
}

// ---------------------------------------------------------------------------
// Server bootstrap
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr = std::env::var("HEARTHGATE_BIND").unwrap_or_else(|_| "127.0.0.1:7400".into());

    let gateway = Arc::new(MemoryGateway::new());
    let (database, link) = MemoryDatabase::new();
    let database = Arc::new(database);
    for (ticket, character) in seed_characters() {
        info!(ticket, name = %character.record.name, "Seeding character");
        gateway.register(ticket, &character.record.account, &character.record.name);
        database.insert(character);
    }

    let server = HearthgateServerBuilder::new()
        .bind(&addr)
        .session_config(SessionConfig::default())
        .database_link(link)
        .build(build_services(gateway, database))
        .await?;

    info!(addr = %server.local_addr()?, "Hearthgate loopback server listening");
    let sessions = server.sessions();

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            let kicked = sessions.kick_all("Server shutting down.");
            info!(kicked, "Shutting down");
        }
    }
    Ok(())
}
