/// Pairing admin tool
///
/// Main entry point. Handles:
/// - Command-line argument parsing
/// - Session database initialization
/// - Running one service operation and printing its JSON response
use anyhow::Context;
use pairing_core::config::{Command, Config};
use pairing_core::db::SqliteSessionStore;
use pairing_core::SessionService;
use std::process;
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    let config = Config::from_args();

    env_logger::Builder::from_default_env()
        .filter_level(config.log_level())
        .format_timestamp_millis()
        .init();

    let service = if config.in_memory {
        log::info!("Using in-memory session registry");
        SessionService::new()
    } else {
        log::info!("Database: {:?}", config.database);
        let store = SqliteSessionStore::open(&config.database)
            .with_context(|| format!("Failed to open database {:?}", config.database))?;
        SessionService::with_store(Arc::new(store)).context("Failed to restore sessions")?
    };

    service.register_log_callback(|message: &str| log::debug!("event: {}", message));

    let (status, response) = run_command(&service, &config.command);
    println!("{}", serde_json::to_string_pretty(&response)?);

    if status != 0 {
        process::exit(status);
    }
    Ok(())
}

fn run_command(service: &SessionService, command: &Command) -> (i32, serde_json::Value) {
    macro_rules! respond {
        ($response:expr) => {{
            let response = $response;
            (response.status.code(), response.to_json())
        }};
    }

    match command {
        Command::Keygen => respond!(service.generate_key_pair()),
        Command::Create { id, owner_key } => {
            respond!(service.create_session(id.as_deref(), owner_key))
        }
        Command::Join {
            session_id,
            participant_key,
        } => respond!(service.join_session(session_id, participant_key)),
        Command::List { session_id } => respond!(service.list_participants(session_id)),
        Command::Ack {
            session_id,
            participant_key,
            stored_participants,
        } => respond!(service.acknowledge(session_id, participant_key, *stored_participants)),
        Command::Leave {
            session_id,
            participant_key,
        } => respond!(service.leave_session(session_id, participant_key)),
        Command::Close { session_id } => respond!(service.close_session(session_id)),
        Command::Show { session_id } => respond!(service.get_session(session_id)),
    }
}
