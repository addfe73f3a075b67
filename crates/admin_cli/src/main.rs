use std::{error::Error, path::PathBuf};

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use engine::{Engine, Entry, ErrorKind, ResultEngine, User};
use migration::MigratorTrait;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use serde::Serialize;

mod settings;

#[derive(Parser, Debug)]
#[command(name = "budget_admin")]
#[command(about = "Admin utilities for the budget ledger (users and entries)")]
struct Cli {
    /// Settings file (defaults to `budget.toml` when present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Database connection string, overrides the settings file.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Log level for the engine and this tool.
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    User(UserArgs),
    Entry(EntryArgs),
    /// Apply or inspect schema migrations.
    Migrate {
        #[command(subcommand)]
        command: MigrateCommand,
    },
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum MigrateCommand {
    Up,
    Down,
    Fresh,
    Status,
}

#[derive(Args, Debug)]
struct UserArgs {
    #[command(subcommand)]
    command: UserCommand,
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    /// Register a user. The credential hash is computed elsewhere.
    Create {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password_hash: String,
        #[arg(long)]
        full_name: String,
        #[arg(long)]
        email: String,
    },
    Show {
        #[arg(long)]
        username: String,
    },
    List {
        #[arg(long, default_value_t = 20)]
        limit: u64,
        #[arg(long, default_value_t = 0)]
        offset: u64,
    },
    /// Delete a user and every entry it owns.
    Delete {
        #[arg(long)]
        username: String,
    },
    /// Change username, full name and email; entries follow the new username.
    Rename {
        #[arg(long)]
        username: String,
        #[arg(long)]
        new_username: String,
        #[arg(long)]
        full_name: String,
        #[arg(long)]
        email: String,
    },
    Password {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password_hash: String,
    },
    /// Rebuild total expenses from the user's entries.
    Recompute {
        #[arg(long)]
        username: String,
    },
}

#[derive(Args, Debug)]
struct EntryArgs {
    #[command(subcommand)]
    command: EntryCommand,
}

#[derive(Args, Debug)]
struct EntryFields {
    #[arg(long)]
    name: String,
    /// Due date, `YYYY-MM-DD`.
    #[arg(long)]
    due_date: NaiveDate,
    /// Amount in minor units.
    #[arg(long, allow_negative_numbers = true)]
    amount: i64,
    #[arg(long)]
    category: Option<String>,
}

#[derive(Subcommand, Debug)]
enum EntryCommand {
    Add {
        #[arg(long)]
        owner: String,
        #[command(flatten)]
        fields: EntryFields,
    },
    Update {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        id: i32,
        #[command(flatten)]
        fields: EntryFields,
    },
    Delete {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        id: i32,
    },
    Show {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        id: i32,
    },
    List {
        #[arg(long)]
        owner: String,
    },
    Categories {
        #[arg(long)]
        owner: String,
    },
}

#[derive(Serialize, Debug)]
#[serde(untagged)]
enum Output {
    User(User),
    Users(Vec<User>),
    Entry(Entry),
    Entries(Vec<Entry>),
    Change { entry: Entry, user: User },
    Categories(Vec<String>),
    Deleted { deleted: String },
}

/// Exit status for an engine failure, following `sysexits.h` where it has a
/// matching code.
fn exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::NotFound => 3,
        ErrorKind::Conflict => 4,
        ErrorKind::Invalid => 65,
        ErrorKind::Internal => 70,
        ErrorKind::Transient => 75,
    }
}

async fn connect_db(
    config: &settings::Database,
) -> Result<DatabaseConnection, Box<dyn Error + Send + Sync>> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections())
        .sqlx_logging(false);
    Ok(Database::connect(options).await?)
}

async fn migrate(
    db: &DatabaseConnection,
    command: MigrateCommand,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    match command {
        MigrateCommand::Up => migration::Migrator::up(db, None).await?,
        MigrateCommand::Down => migration::Migrator::down(db, None).await?,
        MigrateCommand::Fresh => migration::Migrator::fresh(db).await?,
        MigrateCommand::Status => migration::Migrator::status(db).await?,
    }
    Ok(())
}

async fn run_user(engine: &Engine, command: UserCommand) -> ResultEngine<Output> {
    let output = match command {
        UserCommand::Create {
            username,
            password_hash,
            full_name,
            email,
        } => Output::User(
            engine
                .create_user(&username, &password_hash, &full_name, &email)
                .await?,
        ),
        UserCommand::Show { username } => Output::User(engine.user(&username).await?),
        UserCommand::List { limit, offset } => Output::Users(engine.users(limit, offset).await?),
        UserCommand::Delete { username } => {
            engine.delete_user(&username).await?;
            Output::Deleted { deleted: username }
        }
        UserCommand::Rename {
            username,
            new_username,
            full_name,
            email,
        } => Output::User(
            engine
                .rename_owner(&username, &new_username, &full_name, &email)
                .await?,
        ),
        UserCommand::Password {
            username,
            password_hash,
        } => Output::User(
            engine
                .change_password_hash(&username, &password_hash)
                .await?,
        ),
        UserCommand::Recompute { username } => {
            Output::User(engine.recompute_total_expenses(&username).await?)
        }
    };
    Ok(output)
}

async fn run_entry(engine: &Engine, command: EntryCommand) -> ResultEngine<Output> {
    let output = match command {
        EntryCommand::Add { owner, fields } => {
            let (entry, user) = engine
                .add_entry(
                    &owner,
                    &fields.name,
                    fields.due_date,
                    fields.amount,
                    fields.category.as_deref(),
                )
                .await?;
            Output::Change { entry, user }
        }
        EntryCommand::Update { owner, id, fields } => {
            let (entry, user) = engine
                .update_entry(
                    &owner,
                    id,
                    &fields.name,
                    fields.due_date,
                    fields.amount,
                    fields.category.as_deref(),
                )
                .await?;
            Output::Change { entry, user }
        }
        EntryCommand::Delete { owner, id } => Output::User(engine.delete_entry(&owner, id).await?),
        EntryCommand::Show { owner, id } => Output::Entry(engine.entry(&owner, id).await?),
        EntryCommand::List { owner } => Output::Entries(engine.entries(&owner).await?),
        EntryCommand::Categories { owner } => Output::Categories(engine.categories(&owner).await?),
    };
    Ok(output)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = Cli::parse();

    let mut settings = settings::Settings::load(cli.config.as_deref())?;
    if let Some(url) = cli.database_url {
        settings.database.url = url;
    }
    if let Some(level) = cli.log_level {
        settings.log.level = level;
    }

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "budget_admin={level},engine={level}",
            level = settings.log.level
        ))
        .with_writer(std::io::stderr)
        .init();

    let db = connect_db(&settings.database).await?;

    let result = match cli.command {
        Command::Migrate { command } => {
            migrate(&db, command).await?;
            tracing::info!("migration {command:?} done");
            return Ok(());
        }
        Command::User(UserArgs { command }) => {
            migration::Migrator::up(&db, None).await?;
            let engine = Engine::builder().database(db).build().await?;
            run_user(&engine, command).await
        }
        Command::Entry(EntryArgs { command }) => {
            migration::Migrator::up(&db, None).await?;
            let engine = Engine::builder().database(db).build().await?;
            run_entry(&engine, command).await
        }
    };

    match result {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(err) => {
            let kind = err.kind();
            tracing::debug!("command failed with {}: {err:?}", kind.as_str());
            eprintln!("{}: {err}", kind.as_str());
            std::process::exit(exit_code(kind));
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_entry_add_with_negative_amount() {
        let cli = Cli::try_parse_from([
            "budget_admin",
            "--database-url",
            "sqlite::memory:",
            "entry",
            "add",
            "--owner",
            "alice",
            "--name",
            "Refund",
            "--due-date",
            "2024-02-29",
            "--amount",
            "-1500",
        ])
        .unwrap();

        assert_eq!(cli.database_url.as_deref(), Some("sqlite::memory:"));
        let Command::Entry(EntryArgs {
            command: EntryCommand::Add { owner, fields },
        }) = cli.command
        else {
            panic!("expected entry add");
        };
        assert_eq!(owner, "alice");
        assert_eq!(fields.amount, -1500);
        assert_eq!(fields.due_date, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(fields.category, None);
    }

    #[test]
    fn rejects_malformed_due_date() {
        let parsed = Cli::try_parse_from([
            "budget_admin",
            "entry",
            "add",
            "--owner",
            "alice",
            "--name",
            "Rent",
            "--due-date",
            "31/01/2024",
            "--amount",
            "100",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn exit_codes_are_distinct_per_kind() {
        let kinds = [
            ErrorKind::NotFound,
            ErrorKind::Conflict,
            ErrorKind::Invalid,
            ErrorKind::Internal,
            ErrorKind::Transient,
        ];
        let mut codes: Vec<i32> = kinds.iter().map(|kind| exit_code(*kind)).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
        assert_eq!(exit_code(ErrorKind::Transient), 75);
    }
}
