//! Applies the embedded bookmark migrations.
//!
//! Usage:
//!   cargo run -p marks-api --bin marks-migrate
//!   cargo run -p marks-api --bin marks-migrate -- --database-url postgres://...
//!
//! Without `--database-url`, DATABASE_URL is read from the environment (or .env via dotenvy).

use diesel::pg::PgConnection;
use diesel::Connection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::path::Path;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

fn main() {
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    let args: Vec<String> = std::env::args().collect();
    let database_url = database_url_arg(&args)
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .expect("DATABASE_URL env var or --database-url is required");

    println!("Connecting to {}...", redact(&database_url));
    let mut conn =
        PgConnection::establish(&database_url).expect("failed to connect to database");

    println!("Running pending migrations...");
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .expect("failed to run migrations");

    if applied.is_empty() {
        println!("No pending migrations.");
    } else {
        for migration in &applied {
            println!("  Applied: {migration}");
        }
        println!("{} migration(s) applied.", applied.len());
    }
}

fn database_url_arg(args: &[String]) -> Option<String> {
    args.iter()
        .position(|arg| arg == "--database-url")
        .and_then(|i| args.get(i + 1))
        .cloned()
}

/// Hide the password part of a connection string.
fn redact(database_url: &str) -> String {
    match (database_url.find("://"), database_url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            let creds = &database_url[scheme_end + 3..at];
            let user = creds.split(':').next().unwrap_or("");
            format!("{}{user}:***{}", &database_url[..scheme_end + 3], &database_url[at..])
        }
        _ => database_url.to_string(),
    }
}
