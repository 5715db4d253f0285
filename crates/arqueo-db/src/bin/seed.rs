//! # Seed Data Generator
//!
//! Populates the database with a demo workflow configuration and a day of
//! register activity for development.
//!
//! ## Usage
//! ```bash
//! # Seed the default development database
//! cargo run -p arqueo-db --bin seed
//!
//! # Specify database path
//! cargo run -p arqueo-db --bin seed -- --db ./data/arqueo.db
//! ```
//!
//! ## Generated Data
//! - Quote workflow vocabulary (DRAFT, SENT, ACCEPTED, REJECTED) and its
//!   transition rules
//! - A handful of quotes walked through the workflow with audit history
//! - Document codes allocated across two prefixes for today
//! - One cash session with movements, closed and left pending review

use std::env;

use chrono::Utc;
use uuid::Uuid;

use arqueo_core::{Actor, MovementKind, ReconciliationPolicy};
use arqueo_db::{Database, DbConfig};

/// Quote workflow vocabulary: (code, sort order).
const QUOTE_STATES: &[(&str, i64)] = &[
    ("DRAFT", 1),
    ("SENT", 2),
    ("ACCEPTED", 3),
    ("REJECTED", 4),
];

/// Permitted quote edges: (from code, to code).
const QUOTE_RULES: &[(&str, &str)] = &[
    ("DRAFT", "SENT"),
    ("SENT", "ACCEPTED"),
    ("SENT", "REJECTED"),
    ("REJECTED", "DRAFT"),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./arqueo_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Arqueo Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./arqueo_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Arqueo Seed Data Generator");
    println!("=============================");
    println!("Database: {}", db_path);
    println!();

    // Connect to database
    let config = DbConfig::new(&db_path);
    let db = Database::new(config).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    // Check existing configuration
    let existing: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM state_definitions WHERE category = 'quote'")
            .fetch_one(db.pool())
            .await?;
    if existing > 0 {
        println!("⚠ Database already has a quote workflow configured");
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let seeder = Actor::new("seed-script", ["quotes.edit", "cash.close"]);

    // Quote workflow vocabulary
    println!();
    println!("Configuring quote workflow...");

    let states = db.states();
    for (code, sort_order) in QUOTE_STATES {
        states.create_definition(code, "quote", *sort_order).await?;
    }
    for (from, to) in QUOTE_RULES {
        let from = states.resolve_state(from, "quote").await?;
        let to = states.resolve_state(to, "quote").await?;
        states.create_rule(from.id, to.id, "quote").await?;
    }
    println!(
        "✓ {} states, {} rules",
        QUOTE_STATES.len(),
        QUOTE_RULES.len()
    );

    // Demo quotes walked through the workflow
    println!();
    println!("Creating demo quotes...");

    let engine = db.transitions();
    let allocator = db.sequences();
    let today = Utc::now().date_naive();

    for n in 0..5 {
        let quote_id = Uuid::new_v4().to_string();
        let reference = allocator.allocate("COT", today).await?;

        sqlx::query("INSERT INTO quotes (id, reference, state_id, created_at) VALUES (?1, ?2, NULL, ?3)")
            .bind(&quote_id)
            .bind(&reference)
            .bind(Utc::now())
            .execute(db.pool())
            .await?;

        engine
            .transition("quote", &quote_id, "DRAFT", "quote", &seeder, None)
            .await?;
        if n % 2 == 0 {
            engine
                .transition("quote", &quote_id, "SENT", "quote", &seeder, Some("mailed"))
                .await?;
        }

        println!("  {} ({})", reference, if n % 2 == 0 { "SENT" } else { "DRAFT" });
    }

    // Extra invoice numbering to show partition independence
    for _ in 0..3 {
        allocator.allocate("VEN", today).await?;
    }
    println!("✓ Allocated 3 codes under VEN {}", today);

    // One cash session, closed and pending review
    println!();
    println!("Creating demo cash session...");

    let ledger = db.cash();
    let session = ledger.open("demo-cashier", "demo-register", 10_000).await?;
    ledger
        .record_movement(&session.id, MovementKind::Inflow, 5_000, Some("VEN sale"))
        .await?;
    ledger
        .record_movement(&session.id, MovementKind::Outflow, 2_000, Some("supplier payout"))
        .await?;

    let closings = db.closings(ReconciliationPolicy::default());
    let closing = closings.close(&session.id, 12_500, &seeder).await?;

    println!("✓ Session {} closed", session.id);
    println!(
        "  expected {} / counted {} / difference {}",
        closing.expected_cents, closing.counted_cents, closing.difference_cents
    );
    println!("  status: pending review");

    println!();
    println!("Done 🎉");

    Ok(())
}
