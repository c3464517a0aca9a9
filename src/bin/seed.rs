use chrono::Utc;
use clap::Parser;
use sqlx::sqlite::SqlitePoolOptions;
use uuid::Uuid;

use pocketlesson::{
    domain::{CreateUserRequest, Listing},
    repository::{
        HostAccountRepository, ListingRepository, SqliteHostAccountRepository,
        SqliteListingRepository, SqliteUserRepository, UserRepository,
    },
};

/// Fills a database with demo users, listings and a host payment account.
#[derive(Parser, Debug)]
#[command(name = "seed", version)]
struct Args {
    /// SQLite connection string.
    #[arg(long, default_value = "sqlite://pocketlesson.db?mode=rwc")]
    database_url: String,

    /// Password given to every demo user.
    #[arg(long, default_value = "password123")]
    password: String,

    /// Connected account id to attach to the demo host.
    #[arg(long, default_value = "acct_demo_host")]
    stripe_account: String,

    /// Leave the host account unverified so accepting bookings asks for onboarding.
    #[arg(long)]
    unverified_host: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    println!("🌱 Starting database seeding...");

    let db_pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&args.database_url)
        .await?;

    println!("📋 Running migrations...");
    sqlx::migrate!("./migrations").run(&db_pool).await?;

    let user_repo = SqliteUserRepository::new(db_pool.clone());
    let listing_repo = SqliteListingRepository::new(db_pool.clone());
    let host_account_repo = SqliteHostAccountRepository::new(db_pool.clone());

    println!("👥 Creating users...");
    let host = user_repo
        .create(CreateUserRequest {
            email: "host@pocketlesson.local".to_string(),
            display_name: "Keiko Tanaka".to_string(),
            password: args.password.clone(),
        })
        .await?;

    let mut guests = Vec::new();
    for (email, name) in [
        ("guest@pocketlesson.local", "Sam Rivera"),
        ("guest2@pocketlesson.local", "Mika Sato"),
    ] {
        guests.push(
            user_repo
                .create(CreateUserRequest {
                    email: email.to_string(),
                    display_name: name.to_string(),
                    password: args.password.clone(),
                })
                .await?,
        );
    }
    println!("  ✅ Created host and {} guests", guests.len());

    println!("📚 Creating listings...");
    let now = Utc::now();
    let listings = [
        ("Conversational Japanese, 60 min", 1500, 60, vec!["shibuya-cafe", "online"]),
        ("Calligraphy basics", 3000, 90, vec!["asakusa-studio"]),
        ("Tea ceremony walkthrough", 4500, 45, vec![]),
    ];
    for (title, price, duration_minutes, venues) in listings {
        listing_repo
            .create(Listing {
                id: Uuid::new_v4(),
                host_id: host.id,
                title: title.to_string(),
                price,
                duration_minutes,
                venues: venues.into_iter().map(String::from).collect(),
                is_active: true,
                created_at: now,
                updated_at: now,
            })
            .await?;
    }
    println!("  ✅ Created 3 listings");

    println!("💳 Creating host payment account...");
    host_account_repo.create(host.id, &args.stripe_account).await?;
    if !args.unverified_host {
        host_account_repo
            .update_capabilities(&args.stripe_account, true, true)
            .await?;
    }
    println!(
        "  ✅ {} ({})",
        args.stripe_account,
        if args.unverified_host { "unverified" } else { "verified" }
    );

    println!("\n✨ Database seeding complete!");
    println!("\n📝 Test credentials:");
    println!("  Host:   host@pocketlesson.local");
    println!("  Guests: guest@pocketlesson.local, guest2@pocketlesson.local");
    println!("  Password for all demo users: {}", args.password);

    Ok(())
}
