use std::process;

use clap::{Parser, Subcommand};
use entgraph::{
    Client, ClientOption, Context, EntError, Role, SQLITE, Token, User, open,
    entity::user,
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "entgraph")]
#[command(version)]
#[command(about = "Create and inspect an entgraph database")]
struct Cli {
    /// Database dialect
    #[arg(long, global = true, default_value = SQLITE)]
    dialect: String,

    /// Data source name, e.g. `file:ent.db?_fk=1` or `:memory:`
    #[arg(long, global = true, default_value = ":memory:")]
    dsn: String,

    /// Log every statement
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create missing tables and indexes
    Migrate {
        /// Print the statements without running them
        #[arg(long)]
        dry_run: bool,
    },
    /// Row counts per entity table
    Status,
    /// List users
    Users,
    /// Create a user
    AddUser {
        #[arg(long)]
        email: String,
        #[arg(long)]
        tenant: String,
        #[arg(long, default_value = "user")]
        role: String,
    },
    /// List the tokens owned by a user
    Tokens {
        #[arg(long)]
        user: i64,
    },
}

fn main() {
    let cli = Cli::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let mut options = Vec::new();
    if cli.debug {
        options.push(ClientOption::Log(std::sync::Arc::new(|line: &str| {
            eprintln!("{line}")
        })));
        options.push(ClientOption::Debug);
    }
    let client = match open(&cli.dialect, &cli.dsn, options) {
        Ok(client) => client,
        Err(err) => {
            eprintln!("error: {err}");
            process::exit(2);
        }
    };
    let outcome = run(&client, cli.command);
    if let Err(err) = client.close() {
        tracing::warn!(error = %err, "close failed");
    }
    if let Err(err) = outcome {
        eprintln!("command failed: {err}");
        process::exit(1);
    }
}

fn run(client: &Client, command: Command) -> Result<(), EntError> {
    let ctx = Context::background();
    match command {
        Command::Migrate { dry_run } => {
            let schema = client.schema();
            let report = if dry_run {
                schema.plan()?
            } else {
                schema.create(&ctx)?
            };
            for sql in &report.statements {
                println!("{sql};");
            }
            if !dry_run {
                println!("migrated {} tables", report.tables.len());
            }
        }
        Command::Status => {
            for table in client.schema().status(&ctx)? {
                println!("{}\t{}\t{}", table.entity, table.table, table.rows);
            }
        }
        Command::Users => {
            for user in client.user().query().order(user::by_email()).all(&ctx)? {
                print_user(&user);
            }
        }
        Command::AddUser {
            email,
            tenant,
            role,
        } => {
            let role: Role = role
                .parse()
                .map_err(|_| EntError::invalid_input(format!("unknown role {role:?}")))?;
            let user = client
                .user()
                .create()
                .set_email(email)
                .set_tenant(tenant)
                .set_role(role)
                .save(&ctx)?;
            print_user(&user);
        }
        Command::Tokens { user } => {
            let owner = client.user().get(&ctx, user)?;
            let tokens = client.user().query_tokens(&owner)?.all(&ctx)?;
            for token in &tokens {
                print_token(token);
            }
        }
    }
    Ok(())
}

fn print_user(user: &User) {
    println!("{}\t{}\t{}\t{}", user.id, user.email, user.tenant, user.role);
}

fn print_token(token: &Token) {
    let owner = token
        .user_id
        .map_or_else(|| "-".to_string(), |id| id.to_string());
    println!("{}\t{}\t{}", token.id, owner, token.created_at.to_rfc3339());
}
