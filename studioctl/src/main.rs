use clap::Parser;
use serde::Serialize;
use studioctl::{
    Config, CurrentUser, Error,
    booking::{CreditLedger, RegistrationManager},
    config::{Args, Command},
    telemetry,
};
use uuid::Uuid;

/// Operator commands run with admin rights under the nil user id
fn operator() -> CurrentUser {
    CurrentUser::admin(Uuid::nil())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Log a service error at its level and surface the caller-facing message
fn report(error: Error) -> anyhow::Error {
    error.log();
    anyhow::anyhow!("{} ({:?})", error.user_message(), error.kind())
}

async fn run(command: Command, manager: RegistrationManager, ledger: CreditLedger) -> anyhow::Result<()> {
    match command {
        Command::Migrate => Ok(()),
        Command::Availability { session, date, time } => {
            print_json(&manager.check_availability(session, date, &time).await.map_err(report)?)
        }
        Command::Schedule { date } => print_json(&manager.check_date_availability(date).await.map_err(report)?),
        Command::Credits { user } => print_json(&ledger.get_user_credits(&operator(), user).await.map_err(report)?),
        Command::Grant {
            user,
            group,
            amount,
            expires_at,
        } => print_json(
            &ledger
                .add_credits_to_user(&operator(), user, group, amount, expires_at)
                .await
                .map_err(report)?,
        ),
        Command::Stats => print_json(&ledger.get_credit_statistics(&operator()).await.map_err(report)?),
        Command::History { user } => print_json(&ledger.get_user_credit_history(&operator(), user).await.map_err(report)?),
        Command::CreditTypes { class } => print_json(&manager.get_available_credit_types(class).await.map_err(report)?),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI args
    let args = Args::parse();

    // Load configuration
    let config = Config::load(&args)?;

    // If --validate flag is set, exit successfully after config validation
    if args.validate {
        println!("Configuration is valid.");
        return Ok(());
    }

    telemetry::init_telemetry(&config.telemetry)?;

    tracing::debug!("{:?}", args);

    let pool = studioctl::connect_pool(&config.database).await?;
    studioctl::migrator().run(&pool).await?;
    tracing::info!("Migrations applied");

    let manager = RegistrationManager::builder().db(pool).config(config.booking).build();
    let ledger = manager.ledger();

    let result = run(args.command.unwrap_or(Command::Migrate), manager, ledger).await;
    telemetry::shutdown_telemetry();
    result
}
