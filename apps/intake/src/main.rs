use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use intake_core::{
    availability::{AvailabilityGrid, CellKey},
    config::{load_settings_from, prepare_database_url, Settings, DEFAULT_CONFIG_FILE},
    notice::NoticeQueue,
    strength::password_strength,
    FieldValidationEngine, MockRegistrationApi, NavigationOutcome, PasswordPolicy,
    RegistrationSession, RegistrationSubmitter, RulesConfig, SystemClock,
};
use shared::{
    domain::{AppointmentStatus, FormRecord, ProviderId},
    protocol::AppointmentRequest,
};
use storage::{AppointmentFilter, Storage};
use tracing::{error, info};

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Overrides `database_url` from the config file and environment.
    #[arg(long)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Form {
    Patient,
    Provider,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a JSON registration record and print every failing field.
    Check {
        record: PathBuf,
        #[arg(long, value_enum, default_value = "patient")]
        form: Form,
    },
    /// Score a password against the configured policy.
    Strength {
        password: String,
        #[arg(long)]
        policy: Option<String>,
    },
    /// Walk a JSON record through the registration steps and submit it.
    Register {
        record: PathBuf,
        #[arg(long, value_enum, default_value = "patient")]
        form: Form,
        /// Submit to an in-memory mock instead of the database.
        #[arg(long)]
        dry_run: bool,
    },
    Availability {
        #[command(subcommand)]
        command: AvailabilityCommand,
    },
    Appointments {
        #[command(subcommand)]
        command: AppointmentCommand,
    },
}

#[derive(Subcommand, Debug)]
enum AvailabilityCommand {
    Show {
        provider: String,
        #[arg(long)]
        week_of: Option<NaiveDate>,
    },
    /// Toggle cells such as `2026-10-12_09:00` and save.
    Toggle {
        provider: String,
        #[arg(required = true)]
        cells: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
enum AppointmentCommand {
    Book {
        provider: String,
        patient_name: String,
        date: NaiveDate,
        start_time: String,
        #[arg(long)]
        reason: Option<String>,
    },
    List {
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    SetStatus {
        appointment_id: String,
        status: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut settings = load_settings_from(&cli.config);
    if let Some(url) = cli.database_url {
        settings.database_url = url;
    }

    match cli.command {
        Command::Check { record, form } => check(&settings, form, &read_record(&record)?),
        Command::Strength { password, policy } => {
            let policy = match policy {
                Some(raw) => PasswordPolicy::parse(&raw)
                    .with_context(|| format!("unknown password policy '{raw}'"))?,
                None => settings.password_policy,
            };
            let strength = password_strength(&password, policy);
            println!("{} ({}%)", strength.level.label(), strength.percentage);
            for (requirement, met) in strength.requirements.items(policy) {
                println!("  [{}] {requirement}", if met { "x" } else { " " });
            }
            Ok(())
        }
        Command::Register {
            record,
            form,
            dry_run,
        } => {
            let record = read_record(&record)?;
            if dry_run {
                let api = Arc::new(MockRegistrationApi::new(settings.submit_delay()));
                register(&settings, form, record, api).await
            } else {
                let storage = open_storage(&settings).await?;
                register(&settings, form, record, Arc::new(storage)).await
            }
        }
        Command::Availability { command } => {
            let storage = open_storage(&settings).await?;
            availability(&storage, command).await
        }
        Command::Appointments { command } => {
            let storage = open_storage(&settings).await?;
            appointments(&storage, command).await
        }
    }
}

async fn open_storage(settings: &Settings) -> Result<Storage> {
    let database_url = prepare_database_url(&settings.database_url)?;
    Storage::new(&database_url).await.map_err(|error| {
        error!(%database_url, %error, "failed to open SQLite database");
        error
    })
}

fn read_record(path: &Path) -> Result<FormRecord> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("'{}' is not a JSON record", path.display()))
}

fn check(settings: &Settings, form: Form, record: &FormRecord) -> Result<()> {
    let rules = match form {
        Form::Patient => intake_core::patient_rule_table(&settings.rules_config())?,
        Form::Provider => intake_core::provider_rule_table(&RulesConfig::provider())?,
    };
    let mut engine = FieldValidationEngine::new(Arc::new(rules), Arc::new(SystemClock))?;
    for (field, value) in record.iter() {
        engine.set_value(field.clone(), value.clone());
    }

    let errors = engine.validate_all();
    if errors.is_empty() {
        println!("record is valid");
        return Ok(());
    }
    for (field, message) in &errors {
        println!("{field}: {message}");
    }
    bail!("{} field(s) failed validation", errors.len())
}

async fn register(
    settings: &Settings,
    form: Form,
    record: FormRecord,
    submitter: Arc<dyn RegistrationSubmitter>,
) -> Result<()> {
    let notices = NoticeQueue::new(settings.notice_ttl());
    let clock = Arc::new(SystemClock);
    let mut session = match form {
        Form::Patient => RegistrationSession::patient(settings, submitter, notices.clone(), clock)?,
        Form::Provider => {
            RegistrationSession::provider(settings, submitter, notices.clone(), clock)?
        }
    };
    for (field, value) in record {
        session.set_value(field, value);
    }

    while !session.steps().is_last_step() {
        match session.next() {
            NavigationOutcome::Moved { to, .. } => {
                info!(step = %session.steps().steps()[to].id, "advanced");
            }
            NavigationOutcome::Blocked {
                step,
                invalid_fields,
            } => {
                let title = &session.steps().steps()[step].title;
                println!("step '{title}' is incomplete:");
                for field in &invalid_fields {
                    if let Some(message) = session.visible_error(field) {
                        println!("  {field}: {message}");
                    }
                }
                bail!("registration blocked at step {}", step + 1);
            }
            NavigationOutcome::Unchanged => break,
        }
    }

    let outcome = session.submit().await;
    for notice in notices.active() {
        match notice.message {
            Some(message) => println!("{}: {message}", notice.title),
            None => println!("{}", notice.title),
        }
    }
    match outcome {
        Ok(receipt) => {
            println!("registration_id={}", receipt.registration_id.0);
            Ok(())
        }
        Err(err) => {
            for (field, message) in session.engine().visible_errors() {
                println!("  {field}: {message}");
            }
            Err(err.into())
        }
    }
}

async fn availability(storage: &Storage, command: AvailabilityCommand) -> Result<()> {
    match command {
        AvailabilityCommand::Show { provider, week_of } => {
            let provider = ProviderId::new(provider);
            let mut grid = AvailabilityGrid::new(week_of.unwrap_or_else(|| Local::now().date_naive()));
            grid.load(storage, &provider).await?;

            let days = grid.days();
            print!("      ");
            for day in &days {
                print!(" {}", day.format("%a %d"));
            }
            println!();
            for hour in AvailabilityGrid::hours() {
                print!("{hour:02}:00 ");
                for day in &days {
                    let key = CellKey::new(*day, hour)?;
                    print!(" {:^6}", if grid.is_selected(&key) { "##" } else { "." });
                }
                println!();
            }
            Ok(())
        }
        AvailabilityCommand::Toggle { provider, cells } => {
            let provider = ProviderId::new(provider);
            let mut grid = AvailabilityGrid::new(Local::now().date_naive());
            grid.load(storage, &provider).await?;
            for raw in &cells {
                let key: CellKey = raw.parse()?;
                let selected = grid.toggle(key);
                println!("{key} {}", if selected { "on" } else { "off" });
            }
            let changes = grid.pending_changes();
            grid.save(storage, &provider).await?;
            println!(
                "saved: {} added, {} removed",
                changes.added.len(),
                changes.removed.len()
            );
            Ok(())
        }
    }
}

fn parse_status(raw: &str) -> Result<AppointmentStatus> {
    AppointmentStatus::parse(raw).with_context(|| format!("unknown appointment status '{raw}'"))
}

async fn appointments(storage: &Storage, command: AppointmentCommand) -> Result<()> {
    match command {
        AppointmentCommand::Book {
            provider,
            patient_name,
            date,
            start_time,
            reason,
        } => {
            let request = AppointmentRequest {
                provider_id: ProviderId::new(provider),
                patient_name,
                date,
                start_time,
                reason,
            };
            match storage.create_appointment(&request).await? {
                Some(summary) => println!("booked appointment_id={}", summary.appointment_id),
                None => bail!(
                    "{} already has an appointment on {} at {}",
                    request.provider_id.as_str(),
                    request.date,
                    request.start_time
                ),
            }
        }
        AppointmentCommand::List {
            provider,
            status,
            date,
        } => {
            let filter = AppointmentFilter {
                provider_id: provider.map(ProviderId::new),
                status: status.as_deref().map(parse_status).transpose()?,
                date,
            };
            for appointment in storage.list_appointments(&filter).await? {
                println!("{}", serde_json::to_string(&appointment)?);
            }
        }
        AppointmentCommand::SetStatus {
            appointment_id,
            status,
        } => {
            let status = parse_status(&status)?;
            if !storage
                .update_appointment_status(&appointment_id, status)
                .await?
            {
                bail!("no appointment with id {appointment_id}");
            }
            println!("{appointment_id} -> {}", status.as_str());
        }
    }
    Ok(())
}
