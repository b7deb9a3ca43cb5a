// src/main.rs
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use chemviz::catalog::Confirm;
use chemviz::config::{load_config, Config};
use chemviz::models::{DatasetId, RecordFilter, UserId};
use chemviz::query::LoadedView;
use chemviz::{ClientError, Explorer};

#[derive(Parser)]
#[command(name = "chemviz", version, about = "Explore equipment datasets and export charts and reports")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and store the session
    Login {
        username: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Create an account and sign in
    Register {
        username: String,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Sign out and erase the stored session
    Logout,
    /// Show the signed-in user and effective settings
    Whoami,
    /// List visible datasets
    Datasets,
    /// Upload a CSV file as a new dataset
    Upload { file: PathBuf },
    /// Delete a dataset
    Delete {
        id: DatasetId,
        #[arg(long)]
        yes: bool,
    },
    /// Show summary and (filtered) records of a dataset
    View {
        id: DatasetId,
        #[command(flatten)]
        filter: FilterArgs,
        /// Also write the shown records as CSV
        #[arg(long)]
        csv: bool,
    },
    /// Download the server-rendered report of a dataset
    Report { id: DatasetId },
    /// Save the side-by-side distribution charts of a dataset
    Charts { id: DatasetId },
    /// List accounts (administrators only)
    Users,
    /// Delete an account and its datasets (administrators only)
    DeleteUser {
        id: UserId,
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Args, Default)]
struct FilterArgs {
    #[arg(long = "type")]
    equipment_type: Option<String>,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    pressure_min: Option<f64>,
    #[arg(long)]
    pressure_max: Option<f64>,
    #[arg(long)]
    temperature_min: Option<f64>,
    #[arg(long)]
    temperature_max: Option<f64>,
}

impl From<FilterArgs> for RecordFilter {
    fn from(args: FilterArgs) -> Self {
        RecordFilter {
            equipment_type: args.equipment_type,
            name: args.name,
            pressure_min: args.pressure_min,
            pressure_max: args.pressure_max,
            temperature_min: args.temperature_min,
            temperature_max: args.temperature_max,
        }
    }
}

struct PromptConfirm {
    assume_yes: bool,
}

impl Confirm for PromptConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        print!("{} [y/N] ", prompt);
        let _ = io::stdout().flush();
        read_line().map_or(false, |answer| matches!(answer.as_str(), "y" | "Y" | "yes"))
    }
}

fn read_line() -> Option<String> {
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).ok()?;
    Some(line.trim().to_string())
}

fn password_or_prompt(password: Option<String>) -> anyhow::Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }
    print!("Password: ");
    io::stdout().flush()?;
    read_line().ok_or_else(|| anyhow::anyhow!("No password given"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    setup_logging(&config)?;

    let cli = Cli::parse();
    let explorer = Explorer::from_config(&config).map_err(user_error)?;

    run(cli.command, &explorer, &config).await.map_err(user_error)
}

async fn run(command: Command, explorer: &Explorer, config: &Config) -> Result<(), ClientError> {
    match command {
        Command::Login { username, password } => {
            let password = password_or_prompt(password).map_err(|e| ClientError::validation(e.to_string()))?;
            let user = explorer.login(&username, &password).await?;
            println!("Signed in as {} ({})", user.username, user.role.display_name());
        }
        Command::Register { username, password, email } => {
            let password = password_or_prompt(password).map_err(|e| ClientError::validation(e.to_string()))?;
            let user = explorer.register(&username, &password, email).await?;
            println!("Account created. Signed in as {}", user.username);
        }
        Command::Logout => {
            explorer.logout();
            println!("Signed out");
        }
        Command::Whoami => {
            config.print_startup_info();
            match explorer.current_user() {
                Some(user) => println!("{} (#{}) - {}", user.username, user.id, user.role.display_name()),
                None => println!("Not signed in"),
            }
        }
        Command::Datasets => {
            explorer.refresh_datasets().await?;
            let labels = explorer.dataset_labels();
            if labels.is_empty() {
                println!("No datasets yet. Upload one with `chemviz upload <file.csv>`.");
            }
            for label in labels {
                println!("{}", label);
            }
        }
        Command::Upload { file } => {
            let dataset = explorer.upload_dataset(&file).await?;
            println!("Uploaded as dataset #{}", dataset.id);
        }
        Command::Delete { id, yes } => {
            let outcome = explorer.delete_dataset(id, &PromptConfirm { assume_yes: yes }).await?;
            println!("{:?}", outcome);
        }
        Command::View { id, filter, csv } => {
            explorer.select_dataset(id).await?;
            let filter = RecordFilter::from(filter);
            if !filter.is_unconstrained() {
                explorer.apply_filter(filter).await?;
            }
            if let Some(view) = explorer.query().state.view() {
                print_view(view);
            }
            if csv {
                let path = explorer.export_records()?;
                println!("Records saved to {}", path.display());
            }
        }
        Command::Report { id } => {
            let path = explorer.download_report(id).await?;
            println!("Report saved to {}", path.display());
        }
        Command::Charts { id } => {
            explorer.select_dataset(id).await?;
            let path = explorer.export_charts().await?;
            println!("Charts saved to {}", path.display());
        }
        Command::Users => {
            for entry in explorer.list_users().await? {
                let marker = if entry.deletable { "" } else { " (you)" };
                println!(
                    "#{} {} <{}> {}{}",
                    entry.user.id,
                    entry.user.username,
                    entry.user.email.as_deref().unwrap_or("-"),
                    entry.user.role.display_name(),
                    marker
                );
            }
        }
        Command::DeleteUser { id, yes } => {
            let outcome = explorer.delete_user(id, &PromptConfirm { assume_yes: yes }).await?;
            println!("{:?}", outcome);
        }
    }
    Ok(())
}

fn print_view(view: &LoadedView) {
    let s = &view.summary;
    println!("Dataset #{}", view.dataset_id);
    println!("  Total equipment:     {}", s.total_equipment);
    println!("  Average flowrate:    {:.2}", s.average_flowrate);
    println!("  Average pressure:    {:.2}", s.average_pressure);
    println!("  Average temperature: {:.2}", s.average_temperature);
    for (equipment_type, pct) in s.type_percentages() {
        println!("  {:<20} {:>5.1}%", equipment_type, pct);
    }

    println!();
    println!("{}", view.facets.result_label());
    println!("{}", view.facets.record_columns().join("\t"));
    for r in &view.records {
        let mut row = Vec::with_capacity(5);
        if view.facets.name_supported {
            row.push(r.name.clone().unwrap_or_default());
        }
        row.push(r.equipment_type.clone());
        row.push(format!("{:.2}", r.flowrate));
        row.push(format!("{:.2}", r.pressure));
        row.push(format!("{:.2}", r.temperature));
        println!("{}", row.join("\t"));
    }
}

fn user_error(err: ClientError) -> anyhow::Error {
    match err {
        ClientError::AuthExpired => anyhow::anyhow!("Your session has expired. Run `chemviz login <username>`."),
        ClientError::NotAuthenticated => anyhow::anyhow!("Not signed in. Run `chemviz login <username>` first."),
        other => anyhow::anyhow!(other.user_message()),
    }
}

fn setup_logging(config: &Config) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            let level = config.logging.level.as_str();
            tracing_subscriber::EnvFilter::new(level)
        });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    Ok(())
}
