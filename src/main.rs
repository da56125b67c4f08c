//! ehr CLI - load patient/lab tables and query them

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use ehr_analysis::config::{self, EhrConfig};
use ehr_analysis::storage::EhrStore;
use ehr_analysis::ui::{self, Icons, TableBuilder};
use ehr_analysis::{Error, Operator, Patient};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "ehr")]
#[command(version)]
#[command(about = "Load tab-delimited patient and lab tables into SQLite and query them")]
#[command(long_about = r#"
ehr loads a patients file and a labs file into a SQLite database, replacing
whatever the database held before, and answers per-patient questions:
  • demographics and age
  • age at earliest lab (earliest admission)
  • whether any lab of a given name crosses a threshold

Example usage:
  ehr ingest --patients PatientCorePopulatedTable.txt --labs LabsCorePopulatedTable.txt
  ehr patient --id 1
  ehr sick --id 1 --lab HDL --op '>' --threshold 30
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file (defaults to ehr.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the database file (overrides the config file)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default ehr.toml
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Replace the database contents with a patients/labs file pair
    Ingest {
        /// Patients TSV (id, gender, dob, race)
        #[arg(short, long)]
        patients: Option<PathBuf>,

        /// Labs TSV (patient_id, lab_name, lab_value, lab_units, lab_date)
        #[arg(short, long)]
        labs: Option<PathBuf>,
    },

    /// Show a patient's fields and derived ages
    Patient {
        /// Patient identifier
        #[arg(short, long)]
        id: String,
    },

    /// List a patient's labs
    Labs {
        /// Patient identifier
        #[arg(short, long)]
        id: String,
    },

    /// Check whether any lab of a given name crosses a threshold
    Sick {
        /// Patient identifier
        #[arg(short, long)]
        id: String,

        /// Lab name, e.g. HDL
        #[arg(short, long)]
        lab: String,

        /// Comparison: '>' or '<'
        #[arg(short, long)]
        op: String,

        /// Threshold value
        #[arg(short, long, allow_negative_numbers = true)]
        threshold: f64,

        /// Reject operators other than '>' and '<' instead of answering false
        #[arg(long)]
        strict: bool,
    },

    /// Show row counts
    Stats,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let cfg = config::load_config(Some(config_path.as_path()))?.unwrap_or_default();
    let database = cfg.database_path(cli.database.as_deref());

    match cli.command {
        Commands::Init { force } => {
            let fresh = EhrConfig {
                database: Some(database.display().to_string()),
                ..cfg
            };
            config::write_config(&config_path, &fresh, force)?;
            ui::success(&format!("Wrote {}", config_path.display()));
        }

        Commands::Ingest { patients, labs } => {
            let patients = resolve_input(patients, cfg.patients.as_deref(), "patients")?;
            let labs = resolve_input(labs, cfg.labs.as_deref(), "labs")?;

            config::ensure_db_dir(&database)?;
            let mut store = EhrStore::open(&database)?;
            tracing::info!("Loading {} and {} into {:?}", patients.display(), labs.display(), database);

            let (patient_handles, lab_handles) = ehr_analysis::parse_data(&mut store, &patients, &labs)?;
            let stats = store.stats()?;

            if cli.format == OutputFormat::Json {
                let data = serde_json::json!({
                    "database": database.display().to_string(),
                    "patients": patient_handles.len(),
                    "labs": lab_handles.len(),
                    "orphan_labs": stats.orphan_labs,
                });
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                ui::header(Icons::FILE, "Ingestion complete");
                ui::summary_row("Patients file:", &patients.display().to_string());
                ui::summary_row("Labs file:", &labs.display().to_string());
                ui::summary_row("Database:", &database.display().to_string());
                println!(
                    "{}",
                    ui::stats_table(&[
                        ("Patients", patient_handles.len().to_string().as_str()),
                        ("Labs", lab_handles.len().to_string().as_str()),
                    ])
                );
                if stats.orphan_labs > 0 {
                    ui::warn(&format!("{} labs reference patients that are not in the patients file", stats.orphan_labs));
                }
            }
        }

        Commands::Patient { id } => {
            let store = open_existing(&database)?;
            let patient = Patient::new(id);
            let record = patient.record(&store)?;
            let age = patient.age(&store)?;
            let earliest = optional(patient.earliest_admission(&store))?;
            let lab_count = patient.labs(&store)?.len();

            if cli.format == OutputFormat::Json {
                let data = serde_json::json!({
                    "patient": record,
                    "age": age,
                    "earliest_admission": earliest,
                    "labs": lab_count,
                });
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                ui::header(Icons::PERSON, &patient.to_string());
                let mut table = TableBuilder::new();
                table.add_row("Gender", &record.gender);
                table.add_row("Date of birth", &record.dob);
                table.add_row("Race", &record.race);
                table.add_row("Age", &age.to_string());
                table.add_row(
                    "Earliest admission",
                    &earliest.map(|years| years.to_string()).unwrap_or_else(|| "no labs".to_string()),
                );
                table.add_row("Labs", &lab_count.to_string());
                println!("{}", table.build());
            }
        }

        Commands::Labs { id } => {
            let store = open_existing(&database)?;
            let labs = store.list_labs_for_patient(&id)?;

            if cli.format == OutputFormat::Json {
                let records: Vec<_> = labs.iter().map(|stored| &stored.record).collect();
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if labs.is_empty() {
                ui::info("Labs", &format!("none for patient {}", id));
            } else {
                ui::header(Icons::LAB, &format!("Labs for patient {}", id));
                println!("{}", ui::labs_table(&labs));
            }
        }

        Commands::Sick { id, lab, op, threshold, strict } => {
            if strict {
                op.parse::<Operator>()?;
            }
            let store = open_existing(&database)?;
            let sick = Patient::new(id.clone()).is_sick(&store, &lab, &op, threshold)?;

            if cli.format == OutputFormat::Json {
                let data = serde_json::json!({
                    "patient": id,
                    "lab": lab,
                    "operator": op,
                    "threshold": threshold,
                    "sick": sick,
                });
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else if sick {
                ui::warn(&format!("patient {}: {} {} {} matched", id, lab, op, threshold));
            } else {
                ui::success(&format!("patient {}: no {} {} {}", id, lab, op, threshold));
            }
        }

        Commands::Stats => {
            let store = open_existing(&database)?;
            let stats = store.stats()?;

            if cli.format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                ui::header(Icons::STATS, &format!("ehr statistics ({})", database.display()));
                ui::section("Tables");
                println!(
                    "{}",
                    ui::stats_table(&[
                        ("Patients", stats.patients.to_string().as_str()),
                        ("Labs", stats.labs.to_string().as_str()),
                        ("Labs without patient", stats.orphan_labs.to_string().as_str()),
                    ])
                );
            }
        }
    }

    Ok(())
}

fn resolve_input(flag: Option<PathBuf>, configured: Option<&str>, what: &str) -> anyhow::Result<PathBuf> {
    flag.or_else(|| configured.map(PathBuf::from))
        .ok_or_else(|| anyhow::anyhow!("no {} file given (pass --{} or set `{}` in ehr.toml)", what, what, what))
}

fn open_existing(database: &Path) -> anyhow::Result<EhrStore> {
    if !database.exists() {
        ui::error(&format!("{} Database not found: {}", Icons::DATABASE, database.display()));
        anyhow::bail!("run `ehr ingest` first");
    }
    Ok(EhrStore::open(database)?)
}

/// Turn a `NotFound` into `None`, keep every other error
fn optional<T>(result: ehr_analysis::Result<T>) -> ehr_analysis::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(Error::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}
