use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use client_core::{
    AuthSession, HrClient, LetterUpload, PromotionWorkflow, SubmitOutcome,
    LETTER_PICKER_EXTENSIONS,
};
use shared::domain::{EmployeeId, PromotionId, Role};
use storage::SessionStore;
use tracing::warn;

mod config;

#[derive(Parser, Debug)]
#[command(name = "hrdesk", about = "Promotion desk client for the HR backend")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Persist a backend session (token + role) for later commands.
    Login {
        #[arg(long)]
        token: String,
        /// One of: admin, hr, employee.
        #[arg(long)]
        role: String,
        #[arg(long, default_value = "")]
        username: String,
    },
    /// Clear the persisted session.
    Logout,
    /// Print the employee roster.
    Roster,
    /// Print the active designations.
    Designations,
    /// Print the promotion records.
    Promotions,
    /// Promote an employee to a new designation.
    Promote {
        #[arg(long)]
        employee: String,
        #[arg(long)]
        designation: String,
        /// Effective date, RFC 3339. Defaults to now when omitted.
        #[arg(long)]
        date: Option<String>,
        #[arg(long, default_value = "")]
        reason: String,
        #[arg(long, default_value = "")]
        remarks: String,
        /// Scanned promotion letter to attach.
        #[arg(long)]
        letter: Option<PathBuf>,
    },
    /// Download the stored promotion letter for a record.
    DownloadLetter {
        #[arg(long)]
        promotion: String,
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();
    let settings = config::load_settings();

    let database_url = config::normalize_database_url(&settings.database_url);
    let store = SessionStore::new(&database_url).await?;

    match args.command {
        Command::Login {
            token,
            role,
            username,
        } => {
            let role: Role = role.parse()?;
            store.save_session(&token, role, &username).await?;
            println!("Session saved for role '{}'.", role.as_str());
            Ok(())
        }
        Command::Logout => {
            store.clear_session().await?;
            println!("Session cleared.");
            Ok(())
        }
        command => run_command(command, &settings, &store).await,
    }
}

async fn run_command(
    command: Command,
    settings: &config::Settings,
    store: &SessionStore,
) -> Result<()> {
    let Some(session) = store.load_session().await? else {
        bail!("no stored session; run `hrdesk login` first");
    };

    // Page-level gate: refuse the session up front, before anything mounts.
    if !session.role.can_manage_promotions() {
        bail!(
            "role '{}' may not use the promotion desk",
            session.role.as_str()
        );
    }

    url::Url::parse(&settings.api_url)
        .with_context(|| format!("invalid api url '{}'", settings.api_url))?;

    let client = Arc::new(HrClient::new(
        settings.api_url.clone(),
        AuthSession::new(session.token, session.role),
    ));
    let workflow = PromotionWorkflow::new(client);

    match command {
        Command::Roster => {
            workflow.refresh_roster().await;
            workflow.refresh_promotions().await;
            let letters = workflow.employees_with_letters().await;
            let roster = workflow.roster().await;
            if roster.is_empty() {
                println!("No employees.");
            }
            for employee in roster {
                let marker = if letters.contains(&employee.id) {
                    "letter on file"
                } else {
                    ""
                };
                println!(
                    "{:<14} {:<24} {:<18} {:<20} {marker}",
                    employee.id,
                    employee.full_name(),
                    employee.department,
                    employee.designation,
                );
            }
        }
        Command::Designations => {
            workflow.refresh_designations().await;
            let designations = workflow.designations().await;
            if designations.is_empty() {
                println!("No active designations.");
            }
            for designation in designations {
                println!("{:<14} {}", designation.id, designation.name);
            }
        }
        Command::Promotions => {
            workflow.refresh_promotions().await;
            let promotions = workflow.promotions().await;
            if promotions.is_empty() {
                println!("No promotion records.");
            }
            for record in promotions {
                let letter = match &record.promotion_letter {
                    Some(letter) => letter.original_name.as_str(),
                    None => "-",
                };
                println!(
                    "{:<14} {:<14} {} -> {} effective {} letter {letter}",
                    record.id,
                    record.employee.id,
                    record.from_designation,
                    record.to_designation,
                    record.effective_date.date_naive(),
                );
            }
        }
        Command::Promote {
            employee,
            designation,
            date,
            reason,
            remarks,
            letter,
        } => {
            workflow.refresh_roster().await;
            let employee_id = EmployeeId::new(employee);
            let Some(employee) = workflow
                .roster()
                .await
                .into_iter()
                .find(|candidate| candidate.id == employee_id)
            else {
                bail!("employee '{employee_id}' not found in roster");
            };

            if !workflow.open_dialog(employee).await {
                bail!("promotion dialog unavailable");
            }
            workflow.select_designation(designation).await;
            if let Some(raw) = date {
                let date = DateTime::parse_from_rfc3339(&raw)
                    .with_context(|| format!("invalid effective date '{raw}'"))?
                    .with_timezone(&Utc);
                workflow.set_effective_date(Some(date)).await;
            }
            workflow.set_reason(reason).await;
            workflow.set_remarks(remarks).await;

            if let Some(path) = letter {
                workflow.attach_letter(read_letter(&path).await?).await;
            }

            match workflow.submit().await {
                SubmitOutcome::Recorded(record) => {
                    println!(
                        "Promotion recorded: {} ({} to {}).",
                        record.id, record.from_designation, record.to_designation
                    );
                }
                SubmitOutcome::Rejected { warning } => bail!("submission rejected: {warning}"),
                SubmitOutcome::Failed { message } => bail!("{message}"),
            }
        }
        Command::DownloadLetter { promotion, dir } => {
            workflow.refresh_promotions().await;
            let target_dir = dir.unwrap_or_else(|| PathBuf::from(&settings.download_dir));
            let path = workflow
                .download_letter(&PromotionId::new(promotion), &target_dir)
                .await?;
            println!("Letter saved to {}.", path.display());
        }
        Command::Login { .. } | Command::Logout => unreachable!("handled in main"),
    }

    Ok(())
}

async fn read_letter(path: &Path) -> Result<LetterUpload> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if !LETTER_PICKER_EXTENSIONS.contains(&extension.as_str()) {
        warn!(
            path = %path.display(),
            "letter extension outside the picker filter; the backend decides acceptance"
        );
    }

    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read letter '{}'", path.display()))?;
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("promotion-letter")
        .to_string();
    let mime_type = match extension.as_str() {
        "pdf" => Some("application/pdf".to_string()),
        "doc" => Some("application/msword".to_string()),
        "docx" => Some(
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document".to_string(),
        ),
        _ => None,
    };

    Ok(LetterUpload {
        filename,
        mime_type,
        bytes,
    })
}
