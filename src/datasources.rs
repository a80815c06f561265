use std::path::PathBuf;

use anyhow::Result;
use chatbot_core::models::{DataSourceUpdate, ProcessConfig};
use chatbot_core::{
    AppContext, DataSource, DataSourceId, NewDataSource, ProcessingStatus, SourceType,
};
use clap::Subcommand;
use colored::*;
use dialoguer::{theme::ColorfulTheme, Confirm, Select};

use crate::explain;

#[derive(Subcommand)]
pub enum DataSourceCommand {
    /// List all data sources
    List,
    /// Show one data source in full
    Show { id: i64 },
    /// Upload a PDF, DOC or TXT file (5MB max)
    Create {
        title: String,
        /// File to upload
        #[arg(short, long)]
        file: PathBuf,
        /// pdf, doc or txt (asked for when omitted)
        #[arg(short = 't', long = "type", value_parser = parse_source_type)]
        source_type: Option<SourceType>,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// Change the title or description
    Update {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete a data source
    Delete {
        id: i64,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Start (or retry) processing
    Process {
        id: i64,
        #[arg(long)]
        chunk_size: Option<u32>,
        #[arg(long)]
        overlap: Option<u32>,
        #[arg(long)]
        embedding_model: Option<String>,
    },
}

fn parse_source_type(s: &str) -> Result<SourceType, String> {
    s.parse()
}

fn status_badge(status: ProcessingStatus) -> ColoredString {
    let label = status.as_str();
    match status {
        ProcessingStatus::Unprocessed => label.dimmed(),
        ProcessingStatus::Processing => label.yellow(),
        ProcessingStatus::Completed => label.green(),
        ProcessingStatus::Failed => label.red().bold(),
    }
}

fn print_row(datasource: &DataSource) {
    println!(
        "{:>5}  {:<4} {:<12} {}",
        datasource.id.to_string().dimmed(),
        datasource.source_type.label().magenta(),
        status_badge(datasource.processing_status),
        datasource.title.bold()
    );
}

fn print_details(datasource: &DataSource) {
    println!("{}", datasource.title.bold());
    println!("  {:<12} {}", "id".dimmed(), datasource.id);
    println!("  {:<12} {}", "type".dimmed(), datasource.source_type.label());
    println!(
        "  {:<12} {}",
        "status".dimmed(),
        status_badge(datasource.processing_status)
    );
    if !datasource.description.is_empty() {
        println!("  {:<12} {}", "description".dimmed(), datasource.description);
    }
    println!("  {:<12} {}", "location".dimmed(), datasource.location);
    println!(
        "  {:<12} {}",
        "created".dimmed(),
        datasource.created_at.format("%Y-%m-%d %H:%M")
    );
    println!(
        "  {:<12} {}",
        "active".dimmed(),
        if datasource.is_active { "yes" } else { "no" }
    );
    if let Some(config) = &datasource.processing_config {
        println!(
            "  {:<12} {}",
            "config".dimmed(),
            serde_json::Value::Object(config.clone())
        );
    }
}

pub async fn run(context: &AppContext, command: DataSourceCommand) -> Result<()> {
    let manager = context.datasources();

    match command {
        DataSourceCommand::List => {
            let items = manager
                .list()
                .await
                .map_err(|e| explain(e, "Failed to fetch datasources"))?;
            if items.is_empty() {
                println!("{}", "No data sources".yellow());
            }
            for datasource in &items {
                print_row(datasource);
            }
        }
        DataSourceCommand::Show { id } => {
            let datasource = manager
                .get(DataSourceId(id))
                .await
                .map_err(|e| explain(e, "Failed to fetch datasource"))?;
            print_details(&datasource);
        }
        DataSourceCommand::Create {
            title,
            file,
            source_type,
            description,
        } => {
            let source_type = match source_type {
                Some(source_type) => source_type,
                None => {
                    let types = SourceType::all();
                    let labels: Vec<&str> = types.iter().map(|t| t.label()).collect();
                    let choice = Select::with_theme(&ColorfulTheme::default())
                        .with_prompt("File type")
                        .items(&labels)
                        .default(0)
                        .interact()?;
                    types[choice]
                }
            };

            let form = NewDataSource {
                title,
                source_type: Some(source_type),
                description,
                file: Some(file),
            };
            println!("{}", "Uploading...".dimmed());
            let datasource = manager
                .create(&form)
                .await
                .map_err(|e| explain(e, "Failed to create datasource"))?;
            println!("{}", "Created".green());
            print_row(&datasource);
        }
        DataSourceCommand::Update {
            id,
            title,
            description,
        } => {
            let update = DataSourceUpdate { title, description };
            if update.is_empty() {
                println!("{}", "Nothing to update".yellow());
                return Ok(());
            }
            let datasource = manager
                .update(DataSourceId(id), &update)
                .await
                .map_err(|e| explain(e, "Failed to update datasource"))?;
            println!("{}", "Updated".green());
            print_row(&datasource);
        }
        DataSourceCommand::Delete { id, yes } => {
            let confirmed = yes
                || Confirm::with_theme(&ColorfulTheme::default())
                    .with_prompt(format!("Delete data source {}?", id))
                    .default(false)
                    .interact()?;
            if !confirmed {
                println!("{}", "Cancelled".yellow());
                return Ok(());
            }
            manager
                .delete(DataSourceId(id))
                .await
                .map_err(|e| explain(e, "Failed to delete datasource"))?;
            println!("{} {}", "Deleted data source".green(), id);
        }
        DataSourceCommand::Process {
            id,
            chunk_size,
            overlap,
            embedding_model,
        } => {
            let id = DataSourceId(id);
            // Fetch first so a source that is already processing is refused locally.
            manager
                .get(id)
                .await
                .map_err(|e| explain(e, "Failed to fetch datasource"))?;

            let config = ProcessConfig {
                chunk_size,
                overlap,
                embedding_model,
                ..ProcessConfig::default()
            };
            let config = (config != ProcessConfig::default()).then_some(config);
            let outcome = manager
                .process(id, config.as_ref())
                .await
                .map_err(|e| explain(e, "Failed to process datasource"))?;
            println!(
                "{} {}",
                "Processing requested:".green(),
                status_badge(outcome.status)
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_source_type() {
        assert_eq!(parse_source_type("PDF"), Ok(SourceType::Pdf));
        assert!(parse_source_type("docx").unwrap_err().contains("docx"));
    }
}
