//! `terrastat schema ...`

use anyhow::{bail, Result};
use clap::Subcommand;
use terrastat_db::ProjectDb;
use terrastat_pipeline::PipelineConfig;
use tracing::info;

#[derive(Subcommand, Debug)]
pub enum SchemaAction {
    /// Drop and recreate a project's schema (destroys its data)
    Recreate {
        /// Project name as configured
        #[arg(short, long)]
        project: String,

        /// Confirm the destructive operation
        #[arg(long)]
        yes: bool,
    },

    /// Report whether a project's schema exists
    Status {
        /// Project name as configured
        #[arg(short, long)]
        project: String,
    },
}

pub async fn run(config: &PipelineConfig, action: SchemaAction) -> Result<()> {
    let db_config = config.db_config()?;

    match action {
        SchemaAction::Recreate { project, yes } => {
            let project = config.project(&project)?;
            if !yes {
                bail!(
                    "Refusing to recreate schema for project {} without --yes; all its data would be dropped",
                    project.name
                );
            }
            let mut db = ProjectDb::connect(&db_config, &project.name).await?;
            db.recreate_schema().await?;
            info!(project = %project.name, schema = %db.schema(), "Schema recreated");
            println!("Recreated schema {}", db.schema());
            db.close().await?;
        }
        SchemaAction::Status { project } => {
            let project = config.project(&project)?;
            let mut db = ProjectDb::connect(&db_config, &project.name).await?;
            if db.schema_exists().await? {
                let zone_fields = db.count_zone_fields().await?;
                let zones = db.count_zones().await?;
                let zonal_stats = db.count_zonal_stats().await?;
                println!(
                    "{}: {} zone fields, {} zones, {} zonal stats",
                    db.schema(),
                    zone_fields,
                    zones,
                    zonal_stats
                );
            } else {
                println!("{}: missing", db.schema());
            }
            db.close().await?;
        }
    }
    Ok(())
}
