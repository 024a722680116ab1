use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;

mod align;
mod db;
mod models;
mod projection;
mod report;
mod series;
mod week;

use models::{CombineMode, GroupData, GroupInfo};

#[derive(Parser)]
#[command(name = "campaign-pace")]
#[command(about = "Weekly pace and projection reports for fundraising campaigns", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum CombineModeArg {
    Average,
    Median,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Markdown,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import entries or donations from a CSV file
    #[command(group(
        ArgGroup::new("input")
            .args(["entries", "donations"])
            .required(true)
            .multiple(false)
    ))]
    Import {
        #[arg(long)]
        entries: Option<PathBuf>,
        #[arg(long)]
        donations: Option<PathBuf>,
    },
    /// Render the weekly pace report for a campaign group
    Report {
        /// Campaign category; defaults to the newest group's category
        #[arg(long)]
        category: Option<String>,
        /// Campaign year; defaults to the newest year in the category
        #[arg(long)]
        year: Option<i32>,
        /// Comparison year, or "none"; defaults to the previous year
        #[arg(long)]
        compare: Option<String>,
        /// Second comparison year, or "none"; defaults to two years back
        #[arg(long)]
        compare2: Option<String>,
        /// Shift comparison curves by this many days before aligning
        #[arg(long, default_value_t = 0)]
        offset_days: i64,
        /// Project the rest of the campaign from prior years
        #[arg(long)]
        projection: bool,
        /// Projection as-of date, YYYY-MM-DD or MM-DD; defaults to today
        #[arg(long)]
        projection_date: Option<String>,
        /// Baseline combination override; defaults per metric
        #[arg(long, value_enum)]
        combine_mode: Option<CombineModeArg>,
        /// Projection source weights, most recent year first
        #[arg(long, value_delimiter = ',', default_values_t = vec![0.6, 0.3, 0.1])]
        weights: Vec<f64>,
        #[arg(long, value_enum, default_value = "markdown")]
        format: OutputFormat,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn resolve_comparison<'a>(
    groups: &'a [GroupInfo],
    param: Option<&str>,
    default_year: i32,
    exclude_years: &[i32],
) -> anyhow::Result<Option<&'a GroupInfo>> {
    let requested = match param {
        Some("none") => return Ok(None),
        Some(value) => Some(value.parse::<i32>().with_context(|| {
            format!("comparison must be a year or \"none\", got {value}")
        })?),
        None => None,
    };
    let target = requested.unwrap_or(default_year);
    Ok(groups
        .iter()
        .find(|group| group.year == target && !exclude_years.contains(&group.year)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { entries, donations } => {
            if let Some(path) = entries {
                let inserted = db::import_entries_csv(&pool, &path).await?;
                println!("Inserted {inserted} entries from {}.", path.display());
            } else if let Some(path) = donations {
                let inserted = db::import_donations_csv(&pool, &path).await?;
                println!("Inserted {inserted} donations from {}.", path.display());
            }
        }
        Commands::Report {
            category,
            year,
            compare,
            compare2,
            offset_days,
            projection,
            projection_date,
            combine_mode,
            weights,
            format,
            out,
        } => {
            let groups = db::fetch_groups(&pool).await?;
            if groups.is_empty() {
                bail!("no event groups found; run init-db and seed or import data first");
            }

            let category = match category {
                Some(value) => groups
                    .iter()
                    .find(|group| group.category.eq_ignore_ascii_case(&value))
                    .map(|group| group.category.clone())
                    .with_context(|| format!("no event groups in category {value}"))?,
                None => groups[0].category.clone(),
            };
            let in_category: Vec<GroupInfo> = groups
                .iter()
                .filter(|group| group.category == category)
                .cloned()
                .collect();

            let year = year.unwrap_or(in_category[0].year);
            let primary = in_category
                .iter()
                .find(|group| group.year == year)
                .with_context(|| format!("no {category} group for {year}"))?;

            let compare_group =
                resolve_comparison(&in_category, compare.as_deref(), year - 1, &[year])?;
            let compare2_default = compare_group.map(|group| group.year - 1).unwrap_or(year - 2);
            let mut compare2_exclude = vec![year];
            if let Some(group) = compare_group {
                compare2_exclude.push(group.year);
            }
            let compare2_group = resolve_comparison(
                &in_category,
                compare2.as_deref(),
                compare2_default,
                &compare2_exclude,
            )?;

            // Up to the three most recent prior years feed the baseline.
            let source_groups: Vec<&GroupInfo> = in_category
                .iter()
                .filter(|group| group.year < year)
                .take(3)
                .collect();

            for weight in &weights {
                if *weight < 0.0 {
                    bail!("projection source weights must be non-negative");
                }
            }

            let projection_date = if projection {
                match projection_date.as_deref() {
                    Some(value) => Some(week::parse_projection_date(value, year).with_context(
                        || format!("projection date must be YYYY-MM-DD or MM-DD, got {value}"),
                    )?),
                    None => Some(Utc::now().date_naive()),
                }
            } else {
                None
            };

            let combine_override = combine_mode.map(|mode| match mode {
                CombineModeArg::Average => CombineMode::WeightedAverage,
                CombineModeArg::Median => CombineMode::WeightedMedian,
            });

            let mut ids = vec![primary.id];
            ids.extend(compare_group.map(|group| group.id));
            ids.extend(compare2_group.map(|group| group.id));
            ids.extend(source_groups.iter().map(|group| group.id));
            let data = db::fetch_groups_data(&pool, &ids).await?;

            let config = report::ReportConfig {
                category,
                year,
                compare_year: compare_group.map(|group| group.year),
                compare2_year: compare2_group.map(|group| group.year),
                offset_days,
                projection_date,
                combine_override,
                source_weights: weights,
            };

            let primary_data = data
                .get(&primary.id)
                .context("primary group data missing after fetch")?;
            let compare_data = compare_group.and_then(|group| data.get(&group.id));
            let compare2_data = compare2_group.and_then(|group| data.get(&group.id));
            let source_data: Vec<&GroupData> = source_groups
                .iter()
                .filter_map(|group| data.get(&group.id))
                .collect();

            let campaign_report = report::build_campaign_report(
                &config,
                primary_data,
                compare_data,
                compare2_data,
                &source_data,
            );

            let rendered = match format {
                OutputFormat::Markdown => report::render_markdown(&campaign_report),
                OutputFormat::Json => report::render_json(&campaign_report)?,
            };
            std::fs::write(&out, rendered)?;
            println!("Report written to {}.", out.display());

            if let Some(projected) = campaign_report.registrations.summary.projected_total {
                println!("Projected registrations: {projected:.0}");
            }
            if let Some(projected) = campaign_report.donations.summary.projected_total {
                println!("Projected donations: ${projected:.2}");
            }
        }
    }

    Ok(())
}
