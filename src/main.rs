mod app;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use app::App;
use citymap_core::{AppError, Config};
use citymap_geocode::{CityTable, ExportFormat};

#[derive(Debug, Parser)]
#[command(name = "citymap", version, about = "Geocode cities and look up what's around them")]
struct Cli {
    /// Config file (defaults to <config dir>/citymap/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Resolve city names to coordinates
    Resolve {
        #[arg(required = true)]
        names: Vec<String>,
        /// primary (Nominatim) or secondary (Bing)
        #[arg(long)]
        provider: Option<String>,
        /// Lookups in flight at once
        #[arg(long, default_value_t = 1)]
        concurrency: usize,
        /// Print the table as JSON
        #[arg(long)]
        json: bool,
    },
    /// Dump the coordinate cache
    Export {
        #[arg(long, default_value = "csv")]
        format: ExportFormat,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Drop one cached name so it is looked up again
    Forget { name: String },
    /// Drop cached entries
    Clear {
        /// Only drop "not found" entries
        #[arg(long)]
        negative_only: bool,
    },
    /// Temperature and air quality for a city
    Weather {
        city: String,
        #[arg(long)]
        provider: Option<String>,
    },
    /// Points of interest near a city
    Poi {
        city: String,
        /// OpenTripMap categories, e.g. "museums"
        #[arg(long)]
        kinds: Option<String>,
        /// Search radius in meters
        #[arg(long)]
        radius: Option<u32>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        provider: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    citymap_core::init()?;

    if let Err(e) = run(cli).await {
        tracing::error!("{}", e);
        eprintln!("{}", e.user_message());
        eprintln!("  {}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let (config, _) = Config::load_validated(cli.config.as_deref())?;
    let app = App::new(config)?;
    tracing::debug!("Data directory: {}", app.config().data_dir.display());

    match cli.command {
        Command::Resolve {
            names,
            provider,
            concurrency,
            json,
        } => {
            let provider = app.provider(provider.as_deref())?;
            let table = app.resolve(names, provider, concurrency).await?;
            if json {
                let text = serde_json::to_string_pretty(&table).map_err(anyhow::Error::from)?;
                println!("{}", text);
            } else {
                print_table(&table);
            }
        }
        Command::Export { format, output } => {
            let (path, count) = app.export(format, output)?;
            println!("Exported {} entries to {}", count, path.display());
        }
        Command::Forget { name } => {
            if app.forget(&name)? {
                println!("Forgot '{}'", name);
            } else {
                println!("'{}' was not cached", name);
            }
        }
        Command::Clear { negative_only } => {
            let removed = app.clear(negative_only)?;
            println!("Removed {} cached entries", removed);
        }
        Command::Weather { city, provider } => {
            let provider = app.provider(provider.as_deref())?;
            let report = app.weather(&city, provider).await?;

            println!("{} ({})", city, report.coords);
            match report.temperature {
                Some(t) => println!("  Temperature: {:.1} °C", t),
                None => println!("  Temperature: unknown"),
            }
            match report.air_quality {
                Ok(aq) => {
                    println!("  Air quality: {}", aq.category);
                    for (component, value) in &aq.components {
                        println!("    {:<6} {:>9.2} µg/m³", component, value);
                    }
                }
                Err(e) => println!("  {}", e.failure_message("air quality")),
            }
        }
        Command::Poi {
            city,
            kinds,
            radius,
            limit,
            provider,
        } => {
            let provider = app.provider(provider.as_deref())?;
            let mut query = app.poi_query();
            if let Some(kinds) = kinds {
                query = query.with_kinds(kinds);
            }
            if let Some(radius) = radius {
                query = query.with_radius(radius);
            }
            if let Some(limit) = limit {
                query = query.with_limit(limit);
            }

            let places = app.points_of_interest(&city, provider, query).await?;
            if places.is_empty() {
                println!("No points of interest found near {}", city);
            }
            for place in &places {
                println!("{:<40} {:>20}  {}", place.name, place.coords.to_string(), place.kinds);
            }
        }
    }

    Ok(())
}

fn print_table(table: &CityTable) {
    println!("{:<30} {:>12} {:>12}", "city", "lat", "lon");
    for row in table.iter() {
        let fmt = |v: Option<f64>| v.map(|v| format!("{:.6}", v)).unwrap_or_else(|| "-".to_string());
        println!("{:<30} {:>12} {:>12}", row.city, fmt(row.lat), fmt(row.lon));
    }
}
