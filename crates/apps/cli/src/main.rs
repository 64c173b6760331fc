use std::time::Duration;

use clap::{Parser, Subcommand};
use dashboard::{
    DashboardConfig, DashboardController, DetailPanel, DetailsError, PanelState, Scene,
    StationDetails,
};
use engine::HeadlessEngine;
use foundation::{FeatureId, YearMonth};
use legend::presets;
use legend::render::render_tree;
use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use runtime::{MonthRange, ReplayDriver};
use style::{
    Direction, FilterCriteria, FilterKeys, ResourceKind, TileCoord, TileTemplate, derive_filters,
};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Layers of the stand-in basemap the headless replay runs against.
const BASEMAP: [&str; 4] = ["background", "land", "admin-0-boundary", "road-label"];

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless tooling for the groundwater and shift dashboards")]
struct Args {
    /// tipg service root (overrides TIPG_URL)
    #[arg(long)]
    tipg_url: Option<String>,

    /// Vector tile API host (overrides API_HOSTNAME)
    #[arg(long)]
    api_hostname: Option<String>,

    /// Bearer token for authenticated requests (overrides ACCESS_TOKEN)
    #[arg(long)]
    access_token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay the month range against a headless map
    Replay {
        /// groundwater or shifts
        #[arg(long, default_value = "groundwater")]
        scene: Scene,

        /// First month, YYYY-MM (default: REPLAY_START)
        #[arg(long)]
        start: Option<YearMonth>,

        /// Last month, YYYY-MM (default: REPLAY_END)
        #[arg(long)]
        end: Option<YearMonth>,

        /// Milliseconds between months (default: REPLAY_PERIOD_MS)
        #[arg(long)]
        period_ms: Option<u64>,

        /// Print the final style document as JSON
        #[arg(long)]
        dump_style: bool,
    },

    /// Print the direction-naive and direction-sensitive filters
    Filters {
        /// Loadable shift ids
        #[arg(long, value_delimiter = ',')]
        ids: Vec<String>,

        /// Forward, Backward or Both
        #[arg(long, default_value = "Both")]
        direction: Direction,

        /// Selected shift id
        #[arg(long)]
        selected: Option<String>,

        /// Track number of a picked segment
        #[arg(long)]
        track: Option<i64>,
    },

    /// Print tile URL templates, or expanded URLs for one tile
    Tiles {
        #[arg(long, default_value = "groundwater")]
        scene: Scene,

        /// Month of the station tiles, YYYY-MM (default: REPLAY_START)
        #[arg(long)]
        year_month: Option<YearMonth>,

        /// Tile to expand the templates for: z/x/y
        #[arg(long)]
        tile: Option<String>,
    },

    /// Print a legend preset as a tree
    Legend {
        /// groundwater or shifts
        #[arg(long, default_value = "groundwater")]
        preset: String,

        /// Print the state as JSON instead
        #[arg(long)]
        json: bool,
    },

    /// Fetch a station's details and print its KPIs
    Details {
        /// Station id
        #[arg(long)]
        station: String,

        /// Additional attempts for retryable failures
        #[arg(long, default_value_t = 2)]
        retries: u32,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = DashboardConfig::from_env()?;
    if let Some(url) = args.tipg_url {
        config.tipg_url = if url.ends_with('/') { url } else { format!("{url}/") };
    }
    if let Some(host) = args.api_hostname {
        config.api_hostname = host;
    }
    if args.access_token.is_some() {
        config.access_token = args.access_token;
    }

    match args.command {
        Command::Replay {
            scene,
            start,
            end,
            period_ms,
            dump_style,
        } => {
            if let Some(start) = start {
                config.replay_start = start;
            }
            if let Some(end) = end {
                config.replay_end = end;
            }
            if let Some(ms) = period_ms {
                config.replay_period = Duration::from_millis(ms);
            }
            replay(config, scene, dump_style).await?
        }
        Command::Filters {
            ids,
            direction,
            selected,
            track,
        } => print_filters(&ids, direction, selected.as_deref(), track)?,
        Command::Tiles {
            scene,
            year_month,
            tile,
        } => print_tiles(&config, scene, year_month, tile.as_deref())?,
        Command::Legend { preset, json } => {
            let state = presets::by_name(&preset)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&state)?);
            } else {
                print!("{}", render_tree(&state));
            }
        }
        Command::Details { station, retries } => {
            let client = Client::new();
            fetch_details(&client, &config, &station, retries).await?
        }
    }

    Ok(())
}

async fn replay(
    config: DashboardConfig,
    scene: Scene,
    dump_style: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let range = MonthRange::new(config.replay_start, config.replay_end)?;
    let period = config.replay_period;
    let engine = HeadlessEngine::with_style(BASEMAP);
    let mut controller = DashboardController::new(engine, scene, config)?;
    info!(
        months = range.month_count(),
        period_ms = period.as_millis() as u64,
        "replay started"
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut driver = ReplayDriver::spawn(range, period, move |month| {
        let _ = tx.send(month);
    })?;

    loop {
        tokio::select! {
            month = rx.recv() => {
                let Some(month) = month else { break };
                controller.set_year_month(month)?;
                println!("{month}");
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("replay interrupted");
                driver.cancel();
                break;
            }
        }
    }

    if dump_style {
        println!(
            "{}",
            serde_json::to_string_pretty(&controller.engine().style_json())?
        );
    }
    controller.teardown();
    Ok(())
}

fn print_filters(
    ids: &[String],
    direction: Direction,
    selected: Option<&str>,
    track: Option<i64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let criteria = FilterCriteria {
        loadable: ids.iter().map(|id| parse_feature_id(id)).collect(),
        direction,
        selected: selected.map(parse_feature_id),
        track_number: track,
    };
    let filters = derive_filters(&criteria, &FilterKeys::default());
    println!(
        "direction-naive:     {}",
        serde_json::to_string(&filters.direction_naive.to_json())?
    );
    println!(
        "direction-sensitive: {}",
        serde_json::to_string(&filters.direction_sensitive.to_json())?
    );
    Ok(())
}

fn print_tiles(
    config: &DashboardConfig,
    scene: Scene,
    year_month: Option<YearMonth>,
    tile: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let coord = tile.map(parse_tile).transpose()?;
    let templates: Vec<(String, TileTemplate)> = match scene {
        Scene::Groundwater => {
            let month = year_month.unwrap_or(config.replay_start);
            vec![(
                month.to_string(),
                config.station_tiles().template(&month.to_string()),
            )]
        }
        Scene::Shifts => {
            let api = config.vector_tile_api();
            ResourceKind::ALL
                .iter()
                .map(|kind| (kind.layer_name().to_string(), api.template(*kind)))
                .collect()
        }
    };
    for (label, template) in templates {
        match coord {
            Some(coord) => println!("{label}\t{}", template.expand(coord)),
            None => println!("{label}\t{template}"),
        }
    }
    Ok(())
}

/// `z/x/y` into a validated tile coordinate.
fn parse_tile(raw: &str) -> Result<TileCoord, Box<dyn std::error::Error>> {
    let parts: Vec<&str> = raw.split('/').collect();
    let [z, x, y] = parts.as_slice() else {
        return Err(format!("tile must be z/x/y, got {raw}").into());
    };
    Ok(TileCoord::new(z.parse()?, x.parse()?, y.parse()?)?)
}

fn parse_feature_id(raw: &str) -> FeatureId {
    match raw.parse::<i64>() {
        Ok(n) => FeatureId::from(n),
        Err(_) => FeatureId::from(raw),
    }
}

async fn fetch_details(
    client: &Client,
    config: &DashboardConfig,
    station: &str,
    retries: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut panel = DetailPanel::new(config.tipg_url.clone(), config.details_collection.clone());
    let mut request = panel.show(Some(parse_feature_id(station)));
    let mut attempt = 0;

    while let Some(next) = request.take() {
        info!(url = %next.url, attempt, "fetching station details");
        let result = get_details(client, &next.url, config.access_token.as_deref()).await;
        panel.resolve(next.seq, result);
        let retryable = matches!(panel.state(), PanelState::Failed { retryable: true, .. });
        if retryable && attempt < retries {
            attempt += 1;
            tokio::time::sleep(Duration::from_millis(500 * u64::from(attempt))).await;
            request = panel.retry();
        }
    }

    match panel.state() {
        PanelState::Loaded { details, .. } => {
            println!("{} ({})", details.name, details.id);
            for kpi in details.kpis() {
                println!("  {:<34}{}", kpi.title, kpi.formatted());
            }
            Ok(())
        }
        PanelState::Failed { error, .. } => Err(error.clone().into()),
        _ => Err("station details not loaded".into()),
    }
}

async fn get_details(
    client: &Client,
    url: &str,
    token: Option<&str>,
) -> Result<StationDetails, DetailsError> {
    let mut req = client.get(url);
    if let Some(token) = token {
        req = req.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    let resp = req
        .send()
        .await
        .map_err(|e| DetailsError::Network(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(DetailsError::Status(resp.status().as_u16()));
    }
    let body = resp
        .text()
        .await
        .map_err(|e| DetailsError::Network(e.to_string()))?;
    StationDetails::from_item_json(&body)
}
