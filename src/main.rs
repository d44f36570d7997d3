use std::env;
use std::process;
use std::time::SystemTime;

use toromap::{Feature, GenerationSettings, Terrain, TerrainGenerator, TerrainMap, TerrainRenderer};
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

struct CliArgs {
    seed: u32,
    output: String,
}

fn usage() -> &'static str {
    "Usage: toromap-cli [--seed N] [--output FILE]\n\
     Generates a 100x200 map, prints a preview and its stats, saves it as PNG.\n\
     Log level comes from RUST_LOG (default toromap=info)."
}

fn parse_args() -> Result<CliArgs, String> {
    let args: Vec<String> = env::args().collect();
    let mut seed = None;
    let mut output = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--seed" => {
                let value = args.get(i + 1).ok_or("--seed needs a value")?;
                seed = Some(
                    value
                        .parse::<u32>()
                        .map_err(|_| format!("invalid seed: {}", value))?,
                );
                i += 1;
            }
            "--output" => {
                output = Some(args.get(i + 1).ok_or("--output needs a value")?.clone());
                i += 1;
            }
            "--help" | "-h" => {
                println!("{}", usage());
                process::exit(0);
            }
            other => return Err(format!("unknown argument: {}", other)),
        }
        i += 1;
    }

    let seed = seed.unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0)
    });
    let output = output.unwrap_or_else(|| format!("toromap_seed_{}.png", seed));
    Ok(CliArgs { seed, output })
}

fn print_map_ascii(map: &TerrainMap) {
    // sampled so the preview fits a terminal
    let step_x = (map.width / 100).max(1);
    let step_y = (map.height / 50).max(1);

    for row in (0..map.height).step_by(step_y) {
        for col in (0..map.width).step_by(step_x) {
            let cell = map.grid.get((row, col));
            let (color_code, ch) = match (cell.terrain, cell.feature) {
                (Terrain::MapBorder, _) => ("\x1b[90m", '#'),
                (_, Feature::City) => ("\x1b[97m", '@'),
                (_, Feature::River) => ("\x1b[94m", '='),
                (_, Feature::CountryBorder) => ("\x1b[91m", '+'),
                (Terrain::Sea, _) => ("\x1b[34m", '~'),
                (Terrain::Mountain, _) => ("\x1b[33m", '^'),
                (Terrain::Land, _) => ("\x1b[32m", '.'),
            };
            print!("{}{}\x1b[0m", color_code, ch);
        }
        println!();
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("toromap=info")))
        .init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{}\n\n{}", message, usage());
            process::exit(2);
        }
    };

    info!("Generating map with seed {}", args.seed);
    let mut generator = TerrainGenerator::new_with_settings(args.seed, GenerationSettings::default());
    let map = match generator.generate() {
        Ok(map) => map,
        Err(e) => {
            error!("Generation failed: {}", e);
            process::exit(1);
        }
    };

    print_map_ascii(&map);
    match serde_json::to_string_pretty(&map.stats) {
        Ok(json) => println!("{}", json),
        Err(e) => error!("Could not serialize stats: {}", e),
    }

    let saved = TerrainRenderer::render_to_image(&map)
        .and_then(|img| img.save(&args.output).map_err(Into::into));
    match saved {
        Ok(()) => info!("Map saved as: {}", args.output),
        Err(e) => {
            error!("Error saving map: {}", e);
            process::exit(1);
        }
    }
}
