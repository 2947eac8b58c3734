//! ClipCache - walk an image sequence through a movie clip cache.
//!
//! Usage: clipcache <first-frame-file> [--config cache.json] [--proxy-dir DIR] [--passes N]

use anyhow::{bail, Context, Result};
use clipcache_cache::CacheConfig;
use clipcache_clip::{ClipSettings, ClipUser, MovieClip};
use clipcache_media::ImageSequenceDecoder;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const USAGE: &str = "usage: clipcache <first-frame-file> [--config FILE] [--proxy-dir DIR] [--passes N]";

struct Args {
    path: PathBuf,
    config: Option<PathBuf>,
    proxy_dir: Option<PathBuf>,
    passes: usize,
}

fn parse_args() -> Result<Args> {
    let mut args = std::env::args().skip(1);
    let mut path = None;
    let mut config = None;
    let mut proxy_dir = None;
    let mut passes = 2;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config = Some(args.next().context("--config needs a file")?.into()),
            "--proxy-dir" => {
                proxy_dir = Some(args.next().context("--proxy-dir needs a directory")?.into())
            }
            "--passes" => {
                passes = args
                    .next()
                    .context("--passes needs a count")?
                    .parse()
                    .context("--passes needs a count")?
            }
            "-h" | "--help" => bail!(USAGE),
            _ if path.is_none() => path = Some(PathBuf::from(arg)),
            other => bail!("unexpected argument {other}\n{USAGE}"),
        }
    }

    let Some(path) = path else {
        bail!(USAGE);
    };
    Ok(Args {
        path,
        config,
        proxy_dir,
        passes,
    })
}

fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = parse_args()?;
    let config = match &args.config {
        Some(path) => CacheConfig::from_path(path)
            .with_context(|| format!("loading cache config {}", path.display()))?,
        None => CacheConfig::default(),
    };

    let mut decoder = ImageSequenceDecoder::open(&args.path)?;
    if let Some(dir) = args.proxy_dir {
        decoder = decoder.with_proxy_dir(dir);
    }

    let name = args
        .path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "clip".to_string());
    let settings = ClipSettings {
        name,
        path: args.path.clone(),
        ..Default::default()
    };
    let clip = MovieClip::new(settings, Box::new(decoder), config.frame_cache);

    let length = clip.length().unwrap_or(0);
    if length == 0 {
        warn!("No frames found for {}", args.path.display());
        return Ok(());
    }
    info!("Walking {} frames, {} passes", length, args.passes);

    for pass in 1..=args.passes {
        let start = Instant::now();
        let mut missing = 0;
        for frame in 1..=length as i32 {
            if clip.get_frame(&ClipUser::at(frame)).is_none() {
                missing += 1;
            }
        }
        info!(
            pass,
            missing,
            elapsed_ms = start.elapsed().as_millis() as u64,
            memory = clip.memory_usage(),
            "pass complete"
        );
    }

    let stats = clip.cache_stats();
    info!(
        hit_ratio = stats.hit_ratio(),
        segments = ?clip.cached_segments(&ClipUser::at(1)),
        frame_size = ?clip.last_frame_size(),
        "cache summary"
    );
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
