use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing_subscriber::fmt::SubscriberBuilder;

use ksr3::prelude::*;

mod provenance;

#[derive(Parser)]
#[command(name = "ksr3")]
#[command(about = "Kinetic space partitioning runner")]
struct Cmd {
    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand)]
enum Action {
    /// Partition input polygons and write the result soups as JSON
    Partition {
        #[arg(long)]
        input: String,
        #[arg(long)]
        out: String,
        /// Crossing budget per input polygon
        #[arg(long, default_value_t = 2)]
        k: u32,
        /// Bounding box enlargement ratio
        #[arg(long, default_value_t = 1.1)]
        enlarge: f64,
        /// Include the bounding-box walls in the face soup
        #[arg(long, default_value_t = false)]
        with_bbox: bool,
    },
    /// Draw seeded random polygons and write them as partition input
    Sample {
        #[arg(long, default_value_t = 3)]
        count: u64,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long)]
        out: String,
    },
    /// Print a small provenance JSON block
    Report,
}

/// Input and sample file format: a list of 3D corner loops.
#[derive(Serialize, Deserialize)]
struct PolygonSoup {
    polygons: Vec<Vec<[f64; 3]>>,
}

fn main() -> Result<()> {
    SubscriberBuilder::default().with_target(false).init();
    let cmd = Cmd::parse();
    match cmd.action {
        Action::Partition {
            input,
            out,
            k,
            enlarge,
            with_bbox,
        } => partition(input, out, k, enlarge, with_bbox),
        Action::Sample { count, seed, out } => sample(count, seed, out),
        Action::Report => report(),
    }
}

fn partition(input: String, out: String, k: u32, enlarge: f64, with_bbox: bool) -> Result<()> {
    tracing::info!(input, out, k, enlarge, "partition");
    let text = std::fs::read_to_string(&input).with_context(|| format!("reading {input}"))?;
    let soup: PolygonSoup = serde_json::from_str(&text).context("parsing input polygons")?;
    let polys: Vec<Vec<Vec3<f64>>> = soup
        .polygons
        .iter()
        .map(|poly| poly.iter().map(|p| Vec3::new(p[0], p[1], p[2])).collect())
        .collect();

    let cfg = PartitionCfg {
        k,
        enlarge_bbox_ratio: enlarge,
        ..PartitionCfg::default()
    };
    let mut engine = KineticEngine::new(cfg);
    engine.partition(&polys, |p| p.as_slice())?;
    tracing::info!(
        events = engine.events_applied(),
        planes = engine.data().num_support_planes(),
        "partition done"
    );

    let segments: Vec<[[f64; 3]; 2]> = partition_edges_to_segment_soup(engine.data())
        .iter()
        .map(|s| [flat3(&s.source), flat3(&s.target)])
        .collect();
    let faces: Vec<Vec<[f64; 3]>> = partition_faces_to_polygon_soup(engine.data(), with_bbox)
        .iter()
        .map(|poly| poly.iter().map(flat3).collect())
        .collect();

    let num_segments = segments.len();
    let num_faces = faces.len();
    let result = serde_json::json!({
        "planes": engine.data().num_support_planes(),
        "events": engine.events_applied(),
        "segments": segments,
        "faces": faces,
    });
    write_with_parents(&out, &serde_json::to_vec_pretty(&result)?)?;
    provenance::write_sidecar(
        &out,
        provenance::Payload::with_stats(
            serde_json::json!({
                "input": input,
                "k": k,
                "enlarge": enlarge,
                "with_bbox": with_bbox,
            }),
            serde_json::json!({
                "polygons": polys.len(),
                "planes": engine.data().num_support_planes(),
                "events": engine.events_applied(),
                "segments": num_segments,
                "faces": num_faces,
            }),
        ),
    )?;
    Ok(())
}

fn sample(count: u64, seed: u64, out: String) -> Result<()> {
    tracing::info!(count, seed, out, "sample");
    let polygons: Vec<Vec<[f64; 3]>> = (0..count)
        .map(|index| {
            draw_polygon_3(PolyCfg::default(), ReplayToken { seed, index })
                .iter()
                .map(flat3)
                .collect()
        })
        .collect();
    let soup = PolygonSoup { polygons };
    write_with_parents(&out, &serde_json::to_vec_pretty(&soup)?)?;
    provenance::write_sidecar(
        &out,
        provenance::Payload::new(serde_json::json!({
            "count": count,
            "seed": seed,
        })),
    )?;
    Ok(())
}

fn report() -> Result<()> {
    let doc = serde_json::json!({
        "code_rev": provenance::current_git_rev(),
        "ksr3_version": ksr3::VERSION,
    });
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

fn flat3(v: &Vec3<f64>) -> [f64; 3] {
    [v.x, v.y, v.z]
}

fn write_with_parents(path: &str, bytes: &[u8]) -> Result<()> {
    let out_path = Path::new(path);
    if let Some(parent) = out_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    std::fs::write(out_path, bytes).with_context(|| format!("writing {path}"))?;
    Ok(())
}
