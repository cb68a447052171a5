//! Processing plan inspection command.

use clap::Args;

use super::common::{SceneArgs, load_scene};

#[derive(Args)]
pub struct PlanArgs {
    #[command(flatten)]
    scene: SceneArgs,
}

pub fn run(args: PlanArgs) -> anyhow::Result<()> {
    let mut scene = load_scene(&args.scene)?;
    let report = scene.engine.rebuild()?.clone();
    let engine = &scene.engine;
    let tree = engine.tree();

    println!("Patch: {}", scene.name);
    println!("Configuration: {}", engine.config());
    println!();

    println!("Execution order:");
    for (i, id) in report.order.iter().enumerate() {
        match tree.get(*id) {
            Some(node) => println!("  {:>3}. {} ({}, {})", i + 1, node.name(), id, node.kind().label()),
            None => println!("  {:>3}. {}", i + 1, id),
        }
    }
    println!();

    if let Some(path) = engine.path() {
        print!("{}", path.describe(tree));
        println!();
    }

    if report.is_clean() {
        println!("All {} connection(s) routed.", engine.connections().len());
    } else {
        println!("Dropped connections:");
        for dropped in &report.dropped {
            println!("  {}: {}", dropped.connection, dropped.reason);
        }
    }
    Ok(())
}
