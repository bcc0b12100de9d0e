use aixm_graph::{DatasetIndex, FeatureTypeRegistry};
use std::{env, path::Path, sync::Arc};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    if args.len() != 3 {
        eprintln!("Usage: {} <features_config.json> <dataset.xml|dataset.zip>", args[0]);
        std::process::exit(1);
    }

    tracing_subscriber::fmt::init();

    let registry = Arc::new(FeatureTypeRegistry::from_json_file(Path::new(&args[1]))?);
    let mut dataset = DatasetIndex::new(&args[2], registry);
    dataset.process()?;

    for (name, stats) in dataset.type_statistics() {
        println!("{name:<30} {:>8} features {:>8} with broken references", stats.size, stats.broken_count);
    }

    let path = dataset.generate_skeleton()?;
    println!("Skeleton written to {}", path.display());

    Ok(())
}
