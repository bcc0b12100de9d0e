use aixm_graph::{next_offset, prev_offset, DatasetIndex, FeatureTypeRegistry};
use std::{env, path::Path, sync::Arc};

const PAGE_LIMIT: usize = 50;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        eprintln!(
            "Usage: {} <features_config.json> <dataset.xml|dataset.zip> <feature_type|feature_id> [offset] [key]",
            args[0]
        );
        std::process::exit(1);
    }

    tracing_subscriber::fmt::init();

    let registry = Arc::new(FeatureTypeRegistry::from_json_file(Path::new(&args[1]))?);
    let mut dataset = DatasetIndex::new(&args[2], registry);
    dataset.process()?;

    let name = &args[3];
    let offset = args.get(4).map(|s| s.parse::<usize>()).transpose()?.unwrap_or(0);
    let key = args.get(5).map(String::as_str);

    if let Some(feature) = dataset.feature_by_id(name) {
        let graph = dataset.graph_for(feature);
        println!("{}", serde_json::to_string_pretty(&graph)?);
        return Ok(());
    }

    if !dataset.has_feature_type(name) {
        eprintln!("No feature or feature type named {name} in {}", dataset.name());
        std::process::exit(1);
    }

    let size = dataset.features_by_type(name, key).count();
    let graph = dataset.graph_for_features(dataset.features_by_type(name, key), offset, PAGE_LIMIT);
    let page = serde_json::json!({
        "offset": offset,
        "limit": PAGE_LIMIT,
        "size": size,
        "graph": graph,
        "next_offset": next_offset(offset, PAGE_LIMIT, size),
        "prev_offset": prev_offset(offset, PAGE_LIMIT),
    });
    println!("{}", serde_json::to_string_pretty(&page)?);

    Ok(())
}
